//! Idempotent settlement execution and reconciliation.
//!
//! Every settlement is keyed by its ERC-3009 authorization nonce. The
//! executor guarantees at most one on-chain submission per nonce, no matter
//! how many times or how concurrently `/settle` is called: records live in a
//! [`DashMap`] and each record is serialized behind its own async mutex, so
//! a second caller for the same nonce waits for the first and then observes
//! its outcome instead of re-submitting.
//!
//! Status is monotonic: `pending -> submitted -> {confirmed, reverted,
//! expired}`. Terminal states never change. `expired` means the settlement
//! window closed before finality was observed, which is an indeterminate
//! outcome: the transaction may still land. It is deliberately distinct from
//! `reverted`, which is a definite on-chain failure.

use dashmap::DashMap;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::chain::{ChainAdapter, SubmitError, TerminalCall, TxInclusion};
use crate::types::{
    FacilitatorErrorReason, HexEncodedNonce, SettlementStatus, TransactionHash,
};

/// Exponential backoff schedule for retrying transient submission failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total submission attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): exponential in the
    /// attempt count, capped, with up to 50% random jitter added so
    /// concurrent settlements don't retry in lockstep.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        let jitter_cap = exp.as_millis() as u64 / 2;
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_cap)
        };
        exp + Duration::from_millis(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// Tuning for the settlement executor.
#[derive(Debug, Clone)]
pub struct SettlementSettings {
    /// Inclusion depth required before a settlement is `confirmed`.
    pub confirmations: u64,
    /// Upper bound on any settlement window; a request's
    /// `maxTimeoutSeconds` can shrink it but never extend it.
    pub max_timeout: Duration,
    /// How often to poll for a receipt while reconciling.
    pub poll_interval: Duration,
    /// Cap on concurrent on-chain submissions across all settlements.
    pub max_concurrent: usize,
    pub retry: RetryPolicy,
}

impl Default for SettlementSettings {
    fn default() -> Self {
        Self {
            confirmations: 2,
            max_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
            max_concurrent: 8,
            retry: RetryPolicy::default(),
        }
    }
}

/// Per-nonce settlement state. Status only moves forward; see
/// [`SettlementRecord::advance`].
#[derive(Debug, Clone)]
pub struct SettlementRecord {
    pub status: SettlementStatus,
    pub transaction: Option<TransactionHash>,
    pub attempts: u32,
    pub error_reason: Option<FacilitatorErrorReason>,
    pub last_error: Option<String>,
}

impl SettlementRecord {
    fn new() -> Self {
        Self {
            status: SettlementStatus::Pending,
            transaction: None,
            attempts: 0,
            error_reason: None,
            last_error: None,
        }
    }

    /// Applies a forward status transition. Backward or post-terminal
    /// transitions are refused and logged; they indicate an executor bug,
    /// not a recoverable condition.
    fn advance(&mut self, next: SettlementStatus) {
        use SettlementStatus::*;
        let allowed = match (self.status, next) {
            (Pending, Submitted) => true,
            (Pending, Reverted | Expired) => true,
            (Submitted, Confirmed | Reverted | Expired) => true,
            _ => false,
        };
        if allowed {
            self.status = next;
        } else {
            warn!(from = %self.status, to = %next, "refusing non-monotonic settlement transition");
        }
    }

    fn outcome(&self) -> SettlementOutcome {
        SettlementOutcome {
            status: self.status,
            transaction: self.transaction,
            error_reason: self.error_reason,
        }
    }
}

/// What a `settle` call reports back. A non-terminal `status` means the
/// attempt was interrupted (shutdown) and may be resumed by a later call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementOutcome {
    pub status: SettlementStatus,
    pub transaction: Option<TransactionHash>,
    pub error_reason: Option<FacilitatorErrorReason>,
}

impl SettlementOutcome {
    pub fn is_success(&self) -> bool {
        self.status == SettlementStatus::Confirmed
    }
}

/// Executes settlements exactly once per authorization nonce.
pub struct SettlementExecutor {
    records: DashMap<HexEncodedNonce, Arc<Mutex<SettlementRecord>>>,
    permits: Arc<Semaphore>,
    settings: SettlementSettings,
    cancel: CancellationToken,
}

impl SettlementExecutor {
    pub fn new(settings: SettlementSettings, cancel: CancellationToken) -> Self {
        Self {
            records: DashMap::new(),
            permits: Arc::new(Semaphore::new(settings.max_concurrent)),
            settings,
            cancel,
        }
    }

    /// Snapshot of the settlement record for a nonce, if one exists.
    pub async fn record(&self, nonce: &HexEncodedNonce) -> Option<SettlementRecord> {
        let record = self.records.get(nonce)?.clone();
        let guard = record.lock().await;
        Some(guard.clone())
    }

    /// Settles a verified payment, driving it to a terminal state or until
    /// shutdown.
    ///
    /// Idempotent per nonce: if the nonce has already reached a terminal
    /// state, that outcome is returned without touching the chain. If a
    /// previous attempt was interrupted after submission, reconciliation
    /// resumes against the recorded transaction hash.
    ///
    /// `max_timeout_seconds` comes from the payment requirements and is
    /// clamped by the executor's own cap.
    #[instrument(skip_all, fields(
        network = %adapter.network(),
        nonce = %call.authorization.nonce,
    ))]
    pub async fn settle(
        &self,
        adapter: Arc<dyn ChainAdapter>,
        call: TerminalCall,
        max_timeout_seconds: u64,
    ) -> SettlementOutcome {
        let nonce = call.authorization.nonce;
        let record = self
            .records
            .entry(nonce)
            .or_insert_with(|| Arc::new(Mutex::new(SettlementRecord::new())))
            .clone();

        // Serializes all work for this nonce. A concurrent caller parks
        // here and short-circuits on the terminal state below.
        let mut guard = record.lock().await;
        if guard.status.is_terminal() {
            return guard.outcome();
        }

        let window = Duration::from_secs(max_timeout_seconds)
            .min(self.settings.max_timeout);
        let deadline = Instant::now() + window;

        if guard.status == SettlementStatus::Pending {
            match self.submit_with_retry(&adapter, &call, &mut guard, deadline).await {
                SubmitOutcome::Submitted => {}
                SubmitOutcome::Finished => return guard.outcome(),
            }
        }

        self.reconcile(&adapter, &mut guard, deadline).await;
        guard.outcome()
    }

    /// Drives a pending record through submission, retrying transient
    /// failures with backoff. Holds a semaphore permit for the duration so
    /// total in-flight submissions stay bounded.
    async fn submit_with_retry(
        &self,
        adapter: &Arc<dyn ChainAdapter>,
        call: &TerminalCall,
        guard: &mut SettlementRecord,
        deadline: Instant,
    ) -> SubmitOutcome {
        let _permit = tokio::select! {
            permit = self.permits.clone().acquire_owned() => {
                match permit {
                    Ok(permit) => permit,
                    // Semaphore closed only on shutdown.
                    Err(_) => return SubmitOutcome::Finished,
                }
            }
            _ = self.cancel.cancelled() => return SubmitOutcome::Finished,
        };

        loop {
            guard.attempts += 1;
            let result = tokio::select! {
                result = adapter.submit(call) => result,
                _ = self.cancel.cancelled() => {
                    // The submission raced shutdown; we can't know whether
                    // it went out. Leave the record pending for a later
                    // retry rather than inventing an outcome.
                    return SubmitOutcome::Finished;
                }
            };
            match result {
                Ok(tx) => {
                    guard.advance(SettlementStatus::Submitted);
                    guard.transaction = Some(tx);
                    return SubmitOutcome::Submitted;
                }
                Err(error @ SubmitError::Transient(_)) => {
                    guard.last_error = Some(error.to_string());
                    let delay = self.settings.retry.delay(guard.attempts - 1);
                    let exhausted = guard.attempts >= self.settings.retry.max_attempts
                        || Instant::now() + delay >= deadline;
                    if exhausted {
                        // A transient failure doesn't prove the transaction
                        // never left: a timed-out broadcast may still be in
                        // the mempool. Indeterminate, so expired not reverted.
                        guard.advance(SettlementStatus::Expired);
                        guard.error_reason = Some(FacilitatorErrorReason::SettlementTimeout);
                        return SubmitOutcome::Finished;
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.cancelled() => return SubmitOutcome::Finished,
                    }
                }
                Err(SubmitError::Permanent(message)) => {
                    guard.error_reason = Some(classify_permanent(&message));
                    guard.last_error = Some(message);
                    guard.advance(SettlementStatus::Reverted);
                    return SubmitOutcome::Finished;
                }
            }
        }
    }

    /// Polls a submitted transaction until it confirms deep enough, reverts,
    /// or the settlement window closes.
    async fn reconcile(
        &self,
        adapter: &Arc<dyn ChainAdapter>,
        guard: &mut SettlementRecord,
        deadline: Instant,
    ) {
        let Some(tx) = guard.transaction else {
            // A submitted record always carries its hash; bail defensively.
            warn!("submitted settlement record has no transaction hash");
            return;
        };
        loop {
            if self.cancel.is_cancelled() {
                // Leave the record submitted; a later settle call resumes here.
                return;
            }
            if Instant::now() >= deadline {
                guard.advance(SettlementStatus::Expired);
                guard.error_reason = Some(FacilitatorErrorReason::SettlementTimeout);
                return;
            }
            match adapter.transaction_status(tx).await {
                Ok(TxInclusion::Confirmed { confirmations })
                    if confirmations >= self.settings.confirmations =>
                {
                    guard.advance(SettlementStatus::Confirmed);
                    return;
                }
                Ok(TxInclusion::Reverted) => {
                    guard.advance(SettlementStatus::Reverted);
                    guard.error_reason = Some(FacilitatorErrorReason::SettlementReverted);
                    return;
                }
                Ok(TxInclusion::Pending) | Ok(TxInclusion::Confirmed { .. }) => {}
                Err(error) => {
                    // Status lookups are read-only; any failure is safe to
                    // retry until the window closes.
                    guard.last_error = Some(error.to_string());
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                _ = self.cancel.cancelled() => return,
            }
        }
    }
}

enum SubmitOutcome {
    /// The transaction was broadcast; proceed to reconciliation.
    Submitted,
    /// The record reached its final state for this call (terminal status or
    /// interrupted by shutdown).
    Finished,
}

/// Picks the protocol error reason for a permanently rejected submission.
/// Balance failures get their own reason so clients can distinguish "payer
/// is broke" from "terminal rejected the call".
fn classify_permanent(message: &str) -> FacilitatorErrorReason {
    let lower = message.to_ascii_lowercase();
    if lower.contains("insufficient") || lower.contains("exceeds balance") {
        FacilitatorErrorReason::InsufficientFunds
    } else {
        FacilitatorErrorReason::SettlementReverted
    }
}
