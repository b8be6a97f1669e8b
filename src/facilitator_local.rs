//! Local x402 facilitator: verification plus on-chain settlement.
//!
//! [`FacilitatorLocal`] implements the [`Facilitator`] trait with in-process
//! logic: signature verification happens offline via [`crate::verify`], and
//! settlements go through the idempotent [`SettlementExecutor`] against the
//! chain adapter registered for the payment's network.

use std::sync::Arc;
use tracing::instrument;

use crate::chain::{ChainRegistry, TerminalCall};
use crate::facilitator::Facilitator;
use crate::network::Network;
use crate::settlement::SettlementExecutor;
use crate::types::{
    Scheme, SettleRequest, SettleResponse, SettlementStatus, SupportedPaymentKind,
    SupportedPaymentKindsResponse, VerifyRequest, VerifyResponse, X402Version,
};
use crate::verify::{PaymentError, verify_payment};

/// Errors a [`FacilitatorLocal`] reports to the HTTP layer. Everything here
/// maps to a 4xx; verification failures that the protocol expresses in-band
/// (`isValid: false`, `success: false`) never surface as errors.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorLocalError {
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error("No chain configured for network {0}")]
    UnsupportedNetwork(Network),
}

/// A facilitator that verifies and settles payments locally.
pub struct FacilitatorLocal {
    registry: ChainRegistry,
    executor: Arc<SettlementExecutor>,
}

impl FacilitatorLocal {
    pub fn new(registry: ChainRegistry, executor: Arc<SettlementExecutor>) -> Self {
        Self { registry, executor }
    }

    pub fn executor(&self) -> &Arc<SettlementExecutor> {
        &self.executor
    }
}

impl Facilitator for FacilitatorLocal {
    type Error = FacilitatorLocalError;

    /// Verifies a payment payload against the requirements.
    ///
    /// Request defects (wrong scheme, unconfigured network, value that can
    /// never suffice) surface as errors; checks that depend on the payload
    /// contents come back as `isValid: false` with a reason.
    #[instrument(skip_all, err, fields(network = %request.payment_payload.network))]
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, Self::Error> {
        let payload = &request.payment_payload;
        let requirements = &request.payment_requirements;
        self.registry
            .by_network(payload.network)
            .ok_or(FacilitatorLocalError::UnsupportedNetwork(payload.network))?;
        match verify_payment(payload, requirements) {
            Ok(payer) => Ok(VerifyResponse::valid(payer)),
            Err(error) if error.is_request_defect() => Err(error.into()),
            Err(error) => Ok(VerifyResponse::invalid(
                payload.payload.authorization.from,
                (&error).into(),
            )),
        }
    }

    /// Re-verifies the payment, then drives it through settlement.
    ///
    /// Settlement is idempotent per authorization nonce: repeated calls for
    /// the same payment return the recorded outcome instead of submitting
    /// again.
    #[instrument(skip_all, err, fields(network = %request.payment_payload.network))]
    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, Self::Error> {
        let payload = &request.payment_payload;
        let requirements = &request.payment_requirements;
        let adapter = self
            .registry
            .by_network(payload.network)
            .ok_or(FacilitatorLocalError::UnsupportedNetwork(payload.network))?;

        let payer = match verify_payment(payload, requirements) {
            Ok(payer) => payer,
            Err(error) if error.is_request_defect() => return Err(error.into()),
            // Invalid payment: report failure without touching the chain.
            Err(error) => {
                return Ok(SettleResponse {
                    success: false,
                    status: SettlementStatus::Pending,
                    error_reason: Some((&error).into()),
                    payer: payload.payload.authorization.from,
                    transaction: None,
                    network: payload.network,
                });
            }
        };

        let call = TerminalCall {
            token: requirements.asset,
            amount: payload.payload.authorization.value,
            beneficiary: requirements.pay_to,
            authorization: payload.payload.authorization,
            signature: payload.payload.signature,
        };
        let outcome = self
            .executor
            .settle(adapter, call, requirements.max_timeout_seconds)
            .await;
        Ok(SettleResponse {
            success: outcome.is_success(),
            status: outcome.status,
            error_reason: outcome.error_reason,
            payer,
            transaction: outcome.transaction,
            network: payload.network,
        })
    }

    async fn supported(&self) -> Result<SupportedPaymentKindsResponse, Self::Error> {
        let kinds = self
            .registry
            .networks()
            .into_iter()
            .map(|network| SupportedPaymentKind {
                x402_version: X402Version::V1,
                scheme: Scheme::Exact,
                network,
            })
            .collect();
        Ok(SupportedPaymentKindsResponse { kinds })
    }
}
