//! Chain access: submitting settlement transactions and observing their fate.
//!
//! The settlement executor talks to a network through the [`ChainAdapter`]
//! trait, so the on-chain mechanics stay swappable (and mockable in tests).
//! The production adapter, [`TerminalChainAdapter`], routes every settlement
//! through a payment terminal contract's `pay` entrypoint, carrying the
//! ERC-3009 authorization ABI-encoded in the call's metadata bytes. The
//! terminal's internal accounting is opaque to the facilitator; we only
//! observe whether the transaction confirms or reverts.

use alloy::network::EthereumWallet;
use alloy::primitives::{Bytes, FixedBytes, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::sol_types::SolValue;
use alloy::transports::{RpcError, TransportErrorKind};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use url::Url;

use crate::network::Network;
use crate::types::{
    EvmAddress, EvmSignature, ExactEvmPayloadAuthorization, TokenAmount, TransactionHash,
};

sol! {
    /// Multi-token payment terminal entrypoint. Settlements are single
    /// `pay` calls; splits, fees, and ledger bookkeeping happen inside the
    /// terminal contract.
    #[sol(rpc)]
    interface IPaymentTerminal {
        function pay(
            uint256 projectId,
            address token,
            uint256 amount,
            address beneficiary,
            uint256 minReturnedTokens,
            string calldata memo,
            bytes calldata metadata
        ) external payable returns (uint256 beneficiaryTokenCount);
    }
}

sol! {
    /// ERC-3009 authorization plus signature, ABI-encoded into the terminal
    /// call's metadata so the terminal can pull the payer's funds via
    /// `transferWithAuthorization`.
    struct Erc3009Authorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
        bytes signature;
    }
}

/// A fully verified settlement, ready for on-chain submission.
#[derive(Debug, Clone)]
pub struct TerminalCall {
    pub token: EvmAddress,
    pub amount: TokenAmount,
    pub beneficiary: EvmAddress,
    pub authorization: ExactEvmPayloadAuthorization,
    pub signature: EvmSignature,
}

impl TerminalCall {
    /// ABI-encodes the authorization and signature for the terminal's
    /// metadata argument.
    pub fn metadata(&self) -> Bytes {
        let authorization = Erc3009Authorization {
            from: self.authorization.from.0,
            to: self.authorization.to.0,
            value: self.authorization.value.into(),
            validAfter: self.authorization.valid_after.into(),
            validBefore: self.authorization.valid_before.into(),
            nonce: FixedBytes(self.authorization.nonce.0),
            signature: Bytes::copy_from_slice(&self.signature.0),
        };
        authorization.abi_encode().into()
    }
}

/// Errors surfaced by a chain adapter, classified by retryability.
///
/// Transient errors (transport failures, timeouts) mean the submission may
/// not have reached the network and is safe to retry with the same
/// authorization. Permanent errors (node rejected the transaction, call
/// reverted during gas estimation) will not improve with retries.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("transient chain error: {0}")]
    Transient(String),
    #[error("permanent chain error: {0}")]
    Permanent(String),
}

impl SubmitError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SubmitError::Transient(_))
    }

    /// An error response from the node is a verdict on the transaction;
    /// everything else is a delivery failure.
    fn from_rpc(error: RpcError<TransportErrorKind>) -> Self {
        if error.as_error_resp().is_some() {
            SubmitError::Permanent(error.to_string())
        } else {
            SubmitError::Transient(error.to_string())
        }
    }

    fn from_contract(error: alloy::contract::Error) -> Self {
        match error {
            alloy::contract::Error::TransportError(rpc) => Self::from_rpc(rpc),
            other => SubmitError::Permanent(other.to_string()),
        }
    }
}

/// Observed inclusion state of a submitted settlement transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxInclusion {
    /// Not yet mined (or not visible to our node).
    Pending,
    /// Mined successfully; `confirmations` blocks deep including its own.
    Confirmed { confirmations: u64 },
    /// Mined but reverted. Funds did not move.
    Reverted,
}

/// On-chain operations the settlement executor needs, per network.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn network(&self) -> Network;

    /// Address of the facilitator's transaction-signing account.
    fn signer_address(&self) -> EvmAddress;

    /// Broadcasts the terminal `pay` call. Returns as soon as the node
    /// acknowledges the transaction; inclusion is observed separately.
    async fn submit(&self, call: &TerminalCall) -> Result<TransactionHash, SubmitError>;

    /// Looks up the inclusion state of a previously submitted transaction.
    async fn transaction_status(&self, tx: TransactionHash) -> Result<TxInclusion, SubmitError>;
}

/// Production [`ChainAdapter`] over an HTTP JSON-RPC provider with a local
/// signing wallet.
pub struct TerminalChainAdapter {
    network: Network,
    provider: DynProvider,
    terminal: EvmAddress,
    project_id: U256,
    signer_address: EvmAddress,
}

impl TerminalChainAdapter {
    pub fn new(
        network: Network,
        rpc_url: Url,
        signer: PrivateKeySigner,
        terminal: EvmAddress,
        project_id: u64,
    ) -> Self {
        let signer_address = signer.address().into();
        let wallet = EthereumWallet::from(signer);
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(rpc_url)
            .erased();
        Self {
            network,
            provider,
            terminal,
            project_id: U256::from(project_id),
            signer_address,
        }
    }
}

#[async_trait]
impl ChainAdapter for TerminalChainAdapter {
    fn network(&self) -> Network {
        self.network
    }

    fn signer_address(&self) -> EvmAddress {
        self.signer_address
    }

    #[instrument(skip_all, err, fields(network = %self.network, otel.kind = "client"))]
    async fn submit(&self, call: &TerminalCall) -> Result<TransactionHash, SubmitError> {
        let terminal = IPaymentTerminal::new(self.terminal.0, &self.provider);
        let pending = terminal
            .pay(
                self.project_id,
                call.token.0,
                call.amount.into(),
                call.beneficiary.0,
                U256::ZERO,
                String::new(),
                call.metadata(),
            )
            .send()
            .await
            .map_err(SubmitError::from_contract)?;
        Ok((*pending.tx_hash()).into())
    }

    #[instrument(skip_all, err, fields(network = %self.network, tx = %tx, otel.kind = "client"))]
    async fn transaction_status(&self, tx: TransactionHash) -> Result<TxInclusion, SubmitError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx.into())
            .await
            .map_err(SubmitError::from_rpc)?;
        let Some(receipt) = receipt else {
            return Ok(TxInclusion::Pending);
        };
        if !receipt.status() {
            return Ok(TxInclusion::Reverted);
        }
        let Some(block_number) = receipt.block_number else {
            return Ok(TxInclusion::Pending);
        };
        let head = self
            .provider
            .get_block_number()
            .await
            .map_err(SubmitError::from_rpc)?;
        Ok(TxInclusion::Confirmed {
            confirmations: head.saturating_sub(block_number) + 1,
        })
    }
}

/// Registry of chain adapters keyed by network. Built once at startup from
/// the configured RPC endpoints; networks without an endpoint are simply
/// absent and rejected at request time.
#[derive(Clone, Default)]
pub struct ChainRegistry {
    adapters: HashMap<Network, Arc<dyn ChainAdapter>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ChainAdapter>) {
        self.adapters.insert(adapter.network(), adapter);
    }

    pub fn by_network(&self, network: Network) -> Option<Arc<dyn ChainAdapter>> {
        self.adapters.get(&network).cloned()
    }

    /// Networks with a configured adapter, in declaration order.
    pub fn networks(&self) -> Vec<Network> {
        Network::variants()
            .iter()
            .copied()
            .filter(|network| self.adapters.contains_key(network))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::UnixTimestamp;
    use crate::types::HexEncodedNonce;

    fn call() -> TerminalCall {
        TerminalCall {
            token: "0x036CbD53842c5426634e7929541eC2318f3dCF7e"
                .parse()
                .unwrap(),
            amount: TokenAmount::from(10_000u64),
            beneficiary: "0x209693Bc6afc0C5328bA36FaF03C514EF312287C"
                .parse()
                .unwrap(),
            authorization: ExactEvmPayloadAuthorization {
                from: "0x857b06519E91e3A54538791bDbb0E22373e36b66"
                    .parse()
                    .unwrap(),
                to: "0x209693Bc6afc0C5328bA36FaF03C514EF312287C"
                    .parse()
                    .unwrap(),
                value: TokenAmount::from(10_000u64),
                valid_after: UnixTimestamp::from_secs(1_700_000_000),
                valid_before: UnixTimestamp::from_secs(1_700_000_600),
                nonce: HexEncodedNonce([9u8; 32]),
            },
            signature: EvmSignature([3u8; 65]),
        }
    }

    #[test]
    fn metadata_roundtrips_through_abi() {
        let call = call();
        let metadata = call.metadata();
        let decoded = Erc3009Authorization::abi_decode(&metadata).unwrap();
        assert_eq!(decoded.from, call.authorization.from.0);
        assert_eq!(decoded.nonce.0, call.authorization.nonce.0);
        assert_eq!(decoded.signature.as_ref(), &call.signature.0[..]);
    }

    #[test]
    fn registry_reports_registered_networks_only() {
        let registry = ChainRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.by_network(Network::Base).is_none());
        assert!(registry.networks().is_empty());
    }

    #[test]
    fn submit_error_classification() {
        assert!(SubmitError::Transient("connection reset".into()).is_transient());
        assert!(!SubmitError::Permanent("execution reverted".into()).is_transient());
    }
}
