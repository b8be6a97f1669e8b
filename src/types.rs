//! Type definitions for the x402 protocol wire surface.
//!
//! These mirror the structures and validation logic of the official x402 SDKs
//! (TypeScript/Go), so facilitator responses stay compatible with existing
//! clients. The key objects are [`PaymentPayload`], [`PaymentRequirements`],
//! [`VerifyResponse`], and [`SettleResponse`].
//!
//! Payment authorization follows ERC-3009 (EIP-712 typed signatures); the
//! matching Solidity struct lives at the bottom of this module.

use alloy::primitives::U256;
use alloy::{hex, sol};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::{Debug, Display};
use std::str::FromStr;
use url::Url;

use crate::network::Network;
use crate::timestamp::UnixTimestamp;

/// Represents the protocol version. Currently only version 1 is supported.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum X402Version {
    /// Version `1`.
    V1,
}

impl Serialize for X402Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            X402Version::V1 => serializer.serialize_u8(1),
        }
    }
}

impl Display for X402Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            X402Version::V1 => write!(f, "1"),
        }
    }
}

impl<'de> Deserialize<'de> for X402Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let num = u8::deserialize(deserializer)?;
        match num {
            1 => Ok(X402Version::V1),
            other => Err(serde::de::Error::custom(format!(
                "Unsupported x402Version: {other}"
            ))),
        }
    }
}

/// Enumerates payment schemes. Only "exact" is supported in this implementation,
/// meaning the transferred amount must cover the required amount exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Exact,
}

impl Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Exact => write!(f, "exact"),
        }
    }
}

/// Represents an EVM address.
///
/// Wrapper around `alloy::primitives::Address`, providing display/serialization
/// support. Used throughout the protocol for typed Ethereum address handling.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct EvmAddress(pub alloy::primitives::Address);

impl Display for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to decode EVM address")]
pub struct EvmAddressDecodingError;

impl FromStr for EvmAddress {
    type Err = EvmAddressDecodingError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let address =
            alloy::primitives::Address::from_str(s).map_err(|_| EvmAddressDecodingError)?;
        Ok(Self(address))
    }
}

impl From<EvmAddress> for alloy::primitives::Address {
    fn from(address: EvmAddress) -> Self {
        address.0
    }
}

impl From<alloy::primitives::Address> for EvmAddress {
    fn from(address: alloy::primitives::Address) -> Self {
        EvmAddress(address)
    }
}

/// Represents a 65-byte EVM signature used in EIP-712 typed data.
/// Serialized as a 0x-prefixed hex string with 130 characters.
/// Authorizes an ERC-3009 `transferWithAuthorization`.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct EvmSignature(pub [u8; 65]);

impl Debug for EvmSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EvmSignature(0x{})", hex::encode(self.0))
    }
}

impl From<[u8; 65]> for EvmSignature {
    fn from(bytes: [u8; 65]) -> Self {
        EvmSignature(bytes)
    }
}

impl<'de> Deserialize<'de> for EvmSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        static SIG_REGEX: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"^0x[0-9a-fA-F]{130}$").expect("Invalid regex for EVM signature")
        });

        if !SIG_REGEX.is_match(&s) {
            return Err(serde::de::Error::custom(
                "Invalid EVM signature format: must be 0x-prefixed and 130 hex chars",
            ));
        }

        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|_| serde::de::Error::custom("Failed to decode EVM signature hex string"))?;
        let array: [u8; 65] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Signature must be exactly 65 bytes"))?;

        Ok(EvmSignature(array))
    }
}

impl Serialize for EvmSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

/// Represents a 32-byte random nonce, hex-encoded with 0x prefix.
/// Must be exactly 64 hex characters long.
///
/// The nonce uniquely tags one payment authorization; the settlement
/// executor keys its records on it to prevent double submission.
#[derive(Copy, Clone, Hash, PartialEq, Eq)]
pub struct HexEncodedNonce(pub [u8; 32]);

impl Debug for HexEncodedNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HexEncodedNonce(0x{})", hex::encode(self.0))
    }
}

impl Display for HexEncodedNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for HexEncodedNonce {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        static NONCE_REGEX: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{64}$").expect("Invalid nonce regex"));

        if !NONCE_REGEX.is_match(&s) {
            return Err(serde::de::Error::custom("Invalid nonce format"));
        }

        let bytes =
            hex::decode(&s[2..]).map_err(|_| serde::de::Error::custom("Invalid hex in nonce"))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Invalid length for nonce"))?;

        Ok(HexEncodedNonce(array))
    }
}

impl Serialize for HexEncodedNonce {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

/// A precise on-chain token amount in base units (e.g. USDC with 6 decimals).
/// Represented as a stringified decimal integer in JSON to prevent precision
/// loss in clients that parse numbers as floats.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TokenAmount(pub U256);

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if !s.chars().all(|c| c.is_ascii_digit()) || s.is_empty() {
            return Err(serde::de::Error::custom(
                "token amount must be a decimal integer string",
            ));
        }
        let value = U256::from_str(&s)
            .map_err(|_| serde::de::Error::custom("token amount out of range"))?;
        Ok(TokenAmount(value))
    }
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        TokenAmount(U256::from(value))
    }
}

impl From<TokenAmount> for U256 {
    fn from(value: TokenAmount) -> Self {
        value.0
    }
}

/// A 32-byte EVM transaction hash, encoded as a 0x-prefixed hex string.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TransactionHash(pub [u8; 32]);

impl<'de> Deserialize<'de> for TransactionHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;

        static TX_HASH_REGEX: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{64}$").expect("invalid regex"));

        if !TX_HASH_REGEX.is_match(&s) {
            return Err(serde::de::Error::custom("Invalid transaction hash format"));
        }

        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|_| serde::de::Error::custom("Invalid hex in transaction hash"))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Transaction hash must be exactly 32 bytes"))?;

        Ok(TransactionHash(array))
    }
}

impl Serialize for TransactionHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

impl Display for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<alloy::primitives::B256> for TransactionHash {
    fn from(value: alloy::primitives::B256) -> Self {
        TransactionHash(value.0)
    }
}

impl From<TransactionHash> for alloy::primitives::B256 {
    fn from(value: TransactionHash) -> Self {
        alloy::primitives::B256::from(value.0)
    }
}

/// EIP-712 structured data for ERC-3009-based authorization.
/// Defines who may transfer how much, to whom, and within what time window.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayloadAuthorization {
    pub from: EvmAddress,
    pub to: EvmAddress,
    pub value: TokenAmount,
    pub valid_after: UnixTimestamp,
    pub valid_before: UnixTimestamp,
    pub nonce: HexEncodedNonce,
}

/// Full payload required to authorize an ERC-3009 transfer:
/// the EIP-712 struct plus the payer's signature over it.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayload {
    pub signature: EvmSignature,
    pub authorization: ExactEvmPayloadAuthorization,
}

/// Describes a signed request to transfer a specific amount of funds on-chain.
/// Includes the scheme, network, and signed payload contents.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: X402Version,
    pub scheme: Scheme,
    pub network: Network,
    pub payload: ExactEvmPayload,
}

/// Requirements set by the payment-gated endpoint for an acceptable payment.
/// Issued by a resource server; the facilitator only reads it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: Scheme,
    pub network: Network,
    pub max_amount_required: TokenAmount,
    pub resource: Url,
    pub description: String,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    pub pay_to: EvmAddress,
    pub max_timeout_seconds: u64,
    pub asset: EvmAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Wrapper for a payment payload and requirements sent by a client to the
/// facilitator for verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub x402_version: X402Version,
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
}

/// Wrapper for a payment payload and requirements sent by a client to the
/// facilitator for settlement.
pub type SettleRequest = VerifyRequest;

/// Machine-readable reasons a payment was rejected or a settlement failed.
///
/// Stable taxonomy: clients branch on these values, so variants are additive
/// and never renamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum FacilitatorErrorReason {
    /// The scheme in the payload didn't match the required one.
    #[error("invalid_scheme")]
    #[serde(rename = "invalid_scheme")]
    InvalidScheme,
    /// The network in the payload is not supported or didn't match.
    #[error("invalid_network")]
    #[serde(rename = "invalid_network")]
    InvalidNetwork,
    /// The authorization's `to` doesn't match the required `payTo` recipient.
    #[error("invalid_receiver")]
    #[serde(rename = "invalid_receiver")]
    InvalidReceiver,
    /// The authorized value doesn't cover the required amount.
    #[error("insufficient_value")]
    #[serde(rename = "insufficient_value")]
    InsufficientValue,
    /// The EIP-712 signature doesn't recover to the claimed payer.
    #[error("invalid_signature")]
    #[serde(rename = "invalid_signature")]
    InvalidSignature,
    /// The authorization's `validBefore` is in the past.
    #[error("authorization_expired")]
    #[serde(rename = "authorization_expired")]
    AuthorizationExpired,
    /// The authorization's `validAfter` is in the future.
    #[error("authorization_not_active")]
    #[serde(rename = "authorization_not_active")]
    AuthorizationNotActive,
    /// The payer's funds were insufficient at settlement time.
    #[error("insufficient_funds")]
    #[serde(rename = "insufficient_funds")]
    InsufficientFunds,
    /// The on-chain settlement call reverted. Funds did not move.
    #[error("settlement_reverted")]
    #[serde(rename = "settlement_reverted")]
    SettlementReverted,
    /// Settlement did not reach finality within the allowed window.
    /// Indeterminate: funds may still land. Not equivalent to a revert.
    #[error("settlement_timeout")]
    #[serde(rename = "settlement_timeout")]
    SettlementTimeout,
}

/// Result returned by the facilitator after verifying a [`PaymentPayload`]
/// against the provided [`PaymentRequirements`].
///
/// Indicates whether the payment authorization is valid and identifies the
/// payer. If invalid, carries a reason from the stable error taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResponse {
    /// The payload matches the requirements and passes all checks.
    Valid { payer: EvmAddress },
    /// The payload was well-formed but failed verification.
    Invalid {
        reason: FacilitatorErrorReason,
        payer: EvmAddress,
    },
}

impl VerifyResponse {
    /// Constructs a successful verification response for the given payer.
    pub fn valid(payer: EvmAddress) -> Self {
        VerifyResponse::Valid { payer }
    }

    /// Constructs a failed verification response with the given reason.
    pub fn invalid(payer: EvmAddress, reason: FacilitatorErrorReason) -> Self {
        VerifyResponse::Invalid { reason, payer }
    }
}

impl Serialize for VerifyResponse {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            VerifyResponse::Valid { payer } => {
                let mut s = serializer.serialize_struct("VerifyResponse", 2)?;
                s.serialize_field("isValid", &true)?;
                s.serialize_field("payer", payer)?;
                s.end()
            }
            VerifyResponse::Invalid { reason, payer } => {
                let mut s = serializer.serialize_struct("VerifyResponse", 3)?;
                s.serialize_field("isValid", &false)?;
                s.serialize_field("invalidReason", reason)?;
                s.serialize_field("payer", payer)?;
                s.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for VerifyResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Raw {
            is_valid: bool,
            payer: EvmAddress,
            #[serde(default)]
            invalid_reason: Option<FacilitatorErrorReason>,
        }

        let raw = Raw::deserialize(deserializer)?;
        match (raw.is_valid, raw.invalid_reason) {
            (true, None) => Ok(VerifyResponse::Valid { payer: raw.payer }),
            (false, Some(reason)) => Ok(VerifyResponse::Invalid {
                payer: raw.payer,
                reason,
            }),
            (true, Some(_)) => Err(serde::de::Error::custom(
                "`invalidReason` must be absent when `isValid` is true",
            )),
            (false, None) => Err(serde::de::Error::custom(
                "`invalidReason` must be present when `isValid` is false",
            )),
        }
    }
}

/// Terminal disposition of a settlement attempt, mirrored from the
/// settlement record so callers can distinguish a revert (funds did not
/// move) from an expiry (outcome unknown).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    /// No on-chain submission has been made yet.
    Pending,
    /// Submitted on-chain; finality not yet observed.
    Submitted,
    /// Confirmed at the required depth. Terminal.
    Confirmed,
    /// The settlement transaction reverted on-chain. Terminal.
    Reverted,
    /// The settlement window elapsed before finality. Terminal, but
    /// indeterminate: the transaction may still be included.
    Expired,
}

impl SettlementStatus {
    /// Whether the status is terminal (no further transitions allowed).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SettlementStatus::Confirmed | SettlementStatus::Reverted | SettlementStatus::Expired
        )
    }
}

impl Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SettlementStatus::Pending => "pending",
            SettlementStatus::Submitted => "submitted",
            SettlementStatus::Confirmed => "confirmed",
            SettlementStatus::Reverted => "reverted",
            SettlementStatus::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

/// Returned from the facilitator after attempting to settle a payment on-chain.
/// Mirrors the settlement record: success flag, terminal status, transaction
/// hash, and payer identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    pub status: SettlementStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<FacilitatorErrorReason>,
    pub payer: EvmAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionHash>,
    pub network: Network,
}

/// A simple error structure returned on unexpected or malformed requests.
/// Used when no structured protocol-level response is appropriate.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedPaymentKind {
    pub x402_version: X402Version,
    pub scheme: Scheme,
    pub network: Network,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedPaymentKindsResponse {
    pub kinds: Vec<SupportedPaymentKind>,
}

/// Metadata required to identify a token in EIP-712 typed data signatures.
///
/// The `name` and `version` fields feed the EIP-712 domain separator used
/// when signing `transferWithAuthorization` messages. They must match what
/// the token contract reports, or signature recovery produces a different
/// address and verification fails.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TokenDeploymentEip712 {
    pub name: String,
    pub version: String,
}

/// A fungible token identified by its address and network.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TokenAsset {
    pub address: EvmAddress,
    pub network: Network,
}

impl Display for TokenAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // CAIP-19 https://chainagnostic.org/CAIPs/caip-19
        write!(
            f,
            "eip155:{}/erc20:{}",
            self.network.chain_id(),
            self.address
        )
    }
}

/// A specific deployed ERC-20 token instance, including the metadata
/// required for value formatting and EIP-712 signing.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TokenDeployment {
    pub asset: TokenAsset,
    pub decimals: u8,
    pub eip712: TokenDeploymentEip712,
}

impl TokenDeployment {
    pub fn address(&self) -> EvmAddress {
        self.asset.address
    }

    pub fn network(&self) -> Network {
        self.asset.network
    }
}

sol!(
    /// Solidity-compatible struct definition for ERC-3009 `transferWithAuthorization`.
    ///
    /// Matches the EIP-3009 typed-data format: the authorization to transfer
    /// `value` tokens from `from` to `to`, valid only between `validAfter` and
    /// `validBefore`, identified by a unique `nonce`. Used to reconstruct the
    /// typed-data message when verifying a client's signature.
    #[derive(Serialize, Deserialize)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
);

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_json() -> serde_json::Value {
        serde_json::json!({
            "x402Version": 1,
            "scheme": "exact",
            "network": "base",
            "payload": {
                "signature": format!("0x{}", "ab".repeat(65)),
                "authorization": {
                    "from": "0x857b06519E91e3A54538791bDbb0E22373e36b66",
                    "to": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                    "value": "1000000",
                    "validAfter": "1700000000",
                    "validBefore": "1700000600",
                    "nonce": format!("0x{}", "12".repeat(32)),
                }
            }
        })
    }

    #[test]
    fn payment_payload_roundtrip() {
        let payload: PaymentPayload = serde_json::from_value(payload_json()).unwrap();
        assert_eq!(payload.scheme, Scheme::Exact);
        assert_eq!(payload.network, Network::Base);
        assert_eq!(
            payload.payload.authorization.value,
            TokenAmount::from(1_000_000u64)
        );
        let back = serde_json::to_value(&payload).unwrap();
        assert_eq!(back["x402Version"], serde_json::json!(1));
        assert_eq!(back["payload"]["authorization"]["value"], "1000000");
        assert_eq!(back["payload"]["authorization"]["validBefore"], "1700000600");
        assert_eq!(
            back["payload"]["signature"],
            serde_json::json!(format!("0x{}", "ab".repeat(65)))
        );
        // Hex casing of addresses is not significant; reparse to compare.
        let again: PaymentPayload = serde_json::from_value(back).unwrap();
        assert_eq!(
            again.payload.authorization.from,
            payload.payload.authorization.from
        );
        assert_eq!(
            again.payload.authorization.nonce,
            payload.payload.authorization.nonce
        );
    }

    #[test]
    fn rejects_malformed_signature() {
        let mut json = payload_json();
        json["payload"]["signature"] = serde_json::json!("0xdeadbeef");
        let result: Result<PaymentPayload, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_short_nonce() {
        let mut json = payload_json();
        json["payload"]["authorization"]["nonce"] = serde_json::json!("0x1234");
        let result: Result<PaymentPayload, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }

    #[test]
    fn token_amount_rejects_hex_and_negatives() {
        assert!(serde_json::from_str::<TokenAmount>("\"0x10\"").is_err());
        assert!(serde_json::from_str::<TokenAmount>("\"-5\"").is_err());
        assert!(serde_json::from_str::<TokenAmount>("\"\"").is_err());
        assert_eq!(
            serde_json::from_str::<TokenAmount>("\"42\"").unwrap(),
            TokenAmount::from(42u64)
        );
    }

    #[test]
    fn verify_response_wire_shape() {
        let payer: EvmAddress = "0x857b06519E91e3A54538791bDbb0E22373e36b66"
            .parse()
            .unwrap();
        let valid = serde_json::to_value(VerifyResponse::valid(payer)).unwrap();
        assert_eq!(valid["isValid"], serde_json::json!(true));
        assert!(valid.get("invalidReason").is_none());

        let invalid = serde_json::to_value(VerifyResponse::invalid(
            payer,
            FacilitatorErrorReason::AuthorizationExpired,
        ))
        .unwrap();
        assert_eq!(invalid["isValid"], serde_json::json!(false));
        assert_eq!(
            invalid["invalidReason"],
            serde_json::json!("authorization_expired")
        );
    }

    #[test]
    fn settle_response_omits_absent_fields() {
        let payer: EvmAddress = "0x857b06519E91e3A54538791bDbb0E22373e36b66"
            .parse()
            .unwrap();
        let response = SettleResponse {
            success: false,
            status: SettlementStatus::Expired,
            error_reason: Some(FacilitatorErrorReason::SettlementTimeout),
            payer,
            transaction: None,
            network: Network::Base,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], serde_json::json!("expired"));
        assert_eq!(json["errorReason"], serde_json::json!("settlement_timeout"));
        assert!(json.get("transaction").is_none());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!SettlementStatus::Pending.is_terminal());
        assert!(!SettlementStatus::Submitted.is_terminal());
        assert!(SettlementStatus::Confirmed.is_terminal());
        assert!(SettlementStatus::Reverted.is_terminal());
        assert!(SettlementStatus::Expired.is_terminal());
    }
}
