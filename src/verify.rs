//! Payment verification: structural validation and EIP-712 signature recovery.
//!
//! Verification is pure and offline. It checks that a [`PaymentPayload`]
//! is compatible with the [`PaymentRequirements`] issued by a resource
//! server, that the authorization window is open, that the authorized value
//! covers the required amount, and that the ERC-3009 signature actually
//! recovers to the claimed payer. No network access happens here; on-chain
//! conditions (balances, nonce reuse) surface at settlement time instead.

use alloy::primitives::{B256, FixedBytes, Signature};
use alloy::sol_types::{Eip712Domain, SolStruct, eip712_domain};
use tracing::instrument;

use crate::network::{Network, USDCDeployment};
use crate::timestamp::UnixTimestamp;
use crate::types::{
    EvmAddress, ExactEvmPayload, ExactEvmPayloadAuthorization, FacilitatorErrorReason,
    PaymentPayload, PaymentRequirements, Scheme, TransferWithAuthorization,
};

/// Grace period in seconds: the authorization must remain valid at least
/// this long past "now" so it does not expire while the settlement
/// transaction is in flight.
const TIMING_GRACE_SECS: u64 = 6;

/// Errors that can occur while verifying a payment.
///
/// Split in two classes: request defects (the client sent a payload that can
/// never match these requirements, reported as HTTP 400) and verification
/// failures (a well-formed payload that fails a check, reported as
/// `isValid: false`). See [`PaymentError::is_request_defect`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PaymentError {
    #[error("Incompatible payload scheme (payload: {payload}, requirements: {requirements})")]
    IncompatibleScheme {
        payload: Scheme,
        requirements: Scheme,
    },
    #[error("Incompatible payload network (payload: {payload}, requirements: {requirements})")]
    IncompatibleNetwork {
        payload: Network,
        requirements: Network,
    },
    #[error("Payload receiver {payload} does not match required payTo {requirements}")]
    IncompatibleReceivers {
        payload: EvmAddress,
        requirements: EvmAddress,
    },
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("Authorization expired: validBefore {valid_before} <= {now} + grace")]
    Expired {
        valid_before: UnixTimestamp,
        now: UnixTimestamp,
    },
    #[error("Authorization not active yet: validAfter {valid_after} > {now}")]
    NotActiveYet {
        valid_after: UnixTimestamp,
        now: UnixTimestamp,
    },
    #[error("Authorized value is less than the required maxAmountRequired")]
    InsufficientValue,
    #[error("Unable to read system clock")]
    ClockError,
}

impl PaymentError {
    /// Request defects can never succeed against these requirements and map
    /// to HTTP 400. Verification failures map to a 200 with `isValid: false`.
    pub fn is_request_defect(&self) -> bool {
        matches!(
            self,
            PaymentError::IncompatibleScheme { .. }
                | PaymentError::IncompatibleNetwork { .. }
                | PaymentError::InsufficientValue
                | PaymentError::ClockError
        )
    }
}

impl From<&PaymentError> for FacilitatorErrorReason {
    fn from(error: &PaymentError) -> Self {
        match error {
            PaymentError::IncompatibleScheme { .. } => FacilitatorErrorReason::InvalidScheme,
            PaymentError::IncompatibleNetwork { .. } => FacilitatorErrorReason::InvalidNetwork,
            PaymentError::IncompatibleReceivers { .. } => FacilitatorErrorReason::InvalidReceiver,
            PaymentError::InvalidSignature(_) => FacilitatorErrorReason::InvalidSignature,
            PaymentError::Expired { .. } => FacilitatorErrorReason::AuthorizationExpired,
            PaymentError::NotActiveYet { .. } => FacilitatorErrorReason::AuthorizationNotActive,
            PaymentError::InsufficientValue => FacilitatorErrorReason::InsufficientValue,
            // Clock failure is a server-side defect; insufficient_value is the
            // closest protocol reason but callers should surface it as a 400.
            PaymentError::ClockError => FacilitatorErrorReason::InsufficientValue,
        }
    }
}

/// Verifies a payment payload against the requirements, returning the payer
/// address on success.
///
/// Checks run in order: scheme/network/receiver compatibility, the
/// authorization time window (with a grace buffer for settlement latency),
/// the authorized value, and finally the EIP-712 signature.
#[instrument(skip_all, err, fields(
    network = %payload.network,
    payer = %payload.payload.authorization.from,
))]
pub fn verify_payment(
    payload: &PaymentPayload,
    requirements: &PaymentRequirements,
) -> Result<EvmAddress, PaymentError> {
    assert_requirements(payload, requirements)?;
    let now = UnixTimestamp::try_now().ok_or(PaymentError::ClockError)?;
    assert_time(&payload.payload.authorization, now)?;
    assert_enough_value(payload, requirements)?;
    let domain = eip712_domain_for(requirements);
    assert_signature(&payload.payload, &domain)?;
    Ok(payload.payload.authorization.from)
}

/// Checks scheme, network, and receiver compatibility between payload and
/// requirements.
fn assert_requirements(
    payload: &PaymentPayload,
    requirements: &PaymentRequirements,
) -> Result<(), PaymentError> {
    if payload.scheme != requirements.scheme {
        return Err(PaymentError::IncompatibleScheme {
            payload: payload.scheme,
            requirements: requirements.scheme,
        });
    }
    if payload.network != requirements.network {
        return Err(PaymentError::IncompatibleNetwork {
            payload: payload.network,
            requirements: requirements.network,
        });
    }
    if payload.payload.authorization.to != requirements.pay_to {
        return Err(PaymentError::IncompatibleReceivers {
            payload: payload.payload.authorization.to,
            requirements: requirements.pay_to,
        });
    }
    Ok(())
}

/// Checks the authorization validity window against `now`.
///
/// `validBefore` must stay valid for at least [`TIMING_GRACE_SECS`] more
/// seconds so the settlement transaction does not land after expiry.
fn assert_time(
    authorization: &ExactEvmPayloadAuthorization,
    now: UnixTimestamp,
) -> Result<(), PaymentError> {
    if authorization.valid_before < now + TIMING_GRACE_SECS {
        return Err(PaymentError::Expired {
            valid_before: authorization.valid_before,
            now,
        });
    }
    if authorization.valid_after > now {
        return Err(PaymentError::NotActiveYet {
            valid_after: authorization.valid_after,
            now,
        });
    }
    Ok(())
}

/// Checks that the authorized value covers `maxAmountRequired`.
fn assert_enough_value(
    payload: &PaymentPayload,
    requirements: &PaymentRequirements,
) -> Result<(), PaymentError> {
    if payload.payload.authorization.value < requirements.max_amount_required {
        return Err(PaymentError::InsufficientValue);
    }
    Ok(())
}

/// Builds the EIP-712 domain for the asset named by the requirements.
///
/// Domain `name` and `version` come from the statically known USDC
/// deployment on the requirement's network, unless the requirements carry
/// overrides in `extra` (`{"name": ..., "version": ...}`), which x402
/// resource servers use for non-default token deployments.
pub fn eip712_domain_for(requirements: &PaymentRequirements) -> Eip712Domain {
    let usdc = USDCDeployment::by_network(requirements.network);
    let extra_str = |key: &str| -> Option<String> {
        requirements
            .extra
            .as_ref()
            .and_then(|extra| extra.get(key))
            .and_then(|value| value.as_str())
            .map(str::to_string)
    };
    let name = extra_str("name").unwrap_or_else(|| usdc.eip712.name.clone());
    let version = extra_str("version").unwrap_or_else(|| usdc.eip712.version.clone());
    eip712_domain! {
        name: name,
        version: version,
        chain_id: requirements.network.chain_id(),
        verifying_contract: requirements.asset.0,
    }
}

/// The EIP-712 signing hash for an authorization under the given domain.
/// What the payer's wallet actually signed.
pub fn signing_hash(
    authorization: &ExactEvmPayloadAuthorization,
    domain: &Eip712Domain,
) -> B256 {
    let message = TransferWithAuthorization {
        from: authorization.from.0,
        to: authorization.to.0,
        value: authorization.value.into(),
        validAfter: authorization.valid_after.into(),
        validBefore: authorization.valid_before.into(),
        nonce: FixedBytes(authorization.nonce.0),
    };
    message.eip712_signing_hash(domain)
}

/// Recovers the signer from the payload's signature and compares it to the
/// claimed `from` address.
#[instrument(skip_all, err)]
fn assert_signature(payload: &ExactEvmPayload, domain: &Eip712Domain) -> Result<(), PaymentError> {
    let signature = Signature::from_raw_array(&payload.signature.0)
        .map_err(|e| PaymentError::InvalidSignature(format!("{e}")))?;
    let hash = signing_hash(&payload.authorization, domain);
    let recovered_address = signature
        .recover_address_from_prehash(&hash)
        .map_err(|e| PaymentError::InvalidSignature(format!("{e}")))?;
    let expected_address = payload.authorization.from.0;
    if recovered_address != expected_address {
        return Err(PaymentError::InvalidSignature(format!(
            "Address mismatch: recovered {recovered_address}, expected {expected_address}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::signers::SignerSync;
    use alloy::signers::local::PrivateKeySigner;

    use crate::types::{
        EvmSignature, HexEncodedNonce, PaymentPayload, TokenAmount, X402Version,
    };

    fn requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: Scheme::Exact,
            network: Network::BaseSepolia,
            max_amount_required: TokenAmount::from(10_000u64),
            resource: "https://example.com/weather".parse().unwrap(),
            description: "Weather report".into(),
            mime_type: "application/json".into(),
            output_schema: None,
            pay_to: "0x209693Bc6afc0C5328bA36FaF03C514EF312287C"
                .parse()
                .unwrap(),
            max_timeout_seconds: 60,
            asset: "0x036CbD53842c5426634e7929541eC2318f3dCF7e"
                .parse()
                .unwrap(),
            extra: None,
        }
    }

    fn signed_payload(
        signer: &PrivateKeySigner,
        requirements: &PaymentRequirements,
        mutate: impl FnOnce(&mut ExactEvmPayloadAuthorization),
    ) -> PaymentPayload {
        let now = UnixTimestamp::try_now().unwrap();
        let mut authorization = ExactEvmPayloadAuthorization {
            from: signer.address().into(),
            to: requirements.pay_to,
            value: requirements.max_amount_required,
            valid_after: now - 60,
            valid_before: now + 600,
            nonce: HexEncodedNonce([7u8; 32]),
        };
        mutate(&mut authorization);
        let domain = eip712_domain_for(requirements);
        let hash = signing_hash(&authorization, &domain);
        let signature = signer.sign_hash_sync(&hash).unwrap();
        PaymentPayload {
            x402_version: X402Version::V1,
            scheme: requirements.scheme,
            network: requirements.network,
            payload: ExactEvmPayload {
                signature: EvmSignature(signature.as_bytes()),
                authorization,
            },
        }
    }

    #[test]
    fn accepts_properly_signed_payment() {
        let signer = PrivateKeySigner::random();
        let requirements = requirements();
        let payload = signed_payload(&signer, &requirements, |_| {});
        let payer = verify_payment(&payload, &requirements).unwrap();
        assert_eq!(payer.0, signer.address());
    }

    #[test]
    fn rejects_signature_from_other_key() {
        let signer = PrivateKeySigner::random();
        let requirements = requirements();
        let mut payload = signed_payload(&signer, &requirements, |_| {});
        // Claim a different payer than the one who signed.
        payload.payload.authorization.from = "0x857b06519E91e3A54538791bDbb0E22373e36b66"
            .parse()
            .unwrap();
        let err = verify_payment(&payload, &requirements).unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature(_)));
    }

    #[test]
    fn rejects_tampered_value() {
        let signer = PrivateKeySigner::random();
        let requirements = requirements();
        let mut payload = signed_payload(&signer, &requirements, |_| {});
        payload.payload.authorization.value = TokenAmount::from(999_999_999u64);
        let err = verify_payment(&payload, &requirements).unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature(_)));
    }

    #[test]
    fn rejects_expired_authorization() {
        let signer = PrivateKeySigner::random();
        let requirements = requirements();
        let now = UnixTimestamp::try_now().unwrap();
        let payload = signed_payload(&signer, &requirements, |auth| {
            auth.valid_before = now - 1;
        });
        let err = verify_payment(&payload, &requirements).unwrap_err();
        assert!(matches!(err, PaymentError::Expired { .. }));
    }

    #[test]
    fn rejects_expiry_within_grace_window() {
        let signer = PrivateKeySigner::random();
        let requirements = requirements();
        let now = UnixTimestamp::try_now().unwrap();
        // Still nominally valid, but expires before a settlement could land.
        let payload = signed_payload(&signer, &requirements, |auth| {
            auth.valid_before = now + 2;
        });
        let err = verify_payment(&payload, &requirements).unwrap_err();
        assert!(matches!(err, PaymentError::Expired { .. }));
    }

    #[test]
    fn rejects_not_yet_active_authorization() {
        let signer = PrivateKeySigner::random();
        let requirements = requirements();
        let now = UnixTimestamp::try_now().unwrap();
        let payload = signed_payload(&signer, &requirements, |auth| {
            auth.valid_after = now + 120;
        });
        let err = verify_payment(&payload, &requirements).unwrap_err();
        assert!(matches!(err, PaymentError::NotActiveYet { .. }));
    }

    #[test]
    fn rejects_wrong_receiver() {
        let signer = PrivateKeySigner::random();
        let requirements = requirements();
        let payload = signed_payload(&signer, &requirements, |auth| {
            auth.to = "0x857b06519E91e3A54538791bDbb0E22373e36b66"
                .parse()
                .unwrap();
        });
        let err = verify_payment(&payload, &requirements).unwrap_err();
        assert!(matches!(err, PaymentError::IncompatibleReceivers { .. }));
    }

    #[test]
    fn rejects_insufficient_value() {
        let signer = PrivateKeySigner::random();
        let requirements = requirements();
        let payload = signed_payload(&signer, &requirements, |auth| {
            auth.value = TokenAmount::from(1u64);
        });
        let err = verify_payment(&payload, &requirements).unwrap_err();
        assert_eq!(err, PaymentError::InsufficientValue);
        assert!(err.is_request_defect());
    }

    #[test]
    fn rejects_network_mismatch() {
        let signer = PrivateKeySigner::random();
        let requirements = requirements();
        let mut payload = signed_payload(&signer, &requirements, |_| {});
        payload.network = Network::Base;
        let err = verify_payment(&payload, &requirements).unwrap_err();
        assert!(matches!(err, PaymentError::IncompatibleNetwork { .. }));
        assert!(err.is_request_defect());
    }

    #[test]
    fn extra_overrides_domain_name() {
        let signer = PrivateKeySigner::random();
        let mut requirements = requirements();
        requirements.extra = Some(serde_json::json!({"name": "USD Coin", "version": "1"}));
        // Sign under the overridden domain; verification must use the same one.
        let payload = signed_payload(&signer, &requirements, |_| {});
        assert!(verify_payment(&payload, &requirements).is_ok());

        // A verifier using the default domain would reject this signature.
        requirements.extra = None;
        let err = verify_payment(&payload, &requirements).unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature(_)));
    }
}
