//! Core trait defining the verification and settlement interface for x402 facilitators.
//!
//! Implementors validate incoming payment payloads against payment
//! requirements ([`Facilitator::verify`]) and execute on-chain settlements
//! ([`Facilitator::settle`]). The HTTP layer is written against this trait so
//! handler tests can run against stub facilitators.

use std::fmt::{Debug, Display};
use std::sync::Arc;

use crate::types::{
    SettleRequest, SettleResponse, SupportedPaymentKindsResponse, VerifyRequest, VerifyResponse,
};

/// Asynchronous interface for x402 payment facilitators.
pub trait Facilitator {
    /// The error type returned by this facilitator.
    type Error: Debug + Display;

    /// Verifies a proposed x402 payment payload against the payment
    /// requirements: structural compatibility, the authorization time
    /// window, value sufficiency, and the EIP-712 signature.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] only for request defects; a payload that
    /// merely fails verification yields an `Ok` response with
    /// `isValid: false`.
    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerifyResponse, Self::Error>> + Send;

    /// Re-verifies the payment and, if valid, drives it through on-chain
    /// settlement to a terminal state.
    fn settle(
        &self,
        request: &SettleRequest,
    ) -> impl Future<Output = Result<SettleResponse, Self::Error>> + Send;

    /// The scheme/network combinations this facilitator can settle.
    fn supported(
        &self,
    ) -> impl Future<Output = Result<SupportedPaymentKindsResponse, Self::Error>> + Send;
}

impl<T: Facilitator> Facilitator for Arc<T> {
    type Error = T::Error;

    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerifyResponse, Self::Error>> + Send {
        self.as_ref().verify(request)
    }

    fn settle(
        &self,
        request: &SettleRequest,
    ) -> impl Future<Output = Result<SettleResponse, Self::Error>> + Send {
        self.as_ref().settle(request)
    }

    fn supported(
        &self,
    ) -> impl Future<Output = Result<SupportedPaymentKindsResponse, Self::Error>> + Send {
        self.as_ref().supported()
    }
}
