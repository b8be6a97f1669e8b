//! x402 payment facilitator settling into an on-chain payment terminal.
//!
//! The facilitator verifies x402 payment payloads (ERC-3009
//! `transferWithAuthorization` messages signed by the payer) against payment
//! requirements, and settles accepted payments by routing them through a
//! payment terminal contract on an EVM network. Settlement is idempotent per
//! authorization nonce and driven to one of three terminal outcomes:
//! `confirmed`, `reverted`, or `expired`.
//!
//! Crate layout:
//! - [`types`]: x402 wire types, compatible with the official client SDKs
//! - [`verify`]: offline payload validation and EIP-712 signature recovery
//! - [`chain`]: chain adapters and the terminal contract binding
//! - [`settlement`]: the idempotent settlement executor
//! - [`facilitator_local`]: wires verification and settlement together
//! - [`handlers`]: the Axum HTTP surface

pub mod chain;
pub mod config;
pub mod facilitator;
pub mod facilitator_local;
pub mod handlers;
pub mod network;
pub mod settlement;
pub mod shutdown;
pub mod telemetry;
pub mod timestamp;
pub mod types;
pub mod verify;
