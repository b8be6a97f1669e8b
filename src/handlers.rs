//! HTTP endpoints implemented by the x402 facilitator.
//!
//! Server-side handlers for client-submitted x402 payments: the
//! protocol-critical endpoints (`POST /verify`, `POST /settle`), discovery
//! endpoints (`GET /supported`, `GET /verify`, `GET /settle`), and health
//! checking (`GET /health`).
//!
//! Payloads follow the wire types in [`crate::types`] and are compatible
//! with the official x402 client SDKs.
//!
//! Error mapping: malformed JSON and request defects (wrong scheme,
//! unconfigured network, a value that can never suffice) become HTTP 400.
//! Payload-dependent verification failures come back as HTTP 200 with
//! `isValid: false`, and settlement failures as HTTP 200 with
//! `success: false`, so clients get the protocol-level reason either way.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router, response::IntoResponse};
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

use crate::facilitator::Facilitator;
use crate::facilitator_local::{FacilitatorLocal, FacilitatorLocalError};
use crate::types::{ErrorResponse, SettleRequest, VerifyRequest};

/// Builds the facilitator's router with all routes attached.
pub fn routes(facilitator: Arc<FacilitatorLocal>) -> Router {
    Router::new()
        .route("/", get(get_index))
        .route("/health", get(get_health))
        .route("/supported", get(get_supported))
        .route("/verify", get(get_verify_info).post(post_verify))
        .route("/settle", get(get_settle_info).post(post_settle))
        .layer(Extension(facilitator))
}

/// `GET /`: Service banner with pointers to the protocol endpoints.
#[instrument(skip_all)]
async fn get_index() -> impl IntoResponse {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "verify": "/verify",
            "settle": "/settle",
            "supported": "/supported",
            "health": "/health",
        }
    }))
}

/// `GET /health`: Liveness probe.
#[instrument(skip_all)]
async fn get_health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// `GET /verify`: Machine-readable description of the `/verify` endpoint.
///
/// Optional metadata, primarily useful for discoverability and debugging
/// tools.
#[instrument(skip_all)]
async fn get_verify_info() -> impl IntoResponse {
    Json(json!({
        "endpoint": "/verify",
        "description": "POST to verify x402 payments",
        "body": {
            "paymentPayload": "PaymentPayload",
            "paymentRequirements": "PaymentRequirements",
        }
    }))
}

/// `GET /settle`: Machine-readable description of the `/settle` endpoint.
#[instrument(skip_all)]
async fn get_settle_info() -> impl IntoResponse {
    Json(json!({
        "endpoint": "/settle",
        "description": "POST to settle x402 payments",
        "body": {
            "paymentPayload": "PaymentPayload",
            "paymentRequirements": "PaymentRequirements",
        }
    }))
}

/// `GET /supported`: Lists the payment schemes and networks this facilitator
/// can settle, based on the chains configured at startup.
#[instrument(skip_all)]
async fn get_supported(
    Extension(facilitator): Extension<Arc<FacilitatorLocal>>,
) -> impl IntoResponse {
    match facilitator.supported().await {
        Ok(supported) => (StatusCode::OK, Json(supported)).into_response(),
        Err(error) => {
            tracing::warn!(error = ?error, "Failed to list supported kinds");
            internal_error()
        }
    }
}

/// `POST /verify`: Verification of a proposed x402 payment.
///
/// Checks whether the payment payload satisfies the declared requirements:
/// scheme and network match, receiver, validity window, value, and the
/// EIP-712 signature. Responds with a [`crate::types::VerifyResponse`].
#[instrument(skip_all)]
async fn post_verify(
    Extension(facilitator): Extension<Arc<FacilitatorLocal>>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return malformed_request(rejection),
    };
    match facilitator.verify(&body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => {
            tracing::warn!(error = ?error, "Verification rejected");
            bad_request(&error)
        }
    }
}

/// `POST /settle`: Executes a valid x402 payment on-chain.
///
/// Re-verifies the payment, then drives it through the idempotent settlement
/// executor. Repeating the call for the same authorization nonce returns the
/// recorded outcome without a second on-chain submission. Responds with a
/// [`crate::types::SettleResponse`].
#[instrument(skip_all)]
async fn post_settle(
    Extension(facilitator): Extension<Arc<FacilitatorLocal>>,
    body: Result<Json<SettleRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return malformed_request(rejection),
    };
    match facilitator.settle(&body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => {
            tracing::warn!(error = ?error, "Settlement rejected");
            bad_request(&error)
        }
    }
}

fn malformed_request(rejection: JsonRejection) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: format!("Malformed request: {}", rejection.body_text()),
        }),
    )
        .into_response()
}

fn bad_request(error: &FacilitatorLocalError) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

fn internal_error() -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Internal server error".to_string(),
        }),
    )
        .into_response()
}
