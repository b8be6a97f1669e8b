//! End-to-end tests of the HTTP surface against a stubbed chain adapter.

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use alloy::signers::SignerSync;
use alloy::signers::local::PrivateKeySigner;

use x402_terminal::chain::{
    ChainAdapter, ChainRegistry, SubmitError, TerminalCall, TxInclusion,
};
use x402_terminal::facilitator_local::FacilitatorLocal;
use x402_terminal::handlers;
use x402_terminal::network::Network;
use x402_terminal::settlement::{SettlementExecutor, SettlementSettings};
use x402_terminal::timestamp::UnixTimestamp;
use x402_terminal::types::{EvmAddress, TransactionHash};
use x402_terminal::verify::{eip712_domain_for, signing_hash};

struct StubChain {
    submit_count: AtomicU32,
}

#[async_trait]
impl ChainAdapter for StubChain {
    fn network(&self) -> Network {
        Network::BaseSepolia
    }

    fn signer_address(&self) -> EvmAddress {
        "0x857b06519E91e3A54538791bDbb0E22373e36b66"
            .parse()
            .unwrap()
    }

    async fn submit(&self, _call: &TerminalCall) -> Result<TransactionHash, SubmitError> {
        self.submit_count.fetch_add(1, Ordering::SeqCst);
        Ok(TransactionHash([0x42; 32]))
    }

    async fn transaction_status(
        &self,
        _tx: TransactionHash,
    ) -> Result<TxInclusion, SubmitError> {
        Ok(TxInclusion::Confirmed { confirmations: 12 })
    }
}

fn app() -> (Router, Arc<StubChain>) {
    let chain = Arc::new(StubChain {
        submit_count: AtomicU32::new(0),
    });
    let mut registry = ChainRegistry::new();
    registry.register(chain.clone());
    let executor = Arc::new(SettlementExecutor::new(
        SettlementSettings::default(),
        CancellationToken::new(),
    ));
    let facilitator = Arc::new(FacilitatorLocal::new(registry, executor));
    (handlers::routes(facilitator), chain)
}

fn signed_request_json(signer: &PrivateKeySigner, nonce_byte: u8) -> serde_json::Value {
    let requirements_json = serde_json::json!({
        "scheme": "exact",
        "network": "base-sepolia",
        "maxAmountRequired": "10000",
        "resource": "https://example.com/weather",
        "description": "Weather report",
        "mimeType": "application/json",
        "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
        "maxTimeoutSeconds": 60,
        "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
    });
    let requirements: x402_terminal::types::PaymentRequirements =
        serde_json::from_value(requirements_json.clone()).unwrap();

    let now = UnixTimestamp::try_now().unwrap();
    let authorization = x402_terminal::types::ExactEvmPayloadAuthorization {
        from: signer.address().into(),
        to: requirements.pay_to,
        value: requirements.max_amount_required,
        valid_after: now - 60,
        valid_before: now + 600,
        nonce: x402_terminal::types::HexEncodedNonce([nonce_byte; 32]),
    };
    let domain = eip712_domain_for(&requirements);
    let hash = signing_hash(&authorization, &domain);
    let signature = signer.sign_hash_sync(&hash).unwrap();

    serde_json::json!({
        "x402Version": 1,
        "paymentPayload": {
            "x402Version": 1,
            "scheme": "exact",
            "network": "base-sepolia",
            "payload": {
                "signature": format!("0x{}", alloy::hex::encode(signature.as_bytes())),
                "authorization": serde_json::to_value(authorization).unwrap(),
            }
        },
        "paymentRequirements": requirements_json,
    })
}

async fn post_json(
    app: &Router,
    path: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::post(path)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

async fn get_json(app: &Router, path: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

#[tokio::test]
async fn health_reports_ok() {
    let (app, _chain) = app();
    let (status, json) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn supported_lists_configured_networks() {
    let (app, _chain) = app();
    let (status, json) = get_json(&app, "/supported").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json,
        serde_json::json!({
            "kinds": [
                {"x402Version": 1, "scheme": "exact", "network": "base-sepolia"}
            ]
        })
    );
}

#[tokio::test]
async fn verify_and_settle_endpoints_expose_discovery_metadata() {
    let (app, _chain) = app();
    for path in ["/verify", "/settle"] {
        let (status, json) = get_json(&app, path).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["endpoint"], path);
    }
}

#[tokio::test]
async fn malformed_verify_body_is_bad_request() {
    let (app, _chain) = app();
    let (status, json) = post_json(&app, "/verify", serde_json::json!({"nope": true})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn verify_accepts_signed_payment() {
    let (app, _chain) = app();
    let signer = PrivateKeySigner::random();
    let request = signed_request_json(&signer, 1);
    let (status, json) = post_json(&app, "/verify", request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["isValid"], serde_json::json!(true));
    assert_eq!(
        json["payer"].as_str().unwrap().to_lowercase(),
        format!("{:#x}", signer.address())
    );
}

#[tokio::test]
async fn verify_flags_tampered_payment() {
    let (app, _chain) = app();
    let signer = PrivateKeySigner::random();
    let mut request = signed_request_json(&signer, 2);
    // Inflate the authorized value after signing.
    request["paymentPayload"]["payload"]["authorization"]["value"] =
        serde_json::json!("999999999");
    let (status, json) = post_json(&app, "/verify", request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["isValid"], serde_json::json!(false));
    assert_eq!(json["invalidReason"], "invalid_signature");
}

#[tokio::test]
async fn settle_confirms_and_is_idempotent() {
    let (app, chain) = app();
    let signer = PrivateKeySigner::random();
    let request = signed_request_json(&signer, 3);

    let (status, first) = post_json(&app, "/settle", request.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["success"], serde_json::json!(true));
    assert_eq!(first["status"], "confirmed");
    assert_eq!(first["network"], "base-sepolia");
    assert!(first["transaction"].is_string());

    let (_, second) = post_json(&app, "/settle", request).await;
    assert_eq!(second["transaction"], first["transaction"]);
    assert_eq!(chain.submit_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn settle_rejects_scheme_mismatch_as_bad_request() {
    let (app, chain) = app();
    let signer = PrivateKeySigner::random();
    let mut request = signed_request_json(&signer, 4);
    request["paymentRequirements"]["maxAmountRequired"] = serde_json::json!("20000");
    let (status, _json) = post_json(&app, "/settle", request).await;
    // The authorized value can never cover the requirement: request defect.
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(chain.submit_count.load(Ordering::SeqCst), 0);
}
