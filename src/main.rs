//! x402 facilitator HTTP entrypoint.
//!
//! Launches an Axum server exposing the x402 protocol interface for payment
//! verification and settlement against Ethereum-compatible networks.
//!
//! Endpoints:
//! - `POST /verify` – Verify a payment payload against requirements
//! - `POST /settle` – Settle an accepted payment payload on-chain
//! - `GET /supported` – List supported payment kinds (version/scheme/network)
//! - `GET /health` – Liveness probe
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT` control the binding address
//! - `RPC_URL_*` enable networks; `EVM_PRIVATE_KEY` signs settlements
//! - `OTEL_*` variables enable tracing export

use axum::http::Method;
use clap::Parser;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors;
use tower_http::trace::TraceLayer;

use x402_terminal::chain::{ChainRegistry, TerminalChainAdapter};
use x402_terminal::config::Config;
use x402_terminal::facilitator_local::FacilitatorLocal;
use x402_terminal::handlers;
use x402_terminal::network::Network;
use x402_terminal::settlement::SettlementExecutor;
use x402_terminal::shutdown::ShutdownSignal;
use x402_terminal::telemetry::Telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let _telemetry = Telemetry::new();
    let config = Config::parse();

    let signer: alloy::signers::local::PrivateKeySigner = config.evm_private_key.parse()?;
    let mut registry = ChainRegistry::new();
    for network in Network::variants() {
        if let Some(rpc_url) = config.rpc_url(*network) {
            let adapter = TerminalChainAdapter::new(
                *network,
                rpc_url.clone(),
                // Same signing key across networks.
                signer.clone(),
                config.terminal_address,
                config.terminal_project_id,
            );
            tracing::info!(network = %network, "Chain configured");
            registry.register(Arc::new(adapter));
        }
    }
    if registry.is_empty() {
        return Err("No RPC endpoints configured; set RPC_URL_BASE or RPC_URL_BASE_SEPOLIA".into());
    }

    let shutdown = ShutdownSignal::try_new()?;
    let executor = Arc::new(SettlementExecutor::new(
        config.settlement_settings(),
        shutdown.cancellation_token(),
    ));
    let facilitator = Arc::new(FacilitatorLocal::new(registry, executor));

    let app = handlers::routes(facilitator)
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting server at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let cancellation_token = shutdown.cancellation_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancellation_token.cancelled().await })
        .await?;

    Ok(())
}
