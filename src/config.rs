//! Runtime configuration, read from CLI flags or environment variables.

use clap::Parser;
use std::time::Duration;
use url::Url;

use crate::network::Network;
use crate::settlement::{RetryPolicy, SettlementSettings};
use crate::types::EvmAddress;

/// x402 payment facilitator settling into an on-chain payment terminal.
#[derive(Debug, Parser)]
#[command(name = "x402-terminal", version, about)]
pub struct Config {
    /// Address to bind the HTTP server to.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the HTTP server to.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Private key of the account that signs settlement transactions.
    #[arg(long, env = "EVM_PRIVATE_KEY", hide_env_values = true)]
    pub evm_private_key: String,

    /// JSON-RPC endpoint for Base mainnet. Leave unset to disable the network.
    #[arg(long, env = "RPC_URL_BASE")]
    pub rpc_url_base: Option<Url>,

    /// JSON-RPC endpoint for Base Sepolia. Leave unset to disable the network.
    #[arg(long, env = "RPC_URL_BASE_SEPOLIA")]
    pub rpc_url_base_sepolia: Option<Url>,

    /// Payment terminal contract address settlements are routed through.
    #[arg(
        long,
        env = "TERMINAL_ADDRESS",
        default_value = "0xdb9644369c79c3633cde70d2df50d827d7dc7dbc"
    )]
    pub terminal_address: EvmAddress,

    /// Terminal project the received funds are credited to.
    #[arg(long, env = "TERMINAL_PROJECT_ID", default_value_t = 127)]
    pub terminal_project_id: u64,

    /// Cap on concurrent on-chain settlement submissions.
    #[arg(long, env = "MAX_CONCURRENT_SETTLEMENTS", default_value_t = 8)]
    pub max_concurrent_settlements: usize,

    /// Block depth at which a settlement counts as confirmed.
    #[arg(long, env = "SETTLEMENT_CONFIRMATIONS", default_value_t = 2)]
    pub settlement_confirmations: u64,

    /// Submission attempts per settlement before giving up.
    #[arg(long, env = "SETTLEMENT_MAX_ATTEMPTS", default_value_t = 5)]
    pub settlement_max_attempts: u32,

    /// Upper bound in seconds on any settlement window, regardless of the
    /// request's maxTimeoutSeconds.
    #[arg(long, env = "SETTLEMENT_TIMEOUT_SECONDS", default_value_t = 300)]
    pub settlement_timeout_seconds: u64,
}

impl Config {
    /// RPC endpoint configured for the given network, if any.
    pub fn rpc_url(&self, network: Network) -> Option<&Url> {
        match network {
            Network::Base => self.rpc_url_base.as_ref(),
            Network::BaseSepolia => self.rpc_url_base_sepolia.as_ref(),
        }
    }

    pub fn settlement_settings(&self) -> SettlementSettings {
        SettlementSettings {
            confirmations: self.settlement_confirmations,
            max_timeout: Duration::from_secs(self.settlement_timeout_seconds),
            max_concurrent: self.max_concurrent_settlements,
            retry: RetryPolicy {
                max_attempts: self.settlement_max_attempts,
                ..RetryPolicy::default()
            },
            ..SettlementSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut full = vec!["x402-terminal", "--evm-private-key", "0xabc"];
        full.extend_from_slice(args);
        Config::try_parse_from(full).unwrap()
    }

    #[test]
    fn defaults_are_sensible() {
        let config = parse(&[]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.terminal_project_id, 127);
        assert_eq!(config.settlement_settings().confirmations, 2);
        assert!(config.rpc_url(Network::Base).is_none());
    }

    #[test]
    fn rpc_urls_are_per_network() {
        let config = parse(&["--rpc-url-base-sepolia", "https://sepolia.base.org"]);
        assert!(config.rpc_url(Network::Base).is_none());
        assert_eq!(
            config.rpc_url(Network::BaseSepolia).unwrap().as_str(),
            "https://sepolia.base.org/"
        );
    }

    #[test]
    fn settlement_settings_carry_overrides() {
        let config = parse(&[
            "--settlement-max-attempts",
            "9",
            "--settlement-timeout-seconds",
            "30",
        ]);
        let settings = config.settlement_settings();
        assert_eq!(settings.retry.max_attempts, 9);
        assert_eq!(settings.max_timeout, Duration::from_secs(30));
    }
}
