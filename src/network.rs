//! Network definitions and known token deployments.
//!
//! This module defines the EVM networks the facilitator can settle on,
//! their chain IDs, and the statically known USDC deployments per network.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::ops::Deref;

use crate::types::{TokenAsset, TokenDeployment, TokenDeploymentEip712};

/// Supported Ethereum-compatible networks.
///
/// The facilitator settles the `exact` scheme on these networks only;
/// payloads naming any other network are rejected during validation.
#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    /// Base mainnet (chain ID 8453).
    #[serde(rename = "base")]
    Base,
    /// Base Sepolia testnet (chain ID 84532).
    #[serde(rename = "base-sepolia")]
    BaseSepolia,
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Base => write!(f, "base"),
            Network::BaseSepolia => write!(f, "base-sepolia"),
        }
    }
}

impl Network {
    /// Return all known [`Network`] variants.
    pub fn variants() -> &'static [Network] {
        &[Network::Base, Network::BaseSepolia]
    }

    /// EIP-155 chain ID of the network.
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Base => 8453,
            Network::BaseSepolia => 84532,
        }
    }
}

/// The canonical USDC deployment on a given network, including the EIP-712
/// domain metadata (`name`, `version`) needed to verify `transferWithAuthorization`
/// signatures without a round trip to the token contract.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct USDCDeployment(pub TokenDeployment);

impl Deref for USDCDeployment {
    type Target = TokenDeployment;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

static USDC_BASE: Lazy<USDCDeployment> = Lazy::new(|| {
    USDCDeployment(TokenDeployment {
        asset: TokenAsset {
            address: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"
                .parse()
                .expect("valid address"),
            network: Network::Base,
        },
        decimals: 6,
        eip712: TokenDeploymentEip712 {
            name: "USD Coin".into(),
            version: "2".into(),
        },
    })
});

static USDC_BASE_SEPOLIA: Lazy<USDCDeployment> = Lazy::new(|| {
    USDCDeployment(TokenDeployment {
        asset: TokenAsset {
            address: "0x036CbD53842c5426634e7929541eC2318f3dCF7e"
                .parse()
                .expect("valid address"),
            network: Network::BaseSepolia,
        },
        decimals: 6,
        eip712: TokenDeploymentEip712 {
            name: "USDC".into(),
            version: "2".into(),
        },
    })
});

impl USDCDeployment {
    /// Known USDC deployment for the given network.
    pub fn by_network(network: Network) -> &'static USDCDeployment {
        match network {
            Network::Base => &USDC_BASE,
            Network::BaseSepolia => &USDC_BASE_SEPOLIA,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_serde_uses_kebab_case() {
        assert_eq!(serde_json::to_string(&Network::Base).unwrap(), "\"base\"");
        assert_eq!(
            serde_json::from_str::<Network>("\"base-sepolia\"").unwrap(),
            Network::BaseSepolia
        );
    }

    #[test]
    fn unknown_network_is_rejected() {
        let result: Result<Network, _> = serde_json::from_str("\"ethereum-mainnet\"");
        assert!(result.is_err());
    }

    #[test]
    fn chain_ids_match_eip155_registry() {
        assert_eq!(Network::Base.chain_id(), 8453);
        assert_eq!(Network::BaseSepolia.chain_id(), 84532);
    }

    #[test]
    fn usdc_deployment_network_matches() {
        for network in Network::variants() {
            let usdc = USDCDeployment::by_network(*network);
            assert_eq!(usdc.asset.network, *network);
            assert_eq!(usdc.decimals, 6);
        }
    }
}
