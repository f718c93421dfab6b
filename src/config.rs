use reqwest::Url;
use starknet::core::types::Felt;

use crate::cli::PrivateKey;
use crate::error::DeployError;
use crate::network::Network;

pub const ACCOUNT_ADDRESS: &str = "ACCOUNT_ADDRESS";
pub const PRIVATE_KEY: &str = "PRIVATE_KEY";
pub const RPC_URL: &str = "RPC_URL";

/// Deployer identity and RPC endpoint of the selected network.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub network: Network,
    pub account_address: Felt,
    pub private_key: PrivateKey,
    pub rpc_url: Url,
}

impl NetworkConfig {
    pub fn from_env(network: Network) -> Result<Self, DeployError> {
        Self::from_lookup(network, |key| std::env::var(key).ok())
    }

    /// Empty values count as missing.
    pub fn from_lookup(
        network: Network,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, DeployError> {
        let address_key = network.env_key(ACCOUNT_ADDRESS);
        let private_key_key = network.env_key(PRIVATE_KEY);
        let rpc_key = network.env_key(RPC_URL);

        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let (Some(address), Some(private_key)) =
            (get(&address_key), get(&private_key_key))
        else {
            return Err(DeployError::DeployerNotConfigured {
                address_key,
                private_key_key,
            });
        };

        let Some(rpc_url) = get(&rpc_key) else {
            return Err(DeployError::RpcNotConfigured { key: rpc_key });
        };

        let account_address = Felt::from_hex(&address).map_err(|err| {
            DeployError::InvalidConfig {
                key: address_key,
                reason: err.to_string(),
            }
        })?;

        let private_key = private_key.parse::<PrivateKey>().map_err(|err| {
            DeployError::InvalidConfig {
                key: private_key_key,
                reason: err.to_string(),
            }
        })?;

        let rpc_url = Url::parse(&rpc_url).map_err(|err| {
            DeployError::InvalidConfig {
                key: rpc_key,
                reason: err.to_string(),
            }
        })?;

        Ok(Self {
            network,
            account_address,
            private_key,
            rpc_url,
        })
    }
}
