//! Checks run before anything is declared or deployed.

use starknet::core::crypto::compute_hash_on_elements;
use starknet::core::types::Felt;
use starknet::core::utils::starknet_keccak;
use starknet::macros::short_string;
use tracing::{info, instrument};

use crate::chain::{ChainError, StarknetChain};
use crate::config::{ACCOUNT_ADDRESS, PRIVATE_KEY, RPC_URL};
use crate::error::{DeployError, Stage};
use crate::network::Network;

const MESSAGE_PREFIX: Felt = short_string!("StarkNet Message");
const DOMAIN_NAME: Felt = short_string!("snfoundry");
const DOMAIN_VERSION: Felt = Felt::ONE;
const MESSAGE_CONTENT: Felt = short_string!("Hello, StarkNet!");

/// Hash of the revision 0 typed message signed by the deployer:
/// domain `{ name: "snfoundry", version: 1 }`, `Message { content }`.
pub fn canonical_message_hash(account: Felt) -> Felt {
    let domain_type =
        starknet_keccak(b"StarkNetDomain(name:felt,version:felt)");
    let message_type = starknet_keccak(b"Message(content:felt)");

    let domain =
        compute_hash_on_elements(&[domain_type, DOMAIN_NAME, DOMAIN_VERSION]);
    let message = compute_hash_on_elements(&[message_type, MESSAGE_CONTENT]);

    compute_hash_on_elements(&[MESSAGE_PREFIX, domain, account, message])
}

/// RPC liveness and signing capability, checked concurrently.
#[instrument(skip_all, fields(%network))]
pub async fn run(
    chain: &dyn StarknetChain,
    network: Network,
) -> Result<(), DeployError> {
    let (block_number, ()) = tokio::try_join!(
        check_rpc(chain, network),
        check_signature(chain, network)
    )?;

    info!(block_number, "Preflight checks passed");

    Ok(())
}

async fn check_rpc(
    chain: &dyn StarknetChain,
    network: Network,
) -> Result<u64, DeployError> {
    let rpc_key = network.env_key(RPC_URL);

    chain.block_number().await.map_err(|source| match source {
        ChainError::Connection(_) => DeployError::Connection {
            stage: Stage::RpcCheck,
            network,
            rpc_key,
            source,
        },
        ChainError::Timeout(_) => DeployError::Timeout {
            stage: Stage::RpcCheck,
            network,
            source,
        },
        source => DeployError::RpcUnavailable { rpc_key, source },
    })
}

async fn check_signature(
    chain: &dyn StarknetChain,
    network: Network,
) -> Result<(), DeployError> {
    let address = chain.deployer_address();
    let message_hash = canonical_message_hash(address);

    match chain.sign_and_verify(message_hash).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(DeployError::InvalidSignature {
            address_key: network.env_key(ACCOUNT_ADDRESS),
            private_key_key: network.env_key(PRIVATE_KEY),
        }),
        Err(ChainError::ContractNotFound) => {
            Err(DeployError::AccountNotDeployed { address, network })
        }
        Err(source) => Err(DeployError::from_chain(
            Stage::SignatureCheck,
            network,
            address,
            source,
            |source| DeployError::SignatureCheckFailed { source },
        )),
    }
}
