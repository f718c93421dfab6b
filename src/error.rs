use starknet::core::types::Felt;
use thiserror::Error;

use crate::calldata::ArgumentError;
use crate::chain::ChainError;
use crate::network::Network;

/// What the run was doing when a chain call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Stage {
    #[display(fmt = "RPC liveness check")]
    RpcCheck,
    #[display(fmt = "Signature verification")]
    SignatureCheck,
    #[display(fmt = "Class declaration")]
    Declaration,
    #[display(fmt = "Deployment execution")]
    Execution,
}

/// Fatal, categorized failures. Any of these aborts the whole run.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error(
        "Deployer account is not defined. `{address_key}` or `{private_key_key}` is missing from `.env`.\n   Please add both environment variables to your `.env` file."
    )]
    DeployerNotConfigured {
        address_key: String,
        private_key_key: String,
    },

    #[error("RPC provider is not defined. `{key}` is missing from `.env`.")]
    RpcNotConfigured { key: String },

    #[error("Invalid value for `{key}`: {reason}")]
    InvalidConfig { key: String, reason: String },

    #[error(
        "{stage} failed: RPC connection error. Unable to connect to {network} network.\n   Please check your `{rpc_key}` in `.env` and ensure the RPC endpoint is accessible."
    )]
    Connection {
        stage: Stage,
        network: Network,
        rpc_key: String,
        #[source]
        source: ChainError,
    },

    #[error(
        "{stage} failed: request timeout. The connection to {network} network timed out.\n   Please check your network connection and try again."
    )]
    Timeout {
        stage: Stage,
        network: Network,
        #[source]
        source: ChainError,
    },

    #[error(
        "RPC provider is not active. `{rpc_key}` is not reachable.\n   Error details: {source}"
    )]
    RpcUnavailable {
        rpc_key: String,
        #[source]
        source: ChainError,
    },

    #[error(
        "Deployer account at `{address:#066x}` hasn't been deployed on {network} network.\n   Please deploy your account first or use a different account address."
    )]
    AccountNotDeployed { address: Felt, network: Network },

    #[error(
        "Invalid signature. `{address_key}` does not match `{private_key_key}`.\n   Please verify that your account address and private key are correctly configured in `.env`."
    )]
    InvalidSignature {
        address_key: String,
        private_key_key: String,
    },

    #[error(
        "Unable to verify signature from the deployer account.\n   Possible causes: network latency, RPC timeout, or invalid account configuration."
    )]
    SignatureCheckFailed {
        #[source]
        source: ChainError,
    },

    #[error(
        "{stage} failed: insufficient balance.\n   Deployer address: {address:#066x}\n   Please ensure your account has enough {fee_token} to cover the fee."
    )]
    InsufficientBalance {
        stage: Stage,
        address: Felt,
        fee_token: &'static str,
        #[source]
        source: ChainError,
    },

    #[error("Error while checking class hash {class_hash:#066x}")]
    ClassLookup {
        class_hash: Felt,
        #[source]
        source: ChainError,
    },

    #[error("Declaration failed or reverted. Reason: {reason}")]
    DeclareReverted { reason: String },

    #[error("Class declaration failed: error details below")]
    DeclareFailed {
        #[source]
        source: ChainError,
    },

    #[error("Deploy Calls Failed: {reason}")]
    DeployReverted { reason: String },

    #[error("Deployment tx execution failed: error details below")]
    ExecutionFailed {
        #[source]
        source: ChainError,
    },

    #[error(
        "Aborted: No contract to deploy. Please queue contracts before executing the batch"
    )]
    EmptyBatch,

    #[error(
        "No deployment event found for {}. Their addresses could not be resolved from transaction {transaction_hash:#066x}", .names.join(", ")
    )]
    UnresolvedDeployments {
        transaction_hash: Felt,
        names: Vec<String>,
    },

    #[error("Invalid constructor arguments for '{contract}': {source}")]
    ConstructorArguments {
        contract: String,
        #[source]
        source: ArgumentError,
    },

    #[error(
        "Could not find {kind} file for contract \"{contract}\" in {dir}.\n   Try removing the target directory, recompile, and check if your contract name is correct."
    )]
    ArtifactNotFound {
        contract: String,
        kind: String,
        dir: String,
    },

    #[error("Several {kind} files match contract \"{contract}\": {}", .files.join(", "))]
    AmbiguousArtifact {
        contract: String,
        kind: String,
        files: Vec<String>,
    },

    #[error(
        "Unknown reference `{reference}`. Only `$deployer` and contracts deployed by an earlier phase can be referenced"
    )]
    UnknownReference { reference: String },

    #[error("Deployment name `{name}` is used more than once in the plan")]
    DuplicateName { name: String },

    #[error("Phase {index} of the plan has no contracts")]
    EmptyPhase { index: usize },
}

impl DeployError {
    /// Maps the transport level categories every stage shares, deferring
    /// anything else to `fallback`.
    pub fn from_chain(
        stage: Stage,
        network: Network,
        deployer: Felt,
        source: ChainError,
        fallback: impl FnOnce(ChainError) -> DeployError,
    ) -> DeployError {
        match source {
            ChainError::Connection(_) => DeployError::Connection {
                stage,
                network,
                rpc_key: network.env_key(crate::config::RPC_URL),
                source,
            },
            ChainError::Timeout(_) => DeployError::Timeout {
                stage,
                network,
                source,
            },
            ChainError::InsufficientBalance(_) => {
                DeployError::InsufficientBalance {
                    stage,
                    address: deployer,
                    fee_token: network.fee_token().name,
                    source,
                }
            }
            other => fallback(other),
        }
    }
}
