//! The slice of the Starknet JSON-RPC surface the deployer consumes.
//!
//! Everything the orchestrator does on-chain goes through [`StarknetChain`],
//! so the declare and deploy logic can be driven by the scripted chain in
//! the tests exactly like it is driven by a node.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;
use starknet::core::types::{Call, Event, Felt};
use thiserror::Error;

use crate::artifacts::CompiledArtifact;
use crate::types::{Fri, Tip};

pub mod rpc;
pub mod waiter;

#[cfg(test)]
pub mod testing;

pub use self::rpc::RpcChain;
pub use self::waiter::ReceiptWaiter;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("Class hash not found")]
    ClassHashNotFound,
    #[error("Contract not found")]
    ContractNotFound,
    #[error("Transaction hash not found")]
    TransactionNotFound,
    #[error("Insufficient account balance: {0}")]
    InsufficientBalance(String),
    #[error("RPC connection error: {0}")]
    Connection(String),
    #[error("RPC request timed out: {0}")]
    Timeout(String),
    #[error("Signing failed: {0}")]
    Signing(String),
    #[error("{0}")]
    Rpc(String),
}

impl ChainError {
    /// Transport failures only surface as text once they went through the
    /// JSON-RPC client, so they are told apart by their message.
    pub fn from_transport_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowercase = message.to_lowercase();

        if lowercase.contains("timed out") || lowercase.contains("timeout") {
            ChainError::Timeout(message)
        } else if lowercase.contains("connect")
            || lowercase.contains("network")
            || lowercase.contains("dns")
        {
            ChainError::Connection(message)
        } else {
            ChainError::Rpc(message)
        }
    }
}

/// Block a read is performed against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BlockRef {
    Latest,
    #[default]
    PreConfirmed,
    Pending,
    Number(u64),
    Hash(Felt),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid block reference `{0}`")]
pub struct BlockRefParseError(String);

impl BlockRef {
    /// Rewrites references to blocks that are not finalized yet to
    /// `latest`. Some nodes reject `pre_confirmed` or `pending` on reads.
    pub fn normalize(self) -> Self {
        match self {
            BlockRef::PreConfirmed | BlockRef::Pending => BlockRef::Latest,
            other => other,
        }
    }

    /// Accepts a tag name, a block number, a block hash, or an object
    /// carrying any of those (`{"block_tag": "pending"}`,
    /// `{"block_number": 12}`, ...). `null` means `latest`.
    pub fn from_value(value: &Value) -> Result<Self, BlockRefParseError> {
        match value {
            Value::Null => Ok(BlockRef::Latest),
            Value::Number(number) => number
                .as_u64()
                .map(BlockRef::Number)
                .ok_or_else(|| BlockRefParseError(number.to_string())),
            Value::String(s) => s.parse(),
            Value::Object(map) => {
                for key in ["block_tag", "blockTag", "tag", "block_id"] {
                    if let Some(tag) = map.get(key) {
                        return BlockRef::from_value(tag);
                    }
                }

                if let Some(number) =
                    map.get("block_number").or_else(|| map.get("blockNumber"))
                {
                    return BlockRef::from_value(number);
                }

                if let Some(Value::String(hash)) =
                    map.get("block_hash").or_else(|| map.get("blockHash"))
                {
                    return Felt::from_hex(hash)
                        .map(BlockRef::Hash)
                        .map_err(|_| BlockRefParseError(hash.clone()));
                }

                Err(BlockRefParseError(value.to_string()))
            }
            other => Err(BlockRefParseError(other.to_string())),
        }
    }
}

impl FromStr for BlockRef {
    type Err = BlockRefParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        match s {
            "latest" => return Ok(BlockRef::Latest),
            "pre_confirmed" | "preConfirmed" => {
                return Ok(BlockRef::PreConfirmed)
            }
            "pending" => return Ok(BlockRef::Pending),
            _ => {}
        }

        if s.starts_with('{') {
            let value: Value = serde_json::from_str(s)
                .map_err(|_| BlockRefParseError(s.to_string()))?;
            return BlockRef::from_value(&value);
        }

        if s.starts_with("0x") {
            return Felt::from_hex(s)
                .map(BlockRef::Hash)
                .map_err(|_| BlockRefParseError(s.to_string()));
        }

        s.parse::<u64>()
            .map(BlockRef::Number)
            .map_err(|_| BlockRefParseError(s.to_string()))
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockRef::Latest => write!(f, "latest"),
            BlockRef::PreConfirmed => write!(f, "pre_confirmed"),
            BlockRef::Pending => write!(f, "pending"),
            BlockRef::Number(number) => write!(f, "{number}"),
            BlockRef::Hash(hash) => write!(f, "{hash:#x}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Succeeded,
    Reverted { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalityStatus {
    PreConfirmed,
    AcceptedOnL2,
    AcceptedOnL1,
}

impl FinalityStatus {
    /// Accepted on L2 or later.
    pub fn is_accepted(self) -> bool {
        matches!(
            self,
            FinalityStatus::AcceptedOnL2 | FinalityStatus::AcceptedOnL1
        )
    }
}

#[derive(Debug, Clone)]
pub struct Receipt {
    pub transaction_hash: Felt,
    pub finality_status: FinalityStatus,
    pub execution_status: ExecutionStatus,
    pub actual_fee: Felt,
    pub events: Vec<Event>,
}

/// Fee settings of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclareFee {
    pub tip: Tip,
    pub estimated: Fri,
    pub max_fee: Fri,
}

#[async_trait]
pub trait StarknetChain: Send + Sync {
    fn deployer_address(&self) -> Felt;

    async fn block_number(&self) -> Result<u64, ChainError>;

    /// `Err(ChainError::ClassHashNotFound)` when the class isn't declared.
    async fn check_class(&self, class_hash: Felt) -> Result<(), ChainError>;

    async fn class_hash_at(
        &self,
        block: BlockRef,
        address: Felt,
    ) -> Result<Felt, ChainError>;

    async fn recommended_tip(&self) -> Result<Tip, ChainError>;

    async fn estimate_declare_fee(
        &self,
        artifact: &CompiledArtifact,
        tip: Tip,
    ) -> Result<Fri, ChainError>;

    /// Returns the declaration's transaction hash.
    async fn declare(
        &self,
        artifact: &CompiledArtifact,
        fee: DeclareFee,
    ) -> Result<Felt, ChainError>;

    /// Submits all calls as a single transaction, returns its hash.
    async fn execute(
        &self,
        calls: Vec<Call>,
        tip: Option<Tip>,
    ) -> Result<Felt, ChainError>;

    /// `None` while the transaction isn't known to the node yet.
    async fn receipt(
        &self,
        transaction_hash: Felt,
    ) -> Result<Option<Receipt>, ChainError>;

    /// Signs `message_hash` with the deployer key and asks the deployer
    /// account contract whether the signature is valid.
    async fn sign_and_verify(
        &self,
        message_hash: Felt,
    ) -> Result<bool, ChainError>;

    async fn balance_of(
        &self,
        token: Felt,
        account: Felt,
    ) -> Result<Fri, ChainError>;
}

/// Median of the tips paid in a block, 0 for a block without tips.
pub fn median_tip(mut tips: Vec<u64>) -> Tip {
    if tips.is_empty() {
        return Tip(0);
    }

    tips.sort_unstable();

    let mid = tips.len() / 2;
    if tips.len() % 2 == 0 {
        let (low, high) = (tips[mid - 1], tips[mid]);
        Tip(low / 2 + high / 2 + (low % 2 + high % 2) / 2)
    } else {
        Tip(tips[mid])
    }
}
