use std::time::Duration;

use starknet::core::types::Felt;
use tracing::{debug, error, info, instrument};

use crate::artifacts::CompiledArtifact;
use crate::chain::{
    ChainError, DeclareFee, ExecutionStatus, ReceiptWaiter, StarknetChain,
};
use crate::error::{DeployError, Stage};
use crate::network::Network;
use crate::types::{Fri, Tip};

const BASE_RETRY_INTERVAL_MS: u64 = 5000;
const RETRY_INTERVAL_PER_CHUNK_MS: u64 = 1500;
const RETRY_CHUNK_BYTES: u64 = 100_000;
const MAX_RETRY_INTERVAL_MS: u64 = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum DeclareState {
    NotChecked,
    CheckingExistence,
    AlreadyDeclared,
    NeedsDeclare,
    EstimatingFee,
    Submitting,
    AwaitingReceipt,
    Succeeded,
    Reverted,
    Submitted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclareOutcome {
    AlreadyDeclared,
    /// Local networks don't wait for the receipt.
    Submitted { transaction_hash: Felt },
    Declared {
        transaction_hash: Felt,
        actual_fee: Felt,
    },
}

/// Receipt polling interval for a declaration, growing with the size of
/// the class.
pub fn retry_interval(size_bytes: usize) -> Duration {
    let chunks = (size_bytes as u64).div_ceil(RETRY_CHUNK_BYTES);
    let interval =
        BASE_RETRY_INTERVAL_MS + chunks * RETRY_INTERVAL_PER_CHUNK_MS;

    Duration::from_millis(interval.min(MAX_RETRY_INTERVAL_MS))
}

pub fn final_declare_fee(estimated: Fri) -> Fri {
    estimated.max(Fri::MIN_DECLARE_FEE)
}

/// Declares one class unless the network already knows it.
pub struct DeclareCoordinator<'a> {
    chain: &'a dyn StarknetChain,
    network: Network,
    artifact: &'a CompiledArtifact,
    state: DeclareState,
}

impl<'a> DeclareCoordinator<'a> {
    pub fn new(
        chain: &'a dyn StarknetChain,
        network: Network,
        artifact: &'a CompiledArtifact,
    ) -> Self {
        Self {
            chain,
            network,
            artifact,
            state: DeclareState::NotChecked,
        }
    }

    pub fn state(&self) -> DeclareState {
        self.state
    }

    fn transition(&mut self, next: DeclareState) {
        debug!(from = %self.state, to = %next, "Declare state");
        self.state = next;
    }

    fn categorize(&self, source: ChainError) -> DeployError {
        DeployError::from_chain(
            Stage::Declaration,
            self.network,
            self.chain.deployer_address(),
            source,
            |source| DeployError::DeclareFailed { source },
        )
    }

    /// `on_chain_class_hash` is the class hash found at the address of a
    /// previous deployment of the same contract, if any. When it matches
    /// the artifact the existence check is skipped.
    #[instrument(skip_all, fields(contract = %self.artifact.name))]
    pub async fn declare_if_needed(
        &mut self,
        on_chain_class_hash: Option<Felt>,
    ) -> Result<DeclareOutcome, DeployError> {
        let class_hash = self.artifact.class_hash;

        if on_chain_class_hash == Some(class_hash) {
            info!("Class hash matches the previous deployment, skipping declaration");
            self.transition(DeclareState::AlreadyDeclared);
            return Ok(DeclareOutcome::AlreadyDeclared);
        }

        self.transition(DeclareState::CheckingExistence);
        match self.chain.check_class(class_hash).await {
            Ok(()) => {
                info!(
                    "Class {class_hash:#066x} is already declared, skipping"
                );
                self.transition(DeclareState::AlreadyDeclared);
                return Ok(DeclareOutcome::AlreadyDeclared);
            }
            Err(ChainError::ClassHashNotFound) => {
                self.transition(DeclareState::NeedsDeclare);
            }
            Err(source) => {
                return Err(DeployError::from_chain(
                    Stage::Declaration,
                    self.network,
                    self.chain.deployer_address(),
                    source,
                    |source| DeployError::ClassLookup { class_hash, source },
                ));
            }
        }

        self.transition(DeclareState::EstimatingFee);
        let tip = if self.network.is_local() {
            Tip::DEVNET
        } else {
            self.chain
                .recommended_tip()
                .await
                .map_err(|source| self.categorize(source))?
        };

        let estimated = self
            .chain
            .estimate_declare_fee(self.artifact, tip)
            .await
            .map_err(|source| self.categorize(source))?;

        let fee = DeclareFee {
            tip,
            estimated,
            max_fee: final_declare_fee(estimated),
        };
        let interval = retry_interval(self.artifact.size_bytes);

        info!(
            %tip,
            estimated_fee = %fee.estimated,
            max_fee = %fee.max_fee,
            retry_interval_ms = interval.as_millis() as u64,
            "Declaring class {class_hash:#066x}"
        );

        self.transition(DeclareState::Submitting);
        let transaction_hash = self
            .chain
            .declare(self.artifact, fee)
            .await
            .map_err(|source| self.categorize(source))?;

        if self.network.is_local() {
            info!(
                tx = %format!("{transaction_hash:#066x}"),
                "Declaration submitted"
            );
            self.transition(DeclareState::Submitted);
            return Ok(DeclareOutcome::Submitted { transaction_hash });
        }

        self.transition(DeclareState::AwaitingReceipt);
        let receipt = ReceiptWaiter::new(self.chain, transaction_hash)
            .with_interval(interval)
            .wait()
            .await
            .map_err(|source| self.categorize(source))?;

        match receipt.execution_status {
            ExecutionStatus::Succeeded => {
                info!(
                    tx = %format!("{transaction_hash:#066x}"),
                    actual_fee = %receipt.actual_fee,
                    "Class declared"
                );
                self.transition(DeclareState::Succeeded);

                Ok(DeclareOutcome::Declared {
                    transaction_hash,
                    actual_fee: receipt.actual_fee,
                })
            }
            ExecutionStatus::Reverted { ref reason } => {
                error!(?receipt, "Declaration reverted");
                self.transition(DeclareState::Reverted);

                Err(DeployError::DeclareReverted {
                    reason: reason.clone(),
                })
            }
        }
    }
}
