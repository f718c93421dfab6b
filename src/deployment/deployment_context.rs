use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use crate::artifacts::{ArtifactLocator, CompiledArtifact};
use crate::chain::{BlockRef, StarknetChain};
use crate::class_hash_cache::ClassHashCache;
use crate::manifest::{DeploymentManifest, ManifestStore};
use crate::network::Network;

/// Everything a run shares between its phases.
pub struct DeploymentContext {
    pub network: Network,
    pub chain: Arc<dyn StarknetChain>,
    pub locator: ArtifactLocator,
    pub cache: ClassHashCache,
    pub manifest_store: ManifestStore,
    /// Deployments file as it was when the run started.
    pub previous: DeploymentManifest,
    pub block: BlockRef,
    pub reset: bool,
    artifacts: Mutex<HashMap<String, Arc<CompiledArtifact>>>,
}

impl DeploymentContext {
    /// In `reset` mode an unreadable deployments file is only reported,
    /// it gets replaced at the end of the run anyway.
    pub async fn new(
        network: Network,
        chain: Arc<dyn StarknetChain>,
        locator: ArtifactLocator,
        manifest_store: ManifestStore,
        reset: bool,
    ) -> eyre::Result<Self> {
        let previous = match manifest_store.load().await {
            Ok(previous) => previous,
            Err(err) if reset => {
                warn!(
                    path = %manifest_store.path().display(),
                    "Ignoring unreadable deployments file: {err:#}"
                );
                DeploymentManifest::new()
            }
            Err(err) => return Err(err),
        };

        Ok(Self {
            network,
            chain,
            locator,
            cache: ClassHashCache::new(),
            manifest_store,
            previous,
            block: BlockRef::default(),
            reset,
            artifacts: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_block(mut self, block: BlockRef) -> Self {
        self.block = block;
        self
    }

    /// Loads each contract's artifacts once per run.
    pub async fn artifact(
        &self,
        contract: &str,
    ) -> eyre::Result<Arc<CompiledArtifact>> {
        let mut artifacts = self.artifacts.lock().await;

        if let Some(artifact) = artifacts.get(contract) {
            return Ok(artifact.clone());
        }

        let artifact = Arc::new(self.locator.load(contract).await?);
        artifacts.insert(contract.to_string(), artifact.clone());

        Ok(artifact)
    }

    pub async fn insert_artifact(&self, artifact: CompiledArtifact) {
        self.artifacts
            .lock()
            .await
            .insert(artifact.name.clone(), Arc::new(artifact));
    }
}
