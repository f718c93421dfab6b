use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use eyre::Context;
use serde::{Deserialize, Serialize};
use starknet::core::types::Felt;
use tracing::{info, instrument};

use crate::network::Network;
use crate::serde_utils::{self, felt_hex};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    #[serde(with = "felt_hex")]
    pub class_hash: Felt,
    #[serde(with = "felt_hex")]
    pub address: Felt,
    #[serde(alias = "contract")]
    pub source_contract_name: String,
}

/// Deployment name to record.
pub type DeploymentManifest = BTreeMap<String, DeploymentRecord>;

/// The `<network>_latest.json` file of a network.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(deployments_dir: impl AsRef<Path>, network: Network) -> Self {
        Self {
            path: deployments_dir
                .as_ref()
                .join(network.manifest_file_name()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// An absent file is an empty manifest.
    pub async fn load(&self) -> eyre::Result<DeploymentManifest> {
        if !self.path.exists() {
            return Ok(DeploymentManifest::new());
        }

        serde_utils::read_json(&self.path).await
    }

    /// Writes `records`, either alone (`reset`) or on top of the records
    /// already in the file. Returns what was written.
    #[instrument(skip_all, fields(path = %self.path.display(), reset))]
    pub async fn export(
        &self,
        records: &DeploymentManifest,
        reset: bool,
    ) -> eyre::Result<DeploymentManifest> {
        let manifest = if reset {
            if self.path.exists() {
                tokio::fs::remove_file(&self.path).await.with_context(|| {
                    format!("Removing {}", self.path.display())
                })?;
            }

            records.clone()
        } else {
            let mut manifest = self.load().await?;
            manifest.extend(
                records
                    .iter()
                    .map(|(name, record)| (name.clone(), record.clone())),
            );
            manifest
        };

        serde_utils::write_json(&self.path, &manifest).await?;

        info!(
            records = manifest.len(),
            "Exported deployments to {}",
            self.path.display()
        );

        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use maplit::btreemap;

    use super::*;

    fn record(contract: &str, n: u64) -> DeploymentRecord {
        DeploymentRecord {
            class_hash: Felt::from(n),
            address: Felt::from(n + 100),
            source_contract_name: contract.to_string(),
        }
    }

    #[tokio::test]
    async fn merge_overlays_existing_records() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = ManifestStore::new(dir.path(), Network::Sepolia);

        store
            .export(
                &btreemap! {
                    "RoleRegistry".to_string() => record("RoleRegistry", 1),
                    "BloodworksCore".to_string() => record("BloodworksCore", 2),
                },
                true,
            )
            .await?;

        let manifest = store
            .export(
                &btreemap! {
                    "BloodworksCore".to_string() => record("BloodworksCore", 3),
                },
                false,
            )
            .await?;

        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest["RoleRegistry"], record("RoleRegistry", 1));
        assert_eq!(manifest["BloodworksCore"], record("BloodworksCore", 3));
        assert_eq!(store.load().await?, manifest);

        Ok(())
    }

    #[tokio::test]
    async fn reset_keeps_only_this_run() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = ManifestStore::new(dir.path(), Network::Devnet);

        store
            .export(
                &btreemap! {
                    "RoleRegistry".to_string() => record("RoleRegistry", 1),
                },
                false,
            )
            .await?;

        let manifest = store
            .export(
                &btreemap! {
                    "BloodworksCore".to_string() => record("BloodworksCore", 2),
                },
                true,
            )
            .await?;

        assert_eq!(manifest.keys().collect::<Vec<_>>(), vec!["BloodworksCore"]);
        assert_eq!(store.load().await?, manifest);
        assert!(store.path().ends_with("devnet_latest.json"));

        Ok(())
    }

    #[tokio::test]
    async fn missing_file_is_empty() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = ManifestStore::new(dir.path().join("nested"), Network::Mainnet);

        assert!(store.load().await?.is_empty());

        Ok(())
    }

    #[test]
    fn file_format() {
        let manifest: DeploymentManifest = serde_json::from_str(indoc! {r#"
            {
              "RoleRegistry": {
                "classHash": "0x1",
                "address": "0x0000000000000000000000000000000000000000000000000000000000000065",
                "contract": "RoleRegistry"
              }
            }
        "#})
        .unwrap();

        assert_eq!(manifest["RoleRegistry"], record("RoleRegistry", 1));

        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(
            json["RoleRegistry"]["classHash"],
            format!("0x{}1", "0".repeat(63))
        );
        assert_eq!(json["RoleRegistry"]["sourceContractName"], "RoleRegistry");
    }
}
