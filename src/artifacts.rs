use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{Context, ContextCompat};
use serde::Deserialize;
use starknet::core::types::contract::{CompiledClass, SierraClass};
use starknet::core::types::{Felt, FlattenedSierraClass};
use tracing::{info, instrument};

use crate::abi::AbiItem;
use crate::error::DeployError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ArtifactKind {
    /// Sierra program and ABI
    ContractClass,
    /// CASM
    CompiledContractClass,
}

/// A contract as built by Scarb, ready to be declared.
#[derive(Debug, Clone)]
pub struct CompiledArtifact {
    pub name: String,
    pub abi: Vec<AbiItem>,
    pub class: Arc<FlattenedSierraClass>,
    pub class_hash: Felt,
    pub compiled_class_hash: Felt,
    /// Size of the Sierra class as compact JSON, drives the receipt
    /// polling interval.
    pub size_bytes: usize,
}

impl fmt::Display for CompiledArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:#066x}", self.name, self.class_hash)
    }
}

#[derive(Deserialize)]
struct ContractClassAbi {
    abi: Vec<AbiItem>,
}

#[derive(Debug, Clone)]
pub struct ArtifactLocator {
    target_dir: PathBuf,
}

impl ArtifactLocator {
    pub fn new(target_dir: impl AsRef<Path>) -> Self {
        Self {
            target_dir: target_dir.as_ref().to_owned(),
        }
    }

    /// Finds `*<contract>.<kind>.json` in the target directory.
    pub async fn find(
        &self,
        contract: &str,
        kind: ArtifactKind,
    ) -> eyre::Result<PathBuf> {
        let not_found = || DeployError::ArtifactNotFound {
            contract: contract.to_string(),
            kind: kind.to_string(),
            dir: self.target_dir.display().to_string(),
        };

        let mut entries = match tokio::fs::read_dir(&self.target_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(not_found().into())
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("Reading {}", self.target_dir.display())
                })
            }
        };

        let exact = format!("{contract}.{kind}.json");
        let packaged = format!("_{exact}");

        let mut matches = vec![];
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();

            if file_name == exact || file_name.ends_with(&packaged) {
                matches.push(entry.path());
            }
        }

        matches.sort();

        match matches.len() {
            0 => Err(not_found().into()),
            1 => Ok(matches.remove(0)),
            _ => Err(DeployError::AmbiguousArtifact {
                contract: contract.to_string(),
                kind: kind.to_string(),
                files: matches
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect(),
            }
            .into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn load(&self, contract: &str) -> eyre::Result<CompiledArtifact> {
        let sierra_path = self.find(contract, ArtifactKind::ContractClass).await?;
        let casm_path = self
            .find(contract, ArtifactKind::CompiledContractClass)
            .await?;

        let sierra_json = tokio::fs::read_to_string(&sierra_path)
            .await
            .with_context(|| format!("Reading {}", sierra_path.display()))?;
        let casm_json = tokio::fs::read_to_string(&casm_path)
            .await
            .with_context(|| format!("Reading {}", casm_path.display()))?;

        let sierra: SierraClass = serde_json::from_str(&sierra_json)
            .with_context(|| format!("Parsing {}", sierra_path.display()))?;
        let ContractClassAbi { abi } = serde_json::from_str(&sierra_json)
            .with_context(|| {
                format!("Parsing the ABI of {}", sierra_path.display())
            })?;
        let size_bytes = compact_size(&sierra_json)
            .with_context(|| format!("Parsing {}", sierra_path.display()))?;
        let casm: CompiledClass = serde_json::from_str(&casm_json)
            .with_context(|| format!("Parsing {}", casm_path.display()))?;

        let class_hash = sierra
            .class_hash()
            .with_context(|| format!("Computing class hash of {contract}"))?;
        let compiled_class_hash = casm.class_hash().with_context(|| {
            format!("Computing compiled class hash of {contract}")
        })?;
        let class = sierra
            .flatten()
            .with_context(|| format!("Flattening {contract}"))?;

        let file_name = sierra_path
            .file_name()
            .context("Missing artifact file name")?
            .to_string_lossy();
        info!(
            "Loaded {file_name} with class hash {class_hash:#066x}"
        );

        Ok(CompiledArtifact {
            name: contract.to_string(),
            abi,
            class: Arc::new(class),
            class_hash,
            compiled_class_hash,
            size_bytes,
        })
    }
}

/// Length of `json` once re-serialized without whitespace.
fn compact_size(json: &str) -> serde_json::Result<usize> {
    let value: serde_json::Value = serde_json::from_str(json)?;

    Ok(serde_json::to_string(&value)?.len())
}
