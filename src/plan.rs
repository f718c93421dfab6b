use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use starknet::core::types::Felt;

use crate::calldata::ConstructorArgs;
use crate::error::DeployError;
use crate::manifest::DeploymentManifest;
use crate::serde_utils;

const DEPLOYER_REFERENCE: &str = "deployer";

/// Phases are executed in order, each one as a single transaction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeploymentPlan {
    pub phases: Vec<Phase>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Phase {
    pub contracts: Vec<PlannedContract>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlannedContract {
    /// Contract name in the build output.
    pub contract: String,
    /// Name the deployment is exported under, defaults to `contract`.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub constructor_args: Option<ConstructorArgs>,
}

impl PlannedContract {
    pub fn export_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.contract)
    }
}

impl DeploymentPlan {
    pub async fn load(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let plan: DeploymentPlan = serde_utils::read_deserialize(path).await?;

        plan.validate()?;

        Ok(plan)
    }

    pub fn validate(&self) -> Result<(), DeployError> {
        if self.phases.is_empty() {
            return Err(DeployError::EmptyBatch);
        }

        let mut names = HashSet::new();
        for (index, phase) in self.phases.iter().enumerate() {
            if phase.contracts.is_empty() {
                return Err(DeployError::EmptyPhase { index: index + 1 });
            }

            for contract in &phase.contracts {
                if !names.insert(contract.export_name()) {
                    return Err(DeployError::DuplicateName {
                        name: contract.export_name().to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Replaces `$deployer`, `$Name`, `$Name.address` and `$Name.classHash`
/// string values with the matching felts, at any depth.
pub fn resolve_references(
    args: &ConstructorArgs,
    deployer: Felt,
    resolved: &DeploymentManifest,
) -> Result<ConstructorArgs, DeployError> {
    args.iter()
        .map(|(name, value)| {
            Ok((name.clone(), resolve_value(value, deployer, resolved)?))
        })
        .collect()
}

fn resolve_value(
    value: &Value,
    deployer: Felt,
    resolved: &DeploymentManifest,
) -> Result<Value, DeployError> {
    match value {
        Value::String(s) => match s.strip_prefix('$') {
            Some(reference) => {
                resolve_reference(reference, deployer, resolved).map(|felt| {
                    Value::String(format!("{felt:#066x}"))
                })
            }
            None => Ok(value.clone()),
        },
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, deployer, resolved))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => resolve_references(map, deployer, resolved)
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

fn resolve_reference(
    reference: &str,
    deployer: Felt,
    resolved: &DeploymentManifest,
) -> Result<Felt, DeployError> {
    if reference == DEPLOYER_REFERENCE {
        return Ok(deployer);
    }

    let (name, field) = reference.split_once('.').unwrap_or((reference, "address"));

    let unknown = || DeployError::UnknownReference {
        reference: format!("${reference}"),
    };

    let record = resolved.get(name).ok_or_else(unknown)?;

    match field {
        "address" => Ok(record.address),
        "classHash" => Ok(record.class_hash),
        _ => Err(unknown()),
    }
}
