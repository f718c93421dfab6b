use std::sync::Arc;

use starknet::core::types::Felt;
use tracing::{info, instrument};

use crate::artifacts::{ArtifactLocator, CompiledArtifact};
use crate::calldata::{compile_constructor_args, ConstructorArgs};
use crate::chain::{RpcChain, StarknetChain};
use crate::cli::Args;
use crate::config::NetworkConfig;
use crate::declare::DeclareCoordinator;
use crate::deploy_queue::{DeployQueue, ExecutionOutcome};
use crate::error::DeployError;
use crate::manifest::{DeploymentManifest, ManifestStore};
use crate::plan::{resolve_references, DeploymentPlan, Phase, PlannedContract};
use crate::{preflight, summary};

pub mod deployment_context;

pub use self::deployment_context::DeploymentContext;

pub async fn run_deployment(args: Args) -> eyre::Result<()> {
    let config = NetworkConfig::from_env(args.network)?;
    let plan = DeploymentPlan::load(&args.plan).await?;

    let chain: Arc<dyn StarknetChain> = Arc::new(RpcChain::new(&config));

    preflight::run(chain.as_ref(), args.network).await?;

    let context = DeploymentContext::new(
        args.network,
        chain.clone(),
        ArtifactLocator::new(&args.artifacts_dir),
        ManifestStore::new(&args.deployments_dir, args.network),
        args.reset,
    )
    .await?
    .with_block(args.block);

    deploy_plan(&context, &plan).await?;

    summary::log_balance_summary(chain.as_ref(), args.network).await;

    info!("All Setup Done!");

    Ok(())
}

/// Runs every phase in order and exports the deployments once all of
/// them went through.
#[instrument(skip_all, fields(network = %context.network))]
pub async fn deploy_plan(
    context: &DeploymentContext,
    plan: &DeploymentPlan,
) -> eyre::Result<DeploymentManifest> {
    let mut resolved = DeploymentManifest::new();

    for (index, phase) in plan.phases.iter().enumerate() {
        let outcome = deploy_phase(context, index + 1, phase, &resolved).await?;

        summary::log_deployment_summary(
            context.network,
            outcome.transaction_hash,
            outcome.actual_fee,
            &outcome.records,
        );

        resolved.extend(outcome.records);
    }

    context.manifest_store.export(&resolved, context.reset).await?;

    Ok(resolved)
}

#[instrument(skip(context, phase, resolved))]
pub async fn deploy_phase(
    context: &DeploymentContext,
    index: usize,
    phase: &Phase,
    resolved: &DeploymentManifest,
) -> eyre::Result<ExecutionOutcome> {
    let deployer = context.chain.deployer_address();

    // References are checked before this phase touches the chain
    let args = phase
        .contracts
        .iter()
        .map(|planned| {
            planned
                .constructor_args
                .as_ref()
                .map(|args| resolve_references(args, deployer, resolved))
                .transpose()
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut queue = DeployQueue::new(context.network.factory_address());

    for (planned, args) in phase.contracts.iter().zip(args) {
        let (artifact, calldata) =
            prepare_contract(context, planned, args.as_ref()).await?;

        queue.queue(
            planned.export_name(),
            &planned.contract,
            artifact.class_hash,
            calldata,
        );
    }

    let outcome = queue
        .execute(context.chain.as_ref(), context.network)
        .await?;

    Ok(outcome)
}

/// Loads, validates and declares one contract of a phase. Returns the
/// encoded constructor calldata.
#[instrument(skip_all, fields(contract = %planned.contract, name = %planned.export_name()))]
pub async fn prepare_contract(
    context: &DeploymentContext,
    planned: &PlannedContract,
    args: Option<&ConstructorArgs>,
) -> eyre::Result<(Arc<CompiledArtifact>, Vec<Felt>)> {
    let artifact = context.artifact(&planned.contract).await?;

    let calldata = compile_constructor_args(&artifact.abi, args).map_err(
        |source| DeployError::ConstructorArguments {
            contract: planned.contract.clone(),
            source,
        },
    )?;

    let on_chain_class_hash = match context.previous.get(planned.export_name())
    {
        Some(record) if record.source_contract_name == planned.contract => {
            context
                .cache
                .class_hash_at(&context.chain, record.address, context.block)
                .await
        }
        _ => None,
    };

    DeclareCoordinator::new(context.chain.as_ref(), context.network, &artifact)
        .declare_if_needed(on_chain_class_hash)
        .await?;

    Ok((artifact, calldata))
}
