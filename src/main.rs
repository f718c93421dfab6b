use clap::Parser;
use cli::Args;
use tracing_error::ErrorLayer;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub mod abi;
pub mod artifacts;
pub mod calldata;
pub mod chain;
pub mod class_hash_cache;
pub mod declare;
pub mod deploy_queue;
pub mod manifest;
pub mod plan;
pub mod serde_utils;

mod cli;
mod config;
mod deployment;
mod error;
mod network;
mod preflight;
mod summary;
mod types;

async fn start() -> eyre::Result<()> {
    let args = Args::parse();

    deployment::run_deployment(args).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    dotenv::dotenv().ok();

    let indicatif_layer = IndicatifLayer::new();

    let filter = EnvFilter::from_default_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(indicatif_layer.get_stderr_writer())
                .with_filter(filter),
        )
        .with(indicatif_layer)
        .with(ErrorLayer::default())
        .init();

    match start().await {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::error!("{:?}", err);
            std::process::exit(1)
        }
    }
}
