use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::chain::BlockRef;
use crate::network::Network;

pub mod private_key;

pub use private_key::PrivateKey;

#[derive(Debug, Clone, Parser)]
#[clap(rename_all = "kebab-case")]
pub struct Args {
    /// The network to deploy to
    #[clap(short, long, env)]
    pub network: Network,

    /// Replace the network's deployments file instead of merging into it
    #[clap(long, env, default_value_t = true, action = ArgAction::Set)]
    pub reset: bool,

    /// Path to the deployment plan
    #[clap(short, long, env, default_value = "deploy.yml")]
    pub plan: PathBuf,

    /// Directory holding the Scarb build output
    #[clap(long, env, default_value = "contracts/target/dev")]
    pub artifacts_dir: PathBuf,

    /// Directory the deployments file is written to
    #[clap(long, env, default_value = "deployments")]
    pub deployments_dir: PathBuf,

    /// Block the class hashes of previous deployments are read at
    ///
    /// A tag (`latest`, `pre_confirmed`, `pending`), a block number or a
    /// block hash.
    #[clap(long, env, default_value = "pre_confirmed")]
    pub block: BlockRef,
}
