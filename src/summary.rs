use starknet::core::types::Felt;
use tracing::{info, warn};

use crate::chain::StarknetChain;
use crate::manifest::DeploymentRecord;
use crate::network::Network;
use crate::types::Fri;

const FRI_PER_STRK: u128 = 1_000_000_000_000_000_000;

/// `1.5 STRK` style rendering, trailing zeros dropped.
pub fn format_strk(amount: Fri) -> String {
    let whole = amount.0 / FRI_PER_STRK;
    let fraction = amount.0 % FRI_PER_STRK;

    if fraction == 0 {
        return format!("{whole} STRK");
    }

    let fraction = format!("{fraction:018}");
    format!("{whole}.{} STRK", fraction.trim_end_matches('0'))
}

pub fn log_deployment_summary(
    network: Network,
    transaction_hash: Felt,
    actual_fee: Felt,
    records: &[(String, DeploymentRecord)],
) {
    info!(
        %network,
        tx = %format!("{transaction_hash:#066x}"),
        actual_fee = %actual_fee,
        "Deployment summary"
    );

    for (name, record) in records {
        info!(
            "  {name} ({}): class hash {:#066x}, address {:#066x}",
            record.source_contract_name, record.class_hash, record.address
        );
    }
}

/// Best effort, a failed balance read only warns.
pub async fn log_balance_summary(chain: &dyn StarknetChain, network: Network) {
    let token = network.fee_token();
    let deployer = chain.deployer_address();

    match chain.balance_of(token.address, deployer).await {
        Ok(balance) => info!(
            deployer = %format!("{deployer:#066x}"),
            "Deployer {} balance: {}",
            token.name,
            format_strk(balance)
        ),
        Err(err) => warn!(%err, "Could not read the {} balance of the deployer", token.name),
    }
}
