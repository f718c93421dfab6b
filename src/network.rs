use clap::ValueEnum;
use starknet::core::types::Felt;
use starknet::macros::felt;

/// Universal Deployer Contract, deployed at the same address on every
/// supported network.
pub const UDC_ADDRESS: Felt =
    felt!("0x041a78e741e5af2fec34b695679bc6891742439f7afb8484ecd7766661ad02bf");

/// STRK fee token.
pub const STRK_ADDRESS: Felt =
    felt!("0x04718f5a0fc34cc1af16a1cdee98ffb20c31f5cd61d6ab07201858f4287c938d");

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    ValueEnum,
    strum::Display,
    strum::EnumString,
)]
#[clap(rename_all = "kebab-case")]
#[strum(serialize_all = "lowercase")]
pub enum Network {
    Devnet,
    Sepolia,
    Mainnet,
}

impl Network {
    /// Local development networks skip finality checks on declarations.
    pub fn is_local(&self) -> bool {
        matches!(self, Network::Devnet)
    }

    pub fn factory_address(&self) -> Felt {
        UDC_ADDRESS
    }

    pub fn fee_token(&self) -> FeeToken {
        FeeToken {
            name: "STRK",
            address: STRK_ADDRESS,
        }
    }

    /// Configuration keys are named `<VARIABLE>_<NETWORK>`.
    pub fn env_key(&self, variable: &str) -> String {
        format!("{variable}_{}", self.to_string().to_uppercase())
    }

    pub fn manifest_file_name(&self) -> String {
        format!("{self}_latest.json")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FeeToken {
    pub name: &'static str,
    pub address: Felt,
}
