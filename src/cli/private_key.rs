use std::fmt;
use std::str::FromStr;

use starknet::core::types::Felt;
use starknet::signers::SigningKey;

#[derive(Clone)]
pub struct PrivateKey {
    pub key: SigningKey,
}

impl FromStr for PrivateKey {
    type Err = eyre::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);

        let bytes = if s.len() % 2 == 1 {
            hex::decode(format!("0{s}"))?
        } else {
            hex::decode(s)?
        };
        if bytes.len() > 32 {
            eyre::bail!("Private key is longer than 32 bytes");
        }

        let scalar = Felt::from_bytes_be_slice(&bytes);
        if scalar == Felt::ZERO {
            eyre::bail!("Private key is zero");
        }

        Ok(Self {
            key: SigningKey::from_secret_scalar(scalar),
        })
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PrivateKey({:#x})", self.key.verifying_key().scalar())
    }
}
