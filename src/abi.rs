//! Constructor signatures read from Cairo ABIs.

use serde::Deserialize;
use thiserror::Error;

const CONTRACT_ADDRESS: &str =
    "core::starknet::contract_address::ContractAddress";
const CLASS_HASH: &str = "core::starknet::class_hash::ClassHash";
const FELT252: &str = "core::felt252";
const BOOL: &str = "core::bool";
const U256: &str = "core::integer::u256";
const BYTE_ARRAY: &str = "core::byte_array::ByteArray";
const ARRAY_PREFIXES: [&str; 2] = ["core::array::Array::<", "core::array::Span::<"];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AbiItem {
    Constructor {
        name: String,
        inputs: Vec<AbiParam>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AbiParam {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

/// How a constructor parameter is validated and encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    Address,
    /// A single field element. Unsigned integers narrower than 256 bits
    /// carry their width.
    Felt { bits: Option<u32> },
    U256,
    Bool,
    ByteArray,
    Array(Box<ParamKind>),
}

impl ParamKind {
    pub fn from_type(ty: &str) -> Option<ParamKind> {
        let ty = ty.trim();

        let kind = match ty {
            CONTRACT_ADDRESS => ParamKind::Address,
            FELT252 | CLASS_HASH => ParamKind::Felt { bits: None },
            BOOL => ParamKind::Bool,
            U256 => ParamKind::U256,
            BYTE_ARRAY => ParamKind::ByteArray,
            "core::integer::u8" => ParamKind::Felt { bits: Some(8) },
            "core::integer::u16" => ParamKind::Felt { bits: Some(16) },
            "core::integer::u32" | "core::integer::usize" => {
                ParamKind::Felt { bits: Some(32) }
            }
            "core::integer::u64" => ParamKind::Felt { bits: Some(64) },
            "core::integer::u128" => ParamKind::Felt { bits: Some(128) },
            _ => {
                let inner = ARRAY_PREFIXES
                    .iter()
                    .find_map(|prefix| ty.strip_prefix(prefix))
                    .and_then(|rest| rest.strip_suffix('>'))?;

                ParamKind::Array(Box::new(ParamKind::from_type(inner)?))
            }
        };

        Some(kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructorParam {
    pub name: String,
    pub ty: String,
    pub kind: ParamKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConstructorSignature {
    pub inputs: Vec<ConstructorParam>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported constructor parameter type '{ty}' for '{name}'")]
pub struct UnsupportedType {
    pub name: String,
    pub ty: String,
}

impl ConstructorSignature {
    /// `None` for contracts without a constructor.
    pub fn from_abi(
        abi: &[AbiItem],
    ) -> Result<Option<ConstructorSignature>, UnsupportedType> {
        let Some(inputs) = abi.iter().find_map(|item| match item {
            AbiItem::Constructor { inputs, .. } => Some(inputs),
            AbiItem::Other => None,
        }) else {
            return Ok(None);
        };

        let inputs = inputs
            .iter()
            .map(|param| {
                let kind = ParamKind::from_type(&param.ty).ok_or_else(|| {
                    UnsupportedType {
                        name: param.name.clone(),
                        ty: param.ty.clone(),
                    }
                })?;

                Ok(ConstructorParam {
                    name: param.name.clone(),
                    ty: param.ty.clone(),
                    kind,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(ConstructorSignature { inputs }))
    }

    /// `name: type` pairs, for error messages.
    pub fn describe(&self) -> String {
        self.inputs
            .iter()
            .map(|param| format!("{}: {}", param.name, param.ty))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    const ABI: &str = indoc! {r#"
        [
          {
            "type": "impl",
            "name": "CoreImpl",
            "interface_name": "bloodworks::ICore"
          },
          {
            "type": "struct",
            "name": "core::integer::u256",
            "members": [
              { "name": "low", "type": "core::integer::u128" },
              { "name": "high", "type": "core::integer::u128" }
            ]
          },
          {
            "type": "constructor",
            "name": "constructor",
            "inputs": [
              { "name": "role_registry", "type": "core::starknet::contract_address::ContractAddress" },
              { "name": "cooldown_seconds", "type": "core::integer::u64" },
              { "name": "supply", "type": "core::integer::u256" },
              { "name": "perks", "type": "core::array::Array::<core::felt252>" },
              { "name": "title", "type": "core::byte_array::ByteArray" }
            ]
          },
          {
            "type": "event",
            "name": "bloodworks::Core::Event",
            "kind": "enum",
            "variants": []
          }
        ]
    "#};

    #[test]
    fn reads_constructor_from_abi() {
        let abi: Vec<AbiItem> = serde_json::from_str(ABI).unwrap();
        let signature = ConstructorSignature::from_abi(&abi).unwrap().unwrap();

        let kinds: Vec<_> =
            signature.inputs.iter().map(|p| p.kind.clone()).collect();

        assert_eq!(
            kinds,
            vec![
                ParamKind::Address,
                ParamKind::Felt { bits: Some(64) },
                ParamKind::U256,
                ParamKind::Array(Box::new(ParamKind::Felt { bits: None })),
                ParamKind::ByteArray,
            ]
        );
        assert!(signature
            .describe()
            .starts_with("role_registry: core::starknet::contract_address"));
    }

    #[test]
    fn contracts_without_constructor() {
        let abi: Vec<AbiItem> = serde_json::from_str(
            r#"[{ "type": "function", "name": "get", "inputs": [], "outputs": [], "state_mutability": "view" }]"#,
        )
        .unwrap();

        assert_eq!(ConstructorSignature::from_abi(&abi).unwrap(), None);
    }

    #[test]
    fn nested_arrays_and_spans() {
        assert_eq!(
            ParamKind::from_type(
                "core::array::Span::<core::array::Array::<core::bool>>"
            ),
            Some(ParamKind::Array(Box::new(ParamKind::Array(Box::new(
                ParamKind::Bool
            )))))
        );
    }

    #[test]
    fn structs_are_rejected() {
        let abi = vec![AbiItem::Constructor {
            name: "constructor".to_string(),
            inputs: vec![AbiParam {
                name: "config".to_string(),
                ty: "bloodworks::Config".to_string(),
            }],
        }];

        let err = ConstructorSignature::from_abi(&abi).unwrap_err();
        assert_eq!(err.name, "config");
    }
}
