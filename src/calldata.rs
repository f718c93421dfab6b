//! Validation and encoding of constructor arguments.
//!
//! Arguments come from the deployment plan as loosely typed values and are
//! checked against the constructor signature of the contract ABI before
//! anything is sent to the chain.

use serde_json::{Map, Value};
use starknet::core::types::Felt;
use starknet::core::utils::cairo_short_string_to_felt;
use thiserror::Error;

use crate::abi::{AbiItem, ConstructorSignature, ParamKind, UnsupportedType};

/// Parameter name to value, as written in the plan.
pub type ConstructorArgs = Map<String, Value>;

const BYTES_PER_WORD: usize = 31;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error(
        "Missing constructor arguments: expected {expected} ({signature}), but got none"
    )]
    MissingConstructorArgs { expected: usize, signature: String },

    #[error(
        "Missing value for constructor argument '{name}' of type '{ty}'"
    )]
    MissingArgument { name: String, ty: String },

    #[error(
        "Constructor validation failed for '{name}': Zero address ({value}) is not allowed. Please provide a valid non-zero address."
    )]
    ZeroAddress { name: String, value: String },

    #[error(
        "Constructor validation failed for '{name}': {category} (Details: {detail})"
    )]
    Encoding {
        name: String,
        category: &'static str,
        detail: String,
    },

    #[error(transparent)]
    UnsupportedType(#[from] UnsupportedType),
}

fn category(kind: &ParamKind) -> &'static str {
    match kind {
        ParamKind::Felt { .. } => {
            "Invalid felt252 value. Expected: hex string (0x123...), decimal string ('123'), or number."
        }
        ParamKind::Address => {
            "Invalid ContractAddress. Expected: valid hex address (0x123...abc)."
        }
        ParamKind::U256 => {
            "Invalid u256 value. Expected: number, bigint, hex string, or {low: '123', high: '0'} object."
        }
        ParamKind::Bool => {
            "Invalid boolean value. Expected: true, false, 0, or 1."
        }
        ParamKind::ByteArray => "Invalid ByteArray value. Expected: string.",
        ParamKind::Array(_) => {
            "Invalid array value. Expected: array format [item1, item2, ...]."
        }
    }
}

/// Checks `args` against the constructor of `abi` and encodes them in
/// declaration order. Contracts without constructor inputs encode to
/// empty calldata whatever was supplied.
pub fn compile_constructor_args(
    abi: &[AbiItem],
    args: Option<&ConstructorArgs>,
) -> Result<Vec<Felt>, ArgumentError> {
    let Some(signature) = ConstructorSignature::from_abi(abi)? else {
        return Ok(vec![]);
    };

    if signature.inputs.is_empty() {
        return Ok(vec![]);
    }

    let Some(args) = args else {
        return Err(ArgumentError::MissingConstructorArgs {
            expected: signature.inputs.len(),
            signature: signature.describe(),
        });
    };

    let mut values = Vec::with_capacity(signature.inputs.len());
    for param in &signature.inputs {
        let value = match args.get(&param.name) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(value) => Some(value),
        };

        let value = value.ok_or_else(|| ArgumentError::MissingArgument {
            name: param.name.clone(),
            ty: param.ty.clone(),
        })?;

        values.push((param, value));
    }

    // Zero addresses are reported before any encoding error
    for (param, value) in &values {
        if param.kind != ParamKind::Address {
            continue;
        }

        if let Ok(address) = parse_felt(value) {
            if address == Felt::ZERO {
                return Err(ArgumentError::ZeroAddress {
                    name: param.name.clone(),
                    value: display_value(value),
                });
            }
        }
    }

    let mut calldata = vec![];
    for (param, value) in values {
        encode(&param.kind, value, &mut calldata).map_err(|(kind, detail)| {
            ArgumentError::Encoding {
                name: param.name.clone(),
                category: category(&kind),
                detail,
            }
        })?;
    }

    Ok(calldata)
}

type EncodeError = (ParamKind, String);

fn encode(
    kind: &ParamKind,
    value: &Value,
    out: &mut Vec<Felt>,
) -> Result<(), EncodeError> {
    let fail = |detail: String| (kind.clone(), detail);

    match kind {
        ParamKind::Address => {
            let address = parse_felt(value).map_err(fail)?;
            out.push(address);
        }
        ParamKind::Felt { bits } => {
            let felt = parse_felt_or_short_string(value).map_err(fail)?;
            if let Some(bits) = bits {
                check_width(felt, *bits).map_err(fail)?;
            }
            out.push(felt);
        }
        ParamKind::U256 => {
            let (low, high) = parse_u256(value).map_err(fail)?;
            out.push(Felt::from(low));
            out.push(Felt::from(high));
        }
        ParamKind::Bool => {
            let flag = parse_bool(value).map_err(fail)?;
            out.push(if flag { Felt::ONE } else { Felt::ZERO });
        }
        ParamKind::ByteArray => {
            let Value::String(s) = value else {
                return Err(fail(format!("{value} is not a string")));
            };
            encode_byte_array(s, out);
        }
        ParamKind::Array(item) => {
            let Value::Array(items) = value else {
                return Err(fail(format!("{value} is not an array")));
            };

            out.push(Felt::from(items.len()));
            for (index, element) in items.iter().enumerate() {
                encode(item, element, out).map_err(|(kind, detail)| {
                    (kind, format!("item {index}: {detail}"))
                })?;
            }
        }
    }

    Ok(())
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_felt(value: &Value) -> Result<Felt, String> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .map(Felt::from)
            .ok_or_else(|| format!("{number} is not a non-negative integer")),
        Value::String(s) => {
            let s = s.trim();
            if s.starts_with("0x") || s.starts_with("0X") {
                Felt::from_hex(s).map_err(|err| format!("{s}: {err}"))
            } else {
                Felt::from_dec_str(s).map_err(|err| format!("{s}: {err}"))
            }
        }
        other => Err(format!("{other} is not a number or a string")),
    }
}

/// Felts also accept Cairo short strings, `'GOLD'` style values.
fn parse_felt_or_short_string(value: &Value) -> Result<Felt, String> {
    match (parse_felt(value), value) {
        (Ok(felt), _) => Ok(felt),
        (Err(_), Value::String(s)) if !s.trim().is_empty() => {
            cairo_short_string_to_felt(s)
                .map_err(|err| format!("{s} is not a number or a short string: {err}"))
        }
        (Err(err), _) => Err(err),
    }
}

fn check_width(felt: Felt, bits: u32) -> Result<(), String> {
    let bytes = felt.to_bytes_be();
    let leading = bytes.len() - (bits as usize / 8);

    if bytes[..leading].iter().any(|byte| *byte != 0) {
        return Err(format!("{felt} does not fit in {bits} bits"));
    }

    Ok(())
}

fn parse_bool(value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(flag) => Ok(*flag),
        Value::Number(number) => match number.as_u64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(format!("{number} is neither 0 nor 1")),
        },
        Value::String(s) => match s.trim() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(format!("{other} is not a boolean")),
        },
        other => Err(format!("{other} is not a boolean")),
    }
}

fn parse_u128(value: &Value) -> Result<u128, String> {
    let (low, high) = parse_u256(value)?;
    if high != 0 {
        return Err(format!("{value} does not fit in 128 bits"));
    }

    Ok(low)
}

/// Returns the `(low, high)` halves.
fn parse_u256(value: &Value) -> Result<(u128, u128), String> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .map(|n| (n as u128, 0))
            .ok_or_else(|| format!("{number} is not a non-negative integer")),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => parse_hex_u256(hex),
                None => parse_dec_u256(s),
            }
        }
        Value::Object(map) => {
            let low = map.get("low").ok_or("missing `low`")?;
            let high = map.get("high").ok_or("missing `high`")?;

            Ok((parse_u128(low)?, parse_u128(high)?))
        }
        other => Err(format!("{other} is not a u256")),
    }
}

fn parse_hex_u256(hex: &str) -> Result<(u128, u128), String> {
    if hex.is_empty()
        || hex.len() > 64
        || !hex.chars().all(|c| c.is_ascii_hexdigit())
    {
        return Err(format!("0x{hex} is not a 256 bit hex number"));
    }

    let split = hex.len().saturating_sub(32);
    let (high, low) = hex.split_at(split);

    let parse = |digits: &str| {
        if digits.is_empty() {
            return Ok(0);
        }
        u128::from_str_radix(digits, 16).map_err(|err| format!("0x{hex}: {err}"))
    };

    Ok((parse(low)?, parse(high)?))
}

fn parse_dec_u256(s: &str) -> Result<(u128, u128), String> {
    if s.is_empty() {
        return Err("empty number".to_string());
    }

    // Little endian 64 bit limbs
    let mut limbs = [0u64; 4];
    for c in s.chars() {
        let digit = c
            .to_digit(10)
            .ok_or_else(|| format!("{s} is not a decimal number"))?;

        let mut carry = digit as u128;
        for limb in limbs.iter_mut() {
            let next = (*limb as u128) * 10 + carry;
            *limb = next as u64;
            carry = next >> 64;
        }

        if carry != 0 {
            return Err(format!("{s} does not fit in 256 bits"));
        }
    }

    let low = (limbs[1] as u128) << 64 | limbs[0] as u128;
    let high = (limbs[3] as u128) << 64 | limbs[2] as u128;

    Ok((low, high))
}

/// `[full_words_len, ...full_words, pending_word, pending_word_len]`
fn encode_byte_array(s: &str, out: &mut Vec<Felt>) {
    let bytes = s.as_bytes();
    let mut chunks = bytes.chunks_exact(BYTES_PER_WORD);

    let words: Vec<Felt> =
        chunks.by_ref().map(Felt::from_bytes_be_slice).collect();
    let pending = chunks.remainder();

    out.push(Felt::from(words.len()));
    out.extend(words);
    out.push(Felt::from_bytes_be_slice(pending));
    out.push(Felt::from(pending.len()));
}
