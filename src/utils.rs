//! Hex helpers for transaction payloads and JSON-RPC quantities.

use serde_json::{Map, Value as JsonValue};

use crate::{Error, Result};

/// Largest integer a JSON number carries without loss.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

pub fn hexlify_bytes(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn is_hex_string(value: &str) -> bool {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .map(|digits| digits.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

fn hexlify_u64(value: u64) -> String {
    let digits = format!("{value:x}");
    if digits.len() % 2 == 1 {
        format!("0x0{digits}")
    } else {
        format!("0x{digits}")
    }
}

/// Even-length, lowercase `0x` form of a number, hex string or byte array.
pub fn hexlify(value: &JsonValue) -> Result<String> {
    match value {
        JsonValue::Number(number) => {
            if let Some(n) = number.as_u64() {
                return Ok(hexlify_u64(n));
            }
            match number.as_f64() {
                Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= MAX_SAFE_INTEGER => {
                    Ok(hexlify_u64(f as u64))
                }
                _ => Err(Error::Hex(number.to_string())),
            }
        }
        JsonValue::String(s) if is_hex_string(s) => {
            let digits = s[2..].to_ascii_lowercase();
            if digits.len() % 2 == 1 {
                Ok(format!("0x0{digits}"))
            } else {
                Ok(format!("0x{digits}"))
            }
        }
        JsonValue::Array(items) => {
            let bytes = items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .filter(|b| *b <= 0xff)
                        .map(|b| b as u8)
                        .ok_or_else(|| Error::Hex(item.to_string()))
                })
                .collect::<Result<Vec<u8>>>()?;
            Ok(hexlify_bytes(&bytes))
        }
        other => Err(Error::Hex(other.to_string())),
    }
}

/// Hex-normalizes every populated field of a transaction and drops null ones.
pub fn normalize_transaction(tx: &JsonValue) -> Result<JsonValue> {
    let fields = tx
        .as_object()
        .ok_or_else(|| Error::Hex(format!("transaction must be an object: {tx}")))?;
    let mut normalized = Map::new();
    for (key, value) in fields {
        if value.is_null() {
            continue;
        }
        normalized.insert(key.clone(), JsonValue::String(hexlify(value)?));
    }
    Ok(JsonValue::Object(normalized))
}

/// Decodes a JSON-RPC quantity (`"0x1a"`) or a plain number.
pub fn parse_quantity(value: &JsonValue) -> Result<u64> {
    match value {
        JsonValue::String(s) if is_hex_string(s) => {
            let digits = &s[2..];
            if digits.is_empty() {
                return Ok(0);
            }
            u64::from_str_radix(digits, 16).map_err(|e| Error::Hex(format!("{s}: {e}")))
        }
        JsonValue::Number(n) => n.as_u64().ok_or_else(|| Error::Hex(n.to_string())),
        other => Err(Error::Hex(other.to_string())),
    }
}

pub fn expect_string(value: JsonValue, what: &str) -> Result<String> {
    match value {
        JsonValue::String(s) => Ok(s),
        other => Err(Error::JsonRpc(format!("expected {what} string, got {other}"))),
    }
}
