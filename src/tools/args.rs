//! Argument normalization for tool calls.
//!
//! Agents send loosely typed JSON: numbers arrive as strings, mappings as
//! objects with arbitrary values. Everything is validated here, before a
//! request is built, so malformed input never reaches the backend.

use crate::bridge::parse_hex_address;
use crate::error::ToolError;
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// How a function is looked up: exactly one of address or name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionIdentifier {
    Address(u64),
    Name(String),
}

impl FunctionIdentifier {
    /// Anything that parses as base-16 is an address (`0x401000`,
    /// `deadbeef`); otherwise it is a function name. Address 0 is rejected.
    pub fn parse(input: &str) -> Result<Self, ToolError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ToolError::InvalidParams(
                "function_name_or_address must be an address or function name".to_string(),
            ));
        }
        if let Some(negated) = trimmed.strip_prefix('-') {
            if is_hex_literal(negated) {
                return Err(ToolError::InvalidAddress(format!(
                    "Address must be > 0 and in hex format, got {trimmed}"
                )));
            }
        }
        match parse_hex_address(trimmed) {
            Some(0) => Err(ToolError::InvalidAddress(
                "Address must be > 0 and in hex format".to_string(),
            )),
            Some(addr) => Ok(Self::Address(addr)),
            None if is_hex_literal(trimmed) => Err(ToolError::InvalidAddress(format!(
                "Address {trimmed} does not fit in 64 bits"
            ))),
            None => Ok(Self::Name(trimmed.to_string())),
        }
    }

    pub fn address(&self) -> Option<u64> {
        match self {
            Self::Address(addr) => Some(*addr),
            Self::Name(_) => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Address(_) => None,
            Self::Name(name) => Some(name),
        }
    }
}

/// Hex digits with an optional `0x` prefix, of any length.
fn is_hex_literal(s: &str) -> bool {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit())
}

/// Reject empty (or whitespace-only) required strings.
pub fn require_non_empty<'a>(value: &'a str, field: &str) -> Result<&'a str, ToolError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ToolError::InvalidParams(format!("`{field}` must not be empty")))
    } else {
        Ok(trimmed)
    }
}

/// Coerce a JSON number or numeric string into an unsigned integer.
pub fn coerce_u32(value: &Value, field: &str) -> Result<u32, ToolError> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| {
            ToolError::InvalidParams(format!(
                "`{field}` must be a non-negative integer, got {value}"
            ))
        })
}

/// Convert an `{old: new}` object into an ordered rename mapping.
pub fn rename_mapping(map: &Map<String, Value>) -> Result<IndexMap<String, String>, ToolError> {
    if map.is_empty() {
        return Err(ToolError::InvalidParams(
            "`new_names` must contain at least one entry".to_string(),
        ));
    }
    let mut out = IndexMap::with_capacity(map.len());
    for (old, new) in map {
        let old = require_non_empty(old, "new_names key")?;
        let new = match new {
            Value::String(s) => require_non_empty(s, "new_names value")?,
            other => {
                return Err(ToolError::InvalidParams(format!(
                    "new name for `{old}` must be a string, got {other}"
                )))
            }
        };
        if out.insert(old.to_string(), new.to_string()).is_some() {
            return Err(ToolError::InvalidParams(format!(
                "duplicate variable `{old}` in new_names"
            )));
        }
    }
    Ok(out)
}
