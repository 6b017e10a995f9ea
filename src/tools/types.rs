//! Result types returned by tool operations.

use crate::bridge::Variable;
use serde::Serialize;

/// Row of a decompiled function's variable table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableInfo {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
}

impl From<Variable> for VariableInfo {
    fn from(v: Variable) -> Self {
        Self {
            name: v.name,
            data_type: v.data_type,
            storage: v.storage,
        }
    }
}

/// Decompilation of a single function
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecompilationResult {
    pub function: String,
    pub function_signature: String,
    /// `0x`-prefixed hex
    pub address: String,
    pub decompilation: String,
    pub variables: Vec<VariableInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferencesResult {
    pub references_to: Vec<String>,
    pub references_from: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionPage {
    pub page: u32,
    pub page_size: u32,
    pub functions: Vec<String>,
}
