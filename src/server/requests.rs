//! MCP tool request types.
//!
//! These structs define the parameters for each MCP tool exposed by the server.

use rmcp::schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EmptyParams {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ToolCatalogRequest {
    #[schemars(description = "What you're trying to do (e.g., 'rename a local variable')")]
    pub query: Option<String>,
    #[schemars(description = "Filter by category: core, functions, decompile, xrefs, editing")]
    pub category: Option<String>,
    #[schemars(description = "Maximum number of results (default: 7, max: 15)")]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ToolHelpRequest {
    #[schemars(description = "Name of the tool to get help for")]
    pub name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetDecompilationRequest {
    #[schemars(
        description = "Function address in hex (e.g. '0x401000' or '401000') or exact function name"
    )]
    #[serde(alias = "address", alias = "name", alias = "target")]
    pub function_name_or_address: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListFunctionsRequest {
    #[schemars(description = "Page number, 1-indexed (number or numeric string)")]
    pub page: Value,
    #[schemars(description = "Functions per page (default: 20)")]
    #[serde(alias = "limit", alias = "count")]
    pub page_size: Option<Value>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RenameVariableRequest {
    #[schemars(description = "Name of the function containing the variable")]
    #[serde(alias = "function_name", alias = "function")]
    pub containing_function: String,
    #[schemars(description = "Current variable name")]
    pub old_name: String,
    #[schemars(description = "New variable name")]
    pub new_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RenameVariablesRequest {
    #[schemars(description = "Name of the function containing the variables")]
    #[serde(alias = "function_name", alias = "function")]
    pub containing_function: String,
    #[schemars(
        description = "Mapping of old variable name to new name, applied in the order given"
    )]
    pub new_names: Map<String, Value>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetReferencesRequest {
    #[schemars(description = "Address (hex) or symbol name to look up references for")]
    #[serde(alias = "address", alias = "symbol", alias = "target")]
    pub address_or_symbol: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SetCommentRequest {
    #[schemars(description = "Address (hex) or symbol name to attach the comment to")]
    #[serde(alias = "address", alias = "symbol", alias = "target")]
    pub symbol_or_address: String,
    #[schemars(description = "Comment text")]
    pub comment: String,
}
