//! MCP server exposing the analysis tools.

mod requests;

pub use requests::*;

use crate::tool_registry::{self, ToolCategory};
use crate::tools::args::{coerce_u32, rename_mapping};
use crate::tools::{AnalysisTools, FunctionPage, DEFAULT_PAGE_SIZE};
use rmcp::{
    handler::server::{router::tool::ToolRouter, tool::ToolCallContext, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo, Tool},
    schemars::{schema_for, JsonSchema},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::Debug;
use tracing::{debug, info, instrument};

/// MCP server relaying tool calls to the analysis backend
#[derive(Clone)]
pub struct DecompMcpServer {
    tools: AnalysisTools,
    tool_mux: ToolMux<DecompMcpServer>,
}

#[derive(Clone)]
struct ToolMux<S> {
    call_router: ToolRouter<S>,
}

impl<S> ToolMux<S>
where
    S: Send + Sync + 'static,
{
    fn new(call_router: ToolRouter<S>) -> Self {
        Self { call_router }
    }

    async fn call(
        &self,
        context: ToolCallContext<'_, S>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        self.call_router.call(context).await
    }

    /// Routed tools in registry order.
    fn list_all(&self) -> Vec<Tool> {
        let mut tools = Vec::new();
        for info in tool_registry::all_tools() {
            if let Some(route) = self.call_router.map.get(info.name) {
                tools.push(route.attr.clone());
            }
        }
        tools
    }
}

fn json_result<T: Serialize + Debug>(value: &T) -> CallToolResult {
    CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(value).unwrap_or_else(|_| format!("{value:?}")),
    )])
}

fn text_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text.into())])
}

impl DecompMcpServer {
    pub fn new(tools: AnalysisTools) -> Self {
        info!(project = %tools.project(), "Creating decompiler MCP server");
        let call_router = Self::tool_router();
        Self {
            tools,
            tool_mux: ToolMux::new(call_router),
        }
    }

    fn instructions(&self) -> String {
        format!(
            "Decompiler analysis server relaying to a running analysis backend (project: {project}). \
                 \n\nWorkflow: \
                 \n1. function_count: See how large the program is \
                 \n2. list_functions: Page through function names (page is 1-indexed) \
                 \n3. get_decompilation: Decompile a function by hex address or name \
                 \n4. get_references: Follow references to and from an address or symbol \
                 \n5. rename_variable / rename_variables / set_comment: Record what you learned \
                 \n\nDecompiling every function is slow; list functions first and pick targets. \
                 \nUse tool_catalog(query='what you want to do') to find the right tool and \
                 tool_help(name) for parameters.",
            project = self.tools.project()
        )
    }
}

// Tool implementations using the #[tool_router] attribute

#[tool_router]
impl DecompMcpServer {
    #[tool(description = "Discover available tools by query or category. \
        Use this to find the right tool for your task before calling tool_help for full details.")]
    #[instrument(skip(self))]
    async fn tool_catalog(
        &self,
        Parameters(req): Parameters<ToolCatalogRequest>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Tool call: tool_catalog");
        let limit = req.limit.unwrap_or(7).min(15);

        if let Some(cat_str) = &req.category {
            let cat = match cat_str.parse::<ToolCategory>() {
                Ok(cat) => cat,
                Err(e) => return Ok(e.to_tool_result()),
            };
            let tools: Vec<_> = tool_registry::tools_by_category(cat)
                .take(limit)
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.short_desc,
                        "category": t.category.as_str(),
                    })
                })
                .collect();

            return Ok(json_result(&json!({
                "category": cat.as_str(),
                "category_description": cat.description(),
                "tools": tools,
                "hint": "Use tool_help(name) for full documentation and examples"
            })));
        }

        if let Some(query) = &req.query {
            let tools: Vec<_> = tool_registry::search_tools(query, limit)
                .iter()
                .map(|(t, keywords)| {
                    json!({
                        "name": t.name,
                        "description": t.short_desc,
                        "category": t.category.as_str(),
                        "matched": keywords,
                    })
                })
                .collect();

            return Ok(json_result(&json!({
                "query": query,
                "tools": tools,
                "hint": "Use tool_help(name) for full documentation and examples"
            })));
        }

        let categories: Vec<_> = ToolCategory::all()
            .iter()
            .map(|c| {
                json!({
                    "category": c.as_str(),
                    "description": c.description(),
                    "tool_count": tool_registry::tools_by_category(*c).count(),
                })
            })
            .collect();

        Ok(json_result(&json!({
            "categories": categories,
            "hint": "Use tool_catalog(category='...') to list tools in a category, or tool_catalog(query='...') to search."
        })))
    }

    #[tool(
        description = "Get full documentation for a tool including description, parameters schema, and example."
    )]
    #[instrument(skip(self))]
    async fn tool_help(
        &self,
        Parameters(req): Parameters<ToolHelpRequest>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Tool call: tool_help for {}", req.name);

        if let Some(tool) = tool_registry::get_tool(&req.name) {
            Ok(json_result(&json!({
                "name": tool.name,
                "category": tool.category.as_str(),
                "description": tool.full_desc,
                "parameters": tool_params_schema(&req.name),
                "example": tool.example,
                "keywords": tool.keywords,
            })))
        } else {
            let suggestions: Vec<_> = tool_registry::search_tools(&req.name, 3)
                .iter()
                .map(|(t, _)| t.name)
                .collect();
            Ok(json_result(&json!({
                "error": format!("Tool '{}' not found", req.name),
                "suggestions": suggestions,
                "hint": "Use tool_catalog to discover available tools"
            })))
        }
    }

    #[tool(description = "Decompile a function given its hex address (e.g. '0x401000') \
        or exact name. Returns the signature, pseudocode and local variables. \
        Decompilation is slow: page through list_functions first instead of decompiling everything.")]
    #[instrument(skip(self), fields(target = %req.function_name_or_address))]
    async fn get_decompilation(
        &self,
        Parameters(req): Parameters<GetDecompilationRequest>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Tool call: get_decompilation");
        match self
            .tools
            .get_decompilation(&req.function_name_or_address)
            .await
        {
            Ok(result) => Ok(json_result(&result)),
            Err(e) => Ok(e.to_tool_result()),
        }
    }

    #[tool(description = "List defined function names one page at a time. \
        page is 1-indexed; page_size defaults to 20.")]
    #[instrument(skip(self))]
    async fn list_functions(
        &self,
        Parameters(req): Parameters<ListFunctionsRequest>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Tool call: list_functions");
        let page = match coerce_u32(&req.page, "page") {
            Ok(p) => p,
            Err(e) => return Ok(e.to_tool_result()),
        };
        let page_size = match req.page_size.as_ref().filter(|v| !v.is_null()) {
            Some(v) => match coerce_u32(v, "page_size") {
                Ok(s) => s,
                Err(e) => return Ok(e.to_tool_result()),
            },
            None => DEFAULT_PAGE_SIZE,
        };

        match self.tools.list_functions(page, page_size).await {
            Ok(functions) => Ok(json_result(&FunctionPage {
                page,
                page_size,
                functions,
            })),
            Err(e) => Ok(e.to_tool_result()),
        }
    }

    #[tool(description = "Count the defined functions in the program")]
    #[instrument(skip(self))]
    async fn function_count(&self) -> Result<CallToolResult, McpError> {
        debug!("Tool call: function_count");
        match self.tools.function_count().await {
            Ok(count) => Ok(json_result(&json!({ "function_count": count }))),
            Err(e) => Ok(e.to_tool_result()),
        }
    }

    #[tool(description = "Rename a local variable inside a function")]
    #[instrument(skip(self), fields(function = %req.containing_function))]
    async fn rename_variable(
        &self,
        Parameters(req): Parameters<RenameVariableRequest>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Tool call: rename_variable");
        match self
            .tools
            .rename_variable(&req.containing_function, &req.old_name, &req.new_name)
            .await
        {
            Ok(message) => Ok(text_result(message)),
            Err(e) => Ok(e.to_tool_result()),
        }
    }

    #[tool(description = "Rename several local variables in one function. \
        Renames are applied in the order given; the first failure stops the batch \
        and reports which renames already succeeded.")]
    #[instrument(skip(self), fields(function = %req.containing_function, count = req.new_names.len()))]
    async fn rename_variables(
        &self,
        Parameters(req): Parameters<RenameVariablesRequest>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Tool call: rename_variables");
        let mapping = match rename_mapping(&req.new_names) {
            Ok(m) => m,
            Err(e) => return Ok(e.to_tool_result()),
        };
        match self
            .tools
            .rename_variables(&req.containing_function, &mapping)
            .await
        {
            Ok(messages) => Ok(json_result(&json!({ "renamed": messages }))),
            Err(e) => Ok(e.to_tool_result()),
        }
    }

    #[tool(description = "List references to and from an address or symbol")]
    #[instrument(skip(self), fields(target = %req.address_or_symbol))]
    async fn get_references(
        &self,
        Parameters(req): Parameters<GetReferencesRequest>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Tool call: get_references");
        match self.tools.get_references(&req.address_or_symbol).await {
            Ok(refs) => Ok(json_result(&refs)),
            Err(e) => Ok(e.to_tool_result()),
        }
    }

    #[tool(description = "Set a comment at an address or symbol. \
        The backend may ask its user to approve the change.")]
    #[instrument(skip(self, req), fields(target = %req.symbol_or_address))]
    async fn set_comment(
        &self,
        Parameters(req): Parameters<SetCommentRequest>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Tool call: set_comment");
        match self
            .tools
            .set_comment(&req.symbol_or_address, &req.comment)
            .await
        {
            Ok(message) => Ok(text_result(message)),
            Err(e) => Ok(e.to_tool_result()),
        }
    }
}

fn tool_params_schema(name: &str) -> Option<Value> {
    fn schema<T: JsonSchema>() -> Value {
        serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| json!({}))
    }

    match name {
        // Core
        "tool_catalog" => Some(schema::<ToolCatalogRequest>()),
        "tool_help" => Some(schema::<ToolHelpRequest>()),

        // Functions
        "list_functions" => Some(schema::<ListFunctionsRequest>()),
        "function_count" => Some(schema::<EmptyParams>()),

        // Decompile / Xrefs
        "get_decompilation" => Some(schema::<GetDecompilationRequest>()),
        "get_references" => Some(schema::<GetReferencesRequest>()),

        // Editing
        "rename_variable" => Some(schema::<RenameVariableRequest>()),
        "rename_variables" => Some(schema::<RenameVariablesRequest>()),
        "set_comment" => Some(schema::<SetCommentRequest>()),

        _ => None,
    }
}

#[tool_handler(router = self.tool_mux)]
impl ServerHandler for DecompMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(self.instructions()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{channel, ResponseEnvelope, ResponseMessage};
    use std::time::Duration;

    fn result_text(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|c| c.as_text().map(|t| t.text.clone()))
            .collect::<Vec<_>>()
            .join("")
    }

    fn server_with_backend(reply: ResponseMessage) -> DecompMcpServer {
        let (bridge, mut receiver) = channel(8);
        tokio::spawn(async move {
            while let Some(pending) = receiver.recv().await {
                let _ = pending.resolve(ResponseEnvelope::ok(pending.id(), reply.clone()));
            }
        });
        DecompMcpServer::new(AnalysisTools::new(bridge, "test", Duration::from_secs(5)))
    }

    #[test]
    fn every_registered_tool_is_routed_and_documented() {
        let (bridge, _receiver) = channel(1);
        let server =
            DecompMcpServer::new(AnalysisTools::new(bridge, "test", Duration::from_secs(1)));
        let listed: Vec<String> = server
            .tool_mux
            .list_all()
            .iter()
            .map(|t| t.name.to_string())
            .collect();
        let registered: Vec<&str> = tool_registry::all_tools().map(|t| t.name).collect();
        assert_eq!(listed, registered);
        for name in registered {
            assert!(tool_params_schema(name).is_some(), "no schema for {name}");
        }
    }

    #[tokio::test]
    async fn list_functions_coerces_string_page() {
        let server = server_with_backend(ResponseMessage::GetDefinedFunctionList {
            function_list: vec!["main".into(), "init".into()],
        });
        let req = ListFunctionsRequest {
            page: json!("1"),
            page_size: None,
        };
        let result = server.list_functions(Parameters(req)).await.unwrap();
        assert_ne!(result.is_error, Some(true));
        let body: Value = serde_json::from_str(&result_text(&result)).unwrap();
        assert_eq!(body["page_size"], json!(DEFAULT_PAGE_SIZE));
        assert_eq!(body["functions"], json!(["main", "init"]));
    }

    #[tokio::test]
    async fn list_functions_page_zero_is_error_result() {
        let server = server_with_backend(ResponseMessage::GetDefinedFunctionList {
            function_list: vec![],
        });
        let req = ListFunctionsRequest {
            page: json!(0),
            page_size: Some(json!(10)),
        };
        let result = server.list_functions(Parameters(req)).await.unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(result_text(&result).contains("page cannot be 0"));
    }

    #[tokio::test]
    async fn mismatched_reply_is_error_result() {
        let server = server_with_backend(ResponseMessage::SetComment {});
        let result = server.function_count().await.unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(result_text(&result).contains("Protocol mismatch"));
    }

    #[tokio::test]
    async fn batch_rename_rejects_non_string_values() {
        let server = server_with_backend(ResponseMessage::RenameVariable {});
        let new_names = json!({"a": 5});
        let req = RenameVariablesRequest {
            containing_function: "F".into(),
            new_names: new_names.as_object().cloned().unwrap_or_default(),
        };
        let result = server.rename_variables(Parameters(req)).await.unwrap();
        assert_eq!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn tool_help_unknown_tool_suggests() {
        let server = server_with_backend(ResponseMessage::SetComment {});
        let req = ToolHelpRequest {
            name: "decompile".into(),
        };
        let result = server.tool_help(Parameters(req)).await.unwrap();
        let body: Value = serde_json::from_str(&result_text(&result)).unwrap();
        assert!(body["error"].as_str().unwrap().contains("not found"));
        assert!(body["suggestions"]
            .as_array()
            .unwrap()
            .iter()
            .any(|s| s == "get_decompilation"));
    }

    #[tokio::test]
    async fn tool_catalog_rejects_unknown_category() {
        let server = server_with_backend(ResponseMessage::SetComment {});
        let req = ToolCatalogRequest {
            query: None,
            category: Some("memory".into()),
            limit: None,
        };
        let result = server.tool_catalog(Parameters(req)).await.unwrap();
        assert_eq!(result.is_error, Some(true));
    }
}
