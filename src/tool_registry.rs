//! Tool registry for dynamic tool discovery.
//!
//! All tools are exposed in tools/list. `tool_catalog` and `tool_help` read
//! this table for intent search and per-tool documentation.

use crate::error::ToolError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Tool category for grouping related tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// Discovery tools
    Core,
    /// Function listing and counting
    Functions,
    /// Decompilation
    Decompile,
    /// Cross-reference lookups
    Xrefs,
    /// Renames and comments
    Editing,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Functions => "functions",
            Self::Decompile => "decompile",
            Self::Xrefs => "xrefs",
            Self::Editing => "editing",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Core => "Tool discovery and documentation",
            Self::Functions => "List and count defined functions",
            Self::Decompile => "Decompile functions to pseudocode",
            Self::Xrefs => "References to and from addresses and symbols",
            Self::Editing => "Variable renames and comments",
        }
    }

    pub fn all() -> &'static [ToolCategory] {
        &[
            Self::Core,
            Self::Functions,
            Self::Decompile,
            Self::Xrefs,
            Self::Editing,
        ]
    }
}

impl FromStr for ToolCategory {
    type Err = ToolError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "core" | "discovery" => Ok(Self::Core),
            "functions" | "function" => Ok(Self::Functions),
            "decompile" | "decompiler" | "decompilation" => Ok(Self::Decompile),
            "xrefs" | "xref" | "references" | "refs" => Ok(Self::Xrefs),
            "editing" | "edit" | "annotations" => Ok(Self::Editing),
            _ => Err(ToolError::InvalidToolCategory(input.to_string())),
        }
    }
}

/// Metadata for a single tool
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: &'static str,
    pub category: ToolCategory,
    /// Short description (1 line, <100 chars) - used in tool_catalog results
    pub short_desc: &'static str,
    /// Full description with usage details - used in tool_help
    pub full_desc: &'static str,
    /// Example invocation (JSON)
    pub example: &'static str,
    /// Keywords for semantic search
    pub keywords: &'static [&'static str],
}

/// Static registry of all tools, in tools/list order
pub static TOOL_REGISTRY: &[ToolInfo] = &[
    // === CORE ===
    ToolInfo {
        name: "tool_catalog",
        category: ToolCategory::Core,
        short_desc: "Discover tools by query or category",
        full_desc: "Search the available tools by intent (query) or list the tools in a category. \
                    With neither argument, lists every category with its tool count.",
        example: r#"{"query": "rename a local variable"}"#,
        keywords: &["discover", "find", "search", "list", "catalog", "tools"],
    },
    ToolInfo {
        name: "tool_help",
        category: ToolCategory::Core,
        short_desc: "Full documentation and parameter schema for a tool",
        full_desc: "Return the full description, JSON parameter schema and an example invocation \
                    for a tool. Unknown names return up to three suggestions.",
        example: r#"{"name": "get_decompilation"}"#,
        keywords: &["help", "docs", "schema", "parameters", "usage"],
    },
    // === FUNCTIONS ===
    ToolInfo {
        name: "list_functions",
        category: ToolCategory::Functions,
        short_desc: "List defined function names one page at a time",
        full_desc: "List the names of defined functions, one page at a time. `page` is 1-indexed \
                    and `page_size` defaults to 20; both may be given as numbers or numeric strings. \
                    A page never holds more than `page_size` names; an empty page means you are past the end.",
        example: r#"{"page": 1, "page_size": 20}"#,
        keywords: &["list", "functions", "names", "page", "enumerate", "browse"],
    },
    ToolInfo {
        name: "function_count",
        category: ToolCategory::Functions,
        short_desc: "Count the defined functions",
        full_desc: "Return the number of defined functions in the program. Use it to size \
                    list_functions pagination.",
        example: r#"{}"#,
        keywords: &["count", "functions", "total", "size", "how many"],
    },
    // === DECOMPILE ===
    ToolInfo {
        name: "get_decompilation",
        category: ToolCategory::Decompile,
        short_desc: "Decompile a function by hex address or name",
        full_desc: "Decompile one function. Give a hex address (with or without 0x) or the exact \
                    function name; any value that parses as hex is treated as an address. \
                    Returns the function name, signature, 0x-prefixed address, pseudocode and \
                    the local variable table. Decompilation is slow, so page through \
                    list_functions and pick targets rather than decompiling everything.",
        example: r#"{"function_name_or_address": "0x401000"}"#,
        keywords: &["decompile", "pseudocode", "source", "c", "function", "variables", "signature"],
    },
    // === XREFS ===
    ToolInfo {
        name: "get_references",
        category: ToolCategory::Xrefs,
        short_desc: "References to and from an address or symbol",
        full_desc: "List the references to and the references from an address or symbol. \
                    Empty lists mean no references were found.",
        example: r#"{"address_or_symbol": "main"}"#,
        keywords: &["xrefs", "references", "callers", "callees", "uses", "who calls"],
    },
    // === EDITING ===
    ToolInfo {
        name: "rename_variable",
        category: ToolCategory::Editing,
        short_desc: "Rename a local variable in a function",
        full_desc: "Rename one local variable in the given function. All three names must be \
                    non-empty. A failure usually means the variable or function does not exist; \
                    retrying the same call will not help.",
        example: r#"{"containing_function": "main", "old_name": "local_8", "new_name": "count"}"#,
        keywords: &["rename", "variable", "local", "name", "edit"],
    },
    ToolInfo {
        name: "rename_variables",
        category: ToolCategory::Editing,
        short_desc: "Rename several local variables in one function",
        full_desc: "Rename several local variables in one function. Renames run in the order \
                    given and stop at the first failure; the error lists the renames that \
                    already succeeded and the one that failed.",
        example: r#"{"containing_function": "main", "new_names": {"local_8": "count", "local_10": "buf"}}"#,
        keywords: &["rename", "variables", "batch", "bulk", "many", "edit"],
    },
    ToolInfo {
        name: "set_comment",
        category: ToolCategory::Editing,
        short_desc: "Set a comment at an address or symbol",
        full_desc: "Attach a comment at an address or symbol. The backend may ask its user to \
                    approve the change; a rejection comes back as an error.",
        example: r#"{"symbol_or_address": "0x401000", "comment": "entry point"}"#,
        keywords: &["comment", "annotate", "note", "document", "edit"],
    },
];

/// Get all tools
pub fn all_tools() -> impl Iterator<Item = &'static ToolInfo> {
    TOOL_REGISTRY.iter()
}

/// Get tool by name
pub fn get_tool(name: &str) -> Option<&'static ToolInfo> {
    TOOL_REGISTRY.iter().find(|t| t.name == name)
}

/// Get tools by category
pub fn tools_by_category(category: ToolCategory) -> impl Iterator<Item = &'static ToolInfo> {
    TOOL_REGISTRY.iter().filter(move |t| t.category == category)
}

/// Search tools by query (simple keyword matching)
pub fn search_tools(query: &str, limit: usize) -> Vec<(&'static ToolInfo, Vec<&'static str>)> {
    let query_lower = query.to_lowercase();
    let query_words: Vec<&str> = query_lower
        .split(|c: char| c.is_whitespace() || c == '_')
        .filter(|w| !w.is_empty())
        .collect();

    let mut results: Vec<(&'static ToolInfo, Vec<&'static str>, usize)> = Vec::new();

    for tool in TOOL_REGISTRY.iter() {
        let mut matched_keywords = Vec::new();
        let mut score = 0usize;

        let name_lower = tool.name.to_lowercase();
        for word in &query_words {
            if name_lower.contains(word) {
                score += 10;
                if !matched_keywords.contains(&"name match") {
                    matched_keywords.push("name match");
                }
            }
        }

        let desc_lower = tool.short_desc.to_lowercase();
        for word in &query_words {
            if desc_lower.contains(word) {
                score += 5;
            }
        }

        for keyword in tool.keywords {
            let kw_lower = keyword.to_lowercase();
            for word in &query_words {
                if kw_lower.contains(word) || word.contains(&kw_lower) {
                    score += 3;
                    if !matched_keywords.contains(keyword) {
                        matched_keywords.push(keyword);
                    }
                }
            }
        }

        let cat_str = tool.category.as_str();
        for word in &query_words {
            if cat_str.contains(word) {
                score += 2;
                if !matched_keywords.contains(&cat_str) {
                    matched_keywords.push(cat_str);
                }
            }
        }

        if score > 0 {
            results.push((tool, matched_keywords, score));
        }
    }

    // Stable sort keeps registry order among equal scores
    results.sort_by(|a, b| b.2.cmp(&a.2));

    results
        .into_iter()
        .take(limit)
        .map(|(tool, keywords, _)| (tool, keywords))
        .collect()
}
