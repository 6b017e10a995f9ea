//! Decompiler MCP bridge
//!
//! This library exposes a reverse-engineering backend (a decompiler running
//! in its own process) to LLM agents as MCP tools. Agents can page through
//! functions, decompile them, follow references, rename variables and leave
//! comments.
//!
//! # Architecture
//!
//! - **Bridge** (`bridge`): typed request/response messages, a bounded queue
//!   of pending requests and a transport task that frames JSON messages over
//!   the backend stream. Replies are matched to requests by correlation id,
//!   so many tool calls can be outstanding at once.
//!
//! - **AnalysisTools** (`tools`): validates arguments, sends one request per
//!   operation and shapes the reply. Every failure is a [`ToolError`].
//!
//! - **DecompMcpServer** (`server`): the MCP server, using `rmcp`, with one
//!   tool per operation plus `tool_catalog`/`tool_help` discovery backed by
//!   the static [`TOOL_REGISTRY`].
//!
//! # Tools
//!
//! - `get_decompilation`: Decompile a function by hex address or name
//! - `list_functions`: List function names, one page at a time
//! - `function_count`: Count defined functions
//! - `rename_variable`: Rename a local variable
//! - `rename_variables`: Rename several variables, stopping at the first failure
//! - `get_references`: References to and from an address or symbol
//! - `set_comment`: Comment an address or symbol
//! - `tool_catalog` / `tool_help`: Tool discovery

pub mod bridge;
pub mod config;
pub mod error;
pub mod server;
pub mod tool_registry;
pub mod tools;

pub use bridge::{Bridge, BridgeReceiver};
pub use config::{BridgeConfig, ConfigError};
pub use error::ToolError;
pub use server::DecompMcpServer;
pub use tool_registry::{ToolCategory, ToolInfo, TOOL_REGISTRY};
pub use tools::{AnalysisTools, DecompilationResult, FunctionIdentifier, ReferencesResult};
