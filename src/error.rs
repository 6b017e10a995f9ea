//! Error types for the decompiler MCP bridge.
//!
//! Tool execution errors are returned with `is_error: true` in CallToolResult,
//! while protocol errors (invalid tool name, malformed args) are handled by rmcp.

use crate::bridge::MessageKind;
use rmcp::model::{CallToolResult, Content};
use serde_json::json;
use thiserror::Error;

/// Tool execution errors - returned with is_error: true in CallToolResult
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Invalid address format: {0}")]
    InvalidAddress(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Invalid tool category: {0}")]
    InvalidToolCategory(String),

    #[error("{message}{}", retry_hint(.retryable))]
    Backend { message: String, retryable: bool },

    #[error("Protocol mismatch: expected {expected} response, got {actual}")]
    ProtocolMismatch {
        expected: MessageKind,
        actual: MessageKind,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error(
        "Batch aborted at '{failed}' after {} completed operation(s): {source}",
        .completed.len()
    )]
    BatchAborted {
        completed: Vec<String>,
        failed: String,
        source: Box<ToolError>,
    },

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Backend disconnected before responding")]
    Disconnected,

    #[error("Pending request {0} was already resolved")]
    AlreadyResolved(u64),

    #[error("Request queue is full, try again shortly")]
    Busy,

    #[error("Worker channel closed")]
    WorkerClosed,
}

fn retry_hint(retryable: &bool) -> &'static str {
    if *retryable {
        ""
    } else {
        " (retrying will not help)"
    }
}

impl ToolError {
    /// Backend-reported failure that a caller may retry with corrected arguments.
    pub fn backend(message: impl Into<String>) -> Self {
        ToolError::Backend {
            message: message.into(),
            retryable: true,
        }
    }

    /// Backend-reported failure where retrying the same call is pointless.
    pub fn backend_final(message: impl Into<String>) -> Self {
        ToolError::Backend {
            message: message.into(),
            retryable: false,
        }
    }

    /// Mark a backend error as not worth retrying; other kinds pass through.
    pub fn into_final(self) -> Self {
        match self {
            ToolError::Backend { message, .. } => ToolError::backend_final(message),
            other => other,
        }
    }

    /// True for the invalid-argument kinds, which never reach the backend.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            ToolError::InvalidAddress(_) | ToolError::InvalidParams(_)
        )
    }

    /// Duplicate an error for fan-out (e.g. failing every in-flight request).
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            ToolError::Timeout(secs) => ToolError::Timeout(*secs),
            ToolError::Protocol(msg) => ToolError::Protocol(msg.clone()),
            ToolError::WorkerClosed => ToolError::WorkerClosed,
            _ => ToolError::Disconnected,
        }
    }

    /// Convert to MCP CallToolResult with is_error: true
    pub fn to_tool_result(&self) -> CallToolResult {
        let text = match self {
            ToolError::BatchAborted {
                completed,
                failed,
                source,
            } => serde_json::to_string_pretty(&json!({
                "error": source.to_string(),
                "failed": failed,
                "completed": completed,
            }))
            .unwrap_or_else(|_| self.to_string()),
            _ => self.to_string(),
        };
        CallToolResult::error(vec![Content::text(text)])
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(e: serde_json::Error) -> Self {
        ToolError::Protocol(e.to_string())
    }
}

impl From<std::io::Error> for ToolError {
    fn from(_: std::io::Error) -> Self {
        ToolError::Disconnected
    }
}

impl<T> From<tokio::sync::mpsc::error::TrySendError<T>> for ToolError {
    fn from(e: tokio::sync::mpsc::error::TrySendError<T>) -> Self {
        match e {
            tokio::sync::mpsc::error::TrySendError::Full(_) => ToolError::Busy,
            tokio::sync::mpsc::error::TrySendError::Closed(_) => ToolError::WorkerClosed,
        }
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for ToolError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        ToolError::Disconnected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_final_mentions_retry() {
        let err = ToolError::backend_final("Variable foo not found");
        assert_eq!(
            err.to_string(),
            "Variable foo not found (retrying will not help)"
        );
        assert_eq!(
            ToolError::backend("Function not found").to_string(),
            "Function not found"
        );
    }

    #[test]
    fn batch_aborted_reports_progress() {
        let err = ToolError::BatchAborted {
            completed: vec!["Renamed a to b in F".to_string()],
            failed: "c".to_string(),
            source: Box::new(ToolError::backend_final("no such variable")),
        };
        let text = err.to_string();
        assert!(text.contains("'c'"));
        assert!(text.contains("1 completed"));
        assert!(text.contains("no such variable"));
    }

    #[test]
    fn error_kinds_are_distinguishable() {
        assert!(ToolError::InvalidParams("x".into()).is_invalid_argument());
        assert!(!ToolError::backend("x").is_invalid_argument());
        assert!(!ToolError::ProtocolMismatch {
            expected: MessageKind::GetFunctionCount,
            actual: MessageKind::GetReferences,
        }
        .is_invalid_argument());
    }

    #[test]
    fn into_final_only_touches_backend_errors() {
        assert!(matches!(
            ToolError::backend("x").into_final(),
            ToolError::Backend {
                retryable: false,
                ..
            }
        ));
        assert!(matches!(
            ToolError::Disconnected.into_final(),
            ToolError::Disconnected
        ));
    }

    #[test]
    fn tool_result_is_error() {
        let result = ToolError::Disconnected.to_tool_result();
        assert_eq!(result.is_error, Some(true));
    }
}
