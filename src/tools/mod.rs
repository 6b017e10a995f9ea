//! Analysis tool operations.
//!
//! Each operation validates its arguments, builds one typed request, relays it
//! through the [`Bridge`] and shapes the reply. Errors come back as
//! [`ToolError`]; nothing backend-specific crosses this boundary.

pub mod args;
pub mod types;

pub use args::FunctionIdentifier;
pub use types::{DecompilationResult, FunctionPage, ReferencesResult, VariableInfo};

use crate::bridge::{format_address, Bridge, MessageKind, RequestMessage, ResponseMessage};
use crate::error::ToolError;
use args::require_non_empty;
use indexmap::IndexMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Default number of functions per page.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

fn mismatch(expected: MessageKind, actual: &ResponseMessage) -> ToolError {
    warn!(expected = %expected, actual = %actual.kind(), "Unexpected reply kind");
    ToolError::ProtocolMismatch {
        expected,
        actual: actual.kind(),
    }
}

/// Tool façade bound to one bridge and one backend project.
#[derive(Clone)]
pub struct AnalysisTools {
    bridge: Bridge,
    project: String,
    timeout: Duration,
}

impl AnalysisTools {
    pub fn new(bridge: Bridge, project: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bridge,
            project: project.into(),
            timeout,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Relay one request. A reply carrying an error description becomes a
    /// backend error before its payload is looked at.
    async fn exchange(&self, request: RequestMessage) -> Result<ResponseMessage, ToolError> {
        let kind = request.kind();
        debug!(project = %self.project, kind = %kind, "Sending request");
        let (error, message) = self.bridge.call(request, self.timeout).await?.into_parts();
        if let Some(error) = error {
            debug!(kind = %kind, error = %error, "Backend reported error");
            return Err(ToolError::backend(error));
        }
        Ok(message)
    }

    /// Decompile a function given by hex address or by exact name.
    ///
    /// Decompiling everything is slow; page through `list_functions` first.
    #[instrument(skip(self))]
    pub async fn get_decompilation(
        &self,
        function_name_or_address: &str,
    ) -> Result<DecompilationResult, ToolError> {
        let ident = FunctionIdentifier::parse(function_name_or_address)?;
        self.decompile(&ident).await
    }

    pub async fn decompile(
        &self,
        ident: &FunctionIdentifier,
    ) -> Result<DecompilationResult, ToolError> {
        let request = RequestMessage::GetDecompilation {
            address: ident.address(),
            function: ident.name().map(str::to_string),
        };
        match self.exchange(request).await? {
            ResponseMessage::GetDecompilation {
                function,
                function_signature,
                address,
                decompilation,
                variables,
            } => Ok(DecompilationResult {
                function,
                function_signature,
                address: format_address(address),
                decompilation,
                variables: variables.into_iter().map(VariableInfo::from).collect(),
            }),
            other => Err(mismatch(MessageKind::GetDecompilation, &other)),
        }
    }

    /// One page of defined function names. `page` is 1-indexed.
    #[instrument(skip(self))]
    pub async fn list_functions(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<String>, ToolError> {
        if page == 0 {
            return Err(ToolError::InvalidParams(
                "`page` is 1 indexed, page cannot be 0".to_string(),
            ));
        }
        if page_size == 0 {
            return Err(ToolError::InvalidParams(
                "`page_size` must be greater than 0".to_string(),
            ));
        }
        let request = RequestMessage::GetDefinedFunctionList { page, page_size };
        match self.exchange(request).await? {
            ResponseMessage::GetDefinedFunctionList { mut function_list } => {
                if function_list.len() > page_size as usize {
                    warn!(
                        returned = function_list.len(),
                        page_size, "Backend returned an oversized page; truncating"
                    );
                    function_list.truncate(page_size as usize);
                }
                Ok(function_list)
            }
            other => Err(mismatch(MessageKind::GetDefinedFunctionList, &other)),
        }
    }

    /// Total number of defined functions in the program.
    #[instrument(skip(self))]
    pub async fn function_count(&self) -> Result<u64, ToolError> {
        match self.exchange(RequestMessage::GetFunctionCount {}).await? {
            ResponseMessage::GetFunctionCount { function_count } => Ok(function_count),
            other => Err(mismatch(MessageKind::GetFunctionCount, &other)),
        }
    }

    /// Rename `old_name` to `new_name` inside `containing_function`.
    #[instrument(skip(self))]
    pub async fn rename_variable(
        &self,
        containing_function: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<String, ToolError> {
        let function_name = require_non_empty(containing_function, "containing_function")?;
        let old_name = require_non_empty(old_name, "old_name")?;
        let new_name = require_non_empty(new_name, "new_name")?;

        let request = RequestMessage::RenameVariable {
            function_name: function_name.to_string(),
            old_name: old_name.to_string(),
            new_name: new_name.to_string(),
        };
        match self.exchange(request).await.map_err(ToolError::into_final)? {
            ResponseMessage::RenameVariable {} => {
                Ok(format!("Renamed {old_name} to {new_name} in {function_name}"))
            }
            other => Err(mismatch(MessageKind::RenameVariable, &other)),
        }
    }

    /// Apply renames one at a time in mapping order. The first failure stops
    /// the batch; renames already applied stay applied.
    #[instrument(skip(self, new_names), fields(count = new_names.len()))]
    pub async fn rename_variables(
        &self,
        containing_function: &str,
        new_names: &IndexMap<String, String>,
    ) -> Result<Vec<String>, ToolError> {
        require_non_empty(containing_function, "containing_function")?;
        let mut completed = Vec::with_capacity(new_names.len());
        for (old_name, new_name) in new_names {
            match self
                .rename_variable(containing_function, old_name, new_name)
                .await
            {
                Ok(message) => completed.push(message),
                Err(e) => {
                    warn!(
                        variable = %old_name,
                        completed = completed.len(),
                        error = %e,
                        "Batch rename aborted"
                    );
                    return Err(ToolError::BatchAborted {
                        completed,
                        failed: old_name.clone(),
                        source: Box::new(e),
                    });
                }
            }
        }
        Ok(completed)
    }

    /// References to and from an address or symbol. No references is an
    /// empty result, not an error.
    #[instrument(skip(self))]
    pub async fn get_references(
        &self,
        address_or_symbol: &str,
    ) -> Result<ReferencesResult, ToolError> {
        let target = require_non_empty(address_or_symbol, "address_or_symbol")?;
        let request = RequestMessage::GetReferences {
            address_or_symbol: target.to_string(),
        };
        match self.exchange(request).await? {
            ResponseMessage::GetReferences {
                references_to,
                references_from,
            } => Ok(ReferencesResult {
                references_to,
                references_from,
            }),
            other => Err(mismatch(MessageKind::GetReferences, &other)),
        }
    }

    /// Set a plate comment at an address or symbol. The backend may ask its
    /// user to approve the edit and report a rejection as an error.
    #[instrument(skip(self, comment))]
    pub async fn set_comment(
        &self,
        symbol_or_address: &str,
        comment: &str,
    ) -> Result<String, ToolError> {
        let target = require_non_empty(symbol_or_address, "symbol_or_address")?;
        let request = RequestMessage::SetComment {
            symbol_or_address: target.to_string(),
            comment: comment.to_string(),
        };
        match self.exchange(request).await? {
            ResponseMessage::SetComment {} => Ok(format!("Comment set at {target}")),
            other => Err(mismatch(MessageKind::SetComment, &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{channel, parse_hex_address, ResponseEnvelope, Variable};
    use std::sync::{Arc, Mutex};

    type Handler = dyn Fn(&RequestMessage) -> (Option<String>, ResponseMessage) + Send + Sync;

    /// Spawn an in-process backend answering each request with `handler`.
    fn scripted(handler: Box<Handler>) -> (AnalysisTools, Arc<Mutex<Vec<RequestMessage>>>) {
        let (bridge, mut receiver) = channel(16);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        tokio::spawn(async move {
            while let Some(pending) = receiver.recv().await {
                log.lock().unwrap().push(pending.request().clone());
                let (error, message) = handler(pending.request());
                let reply = ResponseEnvelope {
                    id: pending.id(),
                    error_message: error,
                    message,
                };
                pending.resolve(reply).unwrap();
            }
        });
        (
            AnalysisTools::new(bridge, "test-project", Duration::from_secs(5)),
            seen,
        )
    }

    fn echo_decompilation(req: &RequestMessage) -> (Option<String>, ResponseMessage) {
        match req {
            RequestMessage::GetDecompilation { address, function } => (
                None,
                ResponseMessage::GetDecompilation {
                    function: function.clone().unwrap_or_else(|| "FUN_401000".into()),
                    function_signature: "int f(void)".into(),
                    address: address.unwrap_or(0x1000),
                    decompilation: "return 0;".into(),
                    variables: vec![Variable {
                        name: "local_8".into(),
                        data_type: Some("int".into()),
                        storage: None,
                    }],
                },
            ),
            _ => (Some("unexpected".into()), ResponseMessage::SetComment {}),
        }
    }

    #[tokio::test]
    async fn decompilation_by_address_round_trips_address() {
        let (tools, seen) = scripted(Box::new(echo_decompilation));
        for addr in [0x1u64, 0x401000, 0xdead_beef, u64::MAX] {
            let input = format!("{addr:x}");
            let result = tools.get_decompilation(&input).await.unwrap();
            assert_eq!(parse_hex_address(&result.address), Some(addr));
        }
        let result = tools.get_decompilation("0x401000").await.unwrap();
        assert_eq!(result.address, "0x401000");
        assert_eq!(result.variables[0].name, "local_8");
        assert!(matches!(
            seen.lock().unwrap()[0],
            RequestMessage::GetDecompilation {
                address: Some(1),
                function: None
            }
        ));
    }

    #[tokio::test]
    async fn decompilation_by_name() {
        let (tools, seen) = scripted(Box::new(echo_decompilation));
        let result = tools.get_decompilation("main").await.unwrap();
        assert_eq!(result.function, "main");
        assert!(matches!(
            &seen.lock().unwrap()[0],
            RequestMessage::GetDecompilation { address: None, function: Some(f) } if f == "main"
        ));
    }

    #[tokio::test]
    async fn invalid_identifier_never_reaches_backend() {
        let (tools, seen) = scripted(Box::new(echo_decompilation));
        assert!(tools.get_decompilation("0").await.unwrap_err().is_invalid_argument());
        assert!(tools.get_decompilation("").await.unwrap_err().is_invalid_argument());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn backend_error_takes_precedence_over_payload() {
        let (tools, _) = scripted(Box::new(|_| {
            (
                Some("Function not found".into()),
                ResponseMessage::GetDecompilation {
                    function: "ignored".into(),
                    function_signature: String::new(),
                    address: 1,
                    decompilation: String::new(),
                    variables: vec![],
                },
            )
        }));
        let err = tools.get_decompilation("nope").await.unwrap_err();
        assert!(matches!(err, ToolError::Backend { ref message, .. } if message == "Function not found"));
    }

    #[tokio::test]
    async fn wrong_reply_kind_is_protocol_mismatch() {
        let (tools, _) = scripted(Box::new(|_| {
            (None, ResponseMessage::GetFunctionCount { function_count: 1 })
        }));
        let err = tools.get_references("main").await.unwrap_err();
        assert!(matches!(
            err,
            ToolError::ProtocolMismatch {
                expected: MessageKind::GetReferences,
                actual: MessageKind::GetFunctionCount,
            }
        ));
    }

    #[tokio::test]
    async fn page_zero_is_invalid_for_any_size() {
        let (tools, seen) = scripted(Box::new(|_| {
            (None, ResponseMessage::GetDefinedFunctionList { function_list: vec![] })
        }));
        for size in [0, 1, 20, u32::MAX] {
            let err = tools.list_functions(0, size).await.unwrap_err();
            assert!(err.is_invalid_argument());
        }
        assert!(tools.list_functions(1, 0).await.unwrap_err().is_invalid_argument());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn page_never_exceeds_page_size() {
        let (tools, _) = scripted(Box::new(|req| {
            let n = match req {
                RequestMessage::GetDefinedFunctionList { page_size, .. } => *page_size + 3,
                _ => 0,
            };
            let function_list = (0..n).map(|i| format!("FUN_{i:x}")).collect();
            (None, ResponseMessage::GetDefinedFunctionList { function_list })
        }));
        for size in [1, 5, DEFAULT_PAGE_SIZE] {
            let page = tools.list_functions(2, size).await.unwrap();
            assert!(page.len() <= size as usize);
        }
    }

    #[tokio::test]
    async fn function_count_and_backend_error() {
        let (tools, _) = scripted(Box::new(|_| {
            (None, ResponseMessage::GetFunctionCount { function_count: 1234 })
        }));
        assert_eq!(tools.function_count().await.unwrap(), 1234);

        let (tools, _) = scripted(Box::new(|_| {
            (Some("No program open".into()), ResponseMessage::GetFunctionCount { function_count: 0 })
        }));
        assert!(matches!(
            tools.function_count().await,
            Err(ToolError::Backend { .. })
        ));
    }

    #[tokio::test]
    async fn batch_rename_returns_confirmations_in_order() {
        let (tools, _) = scripted(Box::new(|_| (None, ResponseMessage::RenameVariable {})));
        let mut names = IndexMap::new();
        names.insert("a".to_string(), "b".to_string());
        names.insert("c".to_string(), "d".to_string());
        let out = tools.rename_variables("F", &names).await.unwrap();
        assert_eq!(out, vec!["Renamed a to b in F", "Renamed c to d in F"]);
    }

    #[tokio::test]
    async fn batch_rename_aborts_on_first_failure() {
        let (tools, seen) = scripted(Box::new(|req| match req {
            RequestMessage::RenameVariable { old_name, .. } if old_name == "c" => (
                Some("Variable c not found".into()),
                ResponseMessage::RenameVariable {},
            ),
            _ => (None, ResponseMessage::RenameVariable {}),
        }));
        let mut names = IndexMap::new();
        names.insert("a".to_string(), "b".to_string());
        names.insert("c".to_string(), "d".to_string());
        names.insert("e".to_string(), "f".to_string());

        let err = tools.rename_variables("F", &names).await.unwrap_err();
        match err {
            ToolError::BatchAborted {
                completed,
                failed,
                source,
            } => {
                assert_eq!(completed, vec!["Renamed a to b in F"]);
                assert_eq!(failed, "c");
                assert!(source.to_string().contains("retrying will not help"));
            }
            other => panic!("expected BatchAborted, got {other:?}"),
        }
        // "e" was never attempted.
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rename_requires_names() {
        let (tools, seen) = scripted(Box::new(|_| (None, ResponseMessage::RenameVariable {})));
        assert!(tools.rename_variable("F", "", "x").await.is_err());
        assert!(tools.rename_variable("", "a", "x").await.is_err());
        assert!(tools.rename_variable("F", "a", " ").await.is_err());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn references_without_data_are_empty_lists() {
        let (tools, _) = scripted(Box::new(|_| {
            (
                None,
                ResponseMessage::GetReferences {
                    references_to: vec![],
                    references_from: vec![],
                },
            )
        }));
        let refs = tools.get_references("lonely_symbol").await.unwrap();
        assert_eq!(
            serde_json::to_value(&refs).unwrap(),
            serde_json::json!({"references_to": [], "references_from": []})
        );
    }

    #[tokio::test]
    async fn set_comment_surfaces_rejection() {
        let (tools, _) = scripted(Box::new(|req| match req {
            RequestMessage::SetComment { comment, .. } if comment == "rejected" => (
                Some("User rejected the action".into()),
                ResponseMessage::SetComment {},
            ),
            _ => (None, ResponseMessage::SetComment {}),
        }));
        assert_eq!(
            tools.set_comment("0x401000", "entry").await.unwrap(),
            "Comment set at 0x401000"
        );
        let err = tools.set_comment("main", "rejected").await.unwrap_err();
        assert_eq!(err.to_string(), "User rejected the action");
    }

    #[tokio::test(start_paused = true)]
    async fn silent_backend_times_out() {
        let (bridge, receiver) = channel(4);
        let tools = AnalysisTools::new(bridge, "p", Duration::from_secs(2));
        let err = tools.function_count().await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout(2)));
        drop(receiver);
    }
}
