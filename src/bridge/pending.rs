//! Pending request handles.
//!
//! A submitted request is split into two halves that share one write-once
//! slot: [`PendingRequest`] travels through the queue to the transport, which
//! resolves it; [`PendingResponse`] stays with the caller, which waits on it.

use crate::bridge::protocol::{MessageKind, RequestEnvelope, RequestMessage, ResponseEnvelope};
use crate::error::ToolError;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

type Resolution = Result<ResponseEnvelope, ToolError>;

/// Whole seconds for error reports, rounded up so sub-second bounds never
/// read as zero.
pub(crate) fn timeout_secs(timeout: Duration) -> u64 {
    let secs = timeout.as_secs();
    if timeout.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

#[derive(Debug)]
struct Slot {
    id: u64,
    request: RequestMessage,
    resolver: Mutex<Option<oneshot::Sender<Resolution>>>,
}

impl Slot {
    fn lock_resolver(&self) -> MutexGuard<'_, Option<oneshot::Sender<Resolution>>> {
        match self.resolver.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Transport-side half of an outstanding request. Cloning shares the slot.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    slot: Arc<Slot>,
}

impl PendingRequest {
    /// Create a linked request/response pair for correlation id `id`.
    pub fn new(id: u64, request: RequestMessage) -> (PendingRequest, PendingResponse) {
        let (tx, rx) = oneshot::channel();
        let kind = request.kind();
        let pending = PendingRequest {
            slot: Arc::new(Slot {
                id,
                request,
                resolver: Mutex::new(Some(tx)),
            }),
        };
        (pending, PendingResponse { id, kind, rx })
    }

    pub fn id(&self) -> u64 {
        self.slot.id
    }

    pub fn kind(&self) -> MessageKind {
        self.slot.request.kind()
    }

    pub fn request(&self) -> &RequestMessage {
        &self.slot.request
    }

    /// The frame to put on the wire for this request.
    pub fn envelope(&self) -> RequestEnvelope {
        RequestEnvelope {
            id: self.slot.id,
            message: self.slot.request.clone(),
        }
    }

    /// Deliver the backend's reply. Only the first resolution is accepted.
    pub fn resolve(&self, response: ResponseEnvelope) -> Result<(), ToolError> {
        if response.id != self.slot.id {
            return Err(ToolError::Protocol(format!(
                "reply id {} does not match pending request {}",
                response.id, self.slot.id
            )));
        }
        self.complete(Ok(response))
    }

    /// Resolve with an error instead of a reply (disconnect, bad frame).
    pub fn fail(&self, error: ToolError) -> Result<(), ToolError> {
        self.complete(Err(error))
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.lock_resolver().is_none()
    }

    /// True once the waiter has gone away (timed out or dropped).
    pub fn is_abandoned(&self) -> bool {
        self.slot
            .lock_resolver()
            .as_ref()
            .map(|tx| tx.is_closed())
            .unwrap_or(true)
    }

    fn complete(&self, resolution: Resolution) -> Result<(), ToolError> {
        let sender = self
            .slot
            .lock_resolver()
            .take()
            .ok_or(ToolError::AlreadyResolved(self.slot.id))?;
        if sender.send(resolution).is_err() {
            debug!(id = self.slot.id, "Waiter gone before resolution was delivered");
        }
        Ok(())
    }
}

/// Caller-side half: waits for exactly one resolution.
#[derive(Debug)]
pub struct PendingResponse {
    id: u64,
    kind: MessageKind,
    rx: oneshot::Receiver<Resolution>,
}

impl PendingResponse {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait up to `timeout` for the reply. Consumes the handle, so there is
    /// never more than one waiter.
    pub async fn wait(self, timeout: Duration) -> Result<ResponseEnvelope, ToolError> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(_)) => Err(ToolError::Disconnected),
            Err(_) => {
                debug!(id = self.id, kind = %self.kind, "Timed out waiting for reply");
                Err(ToolError::Timeout(timeout_secs(timeout)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::protocol::ResponseMessage;

    fn count_reply(id: u64, n: u64) -> ResponseEnvelope {
        ResponseEnvelope::ok(id, ResponseMessage::GetFunctionCount { function_count: n })
    }

    #[tokio::test]
    async fn resolve_wakes_waiter() {
        let (pending, response) = PendingRequest::new(1, RequestMessage::GetFunctionCount {});
        pending.resolve(count_reply(1, 42)).unwrap();
        let reply = response.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(
            reply.message,
            ResponseMessage::GetFunctionCount { function_count: 42 }
        );
    }

    #[tokio::test]
    async fn second_resolution_is_rejected() {
        let (pending, response) = PendingRequest::new(5, RequestMessage::GetFunctionCount {});
        pending.resolve(count_reply(5, 1)).unwrap();
        let again = pending.resolve(count_reply(5, 2));
        assert!(matches!(again, Err(ToolError::AlreadyResolved(5))));
        assert!(matches!(
            pending.fail(ToolError::Disconnected),
            Err(ToolError::AlreadyResolved(5))
        ));

        // The first resolution wins.
        let reply = response.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(
            reply.message,
            ResponseMessage::GetFunctionCount { function_count: 1 }
        );
    }

    #[tokio::test]
    async fn mismatched_id_does_not_consume_slot() {
        let (pending, response) = PendingRequest::new(3, RequestMessage::GetFunctionCount {});
        assert!(matches!(
            pending.resolve(count_reply(4, 0)),
            Err(ToolError::Protocol(_))
        ));
        assert!(!pending.is_resolved());
        pending.resolve(count_reply(3, 9)).unwrap();
        assert!(response.wait(Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn dropped_resolver_is_disconnect() {
        let (pending, response) = PendingRequest::new(2, RequestMessage::GetFunctionCount {});
        drop(pending);
        let err = response.wait(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ToolError::Disconnected));
    }

    #[tokio::test(start_paused = true)]
    async fn unresolved_wait_times_out() {
        let (pending, response) = PendingRequest::new(8, RequestMessage::GetFunctionCount {});
        let err = response.wait(Duration::from_secs(3)).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout(3)));
        assert!(pending.is_abandoned());
        // Resolving after the waiter left is still a single, accepted resolution.
        assert!(pending.resolve(count_reply(8, 0)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn sub_second_timeout_reports_one_second() {
        let (_pending, response) = PendingRequest::new(9, RequestMessage::GetFunctionCount {});
        let err = response.wait(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout(1)));
        assert_eq!(timeout_secs(Duration::from_secs(2)), 2);
        assert_eq!(timeout_secs(Duration::from_millis(2001)), 3);
    }

    #[test]
    fn envelope_uses_correlation_id() {
        let (pending, _response) = PendingRequest::new(
            11,
            RequestMessage::GetReferences {
                address_or_symbol: "main".to_string(),
            },
        );
        let env = pending.envelope();
        assert_eq!(env.id, 11);
        assert_eq!(pending.kind(), MessageKind::GetReferences);
    }
}
