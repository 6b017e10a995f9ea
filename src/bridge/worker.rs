//! Bridge handle for submitting requests to the transport worker.

use crate::bridge::pending::{PendingRequest, PendingResponse};
use crate::bridge::protocol::{RequestMessage, ResponseEnvelope};
use crate::error::ToolError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Default timeout for backend operations (2 minutes)
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Maximum allowed timeout (10 minutes)
pub const MAX_TIMEOUT_SECS: u64 = 600;
/// Default depth of the shared request queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Resolve an optional per-call timeout against the default and the cap.
pub fn clamp_timeout(timeout_secs: Option<u64>) -> Duration {
    Duration::from_secs(
        timeout_secs
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .min(MAX_TIMEOUT_SECS),
    )
}

/// Create the shared queue: any number of [`Bridge`] clones feed one
/// [`BridgeReceiver`] owned by the transport.
pub fn channel(capacity: usize) -> (Bridge, BridgeReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        Bridge {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        },
        BridgeReceiver { rx },
    )
}

/// Producer side of the shared queue.
#[derive(Clone)]
pub struct Bridge {
    tx: mpsc::Sender<PendingRequest>,
    next_id: Arc<AtomicU64>,
}

impl Bridge {
    /// Enqueue a request and return its waiter. Never blocks: a full queue is
    /// reported as `Busy`, a stopped transport as `WorkerClosed`.
    pub fn submit(&self, request: RequestMessage) -> Result<PendingResponse, ToolError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let kind = request.kind();
        let (pending, response) = PendingRequest::new(id, request);
        self.tx.try_send(pending)?;
        debug!(id, kind = %kind, "Request queued");
        Ok(response)
    }

    /// Submit and wait for the reply.
    pub async fn call(
        &self,
        request: RequestMessage,
        timeout: Duration,
    ) -> Result<ResponseEnvelope, ToolError> {
        self.submit(request)?.wait(timeout).await
    }

    /// True once the transport has stopped accepting requests.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the shared queue, owned by the transport.
pub struct BridgeReceiver {
    rx: mpsc::Receiver<PendingRequest>,
}

impl BridgeReceiver {
    /// Next queued request in submission order; `None` once every
    /// [`Bridge`] handle is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<PendingRequest> {
        self.rx.recv().await
    }

    /// Stop accepting new requests and fail everything still queued.
    /// Returns the number of requests failed.
    pub fn close_and_fail(&mut self, error: &ToolError) -> usize {
        self.rx.close();
        let mut failed = 0;
        while let Ok(pending) = self.rx.try_recv() {
            if pending.fail(error.duplicate()).is_ok() {
                failed += 1;
            }
        }
        failed
    }
}
