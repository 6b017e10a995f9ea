//! Transport worker: drains the shared queue onto a backend byte stream and
//! routes replies back to their pending requests by correlation id.
//!
//! Frames are a little-endian `u32` body length followed by a JSON body.

use crate::bridge::pending::{timeout_secs, PendingRequest};
use crate::bridge::protocol::ResponseEnvelope;
use crate::bridge::worker::BridgeReceiver;
use crate::error::ToolError;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Upper bound on a single frame body.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// How often in-flight entries whose caller gave up are swept.
const PRUNE_INTERVAL: Duration = Duration::from_secs(1);

/// Write one length-prefixed JSON frame.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), ToolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(value)?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(ToolError::Protocol(format!(
            "frame of {} bytes exceeds maximum {}",
            body.len(),
            MAX_FRAME_SIZE
        )));
    }
    let len = (body.len() as u32).to_le_bytes();
    writer.write_all(&len).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame body. `Ok(None)` means the peer closed the stream cleanly
/// at a frame boundary.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, ToolError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        let n = reader.read(&mut len_buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            warn!(read = filled, "Stream closed inside a frame header");
            return Err(ToolError::Protocol(format!(
                "truncated frame header: {filled} of 4 bytes"
            )));
        }
        filled += n;
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(ToolError::Protocol(format!(
            "frame of {len} bytes exceeds maximum {MAX_FRAME_SIZE}"
        )));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// A decoded inbound frame.
#[derive(Debug)]
enum Inbound {
    Reply(ResponseEnvelope),
    Malformed { id: Option<u64>, error: String },
}

fn decode_reply(body: &[u8]) -> Inbound {
    match serde_json::from_slice::<ResponseEnvelope>(body) {
        Ok(env) => Inbound::Reply(env),
        Err(e) => {
            // Salvage the id so the one affected caller fails fast.
            let id = serde_json::from_slice::<Value>(body)
                .ok()
                .and_then(|v| v.get("id").and_then(Value::as_u64));
            Inbound::Malformed {
                id,
                error: e.to_string(),
            }
        }
    }
}

/// Requests written to the backend and not yet answered.
#[derive(Debug, Default)]
pub struct InFlight {
    pending: HashMap<u64, PendingRequest>,
}

impl InFlight {
    pub fn insert(&mut self, pending: PendingRequest) {
        self.pending.insert(pending.id(), pending);
    }

    pub fn take(&mut self, id: u64) -> Option<PendingRequest> {
        self.pending.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop entries whose caller already gave up.
    pub fn prune_abandoned(&mut self) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, p| !p.is_abandoned());
        before - self.pending.len()
    }

    /// Fail every outstanding request with `error`.
    pub fn fail_all(&mut self, error: &ToolError) -> usize {
        let mut failed = 0;
        for (_, pending) in self.pending.drain() {
            if pending.fail(error.duplicate()).is_ok() {
                failed += 1;
            }
        }
        failed
    }

    /// Route a reply to its pending request.
    fn dispatch(&mut self, reply: ResponseEnvelope) {
        let Some(pending) = self.take(reply.id) else {
            warn!(id = reply.id, kind = %reply.message.kind(), "Reply for unknown or abandoned request");
            return;
        };
        if reply.message.kind() != pending.kind() {
            warn!(
                id = reply.id,
                expected = %pending.kind(),
                actual = %reply.message.kind(),
                "Reply kind does not match request"
            );
        }
        debug!(id = reply.id, kind = %reply.message.kind(), failed = reply.error_message.is_some(), "Reply received");
        if let Err(e) = pending.resolve(reply) {
            warn!(error = %e, "Dropped reply");
        }
    }
}

async fn read_loop<R>(mut reader: R, frames: mpsc::UnboundedSender<Inbound>) -> ToolError
where
    R: AsyncRead + Unpin,
{
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(body)) => {
                if frames.send(decode_reply(&body)).is_err() {
                    return ToolError::WorkerClosed;
                }
            }
            Ok(None) => {
                info!("Backend closed the connection");
                return ToolError::Disconnected;
            }
            Err(e) => {
                warn!(error = %e, "Backend read failed");
                return ToolError::Disconnected;
            }
        }
    }
}

/// Drive `stream` until the backend disconnects or every bridge handle is
/// dropped and all in-flight requests are answered.
///
/// On disconnect every in-flight and queued request is failed with
/// `Disconnected`, and later submissions fail with `WorkerClosed`.
pub async fn run_transport<S>(mut receiver: BridgeReceiver, stream: S) -> Result<(), ToolError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();
    let reader_task = tokio::spawn(read_loop(reader, frames_tx));

    let mut in_flight = InFlight::default();
    let mut accepting = true;
    let mut prune_tick = tokio::time::interval(PRUNE_INTERVAL);
    prune_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let outcome = loop {
        let pruned = in_flight.prune_abandoned();
        if pruned > 0 {
            debug!(pruned, "Pruned abandoned requests");
        }
        if !accepting && in_flight.is_empty() {
            info!("Bridge closed and no requests outstanding; transport stopping");
            break Ok(());
        }
        tokio::select! {
            next = receiver.recv(), if accepting => match next {
                Some(pending) => {
                    let envelope = pending.envelope();
                    in_flight.insert(pending);
                    if let Err(e) = write_frame(&mut writer, &envelope).await {
                        match e {
                            ToolError::Protocol(_) => {
                                warn!(id = envelope.id, error = %e, "Request could not be encoded");
                                if let Some(p) = in_flight.take(envelope.id) {
                                    let _ = p.fail(e);
                                }
                            }
                            _ => {
                                error!(id = envelope.id, error = %e, "Backend write failed");
                                break Err(ToolError::Disconnected);
                            }
                        }
                    } else {
                        debug!(id = envelope.id, kind = %envelope.message.kind(), "Request sent");
                    }
                }
                None => {
                    debug!("All bridge handles dropped");
                    accepting = false;
                }
            },
            frame = frames_rx.recv() => match frame {
                Some(Inbound::Reply(reply)) => in_flight.dispatch(reply),
                Some(Inbound::Malformed { id, error }) => {
                    warn!(id = ?id, error = %error, "Malformed reply frame");
                    if let Some(p) = id.and_then(|id| in_flight.take(id)) {
                        let _ = p.fail(ToolError::Protocol(error));
                    }
                }
                None => break Err(ToolError::Disconnected),
            },
            _ = prune_tick.tick() => {}
        }
    };

    if let Err(ref e) = outcome {
        let failed = in_flight.fail_all(e) + receiver.close_and_fail(e);
        error!(error = %e, failed, "Transport stopped; outstanding requests failed");
    }
    reader_task.abort();
    outcome
}

/// Connect to a backend listening on TCP.
pub async fn connect_tcp(addr: &str, connect_timeout: Duration) -> Result<TcpStream, ToolError> {
    info!(addr, "Connecting to analysis backend");
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| ToolError::Timeout(timeout_secs(connect_timeout)))?
        .map_err(|e| {
            error!(addr, error = %e, "Backend connection failed");
            ToolError::Disconnected
        })?;
    let _ = stream.set_nodelay(true);
    info!(addr, "Connected to analysis backend");
    Ok(stream)
}
