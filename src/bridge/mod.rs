//! Request/response bridge to the out-of-process analysis backend.
//!
//! Callers submit requests through a cloneable [`Bridge`] onto a single
//! bounded queue. The transport worker ([`run_transport`]) drains the queue
//! onto the backend stream and resolves each [`PendingRequest`] with the
//! reply carrying the same correlation id.

pub mod pending;
pub mod protocol;
pub mod transport;
pub mod worker;

pub use pending::{PendingRequest, PendingResponse};
pub use protocol::{
    format_address, parse_hex_address, MessageKind, RequestEnvelope, RequestMessage,
    ResponseEnvelope, ResponseMessage, Variable,
};
pub use transport::{connect_tcp, run_transport};
pub use worker::{channel, clamp_timeout, Bridge, BridgeReceiver};
