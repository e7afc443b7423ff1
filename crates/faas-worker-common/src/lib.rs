// Contracts shared by the worker's dispatch core and its sandbox collaborators

use bytes::Bytes;
use thiserror::Error;

pub mod pool;
pub mod transport;

pub use pool::{Channel, Handle, HandlerPool};
pub use transport::{OutboundRequest, SandboxResponse, SandboxTransport};

/// An inbound invocation as handed from the dispatcher to the forward engine.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub method: String,
    /// Full request path, forwarded verbatim to the sandbox.
    pub path: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Failures reported by a handler pool while resolving or leasing a sandbox.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("no sandbox registered for function '{0}'")]
    NotFound(String),

    #[error("timed out waiting for a lease on '{0}'")]
    LeaseTimeout(String),

    #[error("handler pool is closed")]
    Closed,

    #[error("handler pool error: {0}")]
    Internal(String),
}

/// Failures of a single outbound attempt against a sandbox.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The sandbox could not be reached at all.
    #[error("sandbox unreachable: {0}")]
    Connect(String),

    #[error("invalid outbound request: {0}")]
    InvalidRequest(String),

    /// The sandbox answered but its body could not be read.
    #[error("failed to read sandbox response body: {0}")]
    Body(String),
}

impl TransportError {
    /// Only connection-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Connect(_))
    }
}
