use crate::TransportError;
use async_trait::async_trait;
use bytes::Bytes;

/// One request the worker sends to a sandbox.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: String,
    pub url: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// A sandbox's answer with its body already read to the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxResponse {
    pub status: u16,
    /// Header pairs in the order the sandbox sent them; names may repeat.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl SandboxResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Network path to a sandbox.
///
/// `send` must read and drop the response body before returning so nothing
/// from one attempt outlives it.
#[async_trait]
pub trait SandboxTransport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<SandboxResponse, TransportError>;
}
