use crate::{PoolError, SandboxTransport};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Base URL and transport for one leased sandbox.
#[derive(Clone)]
pub struct Channel {
    pub url: String,
    pub transport: Arc<dyn SandboxTransport>,
}

impl Channel {
    pub fn new(url: impl Into<String>, transport: Arc<dyn SandboxTransport>) -> Self {
        Self {
            url: url.into(),
            transport,
        }
    }

    /// Joins the channel base URL with a request path.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.url.trim_end_matches('/'), path)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel").field("url", &self.url).finish_non_exhaustive()
    }
}

/// A leasable binding to one sandbox instance, owned by the handler pool.
#[async_trait]
pub trait Handle: Send + Sync {
    fn name(&self) -> &str;

    /// Waits for exclusive use of the sandbox. Blocking and timeout policy
    /// belong to the implementation.
    async fn lease(&self) -> Result<Channel, PoolError>;

    /// Gives back a lease obtained from `lease`. Called exactly once per
    /// successful `lease`.
    fn release(&self);
}

#[async_trait]
pub trait HandlerPool: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<Arc<dyn Handle>, PoolError>;

    /// Logs the pool's current state for diagnostics.
    fn dump(&self);

    /// Tears down every sandbox; called once at shutdown.
    async fn cleanup(&self);
}
