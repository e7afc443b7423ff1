//! Handler pool over a fixed set of already-running sandboxes.
//!
//! Each configured function maps to one sandbox URL. A sandbox serves one
//! forward sequence at a time; further leases wait, optionally bounded by a
//! lease timeout.

use async_trait::async_trait;
use dashmap::DashMap;
use faas_worker_common::{Channel, Handle, HandlerPool, PoolError, SandboxTransport};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info, warn};

pub struct SandboxHandle {
    name: String,
    url: String,
    transport: Arc<dyn SandboxTransport>,
    permit: Semaphore,
    lease_timeout: Option<Duration>,
    leased: AtomicBool,
    lease_count: AtomicU64,
}

/// Point-in-time view of a handle, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleState {
    pub name: String,
    pub url: String,
    pub leased: bool,
    pub lease_count: u64,
}

impl SandboxHandle {
    fn new(
        name: String,
        url: String,
        transport: Arc<dyn SandboxTransport>,
        lease_timeout: Option<Duration>,
    ) -> Self {
        Self {
            name,
            url,
            transport,
            permit: Semaphore::new(1),
            lease_timeout,
            leased: AtomicBool::new(false),
            lease_count: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> HandleState {
        HandleState {
            name: self.name.clone(),
            url: self.url.clone(),
            leased: self.leased.load(Ordering::SeqCst),
            lease_count: self.lease_count.load(Ordering::SeqCst),
        }
    }

    /// Fails every pending and future lease.
    fn close(&self) {
        self.permit.close();
    }
}

#[async_trait]
impl Handle for SandboxHandle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lease(&self) -> Result<Channel, PoolError> {
        let acquire = self.permit.acquire();
        let permit = match self.lease_timeout {
            Some(limit) => timeout(limit, acquire)
                .await
                .map_err(|_| PoolError::LeaseTimeout(self.name.clone()))?,
            None => acquire.await,
        }
        .map_err(|_| PoolError::Closed)?;

        // held until `release` hands the permit back
        permit.forget();
        self.leased.store(true, Ordering::SeqCst);
        self.lease_count.fetch_add(1, Ordering::SeqCst);

        Ok(Channel::new(self.url.clone(), self.transport.clone()))
    }

    fn release(&self) {
        self.leased.store(false, Ordering::SeqCst);
        self.permit.add_permits(1);
    }
}

pub struct StaticHandlerPool {
    handles: DashMap<String, Arc<SandboxHandle>>,
    transport: Arc<dyn SandboxTransport>,
    lease_timeout: Option<Duration>,
    closed: AtomicBool,
}

impl StaticHandlerPool {
    pub fn new(transport: Arc<dyn SandboxTransport>) -> Self {
        Self {
            handles: DashMap::new(),
            transport,
            lease_timeout: None,
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_lease_timeout(mut self, lease_timeout: Option<Duration>) -> Self {
        self.lease_timeout = lease_timeout;
        self
    }

    pub fn with_sandboxes<I, K, V>(self, sandboxes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, url) in sandboxes {
            self.register(name, url);
        }
        self
    }

    /// Adds or replaces the sandbox serving `name`.
    pub fn register(&self, name: impl Into<String>, url: impl Into<String>) -> Arc<SandboxHandle> {
        let name = name.into();
        let handle = Arc::new(SandboxHandle::new(
            name.clone(),
            url.into(),
            self.transport.clone(),
            self.lease_timeout,
        ));
        debug!(function = %name, url = %handle.url, "Registered sandbox");
        if let Some(previous) = self.handles.insert(name, handle.clone()) {
            warn!(function = %previous.name, "Replaced sandbox {}", previous.url);
        }
        handle
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Handle states sorted by function name.
    pub fn states(&self) -> Vec<HandleState> {
        let mut states: Vec<HandleState> =
            self.handles.iter().map(|entry| entry.value().state()).collect();
        states.sort_by(|a, b| a.name.cmp(&b.name));
        states
    }
}

#[async_trait]
impl HandlerPool for StaticHandlerPool {
    async fn resolve(&self, name: &str) -> Result<Arc<dyn Handle>, PoolError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PoolError::Closed);
        }
        self.handles
            .get(name)
            .map(|entry| entry.value().clone() as Arc<dyn Handle>)
            .ok_or_else(|| PoolError::NotFound(name.to_string()))
    }

    fn dump(&self) {
        let states = self.states();
        info!("Handler pool: {} sandboxes", states.len());
        for state in states {
            info!(
                function = %state.name,
                url = %state.url,
                leased = state.leased,
                leases = state.lease_count,
                "Sandbox"
            );
        }
    }

    async fn cleanup(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let count = self.handles.len();
        for entry in self.handles.iter() {
            entry.value().close();
        }
        self.handles.clear();
        info!("Cleaned up {} sandboxes", count);
    }
}
