#![allow(dead_code)]

use async_trait::async_trait;
use faas_forward::{BenchmarkRecord, BenchmarkReporter};
use faas_worker_common::{
    Channel, Handle, InvocationRequest, OutboundRequest, PoolError, SandboxResponse,
    SandboxTransport, TransportError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Fails its first `failures` sends with a connection error, then echoes.
pub struct FlakyTransport {
    failures: usize,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    delay: Duration,
    pub requests: Mutex<Vec<OutboundRequest>>,
}

impl FlakyTransport {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always_failing() -> Self {
        Self::new(usize::MAX)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SandboxTransport for FlakyTransport {
    async fn send(&self, request: OutboundRequest) -> Result<SandboxResponse, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if call < self.failures {
            return Err(TransportError::Connect(format!("connection refused (call {call})")));
        }
        Ok(SandboxResponse::new(200, request.body).with_header("content-type", "application/json"))
    }
}

/// Single-holder handle that counts leases and releases.
pub struct TestHandle {
    name: String,
    url: String,
    transport: Arc<dyn SandboxTransport>,
    permit: Semaphore,
    fail_lease: bool,
    pub leases: AtomicUsize,
    pub releases: AtomicUsize,
}

impl TestHandle {
    pub fn new(name: &str, transport: Arc<dyn SandboxTransport>) -> Self {
        Self {
            name: name.to_string(),
            url: format!("http://sandbox-{name}:8080"),
            transport,
            permit: Semaphore::new(1),
            fail_lease: false,
            leases: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        }
    }

    pub fn with_url(name: &str, url: &str, transport: Arc<dyn SandboxTransport>) -> Self {
        let mut handle = Self::new(name, transport);
        handle.url = url.to_string();
        handle
    }

    pub fn failing_lease(mut self) -> Self {
        self.fail_lease = true;
        self
    }

    pub fn leases(&self) -> usize {
        self.leases.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handle for TestHandle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lease(&self) -> Result<Channel, PoolError> {
        if self.fail_lease {
            return Err(PoolError::LeaseTimeout(self.name.clone()));
        }
        let permit = self
            .permit
            .acquire()
            .await
            .map_err(|_| PoolError::Closed)?;
        permit.forget();
        self.leases.fetch_add(1, Ordering::SeqCst);
        Ok(Channel::new(self.url.clone(), self.transport.clone()))
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.permit.add_permits(1);
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    pub records: Mutex<Vec<BenchmarkRecord>>,
}

impl BenchmarkReporter for RecordingReporter {
    fn record(&self, record: BenchmarkRecord) {
        self.records.lock().unwrap().push(record);
    }
}

pub fn request(body: &'static [u8]) -> InvocationRequest {
    InvocationRequest {
        method: "POST".to_string(),
        path: "/run/echo".to_string(),
        content_type: Some("application/json".to_string()),
        body: bytes::Bytes::from_static(body),
    }
}
