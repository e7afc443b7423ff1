use crate::bench::{AttemptTimer, BenchmarkReporter, NoopReporter};
use crate::{ForwardError, Lease, Result};
use faas_telemetry::{wrap, TelemetrySampler};
use faas_worker_common::{
    Channel, Handle, InvocationRequest, OutboundRequest, SandboxResponse, TransportError,
};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

pub const MAX_ATTEMPTS: u32 = 10;
pub const BACKOFF_STEP: Duration = Duration::from_millis(100);

const ATTEMPT_TIMER: &str = "lambda request";

/// Linear backoff: attempt `n` failing waits `n * backoff_step` before
/// attempt `n + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            backoff_step: BACKOFF_STEP,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }

    /// Sleep accumulated over a fully exhausted sequence.
    pub fn total_backoff(&self) -> Duration {
        (1..self.attempts()).map(|n| self.backoff(n)).sum()
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success { status: u16 },
    NetworkError(TransportError),
}

/// One try at reaching the sandbox; kept only for diagnostics.
#[derive(Debug, Clone)]
pub struct ForwardAttempt {
    pub index: u32,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
}

impl fmt::Display for ForwardAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            AttemptOutcome::Success { status } => write!(
                f,
                "Attempt {}: status {} after {:?}",
                self.index, status, self.elapsed
            ),
            AttemptOutcome::NetworkError(err) => {
                write!(f, "Attempt {}: {} after {:?}", self.index, err, self.elapsed)
            }
        }
    }
}

/// The sandbox's status code and the envelope that replaces its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

pub struct ForwardEngine {
    policy: RetryPolicy,
    sampler: TelemetrySampler,
    reporter: Arc<dyn BenchmarkReporter>,
}

impl ForwardEngine {
    pub fn new(sampler: TelemetrySampler) -> Self {
        Self {
            policy: RetryPolicy::default(),
            sampler,
            reporter: Arc::new(NoopReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn BenchmarkReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Leases `handle`, sends `request` to its sandbox with retry, and wraps
    /// the answer with a telemetry sample. The lease is held across every
    /// attempt and backoff and released when this returns.
    #[instrument(skip_all, fields(function = handle.name(), path = %request.path))]
    pub async fn forward(
        &self,
        handle: &dyn Handle,
        request: &InvocationRequest,
    ) -> Result<ForwardedResponse> {
        let lease = Lease::acquire(handle).await?;

        let outbound = OutboundRequest {
            method: request.method.clone(),
            url: lease.channel().url_for(&request.path),
            content_type: request.content_type.clone(),
            body: request.body.clone(),
        };
        let response = self.send_with_retry(lease.channel(), outbound).await?;

        let sample = self.sampler.sample();
        let body = wrap(&sample, &response.headers, &response.body, response.status)?;

        Ok(ForwardedResponse {
            status: response.status,
            body,
        })
    }

    async fn send_with_retry(
        &self,
        channel: &Channel,
        outbound: OutboundRequest,
    ) -> Result<SandboxResponse> {
        let max_attempts = self.policy.attempts();
        let mut attempts: Vec<ForwardAttempt> = Vec::new();

        let mut index = 0;
        loop {
            index += 1;
            let timer = AttemptTimer::start(self.reporter.as_ref(), ATTEMPT_TIMER);
            let started = Instant::now();

            // the transport reads and drops the body before returning, so
            // nothing from this attempt outlives it
            let err = match channel.transport.send(outbound.clone()).await {
                Ok(response) => {
                    timer.end();
                    let attempt = ForwardAttempt {
                        index,
                        outcome: AttemptOutcome::Success {
                            status: response.status,
                        },
                        elapsed: started.elapsed(),
                    };
                    debug!("{}", attempt);
                    return Ok(response);
                }
                Err(err) if !err.is_retryable() => {
                    timer.error("Request Failed");
                    warn!(attempt = index, "Forward attempt failed permanently: {}", err);
                    return Err(match err {
                        TransportError::Body(msg) => ForwardError::BodyIo(msg),
                        other => ForwardError::Transport(other),
                    });
                }
                Err(err) => err,
            };

            timer.error("Request Failed");
            warn!(attempt = index, "Forward attempt failed: {}", err);
            attempts.push(ForwardAttempt {
                index,
                outcome: AttemptOutcome::NetworkError(err.clone()),
                elapsed: started.elapsed(),
            });

            if index == max_attempts {
                error!(
                    "Forwarding request to {} failed after {} tries",
                    outbound.url, max_attempts
                );
                for attempt in &attempts {
                    error!("{}", attempt);
                }
                return Err(ForwardError::Exhausted {
                    attempts: max_attempts,
                    last: err,
                });
            }

            sleep(self.policy.backoff(index)).await;
        }
    }
}
