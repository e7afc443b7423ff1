// Forwarding of invocations to leased sandboxes

use faas_worker_common::{PoolError, TransportError};
use thiserror::Error;

pub mod bench;
mod engine;
mod http;
mod lease;

pub use bench::{AttemptTimer, BenchmarkRecord, BenchmarkReporter, FileReporter, NoopReporter, TimerOutcome};
pub use engine::{
    AttemptOutcome, ForwardAttempt, ForwardEngine, ForwardedResponse, RetryPolicy, BACKOFF_STEP,
    MAX_ATTEMPTS,
};
pub use http::HttpTransport;
pub use lease::Lease;

#[derive(Error, Debug)]
pub enum ForwardError {
    /// The handle could not be leased; no request was sent.
    #[error("{0}")]
    Lease(#[from] PoolError),

    /// Every allowed attempt failed to reach the sandbox. Carries the last
    /// attempt's error.
    #[error("{last}")]
    Exhausted { attempts: u32, last: TransportError },

    /// A failure that another attempt would not fix.
    #[error("{0}")]
    Transport(TransportError),

    #[error("{0}")]
    BodyIo(String),

    #[error("failed to encode response envelope: {0}")]
    Envelope(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ForwardError>;
