use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use faas_forward::ForwardError;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

pub const MISSING_FUNCTION_NAME: &str = "function name required";

/// Everything that can stop an invocation. Converted to a status code and a
/// plain-text message at the HTTP boundary.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("function name required")]
    MalformedRequest,

    #[error("{0}")]
    Resolution(String),

    #[error("{0}")]
    Transport(String),

    #[error("{0}")]
    BodyIo(String),

    #[error("{0}")]
    Envelope(String),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::MalformedRequest => StatusCode::BAD_REQUEST,
            DispatchError::Resolution(_)
            | DispatchError::Transport(_)
            | DispatchError::BodyIo(_)
            | DispatchError::Envelope(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ForwardError> for DispatchError {
    fn from(err: ForwardError) -> Self {
        match err {
            ForwardError::BodyIo(msg) => DispatchError::BodyIo(msg),
            ForwardError::Envelope(e) => DispatchError::Envelope(e.to_string()),
            other => DispatchError::Transport(other.to_string()),
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Failures while assembling or running the worker.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build sandbox transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to open benchmark file {path}: {source}")]
    Benchmark {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}
