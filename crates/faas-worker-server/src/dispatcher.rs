use axum::{body::Body, extract::Request, http::header::CONTENT_TYPE};
use faas_forward::{ForwardEngine, ForwardedResponse};
use faas_history::HistoryTracker;
use faas_worker_common::{HandlerPool, InvocationRequest};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::DEFAULT_MAX_BODY_BYTES;
use crate::error::DispatchError;

/// Splits a request path into its `/`-delimited segments after dropping one
/// leading and one trailing slash.
pub fn path_segments(path: &str) -> Vec<&str> {
    let path = path.strip_prefix('/').unwrap_or(path);
    let path = path.strip_suffix('/').unwrap_or(path);
    path.split('/').collect()
}

/// The function an invocation path names: its second segment, cut before
/// any `?`.
pub fn function_name(path: &str) -> Result<&str, DispatchError> {
    let segments = path_segments(path);
    let segment = segments.get(1).ok_or(DispatchError::MalformedRequest)?;
    let name = match segment.find('?') {
        Some(end) => &segment[..end],
        None => segment,
    };
    if name.is_empty() {
        return Err(DispatchError::MalformedRequest);
    }
    Ok(name)
}

/// Resolves invocations to sandboxes and forwards them, recording each
/// accepted invocation in the history log.
pub struct Dispatcher {
    pool: Arc<dyn HandlerPool>,
    engine: ForwardEngine,
    history: Arc<HistoryTracker>,
    max_body_bytes: usize,
}

impl Dispatcher {
    pub fn new(
        pool: Arc<dyn HandlerPool>,
        engine: ForwardEngine,
        history: Arc<HistoryTracker>,
    ) -> Self {
        Self {
            pool,
            engine,
            history,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn pool(&self) -> &Arc<dyn HandlerPool> {
        &self.pool
    }

    /// Runs one invocation. `OPEN` is recorded once the function name is
    /// known and the body read; `CLOSE` follows on every exit after that,
    /// including cancellation of this future.
    #[instrument(skip_all, fields(request_id = %Uuid::new_v4(), path = %request.uri().path()))]
    pub async fn invoke(&self, request: Request) -> Result<ForwardedResponse, DispatchError> {
        let (parts, body) = request.into_parts();
        let path = parts.uri.path().to_string();
        let name = function_name(&path)?.to_string();

        let body = read_body(body, self.max_body_bytes).await?;
        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let _scope = self.history.begin(name.as_str());

        let handle = self
            .pool
            .resolve(&name)
            .await
            .map_err(|e| DispatchError::Resolution(e.to_string()))?;
        debug!(function = %name, "Resolved sandbox handle");

        let invocation = InvocationRequest {
            method: parts.method.to_string(),
            path,
            content_type,
            body,
        };
        let forwarded = self.engine.forward(handle.as_ref(), &invocation).await?;

        info!(function = %name, status = forwarded.status, "Invocation complete");
        Ok(forwarded)
    }
}

async fn read_body(body: Body, limit: usize) -> Result<axum::body::Bytes, DispatchError> {
    axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| DispatchError::BodyIo(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_strip_one_slash_each_side() {
        assert_eq!(path_segments("/run/echo/"), vec!["run", "echo"]);
        assert_eq!(path_segments("run/echo"), vec!["run", "echo"]);
        assert_eq!(path_segments("/run/"), vec!["run"]);
        assert_eq!(path_segments("/run/echo/extra/parts"), vec!["run", "echo", "extra", "parts"]);
    }

    #[test]
    fn test_function_name_is_second_segment() {
        assert_eq!(function_name("/run/echo").unwrap(), "echo");
        assert_eq!(function_name("/runLambda/hello/world").unwrap(), "hello");
        assert_eq!(function_name("/run/echo/").unwrap(), "echo");
    }

    #[test]
    fn test_query_suffix_is_cut_before_question_mark() {
        assert_eq!(function_name("/run/echo?debug=1").unwrap(), "echo");
        assert_eq!(function_name("/run/e?x").unwrap(), "e");
    }

    #[test]
    fn test_missing_name_is_malformed() {
        for path in ["", "/", "/run", "/run/", "/run//x", "/run/?q=1"] {
            assert!(
                matches!(function_name(path), Err(DispatchError::MalformedRequest)),
                "{path:?} should be malformed"
            );
        }
    }
}
