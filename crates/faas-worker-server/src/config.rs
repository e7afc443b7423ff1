use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_HISTORY_CAPACITY: usize = 64;
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Configuration Error: {0}")]
    Invalid(String),
}

/// Worker configuration, read from an optional JSON file and then
/// overridden from `FAAS_WORKER_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub host: String,
    pub worker_port: u16,
    /// Single path segment that invocation URLs start with.
    pub run_prefix: String,
    pub benchmark_file: Option<PathBuf>,
    pub history_capacity: usize,
    pub max_body_bytes: usize,
    /// Upper bound on waiting for a busy sandbox; unbounded when absent.
    pub lease_timeout_ms: Option<u64>,
    /// Report real CPU usage from /proc/stat instead of a constant.
    pub cpu_sampling: bool,
    /// Function name -> sandbox base URL.
    pub sandboxes: BTreeMap<String, String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            worker_port: 8080,
            run_prefix: "/run".to_string(),
            benchmark_file: None,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            lease_timeout_ms: None,
            cpu_sampling: false,
            sandboxes: BTreeMap::new(),
        }
    }
}

impl WorkerConfig {
    /// File (if any), then process environment, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("FAAS_WORKER_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("FAAS_WORKER_PORT") {
            self.worker_port = port.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "FAAS_WORKER_PORT",
                value: port,
            })?;
        }
        if let Some(prefix) = lookup("FAAS_WORKER_RUN_PREFIX") {
            self.run_prefix = prefix;
        }
        if let Some(path) = lookup("FAAS_WORKER_BENCHMARK_FILE") {
            self.benchmark_file = (!path.is_empty()).then(|| PathBuf::from(path));
        }
        if let Some(capacity) = lookup("FAAS_WORKER_HISTORY_CAPACITY") {
            self.history_capacity = capacity.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "FAAS_WORKER_HISTORY_CAPACITY",
                value: capacity,
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "history_capacity must be at least 1".to_string(),
            ));
        }

        let prefix = self.run_prefix.trim_matches('/');
        if prefix.is_empty() || prefix.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "run_prefix must be a single path segment, got {:?}",
                self.run_prefix
            )));
        }

        for (name, sandbox_url) in &self.sandboxes {
            url::Url::parse(sandbox_url).map_err(|e| {
                ConfigError::Invalid(format!("sandbox url for '{name}' is invalid: {e}"))
            })?;
        }

        if self.history_capacity < self.sandboxes.len() {
            warn!(
                "history_capacity {} is smaller than the {} configured sandboxes; \
                 history will not cover all in-flight invocations",
                self.history_capacity,
                self.sandboxes.len()
            );
        }
        Ok(())
    }

    /// Normalised invocation prefix, e.g. `/run`.
    pub fn invoke_prefix(&self) -> String {
        format!("/{}", self.run_prefix.trim_matches('/'))
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.worker_port)
    }

    pub fn lease_timeout(&self) -> Option<Duration> {
        self.lease_timeout_ms.map(Duration::from_millis)
    }
}
