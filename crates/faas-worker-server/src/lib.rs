//! HTTP front of a function worker node: accepts invocations, forwards them
//! to leased sandboxes and wraps the answers with host telemetry.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod routes;
pub mod server;

pub use config::{ConfigError, WorkerConfig};
pub use dispatcher::{function_name, path_segments, Dispatcher};
pub use error::{DispatchError, WorkerError, MISSING_FUNCTION_NAME};
pub use routes::{create_app, AppState};
pub use server::{run, Worker};
