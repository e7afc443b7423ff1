use faas_forward::{BenchmarkReporter, FileReporter, ForwardEngine, HttpTransport, NoopReporter};
use faas_history::HistoryTracker;
use faas_sandbox_pool::StaticHandlerPool;
use faas_telemetry::{ConstantCpuSampler, CpuSampler, ProcStatCpuSampler, TelemetrySampler};
use faas_worker_common::{HandlerPool, SandboxTransport};
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::WorkerError;
use crate::routes::{create_app, AppState, HISTORY_PATH, RID_PATH, STATUS_PATH};

/// Everything the HTTP layer needs, plus the pool for shutdown cleanup.
pub struct Worker {
    pub state: AppState,
    pub pool: Arc<dyn HandlerPool>,
}

impl Worker {
    pub fn build(config: &WorkerConfig) -> Result<Self, WorkerError> {
        let transport: Arc<dyn SandboxTransport> = Arc::new(HttpTransport::new()?);
        let pool: Arc<dyn HandlerPool> = Arc::new(
            StaticHandlerPool::new(transport)
                .with_lease_timeout(config.lease_timeout())
                .with_sandboxes(config.sandboxes.clone()),
        );
        Self::with_pool(config, pool)
    }

    /// Assembles the worker around an externally supplied handler pool.
    pub fn with_pool(config: &WorkerConfig, pool: Arc<dyn HandlerPool>) -> Result<Self, WorkerError> {
        let cpu: Arc<dyn CpuSampler> = if config.cpu_sampling {
            Arc::new(ProcStatCpuSampler::new())
        } else {
            Arc::new(ConstantCpuSampler::default())
        };
        let sampler = TelemetrySampler::new(cpu);

        let reporter: Arc<dyn BenchmarkReporter> = match &config.benchmark_file {
            Some(path) => {
                info!("Writing benchmark records to {}", path.display());
                Arc::new(FileReporter::create(path).map_err(|source| WorkerError::Benchmark {
                    path: path.clone(),
                    source,
                })?)
            }
            None => Arc::new(NoopReporter),
        };
        let engine = ForwardEngine::new(sampler.clone()).with_reporter(reporter);

        let history = Arc::new(HistoryTracker::new(config.history_capacity));
        let dispatcher = Dispatcher::new(pool.clone(), engine, history.clone())
            .with_max_body_bytes(config.max_body_bytes);

        Ok(Self {
            state: AppState::new(Arc::new(dispatcher), history, sampler),
            pool,
        })
    }
}

/// Serves until the listener fails or an interrupt arrives. On interrupt the
/// pool is cleaned up once; in-flight requests are not drained.
pub async fn run(config: WorkerConfig) -> Result<(), WorkerError> {
    let Worker { state, pool } = Worker::build(&config)?;
    let prefix = config.invoke_prefix();
    let app = create_app(state, &prefix);

    let listener = TcpListener::bind(config.listen_addr()).await?;
    let addr = listener.local_addr()?;

    info!("Execute handler by POSTing to {}{}/<lambda>", addr, prefix);
    info!("Get status by sending request to {}{}", addr, STATUS_PATH);
    info!("Discover available resources on this machine at {}{}", addr, RID_PATH);
    info!("Find the history of lambda invocations at {}{}", addr, HISTORY_PATH);

    tokio::select! {
        result = axum::serve(listener, app).into_future() => {
            if let Err(e) = &result {
                error!("Server error: {}", e);
            }
            result?;
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, cleaning up sandboxes");
            pool.cleanup().await;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
