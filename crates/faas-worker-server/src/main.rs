use color_eyre::eyre;
use faas_worker_server::WorkerConfig;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,faas_worker_server=debug")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("FAAS_WORKER_CONFIG").map(PathBuf::from));

    let config = WorkerConfig::load(config_path.as_deref())?;
    info!("Config: {:?}", config);

    faas_worker_server::run(config).await?;
    Ok(())
}
