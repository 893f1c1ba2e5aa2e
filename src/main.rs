//! nanogate -- HTTP gateway for datasets, pages and functions.
//!
//! Stateless: every request is translated into calls against the
//! configured storage and compute services. SIGTERM/SIGINT stop accepting
//! connections and wait for in-flight requests up to the shutdown timeout.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use nanogate::compute::backend::ComputeService;
use nanogate::config::Config;
use nanogate::storage::backend::BlobStore;

/// Command-line arguments for the nanogate server.
#[derive(Parser, Debug)]
#[command(
    name = "nanogate",
    version,
    about = "HTTP gateway for datasets, pages and functions"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "nanogate.example.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

/// Initialize tracing; `RUST_LOG` overrides the configured level.
fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn BlobStore>> {
    match config.storage.backend.as_str() {
        "aws" => {
            let store = nanogate::storage::aws::S3BlobStore::new(&config.storage).await?;
            Ok(Arc::new(store))
        }
        "memory" => {
            warn!("Using in-memory blob store; contents are lost on exit");
            Ok(Arc::new(nanogate::storage::memory::MemoryBlobStore::new()))
        }
        other => anyhow::bail!("unknown storage.backend '{other}' (expected aws or memory)"),
    }
}

async fn build_compute(config: &Config) -> anyhow::Result<Arc<dyn ComputeService>> {
    match config.compute.backend.as_str() {
        "aws" => {
            let compute =
                nanogate::compute::lambda::LambdaComputeService::new(&config.compute).await?;
            Ok(Arc::new(compute))
        }
        "memory" => {
            warn!("Using in-memory compute service; invocations echo their event");
            Ok(Arc::new(nanogate::compute::memory::MemoryComputeService::new()))
        }
        other => anyhow::bail!("unknown compute.backend '{other}' (expected aws or memory)"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = nanogate::config::load_config(&cli.config)?;
    init_tracing(&config);
    info!("Loaded configuration from {}", cli.config);

    let bind_addr = cli
        .bind
        .clone()
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        nanogate::metrics::init_metrics();
        nanogate::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let store = build_store(&config).await?;
    let compute = build_compute(&config).await?;
    let highlighter = nanogate::highlight::Highlighter::new()?;

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);

    let state = Arc::new(nanogate::AppState {
        config,
        store,
        compute,
        highlighter,
    });

    let app = nanogate::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("nanogate listening on {}", bind_addr);

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    let server = tokio::spawn(async move { server.await });

    // In-flight requests get `shutdown_timeout` once a signal arrives.
    tokio::select! {
        result = server => result??,
        _ = async {
            shutdown_signal().await;
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            warn!("Shutdown timeout elapsed; exiting with requests in flight");
        }
    }

    info!("nanogate shut down");

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
