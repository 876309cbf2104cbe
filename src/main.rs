use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use windowgate::config::{GateConfig, StorageBackend, StorageConfig};
use windowgate::error::GateError;
use windowgate::http::HttpServer;
use windowgate::ratelimit::{MemoryStore, RateLimitGate, RedisStore, WindowStore};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "windowgate")]
#[command(about = "Sliding-window rate limiting gate for HTTP services")]
struct Args {
    /// Path to a configuration file (YAML, TOML or JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the bind address from the configuration
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }

    info!("Starting Windowgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = GateConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    info!(
        bind_addr = %config.bind_addr,
        requests = config.rate_limit_requests,
        window_secs = config.rate_limit_window_seconds,
        prefixes = ?config.rate_limit_protected_prefixes,
        backend = ?config.storage.backend,
        "Configuration loaded"
    );

    let store = build_store(&config.storage).await?;
    let gate = Arc::new(RateLimitGate::new(&config, store));
    info!("Rate limit gate initialized");

    let server = HttpServer::new(config.bind_addr, gate);

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Windowgate stopped");
    Ok(())
}

/// Create the configured window store.
async fn build_store(storage: &StorageConfig) -> Result<Arc<dyn WindowStore>, GateError> {
    match storage.backend {
        StorageBackend::Memory => {
            info!(
                purge_interval_secs = storage.purge_interval_secs,
                "Using in-process window store; counts are per instance"
            );
            let store = Arc::new(MemoryStore::new());
            store.clone().spawn_purge_task(storage.purge_interval());
            Ok(store as Arc<dyn WindowStore>)
        }
        StorageBackend::Redis => {
            let url = storage.redis_url.as_deref().ok_or_else(|| {
                GateError::Config("storage.redis_url is required for the redis backend".to_string())
            })?;
            let store = RedisStore::connect(url, storage.operation_timeout()).await?;
            Ok(Arc::new(store) as Arc<dyn WindowStore>)
        }
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
