//! envcache - A multi-tenant in-memory cache server
//!
//! Listens for JSON datagrams, dispatches them through a bounded worker
//! scheduler, and answers each request with a correlated response.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use envcache::persist::{FilePersistence, Persistence};
use envcache::registry::EnvironmentRegistry;
use envcache::server::{ServerContext, Worker};
use envcache::transport::UdpTransport;
use envcache::Config;

/// Main entry point for the envcache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open file persistence when a data directory is configured
/// 4. Build the environment registry and bootstrap the default environment
/// 5. Bind the UDP transport
/// 6. Start the worker scheduler
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber with env filter
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "envcache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting envcache server at {}", chrono::Utc::now().to_rfc3339());

    // Load configuration from environment variables
    let config = Config::from_env();
    info!(
        "Configuration loaded: port={}, max_concurrent_tasks={}, default_max_size={}",
        config.server_port, config.max_concurrent_tasks, config.default_max_size
    );

    // File persistence is optional; without it every environment is volatile
    let persistence: Option<Arc<dyn Persistence>> = match &config.data_dir {
        Some(dir) => {
            let persistence = FilePersistence::new(dir)?;
            info!("Persisting items under {}", dir.display());
            Some(Arc::new(persistence))
        }
        None => None,
    };

    let registry = Arc::new(EnvironmentRegistry::new(persistence));
    registry
        .bootstrap_default(&config.default_security_key, config.default_max_size)
        .await;

    // Bind the transport
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let (transport, inbound) = UdpTransport::bind(addr).await?;
    info!("Server listening on udp://{}", transport.local_addr()?);

    // Start the worker scheduler
    let context = Arc::new(ServerContext::new(registry, Arc::new(transport)));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = Worker::new(context, config.worker_settings()).spawn(inbound, shutdown_rx);

    shutdown_signal().await;

    // The worker stops the transport and drains in-flight tasks
    if shutdown_tx.send(true).is_err() {
        warn!("Worker already stopped");
    }
    worker.await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
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
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
