//! favisend entry point.
//!
//! Builds the ledger store described by the configuration and keeps it alive
//! until the process is asked to stop. The `Arc<dyn LedgerStore>` built here is
//! the handle that request handlers receive.

use anyhow::Context;
use favisend_common::{Config, LoggingConfig};
use favisend_core::open_ledger;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

/// `RUST_LOG` wins over the configured filter.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    dotenvy::dotenv().ok();

    let config = Config::load().context("failed to load configuration")?;
    init_tracing(&config.logging);

    info!(
        backend = ?config.ledger.backend,
        earnings_per_download = config.ledger.earnings_per_download,
        credit_anonymous_downloads = config.ledger.credit_anonymous_downloads,
        "Starting favisend..."
    );

    let ledger = open_ledger(&config)
        .await
        .context("failed to open ledger store")?;

    // Fail fast when the store is unreachable.
    let recent = ledger
        .list_recent_files(Some(1))
        .await
        .context("ledger store is not readable")?;
    info!(has_files = !recent.is_empty(), "Ledger store ready");

    shutdown_signal().await;

    drop(ledger);
    info!("Shutdown complete");
    Ok(())
}
