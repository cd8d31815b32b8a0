//! Main entry point for the comic-downloader CLI

use clap::Parser;
use comic_downloader::cli::{self, Cli};
use comic_downloader::registry::ConnectorRegistry;
use comic_downloader::shutdown::{self, ShutdownCoordinator, ShutdownReason};
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("comic_downloader=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    // Install global shutdown coordinator and Ctrl+C handler
    let shutdown = ShutdownCoordinator::shared();
    shutdown::set_global_shutdown(shutdown.clone());
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl+C received - finishing in-flight pages...");
                shutdown.request_shutdown_with(ShutdownReason::UserInterrupt);
            }
        }
    });

    let registry = Arc::new(ConnectorRegistry::builder().build());

    match cli::run(&cli, registry, shutdown)
        .await
        .map_err(|e| anyhow::anyhow!(e))
    {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("Command failed: {}", e);
            std::process::exit(1);
        }
    }
}
