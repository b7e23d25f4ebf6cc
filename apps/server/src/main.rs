//! Watch Party Server - standalone server for the watch party orchestrator.
//!
//! Hosts the HTTP control API and the WebSocket endpoint that playback
//! clients connect to.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::RwLock;
use tokio::signal;
use watchparty_core::{bootstrap_services, start_server, AppState};

use crate::config::ServerConfig;

/// Watch Party Server - keeps remote viewers in sync.
#[derive(Parser, Debug)]
#[command(name = "watchparty-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "WATCHPARTY_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Passkey validation endpoint (overrides config file).
    #[arg(long, value_name = "URL")]
    passkey_validation_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Watch Party Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // CLI wins over file and environment
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(url) = args.passkey_validation_url {
        config.passkey_validation_url = Some(url);
    }

    log::info!(
        "Configuration: bind={}:{}, drift_threshold={}ms, pause_duration={}s",
        config.bind_address,
        config.bind_port,
        config.drift_threshold_ms,
        config.pause_duration_secs
    );

    let core_config = config.to_core_config();
    let services = bootstrap_services(&core_config).context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    let app_state = AppState::new(&services, Arc::new(RwLock::new(core_config)));

    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state).await {
            log::error!("Server error: {}", e);
        }
    });

    tokio::select! {
        _ = shutdown_signal() => {
            log::info!("Shutdown signal received, cleaning up...");
        }
        _ = services.cancel_token.cancelled() => {}
    }

    services.shutdown().await;

    // The listener drains on cancellation; don't wait on stuck clients.
    if tokio::time::timeout(std::time::Duration::from_secs(5), server_handle)
        .await
        .is_err()
    {
        log::warn!("Server did not stop within 5s");
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
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
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
