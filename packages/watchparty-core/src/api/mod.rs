//! HTTP/WebSocket API layer.
//!
//! This module contains thin handlers that delegate to services.
//! It provides the router construction and server startup functionality.

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::bootstrap::BootstrappedServices;
use crate::services::{CredentialVerifier, Orchestrator};
use crate::state::Config;

pub mod http;
pub mod ws;
pub mod ws_connection;

pub use ws_connection::ConnectionRegistry;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an I/O error.
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared application state for the API layer.
///
/// This is a thin wrapper that holds references to services.
/// All business logic lives in the services themselves.
#[derive(Clone)]
pub struct AppState {
    /// Owns all sessions and their scheduling.
    pub orchestrator: Arc<Orchestrator>,
    /// Live client connections by username.
    pub registry: Arc<ConnectionRegistry>,
    /// Checks WebSocket handshake credentials.
    pub verifier: Arc<dyn CredentialVerifier>,
    /// Application configuration.
    pub config: Arc<RwLock<Config>>,
    /// Cancelled when the server should stop accepting requests.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(services: &BootstrappedServices, config: Arc<RwLock<Config>>) -> Self {
        Self {
            orchestrator: Arc::clone(&services.orchestrator),
            registry: Arc::clone(&services.registry),
            verifier: Arc::clone(&services.verifier),
            config,
            shutdown: services.cancel_token.clone(),
        }
    }
}

/// Binds the configured address and serves until shutdown.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let addr = {
        let config = state.config.read();
        format!("{}:{}", config.bind_address, config.preferred_port)
    };
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    log::info!("[Server] Listening on http://{}", listener.local_addr()?);
    serve(listener, state).await
}

/// Serves the API on an already bound listener until the shutdown token fires.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), ServerError> {
    let shutdown = state.shutdown.clone();
    let app = http::create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    log::info!("[Server] Stopped");
    Ok(())
}
