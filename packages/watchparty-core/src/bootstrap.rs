//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together:
//!
//! - **Clarity**: All dependency relationships are visible in one place
//! - **Testability**: Easy to swap implementations for testing

use std::sync::Arc;

use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::api::ConnectionRegistry;
use crate::clock::{Clock, SystemClock};
use crate::error::{WatchPartyError, WatchPartyResult};
use crate::services::{
    CredentialVerifier, HttpCredentialVerifier, Orchestrator, ParticipantChannel,
};
use crate::state::Config;

/// Container for all bootstrapped services.
///
/// It's consumed by `AppState` to build the final application state.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Owns all sessions and their scheduling.
    pub orchestrator: Arc<Orchestrator>,
    /// Live client connections by username.
    pub registry: Arc<ConnectionRegistry>,
    /// Checks WebSocket handshake credentials.
    pub verifier: Arc<dyn CredentialVerifier>,
    /// Source of "now" shared by all services.
    pub clock: Arc<dyn Clock>,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Initiates graceful shutdown of all services.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        self.cancel_token.cancel();

        let tasks = self.orchestrator.stop_background_tasks();
        log::info!("[Bootstrap] Stopped {} scheduled task(s)", tasks);

        let connections = self.registry.close_all();
        if connections > 0 {
            log::info!("[Bootstrap] Closed {} WebSocket connection(s)", connections);
        }

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Creates the shared HTTP client used for credential verification.
fn create_http_client(config: &Config) -> WatchPartyResult<Client> {
    Client::builder()
        .timeout(config.verify_timeout())
        .build()
        .map_err(|e| WatchPartyError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Bootstraps all application services with their dependencies.
///
/// Services are created in dependency order:
///
/// 1. Shared infrastructure (clock, HTTP client, cancellation token)
/// 2. Connection registry
/// 3. Orchestrator (depends on registry and clock)
/// 4. Credential verifier (depends on HTTP client)
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the HTTP client
/// cannot be built.
pub fn bootstrap_services(config: &Config) -> WatchPartyResult<BootstrappedServices> {
    config.validate().map_err(WatchPartyError::Configuration)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let http_client = create_http_client(config)?;
    let cancel_token = CancellationToken::new();

    let registry = Arc::new(ConnectionRegistry::new());

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&registry) as Arc<dyn ParticipantChannel>,
        Arc::clone(&clock),
        config.to_orchestrator_config(),
    ));

    let http_verifier = HttpCredentialVerifier::new(
        http_client,
        config.passkey_validation_url.clone(),
        config.verify_timeout(),
    );
    if !http_verifier.is_configured() {
        log::warn!("[Bootstrap] No passkey validation URL configured; all connections will be refused");
    }
    let verifier: Arc<dyn CredentialVerifier> = Arc::new(http_verifier);

    Ok(BootstrappedServices {
        orchestrator,
        registry,
        verifier,
        clock,
        cancel_token,
    })
}
