//! Watch Party Core - shared library for the watch party orchestrator.
//!
//! This crate keeps groups of remote viewers watching the same media file in
//! lock-step. Operators create sessions over HTTP; playback clients connect
//! over WebSocket, advertise their devices and report their position. The
//! orchestrator answers with PLAY / PAUSE / SEEK / STOP commands.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`api`]: HTTP control surface, WebSocket handler and connection registry
//! - [`services`]: Sessions, scheduling, drift correction and credential checks
//! - [`protocol`]: Wire types exchanged with playback clients
//! - [`state`]: Configuration
//! - [`bootstrap`]: Composition root
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`ParticipantChannel`](services::ParticipantChannel): Device lookup and command delivery
//! - [`CredentialVerifier`](services::CredentialVerifier): Handshake credential checks
//! - [`Clock`](clock::Clock): Source of "now" in epoch milliseconds

#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod clock;
pub mod error;
pub mod protocol;
pub mod protocol_constants;
pub mod services;
pub mod state;

// Re-export commonly used types at the crate root
pub use clock::{now_millis, Clock, SystemClock};
pub use error::{ErrorCode, WatchPartyError, WatchPartyResult};
pub use protocol::{ClientMessage, Command, CommandType, Device};
pub use state::Config;

// Re-export service types
pub use services::{
    CredentialVerifier, HttpCredentialVerifier, Orchestrator, OrchestratorConfig,
    ParticipantChannel, Session, SessionSummary,
};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, BootstrappedServices};

// Re-export API types
pub use api::{serve, start_server, AppState, ConnectionRegistry, ServerError};
