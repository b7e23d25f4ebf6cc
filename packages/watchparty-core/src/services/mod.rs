//! Application services layer.
//!
//! This module contains the business logic that sits between the API layer
//! and connected clients: session state, scheduling and credential checks.

pub mod credentials;
pub mod orchestrator;
pub(crate) mod scheduler;
pub mod session;
pub mod traits;

pub use credentials::{CredentialVerifier, HttpCredentialVerifier};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use session::{Participant, PauseInterval, Session, SessionSummary};
pub use traits::{CommandDispatch, DeviceDirectory, ParticipantChannel};
