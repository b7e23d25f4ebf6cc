//! Trait abstractions for reaching participants.
//!
//! The orchestrator depends on these traits rather than on the WebSocket
//! registry directly, so tests can substitute recording implementations.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::api::ws_connection::{DeliveryOutcome, DispatchSummary};
use crate::protocol::{Command, Device};

/// Lookup of the devices each user has registered as controllable.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// Returns the devices `username` is authorized to control.
    ///
    /// Empty when the user has no live connection or never registered.
    async fn authorized_devices(&self, username: &str) -> Vec<Device>;
}

/// Delivery of playback commands to connected users.
#[async_trait]
pub trait CommandDispatch: Send + Sync {
    /// Sends one command to one user.
    async fn send(&self, username: &str, cmd: Command) -> DeliveryOutcome;

    /// Sends each user their own command concurrently.
    ///
    /// A slow or failing recipient never delays or prevents delivery to
    /// the others.
    async fn send_many(&self, commands: HashMap<String, Command>) -> DispatchSummary;
}

/// Combined trait for everything the orchestrator needs from the transport.
pub trait ParticipantChannel: DeviceDirectory + CommandDispatch {}

/// Blanket implementation for any type implementing all traits.
impl<T: DeviceDirectory + CommandDispatch> ParticipantChannel for T {}
