//! WebSocket connection tracking and command delivery.
//!
//! - `ConnectionRegistry`: Maps usernames to their live connection
//! - `Connection`: Per-client outbound sink, authorized devices and last status
//! - `ConnectionGuard`: RAII guard for automatic cleanup on disconnect
//!
//! At most one connection exists per username. A newer connection for the
//! same user displaces the older one, whose handler is cancelled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::ErrorCode;
use crate::protocol::{normalize_devices, Command, CommandEnvelope, Device, DeviceRejection};
use crate::protocol_constants::SEND_TIMEOUT_SECS;
use crate::services::traits::{CommandDispatch, DeviceDirectory};

// ─────────────────────────────────────────────────────────────────────────────
// Transport Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Failure while delivering a frame to one client.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
    #[error("send failed: {0}")]
    Sink(String),
    #[error("failed to encode command: {0}")]
    Encode(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Outbound half of a client connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Writes one text frame.
    async fn send_text(&mut self, text: String) -> TransportResult<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Delivery Outcomes
// ─────────────────────────────────────────────────────────────────────────────

/// Result of delivering a command to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// No live connection for the username.
    Offline,
    Failed(String),
}

/// Per-recipient outcomes of a fan-out.
#[derive(Debug, Default, Clone)]
pub struct DispatchSummary {
    pub outcomes: Vec<(String, DeliveryOutcome)>,
}

impl DispatchSummary {
    /// Number of recipients that received their command.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == DeliveryOutcome::Delivered)
            .count()
    }

    /// Usernames whose delivery did not succeed (offline or failed).
    #[must_use]
    pub fn undelivered(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o != DeliveryOutcome::Delivered)
            .map(|(u, _)| u.as_str())
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection
// ─────────────────────────────────────────────────────────────────────────────

/// Last playback position reported by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStatus {
    pub filename: String,
    pub current_offset_ms: i64,
    pub last_update_ms: u64,
}

/// A live, identified client connection.
pub struct Connection {
    id: String,
    username: String,
    sink: tokio::sync::Mutex<Box<dyn FrameSink>>,
    authorized: RwLock<Vec<Device>>,
    status: Mutex<Option<ClientStatus>>,
    cancel_token: CancellationToken,
}

impl Connection {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Replaces the authorized device set with the valid entries of `entries`.
    ///
    /// Returns the rejected entries with their reasons.
    pub fn set_authorized_devices(&self, entries: &[Value]) -> Vec<(Value, DeviceRejection)> {
        let mut devices = Vec::with_capacity(entries.len());
        let mut rejected = Vec::new();
        for (entry, result) in entries.iter().zip(normalize_devices(entries)) {
            match result {
                Ok(device) => devices.push(device),
                Err(reason) => rejected.push((entry.clone(), reason)),
            }
        }
        *self.authorized.write() = devices;
        rejected
    }

    pub fn authorized_devices(&self) -> Vec<Device> {
        self.authorized.read().clone()
    }

    pub fn set_status(&self, status: ClientStatus) {
        *self.status.lock() = Some(status);
    }

    pub fn last_status(&self) -> Option<ClientStatus> {
        self.status.lock().clone()
    }

    /// Sends one command frame, bounded by the send timeout.
    pub async fn send(&self, cmd: &Command) -> TransportResult<()> {
        if self.cancel_token.is_cancelled() {
            return Err(TransportError::Closed);
        }

        let text = CommandEnvelope::new(cmd)
            .to_json()
            .map_err(|e| TransportError::Encode(e.to_string()))?;
        tracing::debug!(
            username = %self.username,
            connection = %self.id,
            payload = %text,
            "sending command"
        );

        let limit = Duration::from_secs(SEND_TIMEOUT_SECS);
        let write = async {
            let mut sink = self.sink.lock().await;
            sink.send_text(text).await
        };
        match tokio::time::timeout(limit, write).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(limit)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Tracks the live connection of every identified client.
///
/// Uses hierarchical cancellation tokens so that `close_all` can
/// force-close every handler at once.
pub struct ConnectionRegistry {
    /// username -> connection
    connections: DashMap<String, Arc<Connection>>,
    next_id: AtomicU64,
    /// Replaced after close_all() so new connections can still be accepted.
    global_cancel: RwLock<CancellationToken>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            global_cancel: RwLock::new(CancellationToken::new()),
        }
    }

    /// Registers a connection for `username` and returns a guard for RAII cleanup.
    ///
    /// Any existing connection for the same username is cancelled and replaced.
    pub fn register(self: &Arc<Self>, username: &str, sink: Box<dyn FrameSink>) -> ConnectionGuard {
        let id = format!("ws-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel_token = self.global_cancel.read().child_token();

        let connection = Arc::new(Connection {
            id: id.clone(),
            username: username.to_string(),
            sink: tokio::sync::Mutex::new(sink),
            authorized: RwLock::new(Vec::new()),
            status: Mutex::new(None),
            cancel_token,
        });

        if let Some(previous) = self
            .connections
            .insert(username.to_string(), Arc::clone(&connection))
        {
            log::info!(
                "[WS] Connection {} for '{}' displaced by {}",
                previous.id,
                username,
                id
            );
            previous.cancel_token.cancel();
        }

        log::info!(
            "[WS] Connection registered: {} user='{}' (total: {})",
            id,
            username,
            self.connections.len()
        );

        ConnectionGuard {
            connection,
            registry: Arc::clone(self),
        }
    }

    /// Removes `connection` unless it has already been displaced.
    fn unregister(&self, connection: &Connection) {
        let removed = self
            .connections
            .remove_if(&connection.username, |_, current| current.id == connection.id);
        if removed.is_some() {
            log::info!(
                "[WS] Connection unregistered: {} user='{}' (remaining: {})",
                connection.id,
                connection.username,
                self.connections.len()
            );
        }
    }

    /// Returns the live connection for `username`.
    pub fn get(&self, username: &str) -> Option<Arc<Connection>> {
        self.connections.get(username).map(|c| Arc::clone(c.value()))
    }

    /// Usernames with a live connection, sorted.
    pub fn connected_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.connections.iter().map(|e| e.key().clone()).collect();
        users.sort();
        users
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Force-closes all connections.
    ///
    /// Returns the number of connections that were signaled to close.
    pub fn close_all(&self) -> usize {
        let count = self.connections.len();
        if count > 0 {
            log::info!("[WS] Force-closing {} connection(s)", count);
            let mut guard = self.global_cancel.write();
            guard.cancel();
            *guard = CancellationToken::new();
        } else {
            log::info!("[WS] close_all called but no connections to close");
        }
        count
    }

    async fn deliver(
        connection: Option<Arc<Connection>>,
        username: String,
        cmd: Command,
    ) -> (String, DeliveryOutcome) {
        let Some(connection) = connection else {
            log::debug!("[WS] {} is offline, dropping {:?}", username, cmd.kind);
            return (username, DeliveryOutcome::Offline);
        };
        let outcome = match connection.send(&cmd).await {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(e) => {
                log::warn!(
                    "[WS] Failed to send {:?} to {} ({}): {}",
                    cmd.kind,
                    username,
                    e.code(),
                    e
                );
                DeliveryOutcome::Failed(e.to_string())
            }
        };
        (username, outcome)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceDirectory for ConnectionRegistry {
    async fn authorized_devices(&self, username: &str) -> Vec<Device> {
        self.get(username)
            .map(|c| c.authorized_devices())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CommandDispatch for ConnectionRegistry {
    async fn send(&self, username: &str, cmd: Command) -> DeliveryOutcome {
        Self::deliver(self.get(username), username.to_string(), cmd)
            .await
            .1
    }

    async fn send_many(&self, commands: HashMap<String, Command>) -> DispatchSummary {
        // Resolve every recipient before the first send goes out.
        let targets: Vec<_> = commands
            .into_iter()
            .map(|(username, cmd)| (self.get(&username), username, cmd))
            .collect();
        let sends = targets
            .into_iter()
            .map(|(connection, username, cmd)| Self::deliver(connection, username, cmd));
        let outcomes = join_all(sends).await;
        DispatchSummary { outcomes }
    }
}

/// RAII guard that unregisters a connection when dropped.
pub struct ConnectionGuard {
    connection: Arc<Connection>,
    registry: Arc<ConnectionRegistry>,
}

impl ConnectionGuard {
    pub fn id(&self) -> &str {
        &self.connection.id
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Cancelled on force-close or when displaced by a newer connection.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.connection.cancel_token
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.connection);
    }
}
