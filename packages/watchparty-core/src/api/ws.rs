//! WebSocket handler for playback clients.
//!
//! Clients connect to `/ws?username=..&passkey=..`. Credentials are checked
//! before the upgrade; a refused handshake never reaches the registry.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures::sink::SinkExt;
use futures::stream::{SplitSink, StreamExt};
use serde::Deserialize;

use crate::api::ws_connection::{ClientStatus, Connection, FrameSink, TransportError, TransportResult};
use crate::api::AppState;
use crate::error::{ErrorCode, WatchPartyError, WatchPartyResult};
use crate::protocol::ClientMessage;
use crate::services::Orchestrator;

// ─────────────────────────────────────────────────────────────────────────────
// Handshake
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct WsParams {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    passkey: Option<String>,
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Verifies the caller's identity, then upgrades the connection.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> WatchPartyResult<Response> {
    let (Some(username), Some(passkey)) = (required(params.username), required(params.passkey))
    else {
        log::warn!("[WS] Refused connection without username/passkey");
        return Err(WatchPartyError::Unauthenticated(
            "username and passkey are required".into(),
        ));
    };

    match state.verifier.verify(&username, &passkey).await {
        Ok(true) => {}
        Ok(false) => {
            log::warn!("[WS] Refused connection for {}: invalid passkey", username);
            return Err(WatchPartyError::Unauthenticated("invalid passkey".into()));
        }
        Err(e) => {
            log::warn!("[WS] Refused connection for {} ({}): {}", username, e.code(), e);
            return Err(e.into());
        }
    }

    Ok(ws
        .on_upgrade(move |socket| handle_ws(socket, state, username))
        .into_response())
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection Loop
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl FrameSink for SplitSink<WebSocket, Message> {
    async fn send_text(&mut self, text: String) -> TransportResult<()> {
        self.send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Sink(e.to_string()))
    }
}

async fn handle_ws(socket: WebSocket, state: AppState, username: String) {
    let (sender, mut receiver) = socket.split();

    let conn_guard = state.registry.register(&username, Box::new(sender));
    let cancel_token = conn_guard.cancel_token().clone();

    log::info!("[WS] {} connected: {}", username, conn_guard.id());

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log::info!("[WS] Connection force-closed: {}", conn_guard.id());
                break;
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&state.orchestrator, conn_guard.connection(), text.as_str()).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    log::info!("[WS] {} disconnected: {}", username, conn_guard.id());
}

/// Applies one inbound text frame from `connection`.
///
/// Malformed frames are logged and ignored.
pub(crate) async fn handle_client_message(orchestrator: &Orchestrator, connection: &Connection, text: &str) {
    let receive_ms = orchestrator.now_millis();

    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Register { authorized_clients }) => {
            let rejected = connection.set_authorized_devices(&authorized_clients);
            for (entry, reason) in &rejected {
                log::warn!(
                    "[WS] Ignoring device entry from {} ({}): {}",
                    connection.username(),
                    reason,
                    entry
                );
            }
            log::info!(
                "[WS] {} registered {} device(s)",
                connection.username(),
                authorized_clients.len() - rejected.len()
            );
        }
        Ok(ClientMessage::StatusUpdate {
            filename: Some(filename),
            current_offset,
        }) if !filename.is_empty() => {
            let adjusted = orchestrator
                .handle_client_status_update(connection.username(), &filename, current_offset, receive_ms)
                .await;
            connection.set_status(ClientStatus {
                filename,
                current_offset_ms: adjusted.unwrap_or(current_offset),
                last_update_ms: receive_ms,
            });
        }
        Ok(ClientMessage::StatusUpdate { .. }) => {
            log::debug!("[WS] Ignoring status update without filename from {}", connection.username());
        }
        Err(e) => {
            log::debug!("[WS] Ignoring malformed message from {}: {}", connection.username(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::Value;

    use crate::api::ConnectionRegistry;
    use crate::clock::SystemClock;
    use crate::protocol::Device;
    use crate::services::{OrchestratorConfig, ParticipantChannel};

    struct RecordingSink(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl FrameSink for RecordingSink {
        async fn send_text(&mut self, text: String) -> TransportResult<()> {
            self.0.lock().push(text);
            Ok(())
        }
    }

    fn setup() -> (Arc<Orchestrator>, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&registry) as Arc<dyn ParticipantChannel>,
            Arc::new(SystemClock::new()),
            OrchestratorConfig::default(),
        ));
        (orchestrator, registry)
    }

    #[tokio::test]
    async fn register_stores_valid_devices() {
        let (orchestrator, registry) = setup();
        let frames = Arc::new(Mutex::new(Vec::new()));
        let guard = registry.register("alice", Box::new(RecordingSink(frames)));

        handle_client_message(
            &orchestrator,
            guard.connection(),
            r#"{"type":"register","authorized_clients":[{"title":"TV","id":"m1"},{"title":""}]}"#,
        )
        .await;

        assert_eq!(
            guard.connection().authorized_devices(),
            vec![Device::new("TV", "m1")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn status_update_seeks_drifted_client_and_caches_status() {
        let (orchestrator, registry) = setup();
        let frames = Arc::new(Mutex::new(Vec::new()));
        let guard = registry.register("alice", Box::new(RecordingSink(Arc::clone(&frames))));
        let connection = Arc::clone(guard.connection());

        handle_client_message(
            &orchestrator,
            &connection,
            r#"{"type":"register","authorized_clients":[{"title":"TV","id":"m1"}]}"#,
        )
        .await;

        let now = orchestrator.now_millis();
        let id = orchestrator.create_session("movie.mkv", 3_600_000, now).unwrap().id;
        orchestrator.start_session(&id).await.unwrap();
        orchestrator.add_participant(&id, "alice", "TV").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        frames.lock().clear();

        handle_client_message(
            &orchestrator,
            &connection,
            r#"{"type":"status_update","filename":"movie.mkv","current_offset":"1000"}"#,
        )
        .await;

        let frames = frames.lock();
        assert_eq!(frames.len(), 1);
        let json: Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(json["cmd"]["type"], "seek");
        assert_eq!(json["cmd"]["device"]["id"], "m1");

        let status = connection.last_status().unwrap();
        assert_eq!(status.filename, "movie.mkv");
        assert_eq!(status.current_offset_ms, 1000);
    }

    #[tokio::test]
    async fn status_update_without_session_keeps_reported_offset() {
        let (orchestrator, registry) = setup();
        let frames = Arc::new(Mutex::new(Vec::new()));
        let guard = registry.register("alice", Box::new(RecordingSink(Arc::clone(&frames))));

        handle_client_message(
            &orchestrator,
            guard.connection(),
            r#"{"type":"status_update","filename":"other.mkv","current_offset":4200}"#,
        )
        .await;

        assert_eq!(guard.connection().last_status().unwrap().current_offset_ms, 4200);
        assert!(frames.lock().is_empty());
    }

    #[tokio::test]
    async fn malformed_and_filename_less_messages_are_ignored() {
        let (orchestrator, registry) = setup();
        let frames = Arc::new(Mutex::new(Vec::new()));
        let guard = registry.register("alice", Box::new(RecordingSink(frames)));

        handle_client_message(&orchestrator, guard.connection(), "not json").await;
        handle_client_message(&orchestrator, guard.connection(), r#"{"type":"dance"}"#).await;
        handle_client_message(
            &orchestrator,
            guard.connection(),
            r#"{"type":"status_update","current_offset":10}"#,
        )
        .await;

        assert!(guard.connection().last_status().is_none());
        assert!(guard.connection().authorized_devices().is_empty());
    }
}
