//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to the orchestrator and the
//! connection registry. The control surface carries no authentication of
//! its own and is meant to be reachable only from trusted operators.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::error::{WatchPartyError, WatchPartyResult};
use crate::protocol::Device;
use crate::protocol_constants::SERVICE_ID;
use crate::services::{DeviceDirectory, SessionSummary};

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    filename: String,
    duration_ms: u64,
    /// Defaults to now.
    #[serde(default)]
    scheduled_start_ms: Option<u64>,
}

#[derive(Deserialize)]
struct JoinRequest {
    username: String,
    device: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/sessions/{id}/start", post(start_session))
        .route("/api/sessions/{id}/pause", post(pause_session))
        .route("/api/sessions/{id}/resume", post(resume_session))
        .route("/api/sessions/{id}/participants", post(join_session))
        .route(
            "/api/sessions/{id}/participants/{username}",
            delete(leave_session),
        )
        .route("/api/participants/{username}", delete(leave_any_session))
        .route("/api/users", get(list_users))
        .route("/api/users/{username}/devices", get(list_user_devices))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "sessions": state.orchestrator.session_count(),
        "connections": state.registry.connection_count(),
    }))
}

async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    Json(state.orchestrator.list_sessions())
}

async fn create_session(
    State(state): State<AppState>,
    Json(payload): Json<CreateSessionRequest>,
) -> WatchPartyResult<impl IntoResponse> {
    let start = payload
        .scheduled_start_ms
        .unwrap_or_else(|| state.orchestrator.now_millis());
    let summary = state
        .orchestrator
        .create_session(&payload.filename, payload.duration_ms, start)?;
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn get_session(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> WatchPartyResult<Json<SessionSummary>> {
    Ok(Json(state.orchestrator.session(&id)?))
}

async fn start_session(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> WatchPartyResult<Json<SessionSummary>> {
    state.orchestrator.start_session(&id).await?;
    Ok(Json(state.orchestrator.session(&id)?))
}

async fn pause_session(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> WatchPartyResult<Json<SessionSummary>> {
    state.orchestrator.pause_session(&id).await?;
    Ok(Json(state.orchestrator.session(&id)?))
}

async fn resume_session(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> WatchPartyResult<Json<SessionSummary>> {
    state.orchestrator.resume_session(&id).await?;
    Ok(Json(state.orchestrator.session(&id)?))
}

async fn join_session(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<JoinRequest>,
) -> WatchPartyResult<Json<SessionSummary>> {
    state
        .orchestrator
        .add_participant(&id, &payload.username, &payload.device)
        .await?;
    Ok(Json(state.orchestrator.session(&id)?))
}

async fn leave_session(
    Path((id, username)): Path<(String, String)>,
    State(state): State<AppState>,
) -> WatchPartyResult<Json<SessionSummary>> {
    state.orchestrator.remove_participant(&id, &username).await?;
    Ok(Json(state.orchestrator.session(&id)?))
}

async fn leave_any_session(
    Path(username): Path<String>,
    State(state): State<AppState>,
) -> WatchPartyResult<Json<SessionSummary>> {
    let id = state
        .orchestrator
        .find_participant_session(&username)
        .ok_or_else(|| {
            WatchPartyError::ParticipantNotFound(format!("{} is not in any session", username))
        })?;
    state.orchestrator.remove_participant(&id, &username).await?;
    Ok(Json(state.orchestrator.session(&id)?))
}

async fn list_users(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.registry.connected_users())
}

async fn list_user_devices(
    Path(username): Path<String>,
    State(state): State<AppState>,
) -> Json<Vec<Device>> {
    Json(state.registry.authorized_devices(&username).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::RwLock;
    use serde_json::Value;

    use crate::bootstrap::bootstrap_services;
    use crate::state::Config;

    async fn spawn_app() -> String {
        let config = Config::default();
        let services = bootstrap_services(&config).unwrap();
        let state = AppState::new(&services, Arc::new(RwLock::new(config)));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(crate::api::serve(listener, state));
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let base = spawn_app().await;
        let body: Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], SERVICE_ID);
        assert_eq!(body["sessions"], 0);
    }

    #[tokio::test]
    async fn create_then_fetch_session() {
        let base = spawn_app().await;
        let client = reqwest::Client::new();

        let start = crate::clock::now_millis() + 3_600_000;
        let res = client
            .post(format!("{}/api/sessions", base))
            .json(&json!({"filename": "movie.mkv", "durationMs": 3_600_000u64, "scheduledStartMs": start}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::CREATED);
        let created: Value = res.json().await.unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(created["startMs"], Value::Null);

        let fetched: Value = client
            .get(format!("{}/api/sessions/{}", base, id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(fetched["filename"], "movie.mkv");

        let listed: Value = client
            .get(format!("{}/api/sessions", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);

        // Scheduled an hour from now.
        let res = client
            .post(format!("{}/api/sessions/{}/start", base, id))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::CONFLICT);
        let err: Value = res.json().await.unwrap();
        assert_eq!(err["error"], "invalid_state");
    }

    #[tokio::test]
    async fn errors_map_to_status_codes() {
        let base = spawn_app().await;
        let client = reqwest::Client::new();

        let res = client
            .post(format!("{}/api/sessions/missing/pause", base))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::NOT_FOUND);

        let res = client
            .post(format!("{}/api/sessions", base))
            .json(&json!({"filename": "", "durationMs": 1000}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST);

        let res = client
            .delete(format!("{}/api/participants/nobody", base))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn join_without_registered_device_is_forbidden() {
        let base = spawn_app().await;
        let client = reqwest::Client::new();

        let created: Value = client
            .post(format!("{}/api/sessions", base))
            .json(&json!({"filename": "movie.mkv", "durationMs": 3_600_000u64}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap();

        let res = client
            .post(format!("{}/api/sessions/{}/participants", base, id))
            .json(&json!({"username": "alice", "device": "TV"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::FORBIDDEN);

        let devices: Value = client
            .get(format!("{}/api/users/alice/devices", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(devices, json!([]));
    }
}
