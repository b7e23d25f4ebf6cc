//! Centralized error types for the watch party core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::api::ws_connection::TransportError;
use crate::services::credentials::VerificationError;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for TransportError {
    fn code(&self) -> &'static str {
        match self {
            Self::Closed => "connection_closed",
            Self::Timeout(_) => "send_timeout",
            Self::Sink(_) => "send_failed",
            Self::Encode(_) => "encode_failed",
        }
    }
}

impl ErrorCode for VerificationError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotConfigured => "verifier_not_configured",
            Self::Http(_) => "verifier_unreachable",
            Self::HttpStatus(_) => "verifier_error_status",
            Self::MalformedResponse(_) => "verifier_malformed_response",
        }
    }
}

/// Application-wide error type for the watch party server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum WatchPartyError {
    /// Requested session ID does not exist.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// User is not a participant of the addressed session.
    #[error("Participant not found: {0}")]
    ParticipantNotFound(String),

    /// Requested device is not in the caller's authorized set.
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// Operation is not valid for the session's current state
    /// (e.g. starting before the scheduled time).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Connection identity could not be verified.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Server configuration error (missing required settings).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WatchPartyError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "session_not_found",
            Self::ParticipantNotFound(_) => "participant_not_found",
            Self::NotAuthorized(_) => "not_authorized",
            Self::InvalidState(_) => "invalid_state",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) | Self::ParticipantNotFound(_) => StatusCode::NOT_FOUND,
            Self::NotAuthorized(_) => StatusCode::FORBIDDEN,
            Self::InvalidState(_) => StatusCode::CONFLICT,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Result Type Aliases
// ─────────────────────────────────────────────────────────────────────────────

pub use crate::api::ws_connection::TransportResult;
pub use crate::services::credentials::VerificationResult;

/// Convenient Result alias for application-wide operations.
pub type WatchPartyResult<T> = Result<T, WatchPartyError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for WatchPartyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<VerificationError> for WatchPartyError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::NotConfigured => Self::Configuration(err.to_string()),
            other => Self::Unauthenticated(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_not_found_maps_to_404() {
        let err = WatchPartyError::SessionNotFound("abc".into());
        assert_eq!(err.code(), "session_not_found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_state_maps_to_conflict() {
        let err = WatchPartyError::InvalidState("scheduled start is in the future".into());
        assert_eq!(err.code(), "invalid_state");
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn not_authorized_is_distinct_from_unauthenticated() {
        assert_eq!(
            WatchPartyError::NotAuthorized("device".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            WatchPartyError::Unauthenticated("passkey".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn unconfigured_verifier_is_a_configuration_error() {
        let err: WatchPartyError = VerificationError::NotConfigured.into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let err: WatchPartyError = VerificationError::HttpStatus(500).into();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn transport_error_codes() {
        assert_eq!(TransportError::Closed.code(), "connection_closed");
        assert_eq!(
            TransportError::Timeout(std::time::Duration::from_secs(1)).code(),
            "send_timeout"
        );
    }
}
