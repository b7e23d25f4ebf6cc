//! Credential verification against an external endpoint.
//!
//! The server never stores passkeys. Each WebSocket handshake is checked by
//! POSTing `{username, passkey}` to the configured validation URL, which
//! must answer HTTP 200 with `{"valid": true}`. Anything else fails closed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur while verifying credentials.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// No validation URL is configured.
    #[error("passkey validation is not configured")]
    NotConfigured,

    /// The request to the verifier failed (connect error, timeout).
    #[error("verifier request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The verifier answered with a non-success status.
    #[error("verifier returned HTTP {0}")]
    HttpStatus(u16),

    /// The verifier's body was not the expected JSON.
    #[error("malformed verifier response: {0}")]
    MalformedResponse(String),
}

/// Convenient Result alias for verification operations.
pub type VerificationResult<T> = Result<T, VerificationError>;

/// Checks a username/passkey pair.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Returns `Ok(true)` only when the credentials are confirmed valid.
    async fn verify(&self, username: &str, passkey: &str) -> VerificationResult<bool>;
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    username: &'a str,
    passkey: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    valid: bool,
}

/// Verifier that calls an HTTP validation endpoint.
pub struct HttpCredentialVerifier {
    client: Client,
    url: Option<String>,
    timeout: Duration,
}

impl HttpCredentialVerifier {
    pub fn new(client: Client, url: Option<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.filter(|u| !u.trim().is_empty()),
            timeout,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }
}

#[async_trait]
impl CredentialVerifier for HttpCredentialVerifier {
    async fn verify(&self, username: &str, passkey: &str) -> VerificationResult<bool> {
        let url = self.url.as_deref().ok_or(VerificationError::NotConfigured)?;

        log::debug!("[Auth] Verifying credentials for {} via {}", username, url);
        let response = self
            .client
            .post(url)
            .json(&VerifyRequest { username, passkey })
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(VerificationError::HttpStatus(status.as_u16()));
        }

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| VerificationError::MalformedResponse(e.to_string()))?;

        log::info!(
            "[Auth] Credentials for {} {}",
            username,
            if body.valid { "accepted" } else { "rejected" }
        );
        Ok(body.valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn spawn_verifier() -> String {
        async fn check(Json(body): Json<Value>) -> (AxumStatus, Json<Value>) {
            match (body["username"].as_str(), body["passkey"].as_str()) {
                (Some("alice"), Some("open-sesame")) => (AxumStatus::OK, Json(json!({"valid": true}))),
                (Some("broken"), _) => (AxumStatus::INTERNAL_SERVER_ERROR, Json(json!({}))),
                (Some("garbled"), _) => (AxumStatus::OK, Json(json!("not an object"))),
                _ => (AxumStatus::OK, Json(json!({"valid": false}))),
            }
        }

        let app = Router::new().route("/verify", post(check));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/verify", addr)
    }

    fn verifier(url: Option<String>) -> HttpCredentialVerifier {
        HttpCredentialVerifier::new(Client::new(), url, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn accepts_valid_credentials() {
        let url = spawn_verifier().await;
        assert!(verifier(Some(url)).verify("alice", "open-sesame").await.unwrap());
    }

    #[tokio::test]
    async fn rejects_invalid_credentials() {
        let url = spawn_verifier().await;
        assert!(!verifier(Some(url)).verify("alice", "wrong").await.unwrap());
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let url = spawn_verifier().await;
        let err = verifier(Some(url)).verify("broken", "x").await.unwrap_err();
        assert!(matches!(err, VerificationError::HttpStatus(500)));
    }

    #[tokio::test]
    async fn malformed_body_is_reported() {
        let url = spawn_verifier().await;
        let err = verifier(Some(url)).verify("garbled", "x").await.unwrap_err();
        assert!(matches!(err, VerificationError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn missing_url_is_not_configured() {
        let v = verifier(Some("   ".into()));
        assert!(!v.is_configured());
        let err = v.verify("alice", "open-sesame").await.unwrap_err();
        assert!(matches!(err, VerificationError::NotConfigured));
    }

    #[tokio::test]
    async fn unreachable_verifier_is_http_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = verifier(Some(format!("http://{}/verify", addr)))
            .verify("alice", "open-sesame")
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::Http(_)));
    }
}
