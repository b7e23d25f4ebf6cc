//! Core configuration types.
//!
//! [`Config`] holds every tunable of the orchestrator and its network
//! surface. The server binary builds one from YAML and environment overrides
//! and hands it to [`bootstrap_services`](crate::bootstrap_services).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    DEFAULT_DRIFT_THRESHOLD_MS, DEFAULT_PAUSE_DURATION_SECS, DEFAULT_PORT,
    DEFAULT_VERIFY_TIMEOUT_SECS,
};
use crate::services::OrchestratorConfig;

/// Configuration for the watch party server.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    // Server
    /// Port for the HTTP/WS server.
    pub preferred_port: u16,

    /// Address the HTTP/WS server binds to.
    pub bind_address: String,

    // Authentication
    /// Endpoint that validates `{username, passkey}` pairs.
    /// Without it every WebSocket handshake is refused.
    pub passkey_validation_url: Option<String>,

    /// Timeout for a single validation request (seconds).
    pub verify_timeout_secs: u64,

    // Playback
    /// Drift beyond which a client is sent a SEEK (milliseconds).
    pub drift_threshold_ms: u64,

    /// Length of each pause before automatic resume (seconds).
    pub pause_duration_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: DEFAULT_PORT,
            bind_address: "0.0.0.0".to_string(),
            passkey_validation_url: None,
            verify_timeout_secs: DEFAULT_VERIFY_TIMEOUT_SECS,
            drift_threshold_ms: DEFAULT_DRIFT_THRESHOLD_MS,
            pause_duration_secs: DEFAULT_PAUSE_DURATION_SECS,
        }
    }
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.pause_duration_secs == 0 {
            return Err("pause_duration_secs must be >= 1".to_string());
        }
        if self.verify_timeout_secs == 0 {
            return Err("verify_timeout_secs must be >= 1".to_string());
        }
        if self.bind_address.trim().is_empty() {
            return Err("bind_address must not be empty".to_string());
        }
        Ok(())
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }

    /// Orchestrator tunables derived from this configuration.
    pub fn to_orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            drift_threshold_ms: self.drift_threshold_ms,
            pause_duration: Duration::from_secs(self.pause_duration_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.preferred_port, 8000);
        assert_eq!(config.to_orchestrator_config().pause_duration, Duration::from_secs(600));
    }

    #[test]
    fn zero_pause_duration_is_rejected() {
        let config = Config {
            pause_duration_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("pause_duration_secs"));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: Config = serde_json::from_str(r#"{"drift_threshold_ms": 2500}"#).unwrap();
        assert_eq!(config.drift_threshold_ms, 2500);
        assert_eq!(config.verify_timeout_secs, 5);
        assert!(config.passkey_validation_url.is_none());
    }
}
