//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use watchparty_core::protocol_constants::{
    DEFAULT_DRIFT_THRESHOLD_MS, DEFAULT_PAUSE_DURATION_SECS, DEFAULT_PORT,
    DEFAULT_VERIFY_TIMEOUT_SECS,
};

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP/WS server to.
    /// Override: `WATCHPARTY_BIND_PORT`
    pub bind_port: u16,

    /// Address to bind the HTTP/WS server to.
    /// Override: `WATCHPARTY_BIND_ADDRESS`
    pub bind_address: String,

    /// Endpoint that validates `{username, passkey}` pairs.
    /// Override: `PASSKEY_VALIDATION_URL`
    pub passkey_validation_url: Option<String>,

    /// Timeout for a single validation request, in seconds.
    pub verify_timeout_secs: u64,

    /// Drift beyond which a client is re-synced, in milliseconds.
    /// Override: `WATCHPARTY_DRIFT_THRESHOLD_MS`
    pub drift_threshold_ms: u64,

    /// Length of each automatic pause, in seconds.
    /// Override: `WATCHPARTY_PAUSE_DURATION_SECS`
    pub pause_duration_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_port: DEFAULT_PORT,
            bind_address: "0.0.0.0".to_string(),
            passkey_validation_url: None,
            verify_timeout_secs: DEFAULT_VERIFY_TIMEOUT_SECS,
            drift_threshold_ms: DEFAULT_DRIFT_THRESHOLD_MS,
            pause_duration_secs: DEFAULT_PAUSE_DURATION_SECS,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn from_file(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("WATCHPARTY_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }

        if let Ok(val) = std::env::var("WATCHPARTY_BIND_ADDRESS") {
            if !val.trim().is_empty() {
                self.bind_address = val;
            }
        }

        if let Ok(val) = std::env::var("PASSKEY_VALIDATION_URL") {
            if !val.trim().is_empty() {
                self.passkey_validation_url = Some(val);
            }
        }

        if let Ok(val) = std::env::var("WATCHPARTY_DRIFT_THRESHOLD_MS") {
            if let Ok(ms) = val.parse() {
                self.drift_threshold_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("WATCHPARTY_PAUSE_DURATION_SECS") {
            if let Ok(secs) = val.parse() {
                self.pause_duration_secs = secs;
            }
        }
    }

    /// Converts to watchparty-core's Config type.
    pub fn to_core_config(&self) -> watchparty_core::Config {
        watchparty_core::Config {
            preferred_port: self.bind_port,
            bind_address: self.bind_address.clone(),
            passkey_validation_url: self.passkey_validation_url.clone(),
            verify_timeout_secs: self.verify_timeout_secs,
            drift_threshold_ms: self.drift_threshold_ms,
            pause_duration_secs: self.pause_duration_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_path_yields_defaults() {
        let config = ServerConfig::from_file(None).unwrap();
        assert_eq!(config.bind_port, DEFAULT_PORT);
        assert_eq!(config.pause_duration_secs, 600);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind_port: 9100").unwrap();
        writeln!(file, "passkey_validation_url: http://auth.local/verify").unwrap();

        let config = ServerConfig::from_file(Some(file.path())).unwrap();
        assert_eq!(config.bind_port, 9100);
        assert_eq!(
            config.passkey_validation_url.as_deref(),
            Some("http://auth.local/verify")
        );
        assert_eq!(config.drift_threshold_ms, DEFAULT_DRIFT_THRESHOLD_MS);

        let core = config.to_core_config();
        assert_eq!(core.preferred_port, 9100);
        assert!(core.validate().is_ok());
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind_port: [not, a, port]").unwrap();

        let err = ServerConfig::from_file(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn unreadable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ServerConfig::from_file(Some(&dir.path().join("absent.yaml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
