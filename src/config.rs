//! Configuration for rfq-realtime

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::endpoint::socket_url_from_api;
use crate::error::RealtimeError;
use crate::realtime::SessionConfig;

/// Default config file location
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rfq-realtime")
        .join("config.toml")
}

/// Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// REST API base URL; the realtime host is taken from it
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Port the realtime server listens on
    #[serde(default = "default_socket_port")]
    pub socket_port: u16,

    /// Socket.IO namespace
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Retries after a failed connection attempt
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    /// Fixed delay between attempts
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Limit for one connect + handshake
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_api_base_url() -> String {
    "http://localhost:5000/api".to_string()
}

fn default_socket_port() -> u16 {
    5001
}

fn default_namespace() -> String {
    "/".to_string()
}

fn default_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_connect_timeout_ms() -> u64 {
    20_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            socket_port: default_socket_port(),
            namespace: default_namespace(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RealtimeError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| RealtimeError::Config(e.to_string()))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), RealtimeError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| RealtimeError::Config(e.to_string()))?;
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Realtime WebSocket URL derived from the API base URL
    pub fn socket_url(&self) -> Result<String, RealtimeError> {
        Ok(socket_url_from_api(&self.api_base_url, self.socket_port)?.to_string())
    }

    /// Session settings for [`crate::realtime::RealtimeClient`]
    pub fn session_config(&self) -> Result<SessionConfig, RealtimeError> {
        Ok(SessionConfig {
            url: self.socket_url()?,
            namespace: self.namespace.clone(),
            reconnect_attempts: self.reconnect_attempts,
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_session_config_matches_session_defaults() {
        let from_config = Config::default().session_config().unwrap();
        let defaults = SessionConfig::default();
        assert_eq!(from_config.url, defaults.url);
        assert_eq!(from_config.namespace, defaults.namespace);
        assert_eq!(from_config.reconnect_attempts, defaults.reconnect_attempts);
        assert_eq!(from_config.reconnect_delay, defaults.reconnect_delay);
        assert_eq!(from_config.connect_timeout, defaults.connect_timeout);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            api_base_url = "https://b2b.example.com/api"
            reconnect_attempts = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.socket_port, 5001);
        assert_eq!(config.reconnect_attempts, 2);
        assert_eq!(
            config.socket_url().unwrap(),
            "wss://b2b.example.com:5001/socket.io/?EIO=4&transport=websocket"
        );
    }
}
