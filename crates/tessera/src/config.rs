//! Configuration management for the Tessera client.
//!
//! This module handles loading, validation, and conversion of client
//! configuration from TOML files and command-line arguments. A default
//! configuration file is written on first run so users have something to
//! edit.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use sync_client::SyncConfig;
use tracing::info;

fn default_server_url() -> String {
    "ws://localhost:8080/ws".to_string()
}

fn default_api_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_username() -> String {
    "guest".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_heartbeat_interval_secs() -> u64 {
    15
}

fn default_stale_after_secs() -> u64 {
    45
}

fn default_reconnect_base_ms() -> u64 {
    1000
}

fn default_reconnect_cap_ms() -> u64 {
    30_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_buffer_capacity() -> usize {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Endpoint settings.
    #[serde(default)]
    pub connection: ConnectionSettings,
    /// Synchronization layer tuning.
    #[serde(default)]
    pub session: SessionSettings,
    /// Player identity defaults.
    #[serde(default)]
    pub player: PlayerSettings,
    /// Logging configuration settings.
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Where to reach the game server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// WebSocket endpoint for the persistent connection.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Base URL of the read-only snapshot API.
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            api_url: default_api_url(),
        }
    }
}

/// Synchronization timings, expressed in TOML-friendly integer units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Bound on the connect handshake in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Heartbeat interval in seconds.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Inbound silence tolerated before reconnecting, in seconds.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    /// Reconnect backoff base in milliseconds.
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    /// Reconnect backoff ceiling in milliseconds.
    #[serde(default = "default_reconnect_cap_ms")]
    pub reconnect_cap_ms: u64,
    /// Reconnect attempts before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Snapshot poll interval in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Retained timeline messages.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            stale_after_secs: default_stale_after_secs(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_cap_ms: default_reconnect_cap_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            poll_interval_secs: default_poll_interval_secs(),
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

/// Default player identity, overridable from the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSettings {
    /// Display name used when `--name` is not given.
    #[serde(default = "default_username")]
    pub username: String,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            username: default_username(),
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from `path`, writing a default file if none exists.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            let config = Self::default();
            let rendered = toml::to_string_pretty(&config)?;
            tokio::fs::write(path, rendered).await?;
            info!("created default configuration at {}", path.display());
            return Ok(config);
        }

        let raw = tokio::fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Checks invariants the synchronization layer depends on.
    pub fn validate(&self) -> Result<(), String> {
        if self.connection.server_url.is_empty() {
            return Err("connection.server_url must not be empty".into());
        }
        if !self.connection.server_url.starts_with("ws://")
            && !self.connection.server_url.starts_with("wss://")
        {
            return Err("connection.server_url must be a ws:// or wss:// URL".into());
        }
        if self.connection.api_url.is_empty() {
            return Err("connection.api_url must not be empty".into());
        }
        if self.session.connect_timeout_secs == 0 {
            return Err("session.connect_timeout_secs must be positive".into());
        }
        if self.session.heartbeat_interval_secs == 0 {
            return Err("session.heartbeat_interval_secs must be positive".into());
        }
        if self.session.stale_after_secs <= self.session.heartbeat_interval_secs {
            return Err(
                "session.stale_after_secs must exceed session.heartbeat_interval_secs".into(),
            );
        }
        if self.session.reconnect_cap_ms < self.session.reconnect_base_ms {
            return Err("session.reconnect_cap_ms must be >= session.reconnect_base_ms".into());
        }
        if self.session.poll_interval_secs == 0 {
            return Err("session.poll_interval_secs must be positive".into());
        }
        if self.session.buffer_capacity == 0 {
            return Err("session.buffer_capacity must be positive".into());
        }
        Ok(())
    }

    /// Converts the TOML-friendly settings into the sync layer's config.
    pub fn to_sync_config(&self) -> SyncConfig {
        SyncConfig {
            connect_timeout: Duration::from_secs(self.session.connect_timeout_secs),
            heartbeat_interval: Duration::from_secs(self.session.heartbeat_interval_secs),
            stale_after: Duration::from_secs(self.session.stale_after_secs),
            reconnect_base: Duration::from_millis(self.session.reconnect_base_ms),
            reconnect_cap: Duration::from_millis(self.session.reconnect_cap_ms),
            max_reconnect_attempts: self.session.max_reconnect_attempts,
            poll_interval: Duration::from_secs(self.session.poll_interval_secs),
            buffer_capacity: self.session.buffer_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_creates_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tessera.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(config.connection.server_url, "ws://localhost:8080/ws");
        assert_eq!(config.session.buffer_capacity, 500);

        // The generated file parses back to the same settings.
        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.session.poll_interval_secs, 5);
        assert_eq!(reloaded.player.username, "guest");
    }

    #[tokio::test]
    async fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tessera.toml");
        tokio::fs::write(
            &path,
            "[connection]\nserver_url = \"wss://play.example/ws\"\n",
        )
        .await
        .unwrap();

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.connection.server_url, "wss://play.example/ws");
        assert_eq!(config.connection.api_url, "http://localhost:8080");
        assert_eq!(config.session.max_reconnect_attempts, 5);
    }

    #[test]
    fn validation_catches_bad_settings() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());

        config.connection.server_url = "http://not-a-socket".into();
        assert!(config.validate().is_err());

        config.connection.server_url = default_server_url();
        config.session.stale_after_secs = config.session.heartbeat_interval_secs;
        assert!(config.validate().is_err());

        config.session.stale_after_secs = default_stale_after_secs();
        config.session.reconnect_cap_ms = 1;
        config.session.reconnect_base_ms = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn sync_config_conversion_preserves_units() {
        let config = AppConfig::default();
        let sync = config.to_sync_config();
        assert_eq!(sync.connect_timeout, Duration::from_secs(10));
        assert_eq!(sync.reconnect_base, Duration::from_millis(1000));
        assert_eq!(sync.reconnect_cap, Duration::from_secs(30));
        assert_eq!(sync.buffer_capacity, 500);
    }
}
