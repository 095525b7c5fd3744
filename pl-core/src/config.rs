//! Application configuration management.
//!
//! Handles loading, saving, and accessing application configuration including
//! the credential provider and socket endpoints, client credentials, reconnect
//! tuning and dispatch sizing. Configuration is persisted as TOML on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{PlError, PlResult};
use crate::platform;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Endpoint and credential settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Automatic reconnection settings.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Handler dispatch sizing.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Which event names are declared at startup.
    #[serde(default)]
    pub subscriptions: SubscriptionConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Endpoint and credential configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Token endpoint of the credential provider (e.g. "https://id.example.com/oauth/token").
    #[serde(default)]
    pub auth_url: String,

    /// Event socket endpoint (e.g. "wss://events.example.com/ws").
    #[serde(default)]
    pub socket_url: String,

    /// OAuth client identifier.
    #[serde(default)]
    pub client_id: String,

    /// OAuth client secret.
    #[serde(default)]
    pub client_secret: String,

    /// Token request timeout in milliseconds.
    #[serde(default = "default_api_timeout")]
    pub api_timeout_ms: u64,

    /// Socket handshake timeout in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

/// Automatic reconnection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Maximum consecutive reconnection attempts (0 disables reconnection).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay in milliseconds; attempt `n` waits `n * base_delay_ms`.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
}

/// Dispatch worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Number of dispatch workers. Each event name is pinned to one worker.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Pending messages per worker before new frames are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Capacity of the per-event notification broadcast channel.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

/// Startup subscription configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Declare every event in the built-in catalogue at startup.
    #[serde(default = "default_true")]
    pub subscribe_catalogue: bool,

    /// Additional event names declared at startup.
    #[serde(default)]
    pub extra_events: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, uses default location.
    #[serde(default)]
    pub directory: String,

    /// Enable JSON structured logging output.
    #[serde(default)]
    pub json_output: bool,
}

// Default value functions for serde

fn default_api_timeout() -> u64 {
    constants::DEFAULT_API_TIMEOUT_MS
}

fn default_connect_timeout() -> u64 {
    constants::DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_max_attempts() -> u32 {
    constants::DEFAULT_MAX_RECONNECT_ATTEMPTS
}

fn default_base_delay() -> u64 {
    constants::DEFAULT_RECONNECT_BASE_DELAY_MS
}

fn default_workers() -> usize {
    constants::DEFAULT_DISPATCH_WORKERS
}

fn default_queue_capacity() -> usize {
    constants::DEFAULT_DISPATCH_QUEUE_CAPACITY
}

fn default_event_channel_capacity() -> usize {
    constants::DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            auth_url: String::new(),
            socket_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            api_timeout_ms: default_api_timeout(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            subscribe_catalogue: true,
            extra_events: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default config file path.
    pub fn load_default() -> PlResult<Self> {
        let path = Self::default_config_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> PlResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> PlResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| PlError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PlResult<PathBuf> {
        Ok(platform::config_dir()?.join("config.toml"))
    }

    /// Get the effective log directory, using the configured path or the default.
    pub fn effective_log_dir(&self) -> PlResult<PathBuf> {
        if self.logging.directory.is_empty() {
            Ok(platform::data_dir()?.join("logs"))
        } else {
            Ok(PathBuf::from(&self.logging.directory))
        }
    }

    /// Check whether endpoints and client credentials are all present.
    pub fn is_server_configured(&self) -> bool {
        !self.server.auth_url.is_empty()
            && !self.server.socket_url.is_empty()
            && !self.server.client_id.is_empty()
            && !self.server.client_secret.is_empty()
    }

    /// Validate the server section before any connection is attempted.
    pub fn validate(&self) -> PlResult<()> {
        let server = &self.server;
        if server.auth_url.is_empty() {
            return Err(PlError::MissingConfig("server.auth_url".into()));
        }
        if server.socket_url.is_empty() {
            return Err(PlError::MissingConfig("server.socket_url".into()));
        }
        if server.client_id.is_empty() {
            return Err(PlError::MissingConfig("server.client_id".into()));
        }
        if server.client_secret.is_empty() {
            return Err(PlError::MissingConfig("server.client_secret".into()));
        }
        if !server.auth_url.starts_with("http://") && !server.auth_url.starts_with("https://") {
            return Err(PlError::Config(format!(
                "server.auth_url must be an http(s) URL, got '{}'",
                server.auth_url
            )));
        }
        if !server.socket_url.starts_with("ws://") && !server.socket_url.starts_with("wss://") {
            return Err(PlError::Config(format!(
                "server.socket_url must be a ws(s) URL, got '{}'",
                server.socket_url
            )));
        }
        if self.dispatch.workers == 0 || self.dispatch.queue_capacity == 0 {
            return Err(PlError::Config(
                "dispatch.workers and dispatch.queue_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Thread-safe configuration holder for shared access across tasks.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<AppConfig>>,
}

impl ConfigHandle {
    /// Create a new configuration handle.
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Read the configuration.
    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, AppConfig> {
        self.inner.read().await
    }

    /// Write/update the configuration.
    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, AppConfig> {
        self.inner.write().await
    }

    /// Take a copy of the current configuration.
    pub async fn snapshot(&self) -> AppConfig {
        self.inner.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> AppConfig {
        let mut config = AppConfig::default();
        config.server.auth_url = "https://id.example.com/oauth/token".into();
        config.server.socket_url = "wss://events.example.com/ws".into();
        config.server.client_id = "client".into();
        config.server.client_secret = "secret".into();
        config
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.api_timeout_ms, 30_000);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.base_delay_ms, 5_000);
        assert!(config.subscriptions.subscribe_catalogue);
        assert_eq!(config.logging.level, "info");
        assert!(!config.is_server_configured());
    }

    #[test]
    fn test_validate_reports_first_missing_field() {
        let mut config = configured();
        assert!(config.validate().is_ok());

        config.server.client_secret.clear();
        match config.validate() {
            Err(PlError::MissingConfig(field)) => assert_eq!(field, "server.client_secret"),
            other => panic!("expected MissingConfig, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_wrong_schemes() {
        let mut config = configured();
        config.server.socket_url = "https://events.example.com/ws".into();
        assert!(matches!(config.validate(), Err(PlError::Config(_))));

        let mut config = configured();
        config.server.auth_url = "id.example.com".into();
        assert!(matches!(config.validate(), Err(PlError::Config(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
            [server]
            socket_url = "wss://events.example.com/ws"

            [reconnect]
            max_attempts = 2
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.socket_url, "wss://events.example.com/ws");
        assert_eq!(config.server.connect_timeout_ms, 15_000);
        assert_eq!(config.reconnect.max_attempts, 2);
        assert_eq!(config.reconnect.base_delay_ms, 5_000);
        assert_eq!(config.dispatch.workers, 4);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = configured();
        config.subscriptions.extra_events = vec!["kicks.gifted".into()];
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.server.client_id, "client");
        assert_eq!(loaded.subscriptions.extra_events, vec!["kicks.gifted".to_string()]);
    }

    #[tokio::test]
    async fn test_config_handle_write_visible_to_readers() {
        let handle = ConfigHandle::new(AppConfig::default());
        handle.write().await.server.client_id = "updated".into();
        assert_eq!(handle.read().await.server.client_id, "updated");
        assert_eq!(handle.snapshot().await.server.client_id, "updated");
    }
}
