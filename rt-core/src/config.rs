//! Application configuration management.
//!
//! Handles loading, saving, and accessing the server address, the optional
//! persisted credential, realtime connection tuning and logging settings.
//! Configuration is persisted as TOML on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants;
use crate::error::{RtError, RtResult};
use crate::platform::Platform;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server connection settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Realtime connection tuning.
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Dashboard host, e.g. "https://dash.example.com". The scheme picks ws or wss.
    #[serde(default)]
    pub address: String,

    /// Credential appended to the endpoint. Issued elsewhere; never refreshed here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Transport connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

/// Realtime connection tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Interval between heartbeat pings while open.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Close the transport when no pong arrives within this window. 0 disables the watchdog.
    #[serde(default)]
    pub pong_timeout_ms: u64,

    /// First reconnect delay.
    #[serde(default = "default_reconnect_base_delay")]
    pub reconnect_base_delay_ms: u64,

    /// Reconnect delay ceiling.
    #[serde(default = "default_reconnect_max_delay")]
    pub reconnect_max_delay_ms: u64,

    /// Jitter factor (0.0 to 1.0) applied to each reconnect delay.
    #[serde(default)]
    pub reconnect_jitter: f64,

    /// Give up after this many consecutive failed attempts. 0 = unlimited.
    #[serde(default)]
    pub max_reconnect_attempts: u32,

    /// Capacity of the broadcast tap carrying every dispatched event.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Disconnect once the last binding is dropped.
    #[serde(default = "default_true")]
    pub disconnect_when_unbound: bool,
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

fn default_connect_timeout() -> u64 {
    constants::DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_heartbeat_interval() -> u64 {
    constants::DEFAULT_HEARTBEAT_INTERVAL_MS
}

fn default_reconnect_base_delay() -> u64 {
    constants::DEFAULT_RECONNECT_BASE_DELAY_MS
}

fn default_reconnect_max_delay() -> u64 {
    constants::DEFAULT_RECONNECT_MAX_DELAY_MS
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
            address: String::new(),
            token: None,
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval(),
            pong_timeout_ms: 0,
            reconnect_base_delay_ms: default_reconnect_base_delay(),
            reconnect_max_delay_ms: default_reconnect_max_delay(),
            reconnect_jitter: 0.0,
            max_reconnect_attempts: 0,
            event_channel_capacity: default_event_channel_capacity(),
            disconnect_when_unbound: true,
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

impl ServerConfig {
    /// Connect timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl RealtimeConfig {
    /// Heartbeat interval as a Duration.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Pong watchdog window, if enabled.
    pub fn pong_timeout(&self) -> Option<Duration> {
        (self.pong_timeout_ms > 0).then(|| Duration::from_millis(self.pong_timeout_ms))
    }
}

impl AppConfig {
    /// Load configuration from the default config file path.
    pub fn load_default() -> RtResult<Self> {
        let path = Self::default_config_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> RtResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to the default config file path.
    pub fn save_default(&self) -> RtResult<()> {
        let path = Self::default_config_path()?;
        self.save_to_file(&path)
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> RtResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RtError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> RtResult<PathBuf> {
        Ok(Platform::config_dir()?.join("config.toml"))
    }

    /// Get the effective log directory, using the configured path or the default.
    pub fn effective_log_dir(&self) -> RtResult<PathBuf> {
        if self.logging.directory.is_empty() {
            Ok(Platform::data_dir()?.join("logs"))
        } else {
            Ok(PathBuf::from(&self.logging.directory))
        }
    }

    /// Check whether the server address is configured.
    pub fn is_server_configured(&self) -> bool {
        !self.server.address.is_empty()
    }

    /// Sanitize and normalize a server address.
    ///
    /// Strips quotes, whitespace and trailing slashes; bare hosts get `http://`.
    /// An address that already names a scheme keeps it, supported or not.
    pub fn sanitize_server_address(address: &str) -> String {
        let trimmed = address.trim().trim_matches('"').trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        };

        with_scheme.trim_end_matches('/').to_string()
    }
}

/// Build the realtime endpoint for `address`, carrying `credential` as a query parameter.
///
/// `https`/`wss` addresses produce `wss://`, `http`/`ws` addresses produce `ws://`.
/// Any path, query or fragment on the address is replaced.
pub fn endpoint_url(address: &str, credential: &str) -> RtResult<Url> {
    let sanitized = AppConfig::sanitize_server_address(address);
    if sanitized.is_empty() {
        return Err(RtError::MissingConfig("server address".into()));
    }

    let mut url = Url::parse(&sanitized)?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(RtError::InvalidUrl(format!("unsupported scheme: {other}"))),
    };
    if url.host_str().is_none() {
        return Err(RtError::InvalidUrl(format!("missing host: {sanitized}")));
    }
    url.set_scheme(scheme)
        .map_err(|_| RtError::InvalidUrl(format!("cannot switch {sanitized} to {scheme}")))?;
    url.set_path(constants::WS_CONNECT_PATH);
    url.set_query(None);
    url.set_fragment(None);
    url.query_pairs_mut()
        .append_pair(constants::TOKEN_QUERY_PARAM, credential);

    Ok(url)
}

/// Replace the credential in an endpoint URL for logging.
pub fn redact_endpoint(url: &Url) -> String {
    let mut redacted = url.clone();
    redacted.set_query(None);
    redacted
        .query_pairs_mut()
        .append_pair(constants::TOKEN_QUERY_PARAM, "***");
    redacted.to_string()
}

/// Thread-safe configuration holder for shared access.
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

    /// Save the current configuration to `path`.
    pub async fn save_to(&self, path: &Path) -> RtResult<()> {
        let config = self.inner.read().await;
        config.save_to_file(path)
    }
}
