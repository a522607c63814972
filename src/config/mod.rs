//! Configuration management for ClipBridge
//!
//! This module handles loading, validating, and managing configuration
//! for the relay and peer processes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::clipboard::Backend;
use crate::sync::{DetectorConfig, SyncTiming};
use crate::transport::websocket::{channel_url, WebSocketConfig};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "CLIPBRIDGE_CONFIG";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML rendering error
    #[error("Failed to render TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Validation error
    #[error("Config validation failed: {0}")]
    Validation(String),

    /// Environment override that does not parse
    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Relay listener settings
    #[serde(default)]
    pub relay: RelayConfig,

    /// Peer connection settings
    #[serde(default)]
    pub peer: PeerConfig,

    /// Timing shared by both sides
    #[serde(default)]
    pub sync: SyncConfig,

    /// Clipboard backend
    #[serde(default)]
    pub clipboard: ClipboardConfig,
}

/// Relay listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Address to listen on
    #[serde(default = "default_relay_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Channel endpoint path
    #[serde(default = "default_path")]
    pub path: String,
}

/// Peer connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Relay host to connect to
    #[serde(default = "default_server_host")]
    pub server_host: String,

    /// Relay port to connect to
    #[serde(default = "default_port")]
    pub server_port: u16,

    /// Channel endpoint path
    #[serde(default = "default_path")]
    pub path: String,

    /// Reconnect with backoff after the connection drops
    #[serde(default)]
    pub reconnect: bool,

    /// Seconds to wait for the handshake
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Synchronization timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Clipboard poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Pause after a failed clipboard read in milliseconds
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,

    /// Seconds between keepalive pings
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,

    /// Seconds past a keepalive to wait for any frame before dropping the connection
    #[serde(default = "default_pong_timeout_secs")]
    pub pong_timeout_secs: u64,

    /// Undelivered updates kept by a peer
    #[serde(default = "default_pending_capacity")]
    pub pending_capacity: usize,

    /// Milliseconds allowed for closing connections on shutdown
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Maximum message size in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Clipboard configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipboardConfig {
    /// `system` or `memory`
    #[serde(default)]
    pub backend: Backend,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_relay_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_path() -> String {
    "/ws".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_error_backoff_ms() -> u64 {
    5000
}

fn default_keepalive_interval_secs() -> u64 {
    30
}

fn default_pong_timeout_secs() -> u64 {
    10
}

fn default_pending_capacity() -> usize {
    crate::sync::pending::DEFAULT_CAPACITY
}

fn default_shutdown_grace_ms() -> u64 {
    1000
}

fn default_max_message_size() -> usize {
    crate::MAX_PAYLOAD_SIZE
}

// Default implementations
impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_relay_host(),
            port: default_port(),
            path: default_path(),
        }
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            server_host: default_server_host(),
            server_port: default_port(),
            path: default_path(),
            reconnect: false,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            pong_timeout_secs: default_pong_timeout_secs(),
            pending_capacity: default_pending_capacity(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            relay: RelayConfig::default(),
            peer: PeerConfig::default(),
            sync: SyncConfig::default(),
            clipboard: ClipboardConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with optional custom path
    ///
    /// Checks in order:
    /// 1. `path` when given
    /// 2. Path from CLIPBRIDGE_CONFIG environment variable
    /// 3. ~/.config/clipbridge/config.toml
    /// 4. Built-in defaults
    ///
    /// Environment overrides are applied last.
    pub fn load_config(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::load()?,
        };
        config.apply_env_overrides()?;
        config.validate_config()?;
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_path() {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(expand_path(path))?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml_str)?;
        config.validate_config()?;
        Ok(config)
    }

    /// Find configuration file path
    pub fn find_config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = expand_path(Path::new(&path));
            if path.exists() {
                return Some(path);
            }
        }

        Self::default_path().filter(|p| p.exists())
    }

    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("clipbridge").join("config.toml"))
    }

    /// Apply `SERVER_HOST`, `SERVER_PORT`, `PORT` and `LOG_LEVEL`
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed like the environment variables
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SERVER_HOST").filter(|v| !v.is_empty()) {
            self.peer.server_host = host;
        }
        if let Some(port) = lookup("SERVER_PORT") {
            self.peer.server_port = parse_port("SERVER_PORT", &port)?;
        }
        if let Some(port) = lookup("PORT") {
            self.relay.port = parse_port("PORT", &port)?;
        }
        if let Some(level) = lookup("LOG_LEVEL").filter(|v| !v.is_empty()) {
            self.log_level = level.to_lowercase();
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate_config(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "log_level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }

        if self.relay.port == 0 || self.peer.server_port == 0 {
            return Err(ConfigError::Validation("port must not be 0".to_string()));
        }
        if self.relay.host.is_empty() || self.peer.server_host.is_empty() {
            return Err(ConfigError::Validation("host must not be empty".to_string()));
        }
        for path in [&self.relay.path, &self.peer.path] {
            if !path.starts_with('/') {
                return Err(ConfigError::Validation(format!(
                    "path '{}' must start with '/'",
                    path
                )));
            }
        }

        let sync = &self.sync;
        if sync.poll_interval_ms == 0
            || sync.error_backoff_ms == 0
            || sync.keepalive_interval_secs == 0
            || sync.pong_timeout_secs == 0
            || sync.shutdown_grace_ms == 0
            || self.peer.connect_timeout_secs == 0
        {
            return Err(ConfigError::Validation(
                "intervals and timeouts must be greater than 0".to_string(),
            ));
        }

        // Validate pending_capacity range (1 to 1000)
        if !(1..=1000).contains(&sync.pending_capacity) {
            return Err(ConfigError::Validation(
                "pending_capacity must be between 1 and 1000".to_string(),
            ));
        }

        if sync.max_message_size < 1024 {
            return Err(ConfigError::Validation(
                "max_message_size must be at least 1024 bytes (1KB)".to_string(),
            ));
        }

        Ok(())
    }

    /// Address the relay binds to
    pub fn relay_bind_addr(&self) -> String {
        format!("{}:{}", self.relay.host, self.relay.port)
    }

    /// Channel URL a peer connects to
    pub fn peer_url(&self) -> String {
        channel_url(&self.peer.server_host, self.peer.server_port, &self.peer.path)
    }

    pub fn timing(&self) -> SyncTiming {
        SyncTiming {
            detector: DetectorConfig {
                poll_interval: Duration::from_millis(self.sync.poll_interval_ms),
                error_backoff: Duration::from_millis(self.sync.error_backoff_ms),
            },
            keepalive_interval: Duration::from_secs(self.sync.keepalive_interval_secs),
            pong_timeout: Duration::from_secs(self.sync.pong_timeout_secs),
            shutdown_grace: Duration::from_millis(self.sync.shutdown_grace_ms),
        }
    }

    pub fn relay_websocket(&self) -> WebSocketConfig {
        WebSocketConfig {
            path: self.relay.path.clone(),
            max_message_size: self.sync.max_message_size,
            ..WebSocketConfig::default()
        }
    }

    pub fn peer_websocket(&self) -> WebSocketConfig {
        WebSocketConfig {
            path: self.peer.path.clone(),
            max_message_size: self.sync.max_message_size,
            connect_timeout: Duration::from_secs(self.peer.connect_timeout_secs),
        }
    }

    /// Save configuration to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Validate configuration file at given path
    pub fn validate(path: &Path) -> Result<(), ConfigError> {
        Self::load_from_path(path).map(|_| ())
    }

    /// Write the example configuration to `path`
    pub fn write_example(path: &Path, force: bool) -> Result<(), ConfigError> {
        if !force && path.exists() {
            return Err(ConfigError::Validation(
                "Config file already exists. Use --force to overwrite.".to_string(),
            ));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, Self::generate_example())?;
        Ok(())
    }

    /// Generate example configuration file
    pub fn generate_example() -> String {
        let config = Config::default();

        format!(
            r#"# ClipBridge Configuration File
# Location: ~/.config/clipbridge/config.toml

# Logging level (trace, debug, info, warn, error)
log_level = "{}"

# Relay settings (clipbridge relay)
[relay]
# Address to listen on
host = "{}"
# Port to listen on (env: PORT)
port = {}
# WebSocket endpoint path
path = "{}"

# Peer settings (clipbridge peer)
[peer]
# Relay to connect to (env: SERVER_HOST, SERVER_PORT)
server_host = "{}"
server_port = {}
path = "{}"
# Reconnect with exponential backoff when the relay goes away
reconnect = {}
# Handshake timeout in seconds
connect_timeout_secs = {}

# Synchronization timing
[sync]
# Clipboard poll interval in milliseconds
poll_interval_ms = {}
# Pause after a failed clipboard read in milliseconds
error_backoff_ms = {}
# Seconds between keepalive pings
keepalive_interval_secs = {}
# Seconds of silence tolerated after a keepalive before the connection is dropped
pong_timeout_secs = {}
# Updates a disconnected peer keeps for later delivery
pending_capacity = {}
# Time allowed for closing connections on shutdown
shutdown_grace_ms = {}
# Maximum message size in bytes (5MB default)
max_message_size = {}

# Clipboard settings
[clipboard]
# "system" for the desktop clipboard, "memory" for headless hosts
backend = "{}"
"#,
            config.log_level,
            config.relay.host,
            config.relay.port,
            config.relay.path,
            config.peer.server_host,
            config.peer.server_port,
            config.peer.path,
            config.peer.reconnect,
            config.peer.connect_timeout_secs,
            config.sync.poll_interval_ms,
            config.sync.error_backoff_ms,
            config.sync.keepalive_interval_secs,
            config.sync.pong_timeout_secs,
            config.sync.pending_capacity,
            config.sync.shutdown_grace_ms,
            config.sync.max_message_size,
            match config.clipboard.backend {
                Backend::System => "system",
                Backend::Memory => "memory",
            },
        )
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}

/// Expand tilde in path
fn expand_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    let expanded = shellexpand::tilde(path_str.as_ref());
    PathBuf::from(expanded.into_owned())
}
