//! Client configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via ROSBRIDGE_CONFIG)
//! 3. Environment variables

use rosbridge_protocol::Compression;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Name of the built-in WebSocket transport.
pub const WEBSOCKET_TRANSPORT: &str = "websocket";

/// How binary transport frames are classified for decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryMode {
    /// Binary frames are raw buffers (CBOR).
    #[default]
    Buffer,
    /// Binary frames are binary large objects (BSON).
    Blob,
}

impl FromStr for BinaryMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buffer" | "arraybuffer" => Ok(BinaryMode::Buffer),
            "blob" => Ok(BinaryMode::Blob),
            other => Err(ConfigError::ValidationError(format!(
                "unknown binary mode '{}'",
                other
            ))),
        }
    }
}

/// Connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Bridge URL. When set, building the connection also connects it.
    pub url: Option<String>,
    /// Transport kind, looked up in the connection's transport registry.
    pub transport: String,
    /// Classification of inbound binary frames.
    pub binary_mode: BinaryMode,
    /// Defaults applied to topics created through the connection.
    pub topic_defaults: TopicDefaults,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: None,
            transport: WEBSOCKET_TRANSPORT.to_string(),
            binary_mode: BinaryMode::default(),
            topic_defaults: TopicDefaults::default(),
        }
    }
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = transport.into();
        self
    }

    pub fn with_binary_mode(mut self, mode: BinaryMode) -> Self {
        self.binary_mode = mode;
        self
    }

    pub fn with_topic_defaults(mut self, defaults: TopicDefaults) -> Self {
        self.topic_defaults = defaults;
        self
    }

    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("ROSBRIDGE_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: ConnectionConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = std::env::var("ROSBRIDGE_URL") {
            self.url = Some(url);
        }
        if let Ok(transport) = std::env::var("ROSBRIDGE_TRANSPORT") {
            self.transport = transport;
        }
        if let Ok(mode) = std::env::var("ROSBRIDGE_BINARY_MODE") {
            self.binary_mode = mode.parse()?;
        }
        Ok(())
    }
}

/// Defaults for topics created through a connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicDefaults {
    /// Compression requested from the bridge.
    pub compression: Compression,
    /// Minimum interval between messages, in milliseconds. Negative values
    /// are treated as 0.
    pub throttle_rate: i64,
    /// Queue created at the bridge for republishing.
    pub queue_size: u64,
    /// Queue length at the bridge when subscribing (0 = no queueing).
    pub queue_length: u64,
    /// Latch published messages.
    pub latch: bool,
    /// Resend subscribe/advertise after the connection closes.
    pub reconnect_on_close: bool,
}

impl Default for TopicDefaults {
    fn default() -> Self {
        Self {
            compression: Compression::None,
            throttle_rate: 0,
            queue_size: 100,
            queue_length: 0,
            latch: false,
            reconnect_on_close: true,
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
