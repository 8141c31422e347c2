//! Stream configuration with YAML, JSON and TOML support

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default connect timeout (3 seconds)
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3_000;
/// Default body read size in bytes
pub const DEFAULT_CHUNK_SIZE: usize = 1024;
/// Default total number of connection attempts
pub const DEFAULT_MAX_CONNECT_ATTEMPTS: u32 = 3;
/// Default wait before reconnecting (3 seconds)
pub const DEFAULT_RECONNECT_TIMEOUT_MS: u64 = 3_000;
/// Default backoff base, in seconds
pub const DEFAULT_BACKOFF_DELAY: f64 = 2.5;

/// HTTP method used to open the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            other => Err(ConfigError::Invalid(format!(
                "unsupported HTTP method: {}",
                other
            ))),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        }
    }
}

/// Settings for one stream call
///
/// Every field has a default, so partial YAML/TOML documents are accepted:
///
/// ```yaml
/// method: POST
/// max_connect_attempts: 5
/// reconnect_timeout_ms: 1000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Connect timeout in milliseconds; only applies to the default client
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// HTTP method
    #[serde(default)]
    pub method: HttpMethod,

    /// Maximum number of bytes handed to the decoder at once
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Total number of connection attempts before giving up
    #[serde(default = "default_max_connect_attempts")]
    pub max_connect_attempts: u32,

    /// Base wait before reconnecting, in milliseconds.
    /// A `retry:` field from the server replaces it for the rest of the call.
    #[serde(default = "default_reconnect_timeout")]
    pub reconnect_timeout_ms: u64,

    /// Extra wait in seconds, raised to the power of the attempt number
    #[serde(default = "default_backoff_delay")]
    pub backoff_delay: f64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            method: HttpMethod::default(),
            chunk_size: default_chunk_size(),
            max_connect_attempts: default_max_connect_attempts(),
            reconnect_timeout_ms: default_reconnect_timeout(),
            backoff_delay: default_backoff_delay(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_max_connect_attempts() -> u32 {
    DEFAULT_MAX_CONNECT_ATTEMPTS
}

fn default_reconnect_timeout() -> u64 {
    DEFAULT_RECONNECT_TIMEOUT_MS
}

fn default_backoff_delay() -> f64 {
    DEFAULT_BACKOFF_DELAY
}

impl StreamConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Serialize configuration to YAML
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Serialize configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Create a builder starting from the defaults
    pub fn builder() -> StreamConfigBuilder {
        StreamConfigBuilder::new()
    }

    /// Reject settings the reconnect loop cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be > 0".to_string()));
        }
        if self.max_connect_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_connect_attempts must be > 0".to_string(),
            ));
        }
        if !self.backoff_delay.is_finite() || self.backoff_delay < 0.0 {
            return Err(ConfigError::Invalid(
                "backoff_delay must be a finite, non-negative number of seconds".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.reconnect_timeout_ms)
    }
}

/// Builder for StreamConfig
#[derive(Debug, Default)]
pub struct StreamConfigBuilder {
    config: StreamConfig,
}

impl StreamConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect timeout in milliseconds
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the HTTP method
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.config.method = method;
        self
    }

    /// Set the body read size in bytes
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the total number of connection attempts
    pub fn max_connect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_connect_attempts = attempts;
        self
    }

    /// Set the base reconnect wait in milliseconds
    pub fn reconnect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_timeout_ms = ms;
        self
    }

    /// Set the backoff base in seconds
    pub fn backoff_delay(mut self, seconds: f64) -> Self {
        self.config.backoff_delay = seconds;
        self
    }

    /// Build the configuration
    pub fn build(self) -> StreamConfig {
        self.config
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("{0}")]
    Invalid(String),
}
