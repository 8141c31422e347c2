//! Configuration file handling for ssec

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use ssec::StreamConfig;
use std::path::{Path, PathBuf};

use crate::output::OutputFormat;

/// Configuration for the CLI tool
///
/// ```toml
/// url = "http://localhost:8080/events"
/// output = "json"
///
/// [stream]
/// max_connect_attempts = 10
/// reconnect_timeout_ms = 1000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default event stream URL
    pub url: Option<String>,
    /// Default output format
    pub output: Option<OutputFormat>,
    /// Disable colored output
    pub no_color: Option<bool>,
    /// Stream settings; missing fields keep their defaults
    #[serde(default)]
    pub stream: StreamConfig,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("ssec");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(
        &self,
        url: Option<&str>,
        output: Option<OutputFormat>,
        no_color: bool,
    ) -> MergedConfig {
        MergedConfig {
            url: url.map(String::from).or_else(|| self.url.clone()),
            output: output.or(self.output).unwrap_or_default(),
            no_color: no_color || self.no_color.unwrap_or(false),
            stream: self.stream.clone(),
        }
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub url: Option<String>,
    pub output: OutputFormat,
    pub no_color: bool,
    pub stream: StreamConfig,
}
