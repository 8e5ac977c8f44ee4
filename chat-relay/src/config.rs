//! Configuration loading for chat-relay.
//!
//! Configuration is loaded from a TOML file (default: `relay.toml`). Every
//! field has a default, so an absent file or section is valid.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for chat-relay.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Per-connection limits.
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the WebSocket listener (default: 0.0.0.0:8443).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Path that accepts WebSocket upgrades (default: /ws).
    #[serde(default = "default_path")]
    pub path: String,
}

/// Per-connection limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Deadline in seconds for one outbound write during broadcast (default: 5).
    /// A destination that does not accept the frame in time is skipped.
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
    /// Largest inbound message in bytes (default: 32 KiB).
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl LimitsConfig {
    /// Write deadline as a [`Duration`].
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8443".to_string()
}

fn default_path() -> String {
    "/ws".to_string()
}

fn default_write_timeout_secs() -> u64 {
    5
}

fn default_max_message_size() -> usize {
    32 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            path: default_path(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            write_timeout_secs: default_write_timeout_secs(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would otherwise fail at startup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.server.path.starts_with('/') {
            return Err(ConfigError::Invalid {
                field: "server.path",
                reason: format!("must start with '/', got {:?}", self.server.path),
            });
        }
        if self.limits.write_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "limits.write_timeout_secs",
                reason: "must be > 0".to_string(),
            });
        }
        if self.limits.max_message_size == 0 {
            return Err(ConfigError::Invalid {
                field: "limits.max_message_size",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }

    /// Load from `path` if given, otherwise from `relay.toml` when it exists,
    /// otherwise fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file is missing, or if any
    /// file that is found cannot be parsed.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        match locate(path, std::path::Path::new(DEFAULT_CONFIG_FILE)) {
            Some(file) => {
                let config = Self::from_file(file)?;
                tracing::info!("Loaded configuration from {}", file.display());
                Ok(config)
            }
            None => {
                tracing::info!("No {} found, using default configuration", DEFAULT_CONFIG_FILE);
                Ok(Self::default())
            }
        }
    }
}

/// The file [`Config::load`] reads: `path` if given, else `fallback` if it exists.
fn locate<'a>(
    path: Option<&'a std::path::Path>,
    fallback: &'a std::path::Path,
) -> Option<&'a std::path::Path> {
    path.or_else(|| fallback.exists().then_some(fallback))
}

/// Configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "relay.toml";

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Dotted name of the field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}
