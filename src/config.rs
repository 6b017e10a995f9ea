//! Bridge configuration.
//!
//! Values come from an optional TOML file; command-line flags and
//! environment variables override them in `main`.

use crate::bridge::worker::{clamp_timeout, DEFAULT_QUEUE_CAPACITY, DEFAULT_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Where the backend lives and how calls to it are bounded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// `host:port` of the analysis backend
    #[serde(default = "default_backend_addr")]
    pub backend_addr: String,
    /// Backend project the tools act on
    #[serde(default = "default_project")]
    pub project: String,
    /// Per-request timeout in seconds, capped at 600
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Depth of the shared request queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_backend_addr() -> String {
    "127.0.0.1:44916".to_string()
}

fn default_project() -> String {
    "default".to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            backend_addr: default_backend_addr(),
            project: default_project(),
            request_timeout_secs: default_request_timeout_secs(),
            queue_capacity: default_queue_capacity(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// File if given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend_addr.trim().is_empty() {
            return Err(ConfigError::Invalid("backend_addr must not be empty".into()));
        }
        if self.project.trim().is_empty() {
            return Err(ConfigError::Invalid("project must not be empty".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be greater than 0".into(),
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "connect_timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Per-request timeout after applying the cap.
    pub fn request_timeout(&self) -> Duration {
        clamp_timeout(Some(self.request_timeout_secs))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
