//! Configuration management
//!
//! The configuration record is a process-wide singleton consumed by the
//! lifecycle controller; it is immutable for the duration of a running
//! session set and only takes effect on the next start.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration errors, all fatal before start
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("chunk size must be positive, got {0} KiB")]
    InvalidChunkSize(i32),

    #[error("listen port must be non-zero")]
    InvalidPort,

    #[error("relay host must not be empty")]
    MissingRelayHost,

    #[error("failed to read config: {0}")]
    Read(std::io::Error),

    #[error("failed to write config: {0}")]
    Write(std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Main configuration
///
/// Field names match the persisted JSON record: `{port, password, wss, chunk}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Local listen port for the CONNECT gateway
    pub port: u16,
    /// Shared secret carried in the relay handshake
    pub password: String,
    /// Relay hostname (WebSocket over TLS, default secure port unless given)
    pub wss: String,
    /// Relay buffer granularity in kibibytes
    pub chunk: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 9090,
            password: String::new(),
            wss: String::new(),
            chunk: 64,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// A missing file is not an error: defaults are written to the path and
    /// returned, so a first run leaves an editable config behind.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path).map_err(ConfigError::Read)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration as pretty-printed JSON, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(ConfigError::Write)?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(ConfigError::Write)
    }

    /// Validate the record before any listener is bound.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk <= 0 {
            return Err(ConfigError::InvalidChunkSize(self.chunk));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.wss.is_empty() {
            return Err(ConfigError::MissingRelayHost);
        }
        Ok(())
    }

    /// Chunk buffer size in bytes
    pub fn chunk_bytes(&self) -> usize {
        self.chunk as usize * 1024
    }
}
