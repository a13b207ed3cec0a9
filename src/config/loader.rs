//! Configuration file loader.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default size of each stdout/stderr read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8192;

/// Default time to keep draining output after the process has exited.
pub const DEFAULT_EXIT_DRAIN_TIMEOUT_MS: u64 = 100;

/// Bridge tuning loaded from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Maximum bytes per stdout/stderr chunk.
    pub read_buffer_size: usize,
    /// How long to wait for output pipes to close after the process exits.
    ///
    /// Grandchildren can keep the pipes open long after the child is gone.
    pub exit_drain_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            exit_drain_timeout_ms: DEFAULT_EXIT_DRAIN_TIMEOUT_MS,
        }
    }
}

impl BridgeConfig {
    /// Read size, never zero.
    #[must_use]
    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size.max(1)
    }

    /// Drain timeout as a `Duration`.
    #[must_use]
    pub fn exit_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.exit_drain_timeout_ms)
    }
}

/// Configuration loader that searches multiple locations.
#[derive(Debug)]
pub struct ConfigLoader {
    /// Search paths in order of priority.
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default search paths.
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        // 1. Current directory: .blocking-child.toml
        search_paths.push(PathBuf::from(".blocking-child.toml"));

        // 2. User config directory: ~/.config/blocking-child/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("blocking-child").join("config.toml"));
        }

        Self { search_paths }
    }

    /// Create a config loader with a specific config file path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            search_paths: vec![path],
        }
    }

    /// Load configuration from the first available file, or return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load(&self) -> Result<BridgeConfig, ConfigError> {
        let Some(path) = self.find_config_file() else {
            tracing::debug!(searched = ?self.search_paths, "No config file found, using defaults");
            return Ok(BridgeConfig::default());
        };

        tracing::debug!(path = %path.display(), "Loading config file");
        Self::load_from_path(&path)
    }

    fn load_from_path(path: &Path) -> Result<BridgeConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Find the first config file that exists.
    #[must_use]
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths.iter().find(|p| p.exists()).cloned()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}
