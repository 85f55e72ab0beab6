//! Configuration loading and typed config structures for a Cadence host.
//!
//! The canonical configuration lives in `cadence-config.yaml`. This module
//! defines strongly-typed structs that mirror the YAML structure and a
//! loader that reads and validates the file. Every field has a default, so
//! an empty document is a complete configuration.

use std::path::Path;

use cadence_tasks::ThreadingConfig;
use serde::{Deserialize, Serialize};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The document parsed but holds an unusable value.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level host configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CadenceConfig {
    /// World identity and cadence.
    #[serde(default)]
    pub world: WorldConfig,

    /// Worker pool parameters.
    #[serde(default)]
    pub threading: ThreadingConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Run boundaries for the host binary.
    #[serde(default)]
    pub simulation: SimulationBoundsConfig,
}

impl CadenceConfig {
    /// Load and validate configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a non-positive or non-finite
    /// tick rate, or an empty worker thread name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rate = self.world.tick_rate;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ConfigError::Invalid {
                reason: format!("world.tick_rate must be a positive number, got {rate}"),
            });
        }
        if self.threading.thread_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: "threading.thread_name must not be empty".to_owned(),
            });
        }
        Ok(())
    }
}

/// World-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Human-readable world name, used in logs and status snapshots.
    #[serde(default = "default_world_name")]
    pub name: String,

    /// Target simulation cycles per second.
    #[serde(default = "default_tick_rate")]
    pub tick_rate: f64,

    /// Upper bound on the shutdown drain wait. 0 = wait indefinitely.
    #[serde(default)]
    pub drain_timeout_ms: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: default_world_name(),
            tick_rate: default_tick_rate(),
            drain_timeout_ms: 0,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Run boundaries enforced by the host binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationBoundsConfig {
    /// Stop after this many cycles. 0 = unlimited.
    #[serde(default)]
    pub max_cycles: u64,

    /// Stop after this much wall-clock time. 0 = unlimited.
    #[serde(default)]
    pub max_real_time_seconds: u64,
}

// ---------------------------------------------------------------------------
// Default value functions (required by serde)
// ---------------------------------------------------------------------------

fn default_world_name() -> String {
    "cadence".to_owned()
}

const fn default_tick_rate() -> f64 {
    60.0
}

fn default_log_level() -> String {
    "info".to_owned()
}
