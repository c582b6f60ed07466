//! Application configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::{
    DEFAULT_DRAIN_TIMEOUT, DEFAULT_INTAKE_CAPACITY, DEFAULT_OUTPUT_CAPACITY, DEFAULT_READ_TIMEOUT,
    DEFAULT_WORKERS,
};

use super::validation::{ConfigError, expand_env_vars};

// =============================================================================
// Constants
// =============================================================================

/// Default store address.
pub const DEFAULT_ADDR: &str = "127.0.0.1:6379";

/// Default key pattern (every key).
pub const DEFAULT_PATTERN: &str = "*";

fn default_addr() -> String {
    DEFAULT_ADDR.to_string()
}

fn default_pattern() -> String {
    DEFAULT_PATTERN.to_string()
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_intake_capacity() -> usize {
    DEFAULT_INTAKE_CAPACITY
}

fn default_output_capacity() -> usize {
    DEFAULT_OUTPUT_CAPACITY
}

fn default_read_timeout() -> Duration {
    DEFAULT_READ_TIMEOUT
}

fn default_drain_timeout() -> Duration {
    DEFAULT_DRAIN_TIMEOUT
}

// =============================================================================
// Redis Configuration
// =============================================================================

/// Store connection and subscription settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Store address, `host:port` or a `redis://` URL (default: "127.0.0.1:6379").
    ///
    /// `${VAR}` and `${VAR:-default}` are expanded at load time.
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Key pattern to subscribe to (default: "*").
    #[serde(default = "default_pattern")]
    pub pattern: String,

    /// Logical database index (default: 0).
    #[serde(default)]
    pub keyspace_id: u32,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            pattern: default_pattern(),
            keyspace_id: 0,
        }
    }
}

// =============================================================================
// Pipeline Configuration
// =============================================================================

/// Worker pool and buffering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Concurrent workers (default: 16).
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Intake queue capacity (default: 1024).
    #[serde(default = "default_intake_capacity")]
    pub intake_capacity: usize,

    /// Capacity of the events and errors streams (default: 16).
    #[serde(default = "default_output_capacity")]
    pub output_capacity: usize,

    /// Timeout for one store read (default: 5s).
    #[serde(default = "default_read_timeout", with = "humantime_serde")]
    pub read_timeout: Duration,

    /// Time allowed for in-flight work on shutdown (default: 5s).
    #[serde(default = "default_drain_timeout", with = "humantime_serde")]
    pub drain_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            intake_capacity: DEFAULT_INTAKE_CAPACITY,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
            read_timeout: DEFAULT_READ_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Store settings.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(content)?;
        config.redis.addr = expand_env_vars(&config.redis.addr);
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redis.addr.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "redis addr must not be empty".to_string(),
            ));
        }

        if self.redis.pattern.is_empty() {
            return Err(ConfigError::ValidationError(
                "redis pattern must not be empty".to_string(),
            ));
        }

        let p = &self.pipeline;
        for (name, value) in [
            ("workers", p.workers),
            ("intake_capacity", p.intake_capacity),
            ("output_capacity", p.output_capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "pipeline {name} must be positive"
                )));
            }
        }

        for (name, value) in [
            ("read_timeout", p.read_timeout),
            ("drain_timeout", p.drain_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ValidationError(format!(
                    "pipeline {name} must be positive"
                )));
            }
        }

        Ok(())
    }
}
