//! Configuration module.
//!
//! YAML-based configuration for the store connection (`redis`) and the
//! worker pool (`pipeline`). Every field has a default, so an empty file
//! is a valid configuration.

mod app;
mod validation;

pub use app::{AppConfig, DEFAULT_ADDR, DEFAULT_PATTERN, PipelineConfig, RedisConfig};
pub use validation::{ConfigError, expand_env_vars, parse_duration};
