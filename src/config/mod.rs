//! Configuration module for debugscope.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Database settings (path, pool size, channel capacity, shutdown mode)
//! - Log filter directives for the binary

mod app;
mod validation;

pub use app::{AppConfig, DEFAULT_DB_PATH, DEFAULT_POOL_SIZE, DatabaseConfig};
pub use validation::{ConfigError, expand_env_vars, parse_duration};
