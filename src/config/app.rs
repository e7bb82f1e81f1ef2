//! Application configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_INIT_TIMEOUT, ShutdownMode};

use super::validation::{ConfigError, expand_env_vars, parse_duration};

// =============================================================================
// Constants
// =============================================================================

/// Default database file path.
pub const DEFAULT_DB_PATH: &str = "debugscope.db";

/// Default connection pool size.
pub const DEFAULT_POOL_SIZE: u32 = 4;

fn default_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

fn default_pool_size() -> u32 {
    DEFAULT_POOL_SIZE
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_checkpoint_interval() -> String {
    "5s".to_string()
}

fn default_init_timeout() -> Duration {
    DEFAULT_INIT_TIMEOUT
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path; `${VAR}` and `${VAR:-default}` are expanded.
    /// The file is deleted and recreated on every `init`.
    #[serde(default = "default_path")]
    pub path: String,

    /// Connection pool size for read operations (default: 4).
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Channel capacity for write operations (default: 10000).
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// WAL checkpoint interval (default: "5s").
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: String,

    /// How long `init` waits for the database to open (default: 30s).
    #[serde(default = "default_init_timeout", with = "humantime_serde")]
    pub init_timeout: Duration,

    /// What happens to queued writes on `destroy` (default: drain).
    #[serde(default)]
    pub shutdown_mode: ShutdownMode,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            pool_size: DEFAULT_POOL_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            checkpoint_interval: default_checkpoint_interval(),
            init_timeout: DEFAULT_INIT_TIMEOUT,
            shutdown_mode: ShutdownMode::default(),
        }
    }
}

impl DatabaseConfig {
    /// Database path with environment variables expanded.
    pub fn resolved_path(&self) -> String {
        expand_env_vars(&self.path)
    }

    /// Parsed checkpoint interval.
    pub fn checkpoint_interval(&self) -> Result<Duration, String> {
        parse_duration(&self.checkpoint_interval)
    }

    /// Validate database settings.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolved_path().trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database path must not be empty".to_string(),
            ));
        }

        if self.pool_size == 0 {
            return Err(ConfigError::ValidationError(
                "database pool_size must be positive".to_string(),
            ));
        }

        if self.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "database channel_capacity must be positive".to_string(),
            ));
        }

        let interval = self.checkpoint_interval().map_err(|e| {
            ConfigError::ValidationError(format!("database checkpoint_interval: {}", e))
        })?;
        if interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "database checkpoint_interval must be positive".to_string(),
            ));
        }

        if self.init_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "database init_timeout must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Tracing filter directives, e.g. `info,debugscope=debug`.
    #[serde(default)]
    pub log_filter: Option<String>,
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

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;

        if self
            .log_filter
            .as_deref()
            .is_some_and(|filter| filter.trim().is_empty())
        {
            return Err(ConfigError::ValidationError(
                "log_filter must not be empty when set".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.path, "debugscope.db");
        assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.checkpoint_interval, "5s");
        assert_eq!(config.init_timeout, DEFAULT_INIT_TIMEOUT);
        assert_eq!(config.shutdown_mode, ShutdownMode::Drain);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("debugscope.yaml");
        std::fs::write(
            &path,
            r#"
database:
  path: /tmp/debug.db
  pool_size: 8
  checkpoint_interval: 10s
  init_timeout: 2s
  shutdown_mode: discard
log_filter: warn
"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.database.path, "/tmp/debug.db");
        assert_eq!(config.database.pool_size, 8);
        assert_eq!(config.database.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(
            config.database.checkpoint_interval().unwrap(),
            Duration::from_secs(10)
        );
        assert_eq!(config.database.init_timeout, Duration::from_secs(2));
        assert_eq!(config.database.shutdown_mode, ShutdownMode::Discard);
        assert_eq!(config.log_filter.as_deref(), Some("warn"));
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert_eq!(config.database.path, DEFAULT_DB_PATH);
        assert!(config.log_filter.is_none());
    }

    #[test]
    fn test_config_validation_invalid_pool_size() {
        let config = AppConfig {
            database: DatabaseConfig {
                pool_size: 0,
                ..Default::default()
            },
            log_filter: None,
        };

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("pool_size"));
    }

    #[test]
    fn test_config_validation_invalid_checkpoint_interval() {
        let config = DatabaseConfig {
            checkpoint_interval: "soon".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DatabaseConfig {
            checkpoint_interval: "0s".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_shutdown_mode_fails_to_parse() {
        let result = AppConfig::from_yaml("database:\n  shutdown_mode: flush\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_resolved_path_expands_env() {
        let config = DatabaseConfig {
            path: "${NONEXISTENT_DEBUGSCOPE_DIR:-/tmp}/scope.db".to_string(),
            ..Default::default()
        };
        assert_eq!(config.resolved_path(), "/tmp/scope.db");
    }
}
