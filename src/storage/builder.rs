//! Storage builder and handles.
//!
//! Provides a builder pattern for constructing the storage layer
//! and a handles struct for accessing all storage facades.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::config::DatabaseConfig;
use crate::storage::StorageError;
use crate::storage::actor::{Command, DEFAULT_INIT_TIMEOUT, DbActor, WriterShared};
use crate::storage::facades::{HttpLogReader, LogReader, StorageAdmin, StorageWriter};
use crate::storage::pool::ReadPool;

/// Default channel capacity for writer commands.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Minimum connection pool size.
const MIN_POOL_SIZE: u32 = 2;

/// Maximum connection pool size.
const MAX_POOL_SIZE: u32 = 32;

/// Default WAL checkpoint interval.
pub const DEFAULT_CHECKPOINT_INTERVAL: Duration = Duration::from_secs(5);

/// Calculate default pool size based on available CPU parallelism.
///
/// Returns the number of available CPUs, clamped between MIN_POOL_SIZE and MAX_POOL_SIZE.
pub fn default_pool_size() -> u32 {
    std::thread::available_parallelism()
        .map(|p| (p.get() as u32).clamp(MIN_POOL_SIZE, MAX_POOL_SIZE))
        .unwrap_or(4)
}

/// What happens to queued writes when the store shuts down.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ShutdownMode {
    /// Apply everything queued before shutdown, then stop.
    #[default]
    Drain,
    /// Skip everything still queued and stop.
    Discard,
}

/// Builder for constructing the storage layer.
pub struct StorageBuilder {
    db_path: PathBuf,
    pool_size: u32,
    channel_capacity: usize,
    checkpoint_interval: Duration,
    init_timeout: Duration,
}

impl StorageBuilder {
    /// Create a new storage builder.
    ///
    /// Pool size defaults to the number of available CPUs (clamped to 2-32).
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            pool_size: default_pool_size(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            init_timeout: DEFAULT_INIT_TIMEOUT,
        }
    }

    /// Create a builder from validated database configuration.
    ///
    /// # Errors
    /// Returns `StorageError::InvalidData` if the configuration does not validate.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self, StorageError> {
        config
            .validate()
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;
        let checkpoint_interval = config
            .checkpoint_interval()
            .map_err(|e| StorageError::InvalidData(format!("checkpoint_interval: {e}")))?;

        Ok(Self::new(config.resolved_path())
            .pool_size(config.pool_size)
            .channel_capacity(config.channel_capacity)
            .checkpoint_interval(checkpoint_interval)
            .init_timeout(config.init_timeout))
    }

    /// Set the connection pool size for readers.
    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the channel capacity for writer commands.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set the WAL checkpoint interval.
    pub fn checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Set how long `build` waits for the writer to open the database.
    pub fn init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    /// Build the storage layer and return handles.
    ///
    /// Any database already at the path is deleted first.
    pub fn build(self) -> Result<StorageHandles, StorageError> {
        let shared = Arc::new(WriterShared::default());

        // Spawn writer actor - returns a cloneable connection for readers
        let (actor_handle, tx, reader_conn) = DbActor::spawn(
            &self.db_path,
            self.channel_capacity,
            self.checkpoint_interval,
            self.init_timeout,
            Arc::clone(&shared),
        )?;

        // Create reader pool from the cloned connection.
        // This ensures readers share the same database instance as the writer,
        // enabling immediate write visibility without WAL checkpoint delays.
        let pool = match ReadPool::new(reader_conn, self.pool_size.max(1)) {
            Ok(pool) => pool,
            Err(e) => {
                let _ = tx.send(Command::Shutdown);
                let _ = actor_handle.join();
                return Err(e);
            }
        };

        tracing::info!(
            path = %self.db_path.display(),
            pool_size = self.pool_size,
            channel_capacity = self.channel_capacity,
            "Storage ready"
        );

        Ok(StorageHandles {
            writer: StorageWriter::new(tx.clone(), Arc::clone(&shared)),
            logs: LogReader::new(Arc::clone(&pool)),
            http_logs: HttpLogReader::new(pool),
            admin: StorageAdmin::new(tx, shared),
            actor_handle: Some(actor_handle),
        })
    }
}

/// Handles to all storage layer facades.
pub struct StorageHandles {
    /// Ordered writer for logs and HTTP transactions.
    pub writer: StorageWriter,
    /// Facade for reading log lines.
    pub logs: LogReader,
    /// Facade for reading HTTP transactions.
    pub http_logs: HttpLogReader,
    /// Facade for storage administration.
    pub admin: StorageAdmin,
    /// Internal actor handle for shutdown.
    actor_handle: Option<JoinHandle<()>>,
}

impl StorageHandles {
    /// Shutdown the storage layer and wait for the writer to exit.
    pub fn shutdown(mut self, mode: ShutdownMode) -> Result<(), StorageError> {
        match mode {
            ShutdownMode::Drain => self.admin.shutdown()?,
            ShutdownMode::Discard => self.admin.halt()?,
        }

        if let Some(handle) = self.actor_handle.take() {
            handle
                .join()
                .map_err(|_| StorageError::Internal("Failed to join actor thread".to_string()))?;
        }

        tracing::info!(mode = %mode, "Storage shut down");
        Ok(())
    }
}

impl Drop for StorageHandles {
    fn drop(&mut self) {
        // Try graceful shutdown if not already done
        if self.actor_handle.is_some() {
            let _ = self.admin.shutdown();
            if let Some(handle) = self.actor_handle.take() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::filter::LogQuery;
    use crate::storage::types::{LogLevel, LogRecord};
    use tempfile::tempdir;

    #[test]
    fn test_storage_builder() {
        let dir = tempdir().unwrap();
        let handles = StorageBuilder::new(dir.path().join("test.db"))
            .pool_size(2)
            .channel_capacity(16)
            .build()
            .unwrap();

        handles
            .writer
            .add_log(LogRecord::new(LogLevel::Info, "builder", "hello"))
            .unwrap();
        handles.writer.sync().unwrap();

        let results = handles.logs.query(&LogQuery::default()).unwrap();
        assert_eq!(results.len(), 1);

        handles.shutdown(ShutdownMode::Drain).unwrap();
    }

    #[test]
    fn test_rebuild_starts_empty() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("rebuild.db");

        let handles = StorageBuilder::new(&db_path).build().unwrap();
        for i in 0..5 {
            handles
                .writer
                .add_log(LogRecord::new(LogLevel::Debug, "t", format!("m{i}")))
                .unwrap();
        }
        handles.shutdown(ShutdownMode::Drain).unwrap();

        let handles = StorageBuilder::new(&db_path).build().unwrap();
        assert!(handles.logs.query(&LogQuery::default()).unwrap().is_empty());
        handles.shutdown(ShutdownMode::Drain).unwrap();
    }

    #[test]
    fn test_drop_joins_writer() {
        let dir = tempdir().unwrap();
        let handles = StorageBuilder::new(dir.path().join("drop.db")).build().unwrap();
        let writer = handles.writer.clone();
        drop(handles);

        assert!(
            writer
                .add_log(LogRecord::new(LogLevel::Info, "t", "late"))
                .is_err()
        );
    }

    #[test]
    fn test_from_config_rejects_invalid_settings() {
        let config = DatabaseConfig {
            pool_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            StorageBuilder::from_config(&config),
            Err(StorageError::InvalidData(_))
        ));
    }

    #[test]
    fn test_shutdown_mode_from_str() {
        use std::str::FromStr;
        assert_eq!(ShutdownMode::from_str("drain").unwrap(), ShutdownMode::Drain);
        assert_eq!(
            ShutdownMode::from_str("DISCARD").unwrap(),
            ShutdownMode::Discard
        );
        assert!(ShutdownMode::from_str("flush").is_err());
    }

    #[test]
    fn test_default_pool_size_within_bounds() {
        let size = super::default_pool_size();
        assert!(size >= super::MIN_POOL_SIZE);
        assert!(size <= super::MAX_POOL_SIZE);
    }
}
