//! Lifecycle-managed store facade.
//!
//! [`DebugStore`] owns the storage handles between `init()` and `destroy()` and
//! exposes the write and read API to arbitrary caller threads.
//!
//! Two synchronization points are kept apart:
//! - the facade `RwLock`, taken shared by every operation and exclusively only by
//!   `init`/`destroy`, so it guards handle validity and never orders reads behind writes;
//! - the writer actor channel, which totally orders all mutations.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use strum_macros::{AsRefStr, Display};

use crate::config::DatabaseConfig;
use crate::storage::StorageError;
use crate::storage::builder::{StorageBuilder, StorageHandles};
use crate::storage::filter::{HttpLogQuery, LogQuery, StatusCodeFilter};
use crate::storage::types::{HttpLogPatch, HttpLogRecord, LogRecord};

/// Store lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Lifecycle {
    /// `init()` has never been called.
    Uninitialized,
    /// The writer is opening the database and creating the schema.
    Initializing,
    /// Reads and writes are accepted.
    Ready,
    /// `destroy()` has been called; `init()` may be called again.
    Closed,
}

impl Lifecycle {
    fn as_u8(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Initializing => 1,
            Self::Ready => 2,
            Self::Closed => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Initializing,
            2 => Self::Ready,
            3 => Self::Closed,
            _ => Self::Uninitialized,
        }
    }
}

struct State {
    config: DatabaseConfig,
    handles: Option<StorageHandles>,
}

/// Process-wide diagnostic event store.
///
/// Use [`DebugStore::global`] for the shared instance, or [`DebugStore::new`] for an
/// isolated one (each instance must use its own database path).
pub struct DebugStore {
    phase: AtomicU8,
    state: RwLock<State>,
}

impl std::fmt::Debug for DebugStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugStore")
            .field("lifecycle", &self.lifecycle())
            .finish_non_exhaustive()
    }
}

impl DebugStore {
    /// Create an uninitialized store.
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            phase: AtomicU8::new(Lifecycle::Uninitialized.as_u8()),
            state: RwLock::new(State {
                config,
                handles: None,
            }),
        }
    }

    /// The process-wide store, created with default configuration on first use.
    pub fn global() -> &'static DebugStore {
        static GLOBAL: OnceLock<DebugStore> = OnceLock::new();
        GLOBAL.get_or_init(|| DebugStore::new(DatabaseConfig::default()))
    }

    /// Current lifecycle phase.
    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, phase: Lifecycle) {
        self.phase.store(phase.as_u8(), Ordering::Release);
    }

    fn read_state(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start the writer, recreate the database file and create the schema.
    ///
    /// Returns once the store is ready. Calling it again while ready is a no-op.
    pub fn init(&self) -> Result<(), StorageError> {
        if self.lifecycle() == Lifecycle::Ready {
            return Ok(());
        }

        let mut state = self.write_state();
        if state.handles.is_some() {
            return Ok(());
        }

        let previous = self.lifecycle();
        self.set_phase(Lifecycle::Initializing);

        match StorageBuilder::from_config(&state.config).and_then(StorageBuilder::build) {
            Ok(handles) => {
                state.handles = Some(handles);
                self.set_phase(Lifecycle::Ready);
                tracing::info!(path = %state.config.resolved_path(), "Debug store initialized");
                Ok(())
            }
            Err(e) => {
                self.set_phase(previous);
                tracing::error!(error = %e, "Debug store initialization failed");
                Err(e)
            }
        }
    }

    /// Replace the configuration, then [`init`](Self::init).
    ///
    /// The configuration is ignored if the store is already ready.
    pub fn init_with(&self, config: DatabaseConfig) -> Result<(), StorageError> {
        {
            let mut state = self.write_state();
            if state.handles.is_none() {
                state.config = config;
            } else {
                tracing::debug!("Debug store already initialized, ignoring new configuration");
            }
        }
        self.init()
    }

    /// Stop the writer and close the database.
    ///
    /// Queued writes are drained or discarded according to the configured
    /// [`ShutdownMode`](crate::storage::ShutdownMode). No-op if the store is not ready.
    pub fn destroy(&self) -> Result<(), StorageError> {
        let mut state = self.write_state();
        let Some(handles) = state.handles.take() else {
            return Ok(());
        };

        self.set_phase(Lifecycle::Closed);
        handles.shutdown(state.config.shutdown_mode)
    }

    #[cfg(test)]
    fn writer(&self) -> crate::storage::StorageWriter {
        self.with_handles(|h| Ok(h.writer.clone())).unwrap()
    }

    fn with_handles<T>(
        &self,
        f: impl FnOnce(&StorageHandles) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let state = self.read_state();
        match state.handles.as_ref() {
            Some(handles) => f(handles),
            None => Err(StorageError::NotInitialized {
                state: self.lifecycle(),
            }),
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Enqueue a log line. Returns without waiting for the insert.
    pub fn add_log(&self, record: LogRecord) -> Result<(), StorageError> {
        self.with_handles(|h| h.writer.add_log(record))
    }

    /// Insert the request phase of an HTTP transaction and return its id.
    ///
    /// Blocks until the writer has applied the insert, so a later update or read of
    /// this id is ordered after it.
    pub fn add_http_log(&self, record: HttpLogRecord) -> Result<i64, StorageError> {
        self.with_handles(|h| h.writer.add_http_log(record))
    }

    /// Enqueue the response phase of an HTTP transaction.
    ///
    /// An id that no longer exists (e.g. cleared meanwhile) is logged and ignored.
    pub fn update_http_log(&self, id: i64, patch: HttpLogPatch) -> Result<(), StorageError> {
        self.with_handles(|h| h.writer.update_http_log(id, patch))
    }

    /// Parse request-layer fields and enqueue the update.
    ///
    /// # Errors
    /// Returns `StorageError::MalformedInput` without enqueuing anything if a field
    /// fails validation.
    pub fn update_http_log_fields(
        &self,
        id: i64,
        fields: &BTreeMap<String, String>,
    ) -> Result<(), StorageError> {
        self.with_handles(|h| h.writer.update_http_log_fields(id, fields))
    }

    pub fn clear_all_logs(&self) -> Result<(), StorageError> {
        self.with_handles(|h| h.writer.clear_logs())
    }

    pub fn clear_all_http_logs(&self) -> Result<(), StorageError> {
        self.with_handles(|h| h.writer.clear_http_logs())
    }

    /// Block until every write enqueued before this call has been applied.
    pub fn sync(&self) -> Result<(), StorageError> {
        self.with_handles(|h| h.writer.sync())
    }

    pub fn checkpoint(&self) -> Result<(), StorageError> {
        self.with_handles(|h| h.admin.checkpoint())
    }

    /// Writes dropped by the writer after a storage failure, this lifetime.
    pub fn failed_writes(&self) -> Result<u64, StorageError> {
        self.with_handles(|h| Ok(h.writer.failed_writes()))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Page through log lines, newest first.
    ///
    /// `level` matches case-insensitively, `tag` exactly, and `search` is a
    /// case-insensitive substring of message or tag. `None` or empty means no filter.
    pub fn get_logs_by_filter(
        &self,
        offset: u32,
        limit: u32,
        level: Option<&str>,
        tag: Option<&str>,
        search: Option<&str>,
    ) -> Result<Vec<LogRecord>, StorageError> {
        self.query_logs(&LogQuery {
            offset,
            limit,
            level: level.map(str::to_string),
            tag: tag.map(str::to_string),
            search: search.map(str::to_string),
            ..Default::default()
        })
    }

    pub fn query_logs(&self, query: &LogQuery) -> Result<Vec<LogRecord>, StorageError> {
        self.with_handles(|h| h.logs.query(query))
    }

    /// Page through HTTP transactions, newest first.
    pub fn get_http_logs(
        &self,
        offset: u32,
        limit: u32,
        status: StatusCodeFilter,
        only_errors: bool,
        search: Option<&str>,
    ) -> Result<Vec<HttpLogRecord>, StorageError> {
        self.query_http_logs(&HttpLogQuery {
            offset,
            limit,
            status,
            only_errors,
            search: search.map(str::to_string),
            ..Default::default()
        })
    }

    pub fn query_http_logs(&self, query: &HttpLogQuery) -> Result<Vec<HttpLogRecord>, StorageError> {
        self.with_handles(|h| h.http_logs.query(query))
    }
}

impl Drop for DebugStore {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            tracing::warn!(error = %e, "Debug store shutdown on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ShutdownMode;
    use crate::storage::types::LogLevel;
    use tempfile::tempdir;

    fn config(dir: &tempfile::TempDir) -> DatabaseConfig {
        DatabaseConfig {
            path: dir.path().join("store.db").display().to_string(),
            pool_size: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_operations_fail_before_init() {
        let dir = tempdir().unwrap();
        let store = DebugStore::new(config(&dir));
        assert_eq!(store.lifecycle(), Lifecycle::Uninitialized);

        let err = store
            .add_log(LogRecord::new(LogLevel::Info, "t", "m"))
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::NotInitialized {
                state: Lifecycle::Uninitialized
            }
        ));
        assert!(err.to_string().contains("DebugStore::init()"));

        assert!(store.get_logs_by_filter(0, 10, None, None, None).is_err());
        assert!(store.clear_all_http_logs().is_err());
    }

    #[test]
    fn test_destroy_without_init_is_noop() {
        let dir = tempdir().unwrap();
        let store = DebugStore::new(config(&dir));
        store.destroy().unwrap();
        assert_eq!(store.lifecycle(), Lifecycle::Uninitialized);
    }

    #[test]
    fn test_init_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = DebugStore::new(config(&dir));

        store.init().unwrap();
        store
            .add_log(LogRecord::new(LogLevel::Info, "t", "kept"))
            .unwrap();
        store.sync().unwrap();

        // A second init must not recreate the database.
        store.init().unwrap();
        assert_eq!(store.lifecycle(), Lifecycle::Ready);
        assert_eq!(
            store.get_logs_by_filter(0, 10, None, None, None).unwrap().len(),
            1
        );

        store.destroy().unwrap();
    }

    #[test]
    fn test_closed_after_destroy() {
        let dir = tempdir().unwrap();
        let store = DebugStore::new(config(&dir));
        store.init().unwrap();
        store.destroy().unwrap();

        assert_eq!(store.lifecycle(), Lifecycle::Closed);
        let err = store.sync().unwrap_err();
        assert!(matches!(
            err,
            StorageError::NotInitialized {
                state: Lifecycle::Closed
            }
        ));

        // Destroy twice is fine.
        store.destroy().unwrap();
    }

    #[test]
    fn test_failed_init_keeps_previous_phase() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let store = DebugStore::new(DatabaseConfig {
            path: blocker.join("store.db").display().to_string(),
            ..Default::default()
        });

        assert!(store.init().is_err());
        assert_eq!(store.lifecycle(), Lifecycle::Uninitialized);
    }

    #[test]
    fn test_init_with_replaces_config() {
        let dir = tempdir().unwrap();
        let store = DebugStore::new(DatabaseConfig::default());
        let custom = DatabaseConfig {
            shutdown_mode: ShutdownMode::Discard,
            ..config(&dir)
        };

        store.init_with(custom).unwrap();
        assert!(dir.path().join("store.db").exists());
        store.destroy().unwrap();
    }

    fn count_rows(db_path: &std::path::Path) -> i64 {
        let conn = duckdb::Connection::open(db_path).unwrap();
        conn.query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_drain_mode_applies_queued_writes() {
        let dir = tempdir().unwrap();
        let store = DebugStore::new(config(&dir));
        store.init().unwrap();

        let writer = store.writer();
        let gate = writer.pause();
        for i in 0..10 {
            store
                .add_log(LogRecord::new(LogLevel::Info, "drain", format!("m{i}")))
                .unwrap();
        }

        std::thread::scope(|s| {
            let destroyer = s.spawn(|| store.destroy());
            while store.lifecycle() != Lifecycle::Closed {
                std::thread::yield_now();
            }
            drop(gate);
            destroyer.join().unwrap().unwrap();
        });

        assert_eq!(count_rows(&dir.path().join("store.db")), 10);
    }

    #[test]
    fn test_discard_mode_skips_queued_writes() {
        let dir = tempdir().unwrap();
        let store = DebugStore::new(DatabaseConfig {
            shutdown_mode: ShutdownMode::Discard,
            ..config(&dir)
        });
        store.init().unwrap();
        store
            .add_log(LogRecord::new(LogLevel::Info, "discard", "applied"))
            .unwrap();

        let writer = store.writer();
        let gate = writer.pause();
        for i in 0..10 {
            store
                .add_log(LogRecord::new(LogLevel::Info, "discard", format!("m{i}")))
                .unwrap();
        }

        std::thread::scope(|s| {
            let destroyer = s.spawn(|| store.destroy());
            while !writer.is_halted() {
                std::thread::yield_now();
            }
            drop(gate);
            destroyer.join().unwrap().unwrap();
        });

        // Only the write ahead of the pause survives.
        assert_eq!(count_rows(&dir.path().join("store.db")), 1);
    }

    #[test]
    fn test_lifecycle_display() {
        assert_eq!(Lifecycle::Uninitialized.to_string(), "uninitialized");
        assert_eq!(Lifecycle::Ready.as_ref(), "ready");
    }
}
