//! debugscope - In-process diagnostic event store
//!
//! Collects application log lines and HTTP transaction records into an embedded
//! DuckDB database so a debugging front end can page through them while the host
//! process keeps running.
//!
//! # Architecture
//!
//! - **Storage**: Single writer thread fed by a bounded channel, plus a pooled
//!   set of reader connections on the same database instance
//! - **Store**: `init` / `destroy` lifecycle around the storage layer; the database
//!   file is recreated on every `init`
//! - **Prefs**: Typed mirror of named key/value preference files
//!
//! # Example
//!
//! ```rust,no_run
//! use debugscope::{DebugStore, HttpLogPatch, HttpLogRecord, LogLevel, LogRecord};
//!
//! # fn main() -> Result<(), debugscope::StorageError> {
//! let store = DebugStore::global();
//! store.init()?;
//!
//! store.add_log(LogRecord::new(LogLevel::Info, "boot", "Started"))?;
//! let id = store.add_http_log(HttpLogRecord::new("GET", "https://example.com"))?;
//! store.update_http_log(id, HttpLogPatch::new().status(200, "OK"))?;
//!
//! let recent = store.get_logs_by_filter(0, 50, Some("info"), None, None)?;
//! # let _ = recent;
//! store.destroy()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod prefs;
pub mod storage;

pub use storage::{
    DebugStore, HttpLogPatch, HttpLogQuery, HttpLogRecord, Lifecycle, LogLevel, LogQuery,
    LogRecord, SortOrder, StatusCodeFilter, StorageError,
};
