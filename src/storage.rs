//! Storage Layer
//!
//! DuckDB storage with read/write separation:
//! - **Writer**: Dedicated thread with exclusive writes fed by a bounded channel
//! - **Reader**: Connection pool for concurrent reads on the same database instance
//!
//! # Components
//!
//! - [`DebugStore`]: Lifecycle-managed facade (`init` / `destroy`) used by callers
//! - [`StorageWriter`]: Ordered write facade for logs and HTTP transactions
//! - [`LogReader`] / [`HttpLogReader`]: Filtered, paginated read facades
//! - [`StorageAdmin`]: Checkpoint and shutdown
//! - [`StorageBuilder`] / [`StorageHandles`]: Initialization and teardown

mod actor;
mod builder;
mod error;
mod facades;
mod filter;
mod http_log_repo;
mod log_repo;
mod pool;
mod schema;
mod store;
mod types;

pub use actor::{DEFAULT_INIT_TIMEOUT, WRITER_THREAD_NAME};
pub use builder::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_CHECKPOINT_INTERVAL, ShutdownMode, StorageBuilder,
    StorageHandles, default_pool_size,
};
pub use error::StorageError;
pub use facades::{HttpLogReader, LogReader, StorageAdmin, StorageWriter};
pub use filter::{
    DEFAULT_LIMIT, HttpLogQuery, LogQuery, MAX_LIMIT, SortOrder, StatusCodeFilter,
};
pub use store::{DebugStore, Lifecycle};
pub use types::{Headers, HttpLogPatch, HttpLogRecord, LogLevel, LogRecord};
