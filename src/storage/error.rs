//! Storage-specific error types.
//!
//! All storage operations return [`StorageError`] on failure, which can be
//! matched to determine the underlying cause (lifecycle, input, database, pool, channel).

use thiserror::Error;

use crate::storage::store::Lifecycle;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Operation invoked while the store is not ready.
    #[error("debug store is {state}; call DebugStore::init() first")]
    NotInitialized { state: Lifecycle },

    /// Write payload failed type or range validation. Nothing was applied.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),

    /// Failed to acquire a reader connection.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// No HTTP log row exists for the given id.
    #[error("http log {0} not found")]
    NotFound(i64),

    /// Failed to send command to writer actor.
    #[error("failed to send command to writer actor")]
    ChannelSend,

    /// Writer actor dropped a reply slot without answering.
    #[error("writer actor stopped before replying")]
    ChannelRecv,

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error (e.g., thread join failure).
    #[error("internal error: {0}")]
    Internal(String),

    /// Invalid data in database (e.g., unknown enum value).
    #[error("invalid data: {0}")]
    InvalidData(String),
}
