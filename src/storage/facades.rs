//! User-facing storage facades.
//!
//! Provides ergonomic APIs for storage operations:
//! - `StorageWriter`: Ordered writes via MPSC
//! - `LogReader`: Query log lines
//! - `HttpLogReader`: Query HTTP transactions
//! - `StorageAdmin`: Checkpoint and shutdown

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, SyncSender};

use crate::storage::StorageError;
use crate::storage::actor::{Command, WriterShared};
use crate::storage::filter::{HttpLogQuery, LogQuery};
use crate::storage::http_log_repo::HttpLogRepository;
use crate::storage::log_repo::LogRepository;
use crate::storage::pool::ReadPool;
use crate::storage::types::{HttpLogPatch, HttpLogRecord, LogRecord};

// =============================================================================
// Writer
// =============================================================================

/// Ordered storage writer.
///
/// Every write is a command on the actor channel, so writes from all clones of
/// this writer are applied in the order they were sent. Sends block only while
/// the channel is full.
#[derive(Clone)]
pub struct StorageWriter {
    tx: SyncSender<Command>,
    shared: Arc<WriterShared>,
}

impl std::fmt::Debug for StorageWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageWriter").finish_non_exhaustive()
    }
}

impl StorageWriter {
    pub(crate) fn new(tx: SyncSender<Command>, shared: Arc<WriterShared>) -> Self {
        Self { tx, shared }
    }

    /// Total count of writes the actor failed to apply.
    pub fn failed_writes(&self) -> u64 {
        self.shared.failed_writes.load(Ordering::Relaxed)
    }

    fn send(&self, cmd: Command) -> Result<(), StorageError> {
        self.tx.send(cmd).map_err(|_| StorageError::ChannelSend)
    }

    /// Enqueue a log line.
    pub fn add_log(&self, record: LogRecord) -> Result<(), StorageError> {
        self.send(Command::InsertLog(record))
    }

    /// Insert an HTTP transaction and wait for its id.
    pub fn add_http_log(&self, record: HttpLogRecord) -> Result<i64, StorageError> {
        let (reply, rx) = mpsc::sync_channel(1);
        self.send(Command::InsertHttpLog { record, reply })?;
        rx.recv().map_err(|_| StorageError::ChannelRecv)?
    }

    /// Enqueue the response phase of an HTTP transaction.
    pub fn update_http_log(&self, id: i64, patch: HttpLogPatch) -> Result<(), StorageError> {
        self.send(Command::UpdateHttpLog { id, patch })
    }

    /// Validate request-layer fields, then enqueue the update.
    ///
    /// Malformed input is rejected here and nothing is enqueued.
    pub fn update_http_log_fields(
        &self,
        id: i64,
        fields: &BTreeMap<String, String>,
    ) -> Result<(), StorageError> {
        let patch = HttpLogPatch::from_wire(fields)?;
        self.update_http_log(id, patch)
    }

    pub fn clear_logs(&self) -> Result<(), StorageError> {
        self.send(Command::ClearLogs)
    }

    pub fn clear_http_logs(&self) -> Result<(), StorageError> {
        self.send(Command::ClearHttpLogs)
    }

    /// Block until every write sent before this call has been applied.
    pub fn sync(&self) -> Result<(), StorageError> {
        let (reply, rx) = mpsc::sync_channel(1);
        self.send(Command::Barrier(reply))?;
        rx.recv().map_err(|_| StorageError::ChannelRecv)
    }

    /// Park the writer on a barrier until the returned receiver is read or dropped.
    #[cfg(test)]
    pub(crate) fn pause(&self) -> mpsc::Receiver<()> {
        let (reply, gate) = mpsc::sync_channel(0);
        self.send(Command::Barrier(reply)).unwrap();
        gate
    }

    #[cfg(test)]
    pub(crate) fn is_halted(&self) -> bool {
        self.shared.halt.load(Ordering::Acquire)
    }
}

// =============================================================================
// Readers
// =============================================================================

/// Log line reader.
#[derive(Clone)]
pub struct LogReader {
    pool: Arc<ReadPool>,
}

impl std::fmt::Debug for LogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogReader").finish_non_exhaustive()
    }
}

impl LogReader {
    pub(crate) fn new(pool: Arc<ReadPool>) -> Self {
        Self { pool }
    }

    /// Query log lines with filters.
    pub fn query(&self, q: &LogQuery) -> Result<Vec<LogRecord>, StorageError> {
        let conn = self.pool.get()?;
        LogRepository::query(&conn, q)
    }
}

/// HTTP transaction reader.
#[derive(Clone)]
pub struct HttpLogReader {
    pool: Arc<ReadPool>,
}

impl std::fmt::Debug for HttpLogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLogReader").finish_non_exhaustive()
    }
}

impl HttpLogReader {
    pub(crate) fn new(pool: Arc<ReadPool>) -> Self {
        Self { pool }
    }

    /// Query HTTP transactions with filters.
    pub fn query(&self, q: &HttpLogQuery) -> Result<Vec<HttpLogRecord>, StorageError> {
        let conn = self.pool.get()?;
        HttpLogRepository::query(&conn, q)
    }
}

// =============================================================================
// Admin
// =============================================================================

/// Storage administration.
#[derive(Clone)]
pub struct StorageAdmin {
    tx: SyncSender<Command>,
    shared: Arc<WriterShared>,
}

impl std::fmt::Debug for StorageAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAdmin").finish_non_exhaustive()
    }
}

impl StorageAdmin {
    pub(crate) fn new(tx: SyncSender<Command>, shared: Arc<WriterShared>) -> Self {
        Self { tx, shared }
    }

    pub fn checkpoint(&self) -> Result<(), StorageError> {
        self.tx
            .send(Command::Checkpoint)
            .map_err(|_| StorageError::ChannelSend)
    }

    /// Ask the actor to stop after the commands already queued.
    pub fn shutdown(&self) -> Result<(), StorageError> {
        self.tx
            .send(Command::Shutdown)
            .map_err(|_| StorageError::ChannelSend)
    }

    /// Ask the actor to skip everything still queued and stop.
    pub fn halt(&self) -> Result<(), StorageError> {
        self.shared.halt.store(true, Ordering::Release);
        self.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::actor::{DEFAULT_INIT_TIMEOUT, DbActor};
    use crate::storage::types::LogLevel;
    use std::time::Duration;
    use tempfile::tempdir;

    struct Fixture {
        writer: StorageWriter,
        admin: StorageAdmin,
        logs: LogReader,
        http_logs: HttpLogReader,
        handle: std::thread::JoinHandle<()>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let shared = Arc::new(WriterShared::default());
        let (handle, tx, reader_conn) = DbActor::spawn(
            &dir.path().join("facades.db"),
            100,
            Duration::from_secs(1),
            DEFAULT_INIT_TIMEOUT,
            Arc::clone(&shared),
        )
        .unwrap();
        let pool = ReadPool::new(reader_conn, 2).unwrap();

        Fixture {
            writer: StorageWriter::new(tx.clone(), Arc::clone(&shared)),
            admin: StorageAdmin::new(tx, shared),
            logs: LogReader::new(Arc::clone(&pool)),
            http_logs: HttpLogReader::new(pool),
            handle,
            _dir: dir,
        }
    }

    impl Fixture {
        fn stop(self) {
            self.admin.shutdown().unwrap();
            self.handle.join().unwrap();
        }
    }

    #[test]
    fn test_log_roundtrip() {
        let f = fixture();

        f.writer
            .add_log(LogRecord::new(LogLevel::Info, "boot", "Started"))
            .unwrap();
        f.writer.sync().unwrap();

        let results = f.logs.query(&LogQuery::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "Started");

        f.stop();
    }

    #[test]
    fn test_http_roundtrip() {
        let f = fixture();

        let id = f
            .writer
            .add_http_log(HttpLogRecord::new("DELETE", "https://example.com/item/3"))
            .unwrap();
        f.writer
            .update_http_log(id, HttpLogPatch::new().status(404, "Not Found"))
            .unwrap();
        f.writer.sync().unwrap();

        let results = f.http_logs.query(&HttpLogQuery::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].method, "DELETE");
        assert_eq!(results[0].status_code, Some(404));

        f.stop();
    }

    #[test]
    fn test_malformed_fields_are_not_enqueued() {
        let f = fixture();

        let id = f
            .writer
            .add_http_log(HttpLogRecord::new("GET", "/a"))
            .unwrap();
        let fields = BTreeMap::from([("code".to_string(), "99999999999".to_string())]);
        let err = f.writer.update_http_log_fields(id, &fields).unwrap_err();
        assert!(matches!(err, StorageError::MalformedInput(_)));
        f.writer.sync().unwrap();

        let results = f.http_logs.query(&HttpLogQuery::default()).unwrap();
        assert_eq!(results[0].status_code, None);

        f.stop();
    }

    #[test]
    fn test_writer_errors_after_shutdown() {
        let f = fixture();
        let writer = f.writer.clone();
        f.stop();

        let err = writer
            .add_log(LogRecord::new(LogLevel::Info, "t", "late"))
            .unwrap_err();
        assert!(matches!(err, StorageError::ChannelSend));
        assert_eq!(writer.failed_writes(), 0);
    }
}
