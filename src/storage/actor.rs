//! Writer actor with dedicated connection and MPSC channel.
//!
//! Single-writer pattern: one thread owns the write connection and applies
//! commands in the order they were received. A failed command is logged and
//! counted; the loop keeps running.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use duckdb::Connection;

use crate::storage::StorageError;
use crate::storage::http_log_repo::HttpLogRepository;
use crate::storage::log_repo::LogRepository;
use crate::storage::schema::init_schema;
use crate::storage::types::{HttpLogPatch, HttpLogRecord, LogRecord};

// =============================================================================
// Constants
// =============================================================================

/// Name of the writer thread.
pub const WRITER_THREAD_NAME: &str = "debugscope-writer";

/// Default time to wait for the writer to open the database.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Commands
// =============================================================================

/// Commands sent to the writer actor.
#[derive(Debug)]
pub enum Command {
    /// Insert a log line (fire-and-forget).
    InsertLog(LogRecord),
    /// Insert an HTTP transaction and reply with its id.
    InsertHttpLog {
        record: HttpLogRecord,
        reply: SyncSender<Result<i64, StorageError>>,
    },
    /// Apply response fields to an HTTP transaction.
    UpdateHttpLog { id: i64, patch: HttpLogPatch },
    /// Delete all log lines.
    ClearLogs,
    /// Delete all HTTP transactions.
    ClearHttpLogs,
    /// Force a database checkpoint.
    Checkpoint,
    /// Reply once every earlier command has been applied.
    Barrier(SyncSender<()>),
    /// Stop the actor.
    Shutdown,
}

/// State shared between the actor and its owner.
#[derive(Debug, Default)]
pub struct WriterShared {
    /// When set, every command except `Shutdown` is skipped.
    pub halt: AtomicBool,
    /// Commands that failed and were dropped.
    pub failed_writes: AtomicU64,
}

// =============================================================================
// Actor
// =============================================================================

/// Database writer actor.
pub struct DbActor {
    conn: Connection,
    rx: Receiver<Command>,
    shared: Arc<WriterShared>,
    last_checkpoint: Instant,
    checkpoint_interval: Duration,
    dirty: bool,
    discarded: u64,
}

impl DbActor {
    /// Spawn the writer actor thread.
    ///
    /// The thread deletes any existing database at `db_path`, opens a fresh one and
    /// creates the schema before accepting commands. This call blocks until that has
    /// finished or `init_timeout` elapses.
    ///
    /// Returns a tuple of:
    /// - `JoinHandle<()>`: Handle to the actor thread
    /// - `SyncSender<Command>`: Channel sender for commands
    /// - `Connection`: A connection to the same database instance, used to seed readers
    pub fn spawn(
        db_path: &Path,
        channel_capacity: usize,
        checkpoint_interval: Duration,
        init_timeout: Duration,
        shared: Arc<WriterShared>,
    ) -> Result<(JoinHandle<()>, SyncSender<Command>, Connection), StorageError> {
        // A writer that missed its startup deadline may still be recreating this file.
        join_stray_writer(db_path);

        let (tx, rx) = mpsc::sync_channel(channel_capacity);
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<Connection, StorageError>>(1);
        let path = db_path.to_path_buf();

        let handle = thread::Builder::new()
            .name(WRITER_THREAD_NAME.to_string())
            .spawn(move || {
                let opened = open_fresh(&path).and_then(|conn| {
                    let reader_conn = conn.try_clone()?;
                    Ok((conn, reader_conn))
                });

                let conn = match opened {
                    Ok((conn, reader_conn)) => {
                        if ready_tx.send(Ok(reader_conn)).is_err() {
                            tracing::warn!("Storage init abandoned before writer was ready");
                            return;
                        }
                        conn
                    }
                    Err(e) => {
                        tracing::error!(error = %e, path = %path.display(), "Failed to open database");
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let mut actor = DbActor {
                    conn,
                    rx,
                    shared,
                    last_checkpoint: Instant::now(),
                    checkpoint_interval,
                    dirty: false,
                    discarded: 0,
                };
                actor.run();
            })
            .map_err(|e| StorageError::Internal(format!("failed to spawn writer thread: {e}")))?;

        match ready_rx.recv_timeout(init_timeout) {
            Ok(Ok(reader_conn)) => Ok((handle, tx, reader_conn)),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                // The thread exits on its own once it finds nobody waiting.
                stray_writers()
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(db_path.to_path_buf(), handle);
                Err(StorageError::Internal(format!(
                    "writer was not ready within {init_timeout:?}"
                )))
            }
            Err(RecvTimeoutError::Disconnected) => Err(StorageError::Internal(
                "writer thread exited during startup".to_string(),
            )),
        }
    }

    fn run(&mut self) {
        tracing::info!("DbActor started");

        loop {
            let checkpoint_deadline = self.last_checkpoint + self.checkpoint_interval;
            let timeout = checkpoint_deadline.saturating_duration_since(Instant::now());

            match self.rx.recv_timeout(timeout) {
                Ok(cmd) => {
                    if self.handle_command(cmd) {
                        break; // Shutdown requested
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    // Timeout: checkpoint overdue
                }
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::warn!("Channel disconnected, shutting down");
                    break;
                }
            }

            if self.dirty && self.last_checkpoint.elapsed() >= self.checkpoint_interval {
                if let Err(e) = self.checkpoint() {
                    tracing::error!(error = %e, "Periodic checkpoint failed");
                }
            }
            if self.last_checkpoint.elapsed() >= self.checkpoint_interval {
                self.last_checkpoint = Instant::now();
            }
        }

        tracing::info!(discarded = self.discarded, "DbActor stopped");
    }

    fn handle_command(&mut self, cmd: Command) -> bool {
        if self.shared.halt.load(Ordering::Acquire) && !matches!(cmd, Command::Shutdown) {
            // Dropping the command also drops any reply sender it carries.
            self.discarded += 1;
            return false;
        }

        match cmd {
            Command::InsertLog(record) => match LogRepository::insert(&self.conn, &record) {
                Ok(_) => self.dirty = true,
                Err(e) => self.record_failure(&e, "Log insert failed"),
            },
            Command::InsertHttpLog { record, reply } => {
                let result = HttpLogRepository::insert(&self.conn, &record);
                match result {
                    Ok(_) => self.dirty = true,
                    Err(ref e) => self.record_failure(e, "HTTP log insert failed"),
                }
                let _ = reply.send(result);
            }
            Command::UpdateHttpLog { id, patch } => {
                match HttpLogRepository::update(&self.conn, id, &patch) {
                    Ok(()) => self.dirty = true,
                    Err(StorageError::NotFound(id)) => {
                        tracing::warn!(id, "HTTP log update skipped, row no longer exists");
                    }
                    Err(e) => self.record_failure(&e, "HTTP log update failed"),
                }
            }
            Command::ClearLogs => match LogRepository::clear(&self.conn) {
                Ok(deleted) => {
                    self.dirty = true;
                    tracing::info!(deleted, "Logs cleared");
                }
                Err(e) => self.record_failure(&e, "Clear logs failed"),
            },
            Command::ClearHttpLogs => match HttpLogRepository::clear(&self.conn) {
                Ok(deleted) => {
                    self.dirty = true;
                    tracing::info!(deleted, "HTTP logs cleared");
                }
                Err(e) => self.record_failure(&e, "Clear HTTP logs failed"),
            },
            Command::Checkpoint => {
                if let Err(e) = self.checkpoint() {
                    tracing::error!(error = %e, "Checkpoint failed");
                }
            }
            Command::Barrier(reply) => {
                let _ = reply.send(());
            }
            Command::Shutdown => {
                tracing::info!("DbActor shutting down");
                if self.dirty {
                    let _ = self.checkpoint();
                }
                return true;
            }
        }
        false
    }

    fn record_failure(&self, e: &StorageError, what: &str) {
        self.shared.failed_writes.fetch_add(1, Ordering::Relaxed);
        tracing::error!(error = %e, "{what}");
    }

    fn checkpoint(&mut self) -> Result<(), StorageError> {
        self.conn.execute_batch("CHECKPOINT;")?;
        self.dirty = false;
        self.last_checkpoint = Instant::now();
        tracing::debug!("WAL checkpoint completed");
        Ok(())
    }
}

// =============================================================================
// Database File
// =============================================================================

/// Writer threads abandoned by a startup timeout, keyed by database path.
fn stray_writers() -> &'static Mutex<HashMap<PathBuf, JoinHandle<()>>> {
    static STRAY: OnceLock<Mutex<HashMap<PathBuf, JoinHandle<()>>>> = OnceLock::new();
    STRAY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn join_stray_writer(path: &Path) {
    let stray = stray_writers()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(path);
    if let Some(handle) = stray {
        tracing::debug!(path = %path.display(), "Waiting for abandoned writer to exit");
        let _ = handle.join();
    }
}

/// Delete any previous database at `path` and open an empty one with the schema.
fn open_fresh(path: &Path) -> Result<Connection, StorageError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            StorageError::Internal(format!(
                "Failed to create database directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    remove_if_exists(path)?;
    remove_if_exists(&wal_path(path))?;

    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    Ok(conn)
}

fn wal_path(path: &Path) -> PathBuf {
    let mut wal = path.as_os_str().to_owned();
    wal.push(".wal");
    PathBuf::from(wal)
}

fn remove_if_exists(path: &Path) -> Result<(), StorageError> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed previous database file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::Internal(format!(
            "Failed to remove '{}': {}",
            path.display(),
            e
        ))),
    }
}
