//! Reader connection pool using r2d2.
//!
//! Reader connections are cloned from a seed connection handed over by the
//! writer actor, so every reader shares the writer's database instance and sees
//! committed writes immediately.

use std::sync::{Arc, Mutex, PoisonError};

use duckdb::Connection;
use r2d2::{ManageConnection, Pool, PooledConnection};

use crate::storage::StorageError;

/// r2d2 manager that clones connections from a shared database instance.
pub struct SharedConnectionManager {
    seed: Mutex<Connection>,
}

impl SharedConnectionManager {
    pub fn new(seed: Connection) -> Self {
        Self {
            seed: Mutex::new(seed),
        }
    }
}

impl ManageConnection for SharedConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Connection, duckdb::Error> {
        self.seed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_clone()
    }

    fn is_valid(&self, conn: &mut Connection) -> Result<(), duckdb::Error> {
        conn.execute_batch("SELECT 1")
    }

    fn has_broken(&self, _conn: &mut Connection) -> bool {
        false
    }
}

/// Connection pool for concurrent read operations.
pub struct ReadPool {
    pool: Pool<SharedConnectionManager>,
}

impl ReadPool {
    /// Create a new read pool.
    ///
    /// Note: Schema is expected to be initialized by the writer actor before this is called.
    pub fn new(seed: Connection, size: u32) -> Result<Arc<Self>, StorageError> {
        let manager = SharedConnectionManager::new(seed);
        let pool = Pool::builder().max_size(size).build(manager)?;

        Ok(Arc::new(Self { pool }))
    }

    /// Get a connection from the pool.
    pub fn get(&self) -> Result<PooledConnection<SharedConnectionManager>, StorageError> {
        Ok(self.pool.get()?)
    }
}
