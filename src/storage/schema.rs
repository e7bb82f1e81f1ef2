//! Database schema definitions.
//!
//! Each repository owns its table; [`init_schema`] creates both. All DDL is
//! create-if-absent so it is safe to run against an existing database.

use duckdb::Connection;

use crate::storage::StorageError;
use crate::storage::http_log_repo::HttpLogRepository;
use crate::storage::log_repo::LogRepository;

/// SQL statement for creating the logs table.
///
/// `id` comes from a sequence, so insertion order is id order.
/// Note: metadata stored as JSON string for prepared statement compatibility.
pub const LOGS_TABLE_DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS logs_id_seq;
CREATE TABLE IF NOT EXISTS logs (
    id        BIGINT PRIMARY KEY DEFAULT NEXTVAL('logs_id_seq'),
    ts        BIGINT NOT NULL,
    level     VARCHAR NOT NULL,
    tag       VARCHAR NOT NULL,
    message   VARCHAR NOT NULL,
    metadata  VARCHAR
);
"#;

/// SQL statement for creating the http_logs table.
///
/// Request columns are written once on insert; response columns are nullable
/// until the response phase is applied by id.
pub const HTTP_LOGS_TABLE_DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS http_logs_id_seq;
CREATE TABLE IF NOT EXISTS http_logs (
    id                   BIGINT PRIMARY KEY DEFAULT NEXTVAL('http_logs_id_seq'),
    started_at           BIGINT NOT NULL,
    method               VARCHAR NOT NULL,
    url                  VARCHAR NOT NULL,
    request_content_type VARCHAR,
    request_headers      VARCHAR DEFAULT '{}',
    request_body         VARCHAR,
    status_code          INTEGER,
    status_message       VARCHAR,
    response_headers     VARCHAR DEFAULT '{}',
    response_body        VARCHAR,
    body_size            BIGINT,
    duration_ms          BIGINT,
    is_with_error        BOOLEAN NOT NULL DEFAULT false,
    error_message        VARCHAR
);
"#;

/// Initialize the database schema.
///
/// Creates all necessary tables and sequences if they don't exist.
pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    LogRepository::create_schema(conn)?;
    HttpLogRepository::create_schema(conn)?;

    tracing::info!("Database schema initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?",
            [table],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_schema_initialization() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        assert_eq!(table_count(&conn, "logs"), 1);
        assert_eq!(table_count(&conn, "http_logs"), 1);
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO logs (ts, level, tag, message) VALUES (1, 'INFO', 'app', 'kept')",
            [],
        )
        .unwrap();

        init_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_ids_follow_insertion_order() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let first: i64 = conn
            .query_row(
                "INSERT INTO http_logs (started_at, method, url) VALUES (1, 'GET', '/a') RETURNING id",
                [],
                |row| row.get(0),
            )
            .unwrap();
        let second: i64 = conn
            .query_row(
                "INSERT INTO http_logs (started_at, method, url) VALUES (2, 'GET', '/b') RETURNING id",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert!(second > first);
    }
}
