//! Log line repository.
//!
//! Maps [`LogRecord`] to rows of the `logs` table and back. Writes are issued by
//! the writer actor on its own connection; queries run on pooled reader connections.

use std::str::FromStr;

use chrono::DateTime;
use duckdb::Connection;

use crate::storage::StorageError;
use crate::storage::filter::LogQuery;
use crate::storage::schema::LOGS_TABLE_DDL;
use crate::storage::types::{LogLevel, LogRecord};

/// Repository for the `logs` table.
pub struct LogRepository;

impl LogRepository {
    /// Create the `logs` table if it does not exist.
    pub fn create_schema(conn: &Connection) -> Result<(), StorageError> {
        conn.execute_batch(LOGS_TABLE_DDL)?;
        Ok(())
    }

    /// Insert a log line and return its assigned id.
    pub fn insert(conn: &Connection, record: &LogRecord) -> Result<i64, StorageError> {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO logs (ts, level, tag, message, metadata)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id",
        )?;

        let metadata = record
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let id = stmt.query_row(
            duckdb::params![
                record.ts.timestamp_micros(),
                record.level.as_ref(),
                &record.tag,
                &record.message,
                metadata,
            ],
            |row| row.get(0),
        )?;

        Ok(id)
    }

    /// Delete every log line. Returns the number of rows removed.
    pub fn clear(conn: &Connection) -> Result<usize, StorageError> {
        Ok(conn.execute("DELETE FROM logs", [])?)
    }

    /// Query log lines with filters and pagination.
    pub fn query(conn: &Connection, q: &LogQuery) -> Result<Vec<LogRecord>, StorageError> {
        let filter = q.to_filter();
        let sql = format!(
            "SELECT id, ts, level, tag, message, metadata FROM logs{}{}",
            filter.where_sql(),
            q.window_sql()
        );

        let params = filter.params();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params.as_slice(), |row| {
            Ok(LogRecord {
                id: Some(row.get(0)?),
                ts: DateTime::from_timestamp_micros(row.get(1)?).unwrap_or(DateTime::UNIX_EPOCH),
                level: LogLevel::from_str(&row.get::<_, String>(2)?).unwrap_or(LogLevel::Info),
                tag: row.get(3)?,
                message: row.get(4)?,
                metadata: row
                    .get::<_, Option<String>>(5)?
                    .and_then(|raw| serde_json::from_str(&raw).ok()),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        LogRepository::create_schema(&conn).unwrap();
        conn
    }

    fn seed(conn: &Connection) {
        let records = [
            LogRecord::new(LogLevel::Info, "net", "connected to api.example.com"),
            LogRecord::new(LogLevel::Error, "net", "Connection reset by peer"),
            LogRecord::new(LogLevel::Debug, "db", "query took 12ms"),
            LogRecord::new(LogLevel::Error, "ui", "render failed"),
        ];
        for record in &records {
            LogRepository::insert(conn, record).unwrap();
        }
    }

    #[test]
    fn test_insert_roundtrip() {
        let conn = setup();
        let record = LogRecord::new(LogLevel::Warn, "auth", "token expiring")
            .with_metadata(json!({"user": 42}));

        let id = LogRepository::insert(&conn, &record).unwrap();
        let results = LogRepository::query(&conn, &LogQuery::default()).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, Some(id));
        assert_eq!(results[0].level, LogLevel::Warn);
        assert_eq!(results[0].tag, "auth");
        assert_eq!(results[0].metadata, Some(json!({"user": 42})));
        assert_eq!(
            results[0].ts.timestamp_micros(),
            record.ts.timestamp_micros()
        );
    }

    #[test]
    fn test_newest_first() {
        let conn = setup();
        seed(&conn);

        let results = LogRepository::query(&conn, &LogQuery::default()).unwrap();
        let ids: Vec<i64> = results.iter().filter_map(|r| r.id).collect();

        assert_eq!(ids.len(), 4);
        assert!(ids.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(results[0].message, "render failed");
    }

    #[test]
    fn test_level_filter_case_insensitive() {
        let conn = setup();
        seed(&conn);

        let results = LogRepository::query(&conn, &LogQuery::default().level("error")).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.level == LogLevel::Error));
    }

    #[test]
    fn test_tag_and_search_filters() {
        let conn = setup();
        seed(&conn);

        let results = LogRepository::query(&conn, &LogQuery::default().tag("net")).unwrap();
        assert_eq!(results.len(), 2);

        let results =
            LogRepository::query(&conn, &LogQuery::default().search("CONNECT")).unwrap();
        assert_eq!(results.len(), 2);

        // Search also matches the tag.
        let results = LogRepository::query(&conn, &LogQuery::default().search("db")).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "query took 12ms");
    }

    #[test]
    fn test_tag_match_keeps_surrounding_whitespace() {
        let conn = setup();
        LogRepository::insert(&conn, &LogRecord::new(LogLevel::Info, "net", "plain")).unwrap();
        LogRepository::insert(&conn, &LogRecord::new(LogLevel::Info, " net", "padded")).unwrap();

        let tags = |tag: &str| -> Vec<String> {
            LogRepository::query(&conn, &LogQuery::default().tag(tag))
                .unwrap()
                .into_iter()
                .map(|r| r.message)
                .collect()
        };

        assert_eq!(tags("net"), vec!["plain"]);
        assert_eq!(tags(" net"), vec!["padded"]);
        assert!(tags("net ").is_empty());

        // Search text is matched as given, spaces included.
        let results =
            LogRepository::query(&conn, &LogQuery::default().search(" net")).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "padded");
    }

    #[test]
    fn test_search_wildcards_are_literal() {
        let conn = setup();
        seed(&conn);
        LogRepository::insert(&conn, &LogRecord::new(LogLevel::Info, "x", "100% done")).unwrap();

        let results = LogRepository::query(&conn, &LogQuery::default().search("%")).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "100% done");
    }

    #[test]
    fn test_pagination() {
        let conn = setup();
        seed(&conn);

        let page = LogRepository::query(&conn, &LogQuery::page(1, 2)).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].message, "query took 12ms");

        let past_end = LogRepository::query(&conn, &LogQuery::page(10, 2)).unwrap();
        assert!(past_end.is_empty());
    }

    #[test]
    fn test_clear() {
        let conn = setup();
        seed(&conn);

        assert_eq!(LogRepository::clear(&conn).unwrap(), 4);
        assert!(
            LogRepository::query(&conn, &LogQuery::default())
                .unwrap()
                .is_empty()
        );
    }
}
