//! HTTP transaction repository.
//!
//! A transaction is inserted once with its request fields, then updated in place
//! by id with the response fields. The update never touches request columns.

use chrono::DateTime;
use duckdb::Connection;

use crate::storage::StorageError;
use crate::storage::filter::HttpLogQuery;
use crate::storage::schema::HTTP_LOGS_TABLE_DDL;
use crate::storage::types::{Headers, HttpLogPatch, HttpLogRecord};

const SELECT_COLUMNS: &str = "id, started_at, method, url, request_content_type, request_headers,
    request_body, status_code, status_message, response_headers, response_body, body_size,
    duration_ms, is_with_error, error_message";

/// Repository for the `http_logs` table.
pub struct HttpLogRepository;

impl HttpLogRepository {
    /// Create the `http_logs` table if it does not exist.
    pub fn create_schema(conn: &Connection) -> Result<(), StorageError> {
        conn.execute_batch(HTTP_LOGS_TABLE_DDL)?;
        Ok(())
    }

    /// Insert a transaction and return its id (the correlation id).
    pub fn insert(conn: &Connection, r: &HttpLogRecord) -> Result<i64, StorageError> {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO http_logs (started_at, method, url, request_content_type, request_headers,
                request_body, status_code, status_message, response_headers, response_body,
                body_size, duration_ms, is_with_error, error_message)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )?;

        let request_headers = serde_json::to_string(&r.request_headers)?;
        let response_headers = serde_json::to_string(&r.response_headers)?;
        let id = stmt.query_row(
            duckdb::params![
                r.started_at.timestamp_micros(),
                &r.method,
                &r.url,
                r.request_content_type.as_deref(),
                request_headers,
                r.request_body.as_deref(),
                r.status_code,
                r.status_message.as_deref(),
                response_headers,
                r.response_body.as_deref(),
                r.body_size,
                r.duration_ms,
                r.is_with_error,
                r.error_message.as_deref(),
            ],
            |row| row.get(0),
        )?;

        Ok(id)
    }

    /// Apply response fields to an existing transaction.
    ///
    /// # Errors
    /// Returns `StorageError::NotFound` if no row has this id.
    pub fn update(conn: &Connection, id: i64, patch: &HttpLogPatch) -> Result<(), StorageError> {
        if patch.is_empty() {
            let exists: i64 = conn.query_row(
                "SELECT COUNT(*) FROM http_logs WHERE id = ?",
                [id],
                |row| row.get(0),
            )?;
            return if exists > 0 {
                Ok(())
            } else {
                Err(StorageError::NotFound(id))
            };
        }

        let mut sets: Vec<&'static str> = Vec::new();
        let mut params: Vec<Box<dyn duckdb::ToSql>> = Vec::new();

        if let Some(code) = patch.status_code {
            sets.push("status_code = ?");
            params.push(Box::new(code));
        }
        if let Some(ref message) = patch.status_message {
            sets.push("status_message = ?");
            params.push(Box::new(message.clone()));
        }
        if let Some(ref headers) = patch.response_headers {
            sets.push("response_headers = ?");
            params.push(Box::new(serde_json::to_string(headers)?));
        }
        if let Some(ref body) = patch.response_body {
            sets.push("response_body = ?");
            params.push(Box::new(body.clone()));
        }
        if let Some(size) = patch.body_size {
            sets.push("body_size = ?");
            params.push(Box::new(size));
        }
        if let Some(duration) = patch.duration_ms {
            sets.push("duration_ms = ?");
            params.push(Box::new(duration));
        }
        if let Some(with_error) = patch.is_with_error {
            sets.push("is_with_error = ?");
            params.push(Box::new(with_error));
        }
        if let Some(ref message) = patch.error_message {
            sets.push("error_message = ?");
            params.push(Box::new(message.clone()));
        }

        let sql = format!("UPDATE http_logs SET {} WHERE id = ?", sets.join(", "));
        params.push(Box::new(id));

        let param_refs: Vec<&dyn duckdb::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let updated = conn.execute(&sql, param_refs.as_slice())?;
        if updated == 0 {
            return Err(StorageError::NotFound(id));
        }

        Ok(())
    }

    /// Delete every transaction. Returns the number of rows removed.
    pub fn clear(conn: &Connection) -> Result<usize, StorageError> {
        Ok(conn.execute("DELETE FROM http_logs", [])?)
    }

    /// Query transactions with filters and pagination.
    pub fn query(conn: &Connection, q: &HttpLogQuery) -> Result<Vec<HttpLogRecord>, StorageError> {
        let filter = q.to_filter();
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM http_logs{}{}",
            filter.where_sql(),
            q.window_sql()
        );

        let params = filter.params();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params.as_slice(), |row| {
            Ok(HttpLogRecord {
                id: Some(row.get(0)?),
                started_at: DateTime::from_timestamp_micros(row.get(1)?)
                    .unwrap_or(DateTime::UNIX_EPOCH),
                method: row.get(2)?,
                url: row.get(3)?,
                request_content_type: row.get(4)?,
                request_headers: parse_headers(&row.get::<_, Option<String>>(5)?.unwrap_or_default()),
                request_body: row.get(6)?,
                status_code: row.get(7)?,
                status_message: row.get(8)?,
                response_headers: parse_headers(
                    &row.get::<_, Option<String>>(9)?.unwrap_or_default(),
                ),
                response_body: row.get(10)?,
                body_size: row.get(11)?,
                duration_ms: row.get(12)?,
                is_with_error: row.get(13)?,
                error_message: row.get(14)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::from)
    }
}

/// Parse a JSON header object, falling back to empty on malformed data.
fn parse_headers(s: &str) -> Headers {
    if s.is_empty() || s == "{}" {
        return Headers::new();
    }
    serde_json::from_str(s).unwrap_or_else(|e| {
        tracing::debug!(error = %e, raw = s, "Failed to parse header map, returning empty");
        Headers::new()
    })
}
