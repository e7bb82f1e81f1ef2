//! Core data types for the storage layer.
//!
//! - [`LogRecord`]: A free-form application log line
//! - [`HttpLogRecord`]: One HTTP transaction, inserted at request time
//! - [`HttpLogPatch`]: Response-phase fields applied to an existing transaction
//! - [`LogLevel`]: Severity of a log line

use std::collections::BTreeMap;
use std::num::{IntErrorKind, ParseIntError};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::storage::StorageError;

/// HTTP header map, stored as a JSON object.
pub type Headers = BTreeMap<String, String>;

/// Log severity level.
///
/// Stored uppercase; parsing is case-insensitive.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum LogLevel {
    Verbose,
    Debug,
    Info,
    Warn,
    Error,
    Assert,
}

/// A log line stored in the `logs` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Assigned by the store on insert.
    pub id: Option<i64>,
    /// Time the line was produced (UTC).
    pub ts: DateTime<Utc>,
    pub level: LogLevel,
    /// Short category string.
    pub tag: String,
    pub message: String,
    /// Optional structured context.
    pub metadata: Option<serde_json::Value>,
}

impl LogRecord {
    pub fn new(level: LogLevel, tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: None,
            ts: Utc::now(),
            level,
            tag: tag.into(),
            message: message.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_ts(mut self, ts: DateTime<Utc>) -> Self {
        self.ts = ts;
        self
    }
}

/// An HTTP transaction stored in the `http_logs` table.
///
/// The request phase is inserted with [`HttpLogRecord::new`]; the returned row id
/// is the correlation id used to apply the response phase via [`HttpLogPatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpLogRecord {
    /// Row id, also the correlation id.
    pub id: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub method: String,
    pub url: String,
    pub request_content_type: Option<String>,
    pub request_headers: Headers,
    pub request_body: Option<String>,
    pub status_code: Option<i32>,
    pub status_message: Option<String>,
    pub response_headers: Headers,
    pub response_body: Option<String>,
    pub body_size: Option<i64>,
    pub duration_ms: Option<i64>,
    /// Transaction failed with an exception rather than a response.
    pub is_with_error: bool,
    pub error_message: Option<String>,
}

impl HttpLogRecord {
    /// Create the request phase of a transaction.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: None,
            started_at: Utc::now(),
            method: method.into(),
            url: url.into(),
            request_content_type: None,
            request_headers: Headers::new(),
            request_body: None,
            status_code: None,
            status_message: None,
            response_headers: Headers::new(),
            response_body: None,
            body_size: None,
            duration_ms: None,
            is_with_error: false,
            error_message: None,
        }
    }

    pub fn with_request_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_request_body(
        mut self,
        content_type: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        self.request_content_type = Some(content_type.into());
        self.request_body = Some(body.into());
        self
    }

    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }
}

/// Response-phase fields for an in-flight HTTP transaction.
///
/// `None` leaves the stored column unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpLogPatch {
    pub status_code: Option<i32>,
    pub status_message: Option<String>,
    pub response_headers: Option<Headers>,
    pub response_body: Option<String>,
    pub body_size: Option<i64>,
    pub duration_ms: Option<i64>,
    pub is_with_error: Option<bool>,
    pub error_message: Option<String>,
}

impl HttpLogPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, code: i32, message: impl Into<String>) -> Self {
        self.status_code = Some(code);
        self.status_message = Some(message.into());
        self
    }

    pub fn response_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.response_headers
            .get_or_insert_with(Headers::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn response_body(mut self, body: impl Into<String>) -> Self {
        let body = body.into();
        self.body_size = Some(body.len() as i64);
        self.response_body = Some(body);
        self
    }

    pub fn duration_ms(mut self, duration_ms: i64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Mark the transaction as failed with an exception.
    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.is_with_error = Some(true);
        self.error_message = Some(message.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Parse a patch from request-layer string fields.
    ///
    /// Accepted keys: `code`, `message`, `response_headers` (JSON object), `body`,
    /// `body_size`, `duration`, `is_with_error`, `error_message`.
    ///
    /// # Errors
    /// Returns `StorageError::MalformedInput` on unknown keys, numbers that do not
    /// fit their column width, or out-of-range values.
    pub fn from_wire(fields: &BTreeMap<String, String>) -> Result<Self, StorageError> {
        let mut patch = Self::default();

        for (key, raw) in fields {
            match key.as_str() {
                "code" => {
                    let code: i32 = parse_int(key, raw, "32-bit")?;
                    if !(100..=599).contains(&code) {
                        return Err(StorageError::MalformedInput(format!(
                            "code: {code} is not a valid HTTP status code"
                        )));
                    }
                    patch.status_code = Some(code);
                }
                "message" => patch.status_message = Some(raw.clone()),
                "response_headers" => {
                    let headers: Headers = serde_json::from_str(raw).map_err(|e| {
                        StorageError::MalformedInput(format!("response_headers: {e}"))
                    })?;
                    patch.response_headers = Some(headers);
                }
                "body" => patch.response_body = Some(raw.clone()),
                "body_size" => patch.body_size = Some(parse_non_negative(key, raw)?),
                "duration" => patch.duration_ms = Some(parse_non_negative(key, raw)?),
                "is_with_error" => {
                    let flag = raw.trim().to_ascii_lowercase().parse::<bool>().map_err(|_| {
                        StorageError::MalformedInput(format!(
                            "is_with_error: '{raw}' is not a boolean"
                        ))
                    })?;
                    patch.is_with_error = Some(flag);
                }
                "error_message" => patch.error_message = Some(raw.clone()),
                other => {
                    return Err(StorageError::MalformedInput(format!(
                        "unknown http log field '{other}'"
                    )));
                }
            }
        }

        Ok(patch)
    }
}

fn parse_int<T>(field: &str, raw: &str, width: &str) -> Result<T, StorageError>
where
    T: FromStr<Err = ParseIntError>,
{
    raw.trim().parse::<T>().map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => StorageError::MalformedInput(
            format!("{field}: '{raw}' does not fit in a {width} integer"),
        ),
        _ => StorageError::MalformedInput(format!("{field}: '{raw}' is not an integer")),
    })
}

fn parse_non_negative(field: &str, raw: &str) -> Result<i64, StorageError> {
    let value: i64 = parse_int(field, raw, "64-bit")?;
    if value < 0 {
        return Err(StorageError::MalformedInput(format!(
            "{field}: {value} must not be negative"
        )));
    }
    Ok(value)
}
