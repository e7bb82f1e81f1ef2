//! Filter and pagination model for log queries.
//!
//! Queries are translated into a parameterized `WHERE` clause plus an
//! `ORDER BY id ... LIMIT ... OFFSET ...` window. User-supplied text is always
//! bound as a parameter; only integers and fixed keywords are formatted into SQL.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

// =============================================================================
// Constants
// =============================================================================

pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 10_000;

// =============================================================================
// Query Types
// =============================================================================

/// Sort order by insertion id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, AsRefStr, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SortOrder {
    Asc,
    /// Newest first.
    #[default]
    Desc,
}

impl SortOrder {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// HTTP status code class filter.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum StatusCodeFilter {
    #[default]
    #[strum(serialize = "all")]
    #[serde(rename = "all")]
    All,
    #[strum(serialize = "1xx")]
    #[serde(rename = "1xx")]
    Informational,
    #[strum(serialize = "2xx")]
    #[serde(rename = "2xx")]
    Success,
    #[strum(serialize = "3xx")]
    #[serde(rename = "3xx")]
    Redirection,
    #[strum(serialize = "4xx")]
    #[serde(rename = "4xx")]
    ClientError,
    #[strum(serialize = "5xx")]
    #[serde(rename = "5xx")]
    ServerError,
}

impl StatusCodeFilter {
    /// Half-open status code range selected by this filter, `None` for `All`.
    pub fn range(&self) -> Option<(i32, i32)> {
        match self {
            Self::All => None,
            Self::Informational => Some((100, 200)),
            Self::Success => Some((200, 300)),
            Self::Redirection => Some((300, 400)),
            Self::ClientError => Some((400, 500)),
            Self::ServerError => Some((500, 600)),
        }
    }
}

/// Query for log lines.
///
/// Empty strings are treated the same as `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub offset: u32,
    pub limit: u32,
    /// Exact level match, case-insensitive.
    pub level: Option<String>,
    /// Exact tag match.
    pub tag: Option<String>,
    /// Case-insensitive substring of message or tag.
    pub search: Option<String>,
    pub order: SortOrder,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_LIMIT,
            level: None,
            tag: None,
            search: None,
            order: SortOrder::default(),
        }
    }
}

impl LogQuery {
    pub fn page(offset: u32, limit: u32) -> Self {
        Self {
            offset,
            limit,
            ..Default::default()
        }
    }

    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub(crate) fn to_filter(&self) -> SqlFilter {
        let mut filter = SqlFilter::default();

        if let Some(level) = non_empty(&self.level) {
            filter.push("level = ?");
            filter.bind(level.trim().to_ascii_uppercase());
        }
        if let Some(tag) = non_empty(&self.tag) {
            filter.push("tag = ?");
            filter.bind(tag.to_string());
        }
        if let Some(search) = non_empty(&self.search) {
            let needle = search.to_lowercase();
            filter.push("(strpos(lower(message), ?) > 0 OR strpos(lower(tag), ?) > 0)");
            filter.bind(needle.clone());
            filter.bind(needle);
        }

        filter
    }

    pub(crate) fn window_sql(&self) -> String {
        window_sql(self.offset, self.limit, self.order)
    }
}

/// Query for HTTP transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpLogQuery {
    pub offset: u32,
    pub limit: u32,
    pub status: StatusCodeFilter,
    /// Keep only transactions that failed with an exception.
    pub only_errors: bool,
    /// Case-insensitive substring of the URL.
    pub search: Option<String>,
    pub order: SortOrder,
}

impl Default for HttpLogQuery {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_LIMIT,
            status: StatusCodeFilter::All,
            only_errors: false,
            search: None,
            order: SortOrder::default(),
        }
    }
}

impl HttpLogQuery {
    pub fn page(offset: u32, limit: u32) -> Self {
        Self {
            offset,
            limit,
            ..Default::default()
        }
    }

    pub fn status(mut self, status: StatusCodeFilter) -> Self {
        self.status = status;
        self
    }

    pub fn only_errors(mut self, only_errors: bool) -> Self {
        self.only_errors = only_errors;
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub(crate) fn to_filter(&self) -> SqlFilter {
        let mut filter = SqlFilter::default();

        if let Some((lo, hi)) = self.status.range() {
            filter.push("status_code >= ? AND status_code < ?");
            filter.bind(lo);
            filter.bind(hi);
        }
        if self.only_errors {
            filter.push("is_with_error = true");
        }
        if let Some(search) = non_empty(&self.search) {
            filter.push("strpos(lower(url), ?) > 0");
            filter.bind(search.to_lowercase());
        }

        filter
    }

    pub(crate) fn window_sql(&self) -> String {
        window_sql(self.offset, self.limit, self.order)
    }
}

// =============================================================================
// SQL Building
// =============================================================================

/// Accumulated `WHERE` predicates with their bound parameters.
#[derive(Default)]
pub(crate) struct SqlFilter {
    clauses: Vec<&'static str>,
    params: Vec<Box<dyn duckdb::ToSql>>,
}

impl SqlFilter {
    fn push(&mut self, clause: &'static str) {
        self.clauses.push(clause);
    }

    fn bind<T: duckdb::ToSql + 'static>(&mut self, value: T) {
        self.params.push(Box::new(value));
    }

    /// `""` when unfiltered, otherwise `" WHERE a AND b"`.
    pub(crate) fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub(crate) fn params(&self) -> Vec<&dyn duckdb::ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }

    #[cfg(test)]
    fn param_count(&self) -> usize {
        self.params.len()
    }
}

fn window_sql(offset: u32, limit: u32, order: SortOrder) -> String {
    format!(
        " ORDER BY id {} LIMIT {} OFFSET {}",
        order.as_sql(),
        limit.min(MAX_LIMIT),
        offset
    )
}

/// The value as given, or `None` when absent or blank.
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}
