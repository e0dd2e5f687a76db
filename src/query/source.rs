use crate::query::filters::WeeklyFilters;
use crate::query::weekly::TimeBucketRow;
use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

/// An analytical store that can count distinct sessions per weekly bucket.
///
/// Implementations return one row per non-empty `"<day>:<hour>"` bucket in
/// the requested timezone; the caller fills in the gaps.
#[async_trait]
pub trait WeeklySessionsSource: Send + Sync + 'static {
    /// Short backend name for logs and health output.
    fn name(&self) -> &'static str;

    async fn fetch_weekly_rows(
        &self,
        website_id: Uuid,
        filters: &WeeklyFilters,
    ) -> Result<Vec<TimeBucketRow>, SourceError>;
}

/// Which store answers weekly queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    DuckDb,
    ClickHouse,
}

impl Backend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "duckdb" => Some(Self::DuckDb),
            "clickhouse" => Some(Self::ClickHouse),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DuckDb => "duckdb",
            Self::ClickHouse => "clickhouse",
        }
    }
}

/// Failure while fetching rows from a backend.
#[derive(Debug)]
pub enum SourceError {
    Database(duckdb::Error),
    Http(reqwest::Error),
    Io(std::io::Error),
    /// Backend answered with a non-success status.
    Backend { status: u16, body: String },
    Decode(String),
    TaskPanicked(String),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Database(e) => write!(f, "Database error: {e}"),
            Self::Http(e) => write!(f, "HTTP error: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Backend { status, body } => write!(f, "Backend error {status}: {body}"),
            Self::Decode(msg) => write!(f, "Decode error: {msg}"),
            Self::TaskPanicked(msg) => write!(f, "Query task panicked: {msg}"),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Database(e) => Some(e),
            Self::Http(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Backend { .. } | Self::Decode(_) | Self::TaskPanicked(_) => None,
        }
    }
}

impl From<duckdb::Error> for SourceError {
    fn from(e: duckdb::Error) -> Self {
        Self::Database(e)
    }
}

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e)
    }
}
