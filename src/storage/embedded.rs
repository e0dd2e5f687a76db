use crate::query::filters::{Dialect, FilterClause, WeeklyFilters};
use crate::query::source::{SourceError, WeeklySessionsSource};
use crate::query::weekly::TimeBucketRow;
use async_trait::async_trait;
use duckdb::Connection;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

/// Weekly session counts from the embedded DuckDB database.
pub struct DuckDbSource {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbSource {
    pub const fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl WeeklySessionsSource for DuckDbSource {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    async fn fetch_weekly_rows(
        &self,
        website_id: Uuid,
        filters: &WeeklyFilters,
    ) -> Result<Vec<TimeBucketRow>, SourceError> {
        let conn = Arc::clone(&self.conn);
        let filters = filters.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            query_weekly_rows(&conn, website_id, &filters)
        })
        .await
        .map_err(|e| SourceError::TaskPanicked(e.to_string()))?
        .map_err(SourceError::from)
    }
}

/// Build the bucketing SQL. Non-UTC zones take the timezone name as the
/// first bound parameter.
pub fn weekly_sql(filters: &WeeklyFilters, clause: &FilterClause) -> String {
    let local_time = if filters.is_utc() {
        "created_at"
    } else {
        "timezone(CAST(? AS VARCHAR), timezone('UTC', created_at))"
    };
    let filter_sql = &clause.sql;

    format!(
        "SELECT strftime({local_time}, '%w:%H') AS bucket,
                COUNT(DISTINCT session_id) AS sessions
         FROM website_event
         WHERE website_id = ? AND created_at >= CAST(? AS TIMESTAMP) AND created_at < CAST(? AS TIMESTAMP)
           {filter_sql}
         GROUP BY bucket
         ORDER BY bucket"
    )
}

/// Count distinct sessions per `"<day>:<hour>"` bucket.
pub fn query_weekly_rows(
    conn: &Connection,
    website_id: Uuid,
    filters: &WeeklyFilters,
) -> Result<Vec<TimeBucketRow>, duckdb::Error> {
    let clause = FilterClause::build(filters, Dialect::DuckDb);
    let sql = weekly_sql(filters, &clause);

    let mut params: Vec<String> = Vec::with_capacity(4 + clause.params.len());
    if !filters.is_utc() {
        params.push(filters.timezone.name().to_string());
    }
    params.push(website_id.to_string());
    params.push(filters.start_date.clone());
    params.push(filters.end_date.clone());
    params.extend(clause.values().map(str::to_string));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(duckdb::params_from_iter(params.iter()), |row| {
            let bucket: String = row.get(0)?;
            let sessions: i64 = row.get(1)?;
            Ok(TimeBucketRow::new(bucket, sessions))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}
