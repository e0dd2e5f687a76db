use crate::query::filters::{Dialect, FilterClause, WeeklyFilters};
use crate::query::source::{SourceError, WeeklySessionsSource};
use crate::query::weekly::TimeBucketRow;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// Raw per-event table.
pub const EVENTS_TABLE: &str = "website_event";
/// Hourly session rollup; only usable without per-event filters.
pub const HOURLY_STATS_TABLE: &str = "website_event_stats_hourly";

/// HTTP client for ClickHouse.
///
/// SQL is posted as the request body; named parameters travel as
/// `param_<name>` query-string entries so ClickHouse substitutes them itself.
#[derive(Clone)]
pub struct ClickHouseClient {
    client: reqwest::Client,
    url: String,
    user: String,
    password: String,
    database: String,
}

impl ClickHouseClient {
    pub fn new(
        url: &str,
        user: &str,
        password: &str,
        database: &str,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            database: database.to_string(),
        })
    }

    /// Run a SELECT and return the `data` array of the JSON response.
    pub async fn query(
        &self,
        sql: &str,
        named_params: &[(String, String)],
    ) -> Result<Vec<Value>, SourceError> {
        let mut url = reqwest::Url::parse(&self.url)
            .map_err(|e| SourceError::Decode(format!("Invalid ClickHouse URL: {e}")))?;
        {
            let mut qs = url.query_pairs_mut();
            qs.append_pair("default_format", "JSON");
            qs.append_pair("database", &self.database);
            for (name, value) in named_params {
                qs.append_pair(&format!("param_{name}"), value);
            }
        }

        let resp = self
            .client
            .post(url)
            .basic_auth(&self.user, Some(&self.password))
            .body(sql.to_string())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = resp.json().await?;
        Ok(json
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

/// Weekly session counts from ClickHouse.
pub struct ClickHouseSource {
    client: ClickHouseClient,
}

impl ClickHouseSource {
    pub const fn new(client: ClickHouseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WeeklySessionsSource for ClickHouseSource {
    fn name(&self) -> &'static str {
        "clickhouse"
    }

    async fn fetch_weekly_rows(
        &self,
        website_id: Uuid,
        filters: &WeeklyFilters,
    ) -> Result<Vec<TimeBucketRow>, SourceError> {
        let clause = FilterClause::build(filters, Dialect::ClickHouse);
        let sql = weekly_sql(filters, &clause);

        let mut params = vec![
            ("websiteId".to_string(), website_id.to_string()),
            ("startDate".to_string(), date_to_ch(&filters.start_date)),
            ("endDate".to_string(), date_to_ch(&filters.end_date)),
        ];
        params.extend(clause.params);

        let data = self.client.query(&sql, &params).await?;
        decode_rows(data)
    }
}

/// Pick the table: per-event filters need raw events, everything else can
/// read the hourly rollup.
pub fn source_table(filters: &WeeklyFilters) -> &'static str {
    if filters.has_event_filters() {
        EVENTS_TABLE
    } else {
        HOURLY_STATS_TABLE
    }
}

/// Build the bucketing SQL. `toDateTime` needs a constant timezone, so the
/// already-validated IANA name is inlined.
pub fn weekly_sql(filters: &WeeklyFilters, clause: &FilterClause) -> String {
    let table = source_table(filters);
    let timezone = filters.timezone.name();
    let filter_sql = &clause.sql;

    format!(
        "SELECT formatDateTime(toDateTime(created_at, '{timezone}'), '%w:%H') AS time,
                count(DISTINCT session_id) AS value
         FROM {table} website_event
         WHERE website_id = {{websiteId:UUID}}
           AND created_at >= {{startDate:DateTime64(3, 'UTC')}}
           AND created_at < {{endDate:DateTime64(3, 'UTC')}}
           {filter_sql}
         GROUP BY time
         ORDER BY time"
    )
}

/// `YYYY-MM-DD` → midnight UTC as a `DateTime64(3, 'UTC')` literal.
fn date_to_ch(date: &str) -> String {
    format!("{date} 00:00:00.000")
}

fn decode_rows(data: Vec<Value>) -> Result<Vec<TimeBucketRow>, SourceError> {
    serde_json::from_value(Value::Array(data)).map_err(|e| SourceError::Decode(e.to_string()))
}
