use crate::api::errors::ApiError;
use crate::query::filters::{parse_timezone, WeeklyFilters};
use crate::query::weekly::{self, WeeklyMatrix};
use crate::server::AppState;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Maximum number of days allowed for an explicit date range.
const MAX_RANGE_DAYS: i64 = 366;

/// Maximum length of a single filter value.
const MAX_FILTER_LEN: usize = 256;

/// Query parameters for the weekly sessions endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct WeeklyParams {
    pub website_id: Option<String>,
    #[serde(default = "default_period")]
    pub period: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    pub url_path: Option<String>,
    pub referrer: Option<String>,
    pub title: Option<String>,
    pub query: Option<String>,
    pub event_name: Option<String>,
    pub hostname: Option<String>,
    pub tag: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

fn default_period() -> String {
    "30d".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Parse a `website_id` parameter. Website ids are UUIDs.
pub fn validate_website_id(website_id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(website_id.trim())
        .map_err(|_| ApiError::BadRequest("website_id must be a UUID".to_string()))
}

/// Drop empty values and reject oversized ones.
fn filter_value(name: &str, value: Option<String>) -> Result<Option<String>, ApiError> {
    match value {
        Some(v) if v.is_empty() => Ok(None),
        Some(v) if v.len() > MAX_FILTER_LEN => Err(ApiError::BadRequest(format!(
            "{name} must be at most {MAX_FILTER_LEN} characters"
        ))),
        other => Ok(other),
    }
}

/// Validate an explicit `[start_date, end_date)` pair.
fn explicit_range(start_str: &str, end_str: &str) -> Result<(String, String), ApiError> {
    let start = chrono::NaiveDate::parse_from_str(start_str, "%Y-%m-%d").map_err(|_| {
        ApiError::BadRequest("Invalid start_date format. Use YYYY-MM-DD.".to_string())
    })?;
    let end = chrono::NaiveDate::parse_from_str(end_str, "%Y-%m-%d").map_err(|_| {
        ApiError::BadRequest("Invalid end_date format. Use YYYY-MM-DD.".to_string())
    })?;
    let days = (end - start).num_days();
    if days < 0 {
        return Err(ApiError::BadRequest(
            "end_date must be on or after start_date".to_string(),
        ));
    }
    if days > MAX_RANGE_DAYS {
        return Err(ApiError::BadRequest(format!(
            "Date range must not exceed {MAX_RANGE_DAYS} days"
        )));
    }
    Ok((start.to_string(), end.to_string()))
}

impl WeeklyParams {
    /// Resolve the start and end dates from the period or explicit params.
    pub fn date_range(&self) -> Result<(String, String), ApiError> {
        match (&self.start_date, &self.end_date) {
            (Some(start_str), Some(end_str)) => {
                return explicit_range(start_str, end_str);
            }
            (None, None) => {}
            _ => {
                return Err(ApiError::BadRequest(
                    "start_date and end_date must be provided together".to_string(),
                ));
            }
        }

        let now = chrono::Utc::now().date_naive();
        let (start, end) = match self.period.as_str() {
            "day" | "today" => (now, now + chrono::Days::new(1)),
            "7d" => (now - chrono::Days::new(7), now + chrono::Days::new(1)),
            "30d" => (now - chrono::Days::new(30), now + chrono::Days::new(1)),
            "90d" => (now - chrono::Days::new(90), now + chrono::Days::new(1)),
            _ => {
                return Err(ApiError::BadRequest(format!(
                    "Invalid period: {}. Use 'day', '7d', '30d', '90d', or provide start_date and end_date.",
                    self.period
                )));
            }
        };

        Ok((start.to_string(), end.to_string()))
    }

    /// Validate everything and build the backend-neutral filter set.
    pub fn into_filters(self) -> Result<(Uuid, WeeklyFilters), ApiError> {
        let website_id = self
            .website_id
            .as_deref()
            .ok_or_else(|| ApiError::BadRequest("website_id is required".to_string()))
            .and_then(validate_website_id)?;
        let (start, end) = self.date_range()?;
        let timezone = parse_timezone(&self.timezone).ok_or_else(|| {
            ApiError::BadRequest(format!("Unknown timezone: {}", self.timezone))
        })?;

        let mut filters = WeeklyFilters::new(start, end).with_timezone(timezone);
        filters.url_path = filter_value("url_path", self.url_path)?;
        filters.referrer = filter_value("referrer", self.referrer)?;
        filters.title = filter_value("title", self.title)?;
        filters.query = filter_value("query", self.query)?;
        filters.event_name = filter_value("event_name", self.event_name)?;
        filters.hostname = filter_value("hostname", self.hostname)?;
        filters.tag = filter_value("tag", self.tag)?;
        filters.browser = filter_value("browser", self.browser)?;
        filters.os = filter_value("os", self.os)?;
        filters.device = filter_value("device", self.device)?;
        filters.country = filter_value("country", self.country)?;
        filters.region = filter_value("region", self.region)?;
        filters.city = filter_value("city", self.city)?;

        Ok((website_id, filters))
    }
}

/// GET /api/stats/sessions/weekly — Distinct sessions per weekday and hour.
pub async fn get_sessions_weekly(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WeeklyParams>,
) -> Result<Json<WeeklyMatrix>, ApiError> {
    let (website_id, filters) = params.into_filters()?;
    let cache_key = format!("weekly:{website_id}:{}", filters.cache_key());

    if let Some(cached) = state.query_cache.get(&cache_key) {
        tracing::debug!(%website_id, "Weekly sessions cache hit");
        return Ok(Json(cached));
    }

    let matrix =
        weekly::get_website_sessions_weekly(state.source.as_ref(), website_id, &filters).await?;

    state.query_cache.insert(cache_key, matrix);
    Ok(Json(matrix))
}
