use crate::query::filters::WeeklyFilters;
use crate::query::source::{SourceError, WeeklySessionsSource};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Days in the heatmap, Sunday first.
pub const DAYS: usize = 7;
/// Hours per day in the heatmap.
pub const HOURS: usize = 24;

/// One `(day-of-week, hour-of-day)` row as returned by a backend.
///
/// `time` is a `"<day>:<hour>"` label with an unpadded day (0 = Sunday) and a
/// two-digit hour. `value` is kept as raw JSON because ClickHouse renders
/// 64-bit counts as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBucketRow {
    pub time: String,
    #[serde(default)]
    pub value: Value,
}

impl TimeBucketRow {
    pub fn new(time: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            time: time.into(),
            value: value.into(),
        }
    }
}

/// Dense 7×24 matrix of distinct session counts. `matrix[0][0]` is Sunday 00:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeeklyMatrix([[u64; HOURS]; DAYS]);

impl WeeklyMatrix {
    pub const fn zeroed() -> Self {
        Self([[0; HOURS]; DAYS])
    }

    /// Count for a single bucket. Out-of-range indices read as 0.
    pub fn get(&self, day: usize, hour: usize) -> u64 {
        self.0
            .get(day)
            .and_then(|hours| hours.get(hour))
            .copied()
            .unwrap_or(0)
    }

    pub const fn rows(&self) -> &[[u64; HOURS]; DAYS] {
        &self.0
    }

    /// Sum of all 168 buckets.
    pub fn total(&self) -> u64 {
        self.0.iter().flatten().sum()
    }
}

impl Default for WeeklyMatrix {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Label identifying one bucket: `"{day}:{hour:02}"`.
pub fn bucket_label(day: usize, hour: usize) -> String {
    format!("{day}:{hour:02}")
}

/// Coerce a backend count to a number. Anything that isn't a finite,
/// non-negative number (or a string holding one) becomes 0.
pub fn coerce_count(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().map(float_to_count))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(float_to_count))
                .unwrap_or(0)
        }
        Value::Bool(b) => u64::from(*b),
        Value::Null | Value::Array(_) | Value::Object(_) => 0,
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn float_to_count(f: f64) -> u64 {
    if f.is_finite() && f > 0.0 {
        f.min(u64::MAX as f64) as u64
    } else {
        0
    }
}

/// Reshape backend rows into a dense weekly matrix.
///
/// The first row carrying a given label wins; rows with labels outside the
/// 7×24 grid (or not in canonical `"d:HH"` form) are never matched. This
/// never fails: anything unusable counts as 0.
pub fn format_weekly(rows: &[TimeBucketRow]) -> WeeklyMatrix {
    let mut by_label: HashMap<&str, &Value> = HashMap::with_capacity(rows.len());
    for row in rows {
        by_label.entry(row.time.as_str()).or_insert(&row.value);
    }

    let mut matrix = WeeklyMatrix::zeroed();
    for (day, hours) in matrix.0.iter_mut().enumerate() {
        for (hour, cell) in hours.iter_mut().enumerate() {
            if let Some(value) = by_label.get(bucket_label(day, hour).as_str()) {
                *cell = coerce_count(value);
            }
        }
    }
    matrix
}

/// Fetch distinct-session rows from the configured backend and reshape them.
pub async fn get_website_sessions_weekly(
    source: &dyn WeeklySessionsSource,
    website_id: Uuid,
    filters: &WeeklyFilters,
) -> Result<WeeklyMatrix, SourceError> {
    let rows = source.fetch_weekly_rows(website_id, filters).await?;
    tracing::debug!(
        backend = source.name(),
        %website_id,
        rows = rows.len(),
        "Fetched weekly session rows"
    );
    Ok(format_weekly(&rows))
}
