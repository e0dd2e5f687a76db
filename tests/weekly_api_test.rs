use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use duckdb::Connection;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use session_heatmap::config::Config;
use session_heatmap::query::filters::WeeklyFilters;
use session_heatmap::query::source::{SourceError, WeeklySessionsSource};
use session_heatmap::query::weekly::TimeBucketRow;
use session_heatmap::server::{build_router, AppState};
use session_heatmap::storage::embedded::DuckDbSource;
use session_heatmap::storage::migrations;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const SITE: &str = "5e3c9c64-8f1e-4f6b-9a55-0d6f2b1c8e21";
const JANUARY: &str = "start_date=2024-01-01&end_date=2024-02-01";

fn make_duckdb_state(cache_ttl_secs: u64) -> (Arc<AppState>, Arc<Mutex<Connection>>) {
    let conn = Connection::open_in_memory().unwrap();
    migrations::run_migrations(&conn).unwrap();
    let conn = Arc::new(Mutex::new(conn));
    let config = Config {
        cache_ttl_secs,
        ..Config::default()
    };
    let source = Arc::new(DuckDbSource::new(Arc::clone(&conn)));
    (Arc::new(AppState::new(source, &config)), conn)
}

fn insert_event(conn: &Mutex<Connection>, session_id: &str, timestamp: &str, url_path: &str) {
    conn.lock()
        .execute(
            "INSERT INTO website_event (website_id, session_id, created_at, event_name, url_path, country)
             VALUES (?, ?, CAST(? AS TIMESTAMP), 'pageview', ?, 'US')",
            duckdb::params![SITE, session_id, timestamp, url_path],
        )
        .unwrap();
}

async fn get(state: Arc<AppState>, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = build_router(state)
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

fn cell(matrix: &serde_json::Value, day: usize, hour: usize) -> u64 {
    matrix[day][hour].as_u64().unwrap()
}

fn assert_dense(matrix: &serde_json::Value) {
    let days = matrix.as_array().unwrap();
    assert_eq!(days.len(), 7);
    for hours in days {
        assert_eq!(hours.as_array().unwrap().len(), 24);
    }
}

#[tokio::test]
async fn test_weekly_heatmap_from_duckdb() {
    let (state, conn) = make_duckdb_state(60);
    // Monday 10:xx, two sessions
    insert_event(&conn, "s1", "2024-01-15 10:05:00", "/");
    insert_event(&conn, "s1", "2024-01-15 10:40:00", "/pricing");
    insert_event(&conn, "s2", "2024-01-15 10:30:00", "/");
    // Saturday 23:xx
    insert_event(&conn, "s3", "2024-01-20 23:59:00", "/");

    let (status, matrix) = get(
        state,
        &format!("/api/stats/sessions/weekly?website_id={SITE}&{JANUARY}"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_dense(&matrix);
    assert_eq!(cell(&matrix, 1, 10), 2);
    assert_eq!(cell(&matrix, 6, 23), 1);
    let total: u64 = matrix
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|d| d.as_array().unwrap())
        .map(|v| v.as_u64().unwrap())
        .sum();
    assert_eq!(total, 3);
}

#[tokio::test]
async fn test_empty_site_is_all_zeros() {
    let (state, _conn) = make_duckdb_state(60);
    let (status, matrix) = get(
        state,
        &format!("/api/stats/sessions/weekly?website_id={SITE}&{JANUARY}"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_dense(&matrix);
    assert!(matrix
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|d| d.as_array().unwrap())
        .all(|v| v.as_u64() == Some(0)));
}

#[tokio::test]
async fn test_event_filter_narrows_sessions() {
    let (state, conn) = make_duckdb_state(60);
    insert_event(&conn, "s1", "2024-01-15 10:05:00", "/pricing");
    insert_event(&conn, "s2", "2024-01-15 10:30:00", "/");

    let (status, matrix) = get(
        state,
        &format!("/api/stats/sessions/weekly?website_id={SITE}&{JANUARY}&url_path=/pricing"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(cell(&matrix, 1, 10), 1);
}

#[tokio::test]
async fn test_cached_result_served_until_expiry() {
    let (state, conn) = make_duckdb_state(60);
    insert_event(&conn, "s1", "2024-01-15 10:05:00", "/");
    let uri = format!("/api/stats/sessions/weekly?website_id={SITE}&{JANUARY}");

    let (_, first) = get(Arc::clone(&state), &uri).await;
    insert_event(&conn, "s2", "2024-01-15 10:06:00", "/");
    let (_, second) = get(Arc::clone(&state), &uri).await;

    assert_eq!(cell(&first, 1, 10), 1);
    assert_eq!(cell(&second, 1, 10), 1);
    assert_eq!(state.query_cache.len(), 1);
}

#[tokio::test]
async fn test_cache_disabled_reads_fresh_data() {
    let (state, conn) = make_duckdb_state(0);
    insert_event(&conn, "s1", "2024-01-15 10:05:00", "/");
    let uri = format!("/api/stats/sessions/weekly?website_id={SITE}&{JANUARY}");

    let (_, first) = get(Arc::clone(&state), &uri).await;
    insert_event(&conn, "s2", "2024-01-15 10:06:00", "/");
    let (_, second) = get(Arc::clone(&state), &uri).await;

    assert_eq!(cell(&first, 1, 10), 1);
    assert_eq!(cell(&second, 1, 10), 2);
}

#[tokio::test]
async fn test_invalid_website_id_rejected() {
    let (state, _conn) = make_duckdb_state(60);
    let (status, body) = get(
        state,
        &format!("/api/stats/sessions/weekly?website_id=example.com&{JANUARY}"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("UUID"));
}

#[tokio::test]
async fn test_unknown_timezone_rejected() {
    let (state, _conn) = make_duckdb_state(60);
    let (status, body) = get(
        state,
        &format!("/api/stats/sessions/weekly?website_id={SITE}&timezone=Nowhere/Special"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("timezone"));
}

#[tokio::test]
async fn test_invalid_period_rejected() {
    let (state, _conn) = make_duckdb_state(60);
    let (status, _) = get(
        state,
        &format!("/api/stats/sessions/weekly?website_id={SITE}&period=forever"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_website_id_is_json_bad_request() {
    let (state, _conn) = make_duckdb_state(60);
    let (status, body) = get(state, &format!("/api/stats/sessions/weekly?{JANUARY}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("website_id"));
}

#[tokio::test]
async fn test_start_date_without_end_date_rejected() {
    let (state, _conn) = make_duckdb_state(60);
    let (status, body) = get(
        state,
        &format!("/api/stats/sessions/weekly?website_id={SITE}&start_date=2024-01-01"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("together"));
}

#[tokio::test]
async fn test_filter_values_with_separators_get_separate_cache_entries() {
    let (state, conn) = make_duckdb_state(60);
    conn.lock()
        .execute(
            "INSERT INTO website_event (website_id, session_id, created_at, region, city)
             VALUES (?, 's1', CAST('2024-01-15 10:00:00' AS TIMESTAMP), 'a', 'b')",
            duckdb::params![SITE],
        )
        .unwrap();
    let base = format!("/api/stats/sessions/weekly?website_id={SITE}&{JANUARY}");

    let (_, split) = get(Arc::clone(&state), &format!("{base}&region=a&city=b")).await;
    let (_, joined) = get(Arc::clone(&state), &format!("{base}&region=a%3Acity%3Db")).await;

    assert_eq!(cell(&split, 1, 10), 1);
    assert_eq!(cell(&joined, 1, 10), 0);
    assert_eq!(state.query_cache.len(), 2);
}

/// Source that always fails and counts how often it was called.
struct FailingSource {
    calls: AtomicUsize,
}

#[async_trait]
impl WeeklySessionsSource for FailingSource {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn fetch_weekly_rows(
        &self,
        _website_id: Uuid,
        _filters: &WeeklyFilters,
    ) -> Result<Vec<TimeBucketRow>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SourceError::Backend {
            status: 503,
            body: "replica unavailable".to_string(),
        })
    }
}

#[tokio::test]
async fn test_backend_failure_is_internal_error_and_not_cached() {
    let source = Arc::new(FailingSource {
        calls: AtomicUsize::new(0),
    });
    let state = Arc::new(AppState::new(
        Arc::clone(&source) as Arc<dyn WeeklySessionsSource>,
        &Config::default(),
    ));
    let uri = format!("/api/stats/sessions/weekly?website_id={SITE}&{JANUARY}");

    let (status, body) = get(Arc::clone(&state), &uri).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");

    let (status, _) = get(Arc::clone(&state), &uri).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    assert!(state.query_cache.is_empty());
}

/// Source returning ClickHouse-shaped rows: string counts, duplicates, junk labels.
struct CannedSource;

#[async_trait]
impl WeeklySessionsSource for CannedSource {
    fn name(&self) -> &'static str {
        "canned"
    }

    async fn fetch_weekly_rows(
        &self,
        _website_id: Uuid,
        _filters: &WeeklyFilters,
    ) -> Result<Vec<TimeBucketRow>, SourceError> {
        Ok(vec![
            TimeBucketRow::new("0:00", "12"),
            TimeBucketRow::new("4:04", 3),
            TimeBucketRow::new("4:04", 99),
            TimeBucketRow::new("9:99", 50),
            TimeBucketRow::new("3:5", 8),
            TimeBucketRow::new("1:02", serde_json::Value::Null),
        ])
    }
}

#[tokio::test]
async fn test_backend_rows_are_normalized() {
    let state = Arc::new(AppState::new(Arc::new(CannedSource), &Config::default()));
    let (status, matrix) = get(
        state,
        &format!("/api/stats/sessions/weekly?website_id={SITE}&{JANUARY}"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_dense(&matrix);
    assert_eq!(cell(&matrix, 0, 0), 12);
    assert_eq!(cell(&matrix, 4, 4), 3);
    assert_eq!(cell(&matrix, 3, 5), 0);
    assert_eq!(cell(&matrix, 1, 2), 0);
}

#[tokio::test]
async fn test_detailed_health_reports_backend() {
    let (state, _conn) = make_duckdb_state(60);
    let (status, body) = get(state, "/health/detailed").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["backend"], "duckdb");
    assert_eq!(body["cache_ttl_secs"], 60);
}
