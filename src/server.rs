use crate::api::stats;
use crate::config::Config;
use crate::query::cache::QueryCache;
use crate::query::source::WeeklySessionsSource;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Shared state for all handlers.
pub struct AppState {
    pub source: Arc<dyn WeeklySessionsSource>,
    pub query_cache: QueryCache,
    pub dashboard_origin: Option<String>,
}

impl AppState {
    pub fn new(source: Arc<dyn WeeklySessionsSource>, config: &Config) -> Self {
        Self {
            source,
            query_cache: QueryCache::new(config.cache_ttl_secs),
            dashboard_origin: config.dashboard_origin.clone(),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let stats_cors = build_stats_cors(state.dashboard_origin.as_deref());

    let stats_routes = Router::new()
        .route("/stats/sessions/weekly", get(stats::get_sessions_weekly))
        .layer(stats_cors);

    Router::new()
        .route("/health", get(health_check))
        .route("/health/detailed", get(detailed_health_check))
        .nest("/api", stats_routes)
        .layer(axum::middleware::map_response(add_security_headers))
        .layer(TimeoutLayer::with_status_code(
            axum::http::StatusCode::REQUEST_TIMEOUT,
            std::time::Duration::from_secs(30),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Inject security headers on every HTTP response.
async fn add_security_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    response
}

/// Build CORS layer for stats routes based on configured origin.
fn build_stats_cors(dashboard_origin: Option<&str>) -> CorsLayer {
    dashboard_origin.map_or_else(
        || {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET])
                .allow_headers(Any)
        },
        |origin| {
            let allowed_origin = origin.parse::<HeaderValue>().unwrap_or_else(|e| {
                tracing::warn!(origin, error = %e, "Invalid dashboard origin, allowing any");
                HeaderValue::from_static("*")
            });
            CorsLayer::new()
                .allow_origin(allowed_origin)
                .allow_methods([Method::GET])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        },
    )
}

/// GET /health — Simple health check endpoint.
async fn health_check() -> &'static str {
    "ok"
}

/// GET /health/detailed — Backend and cache status.
async fn detailed_health_check(
    State(state): State<Arc<AppState>>,
) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.source.name(),
        "cache_entries": state.query_cache.len(),
        "cache_ttl_secs": state.query_cache.ttl().as_secs(),
    }))
}
