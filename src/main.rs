use session_heatmap::config::Config;
use session_heatmap::server::{self, AppState};
use session_heatmap::storage;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_heatmap=info,tower_http=info".into()),
        )
        .init();

    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref().map(std::path::Path::new));

    tracing::info!(
        host = %config.host,
        port = config.port,
        backend = config.backend.as_str(),
        data_dir = %config.data_dir.display(),
        cache_ttl_secs = config.cache_ttl_secs,
        "Starting session heatmap service"
    );

    let source = storage::build_source(&config).unwrap_or_else(|e| {
        panic!(
            "Failed to initialize {} backend: {e}",
            config.backend.as_str()
        )
    });

    let state = Arc::new(AppState::new(source, &config));

    // Periodically drop expired cache entries
    if config.cache_ttl_secs > 0 {
        let cache = state.query_cache.clone();
        let ttl = config.cache_ttl_secs;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(ttl));
            loop {
                interval.tick().await;
                let removed = cache.cleanup_expired();
                if removed > 0 {
                    tracing::debug!(removed, "Expired cache entries removed");
                }
            }
        });
    }

    let app = server::build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!(addr = %addr, "Listening");
    axum::serve(listener, app).await.expect("Server error");
}
