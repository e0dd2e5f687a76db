pub mod clickhouse;
pub mod embedded;
pub mod migrations;
pub mod schema;

use crate::config::Config;
use crate::query::source::{Backend, SourceError, WeeklySessionsSource};
use duckdb::Connection;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Open the configured backend.
///
/// DuckDB: opens (or creates) the database file under `data_dir`, runs
/// migrations and, if enabled, tries to load ICU. ClickHouse: builds the
/// HTTP client; no connection is made until the first query.
pub fn build_source(config: &Config) -> Result<Arc<dyn WeeklySessionsSource>, SourceError> {
    match config.backend {
        Backend::DuckDb => {
            std::fs::create_dir_all(&config.data_dir)?;
            let conn = Connection::open(config.database_path())?;
            migrations::run_migrations(&conn)?;

            if config.load_icu {
                match schema::load_icu_extension(&conn) {
                    Ok(()) => tracing::info!("ICU extension loaded"),
                    Err(e) => tracing::warn!(
                        error = %e,
                        "ICU extension not available; only UTC heatmaps will work"
                    ),
                }
            }

            Ok(Arc::new(embedded::DuckDbSource::new(Arc::new(Mutex::new(
                conn,
            )))))
        }
        Backend::ClickHouse => {
            let client = clickhouse::ClickHouseClient::new(
                &config.clickhouse_url,
                &config.clickhouse_user,
                &config.clickhouse_password,
                &config.clickhouse_database,
                Duration::from_secs(config.query_timeout_secs),
            )?;
            Ok(Arc::new(clickhouse::ClickHouseSource::new(client)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_duckdb_source_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().join("nested"),
            load_icu: false,
            ..Config::default()
        };
        let source = build_source(&config).unwrap();
        assert_eq!(source.name(), "duckdb");
        assert!(config.database_path().exists());
    }

    #[test]
    fn test_build_clickhouse_source_is_lazy() {
        let config = Config {
            backend: Backend::ClickHouse,
            clickhouse_url: "http://127.0.0.1:1".to_string(),
            ..Config::default()
        };
        let source = build_source(&config).unwrap();
        assert_eq!(source.name(), "clickhouse");
    }
}
