use crate::query::source::Backend;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration loaded from environment variables or TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Store answering weekly queries: `duckdb` (embedded) or `clickhouse`.
    #[serde(default)]
    pub backend: Backend,
    #[serde(default = "default_clickhouse_url")]
    pub clickhouse_url: String,
    #[serde(default = "default_clickhouse_user")]
    pub clickhouse_user: String,
    #[serde(default)]
    pub clickhouse_password: String,
    #[serde(default = "default_clickhouse_database")]
    pub clickhouse_database: String,
    /// Dashboard origin for CORS restrictions on stats routes.
    /// If not set, any origin may read stats.
    #[serde(default)]
    pub dashboard_origin: Option<String>,
    /// Query cache TTL in seconds (default: 60). 0 = no caching.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Install and load DuckDB's ICU extension at startup (needed for
    /// non-UTC timezones on the DuckDB backend).
    #[serde(default = "default_load_icu")]
    pub load_icu: bool,
    /// Timeout for a single ClickHouse round trip in seconds (default: 30).
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_clickhouse_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_clickhouse_user() -> String {
    "default".to_string()
}

fn default_clickhouse_database() -> String {
    "analytics".to_string()
}

const fn default_load_icu() -> bool {
    true
}

const fn default_cache_ttl_secs() -> u64 {
    60
}

const fn default_query_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            backend: Backend::default(),
            clickhouse_url: default_clickhouse_url(),
            clickhouse_user: default_clickhouse_user(),
            clickhouse_password: String::new(),
            clickhouse_database: default_clickhouse_database(),
            dashboard_origin: None,
            cache_ttl_secs: default_cache_ttl_secs(),
            load_icu: default_load_icu(),
            query_timeout_secs: default_query_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults.
    ///
    /// Environment variables override file values:
    /// - `HEATMAP_HOST` → host
    /// - `HEATMAP_PORT` → port
    /// - `HEATMAP_DATA_DIR` → data_dir
    /// - `HEATMAP_BACKEND` → backend
    /// - `HEATMAP_CLICKHOUSE_URL` → clickhouse_url
    /// - `HEATMAP_CLICKHOUSE_USER` → clickhouse_user
    /// - `HEATMAP_CLICKHOUSE_PASSWORD` → clickhouse_password
    /// - `HEATMAP_CLICKHOUSE_DATABASE` → clickhouse_database
    /// - `HEATMAP_DASHBOARD_ORIGIN` → dashboard_origin
    /// - `HEATMAP_CACHE_TTL` → cache_ttl_secs
    /// - `HEATMAP_LOAD_ICU` → load_icu
    /// - `HEATMAP_QUERY_TIMEOUT` → query_timeout_secs
    pub fn load(config_path: Option<&Path>) -> Self {
        let mut config =
            config_path.map_or_else(Self::default, |path| match std::fs::read_to_string(path) {
                Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                    tracing::warn!("Failed to parse config file: {e}, using defaults");
                    Self::default()
                }),
                Err(e) => {
                    tracing::warn!("Failed to read config file: {e}, using defaults");
                    Self::default()
                }
            });

        if let Ok(host) = std::env::var("HEATMAP_HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("HEATMAP_PORT") {
            if let Ok(p) = port.parse() {
                config.port = p;
            }
        }
        if let Ok(data_dir) = std::env::var("HEATMAP_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Ok(val) = std::env::var("HEATMAP_BACKEND") {
            match Backend::parse(&val) {
                Some(backend) => config.backend = backend,
                None => tracing::warn!(value = %val, "Unknown HEATMAP_BACKEND, ignoring"),
            }
        }
        if let Ok(url) = std::env::var("HEATMAP_CLICKHOUSE_URL") {
            config.clickhouse_url = url;
        }
        if let Ok(user) = std::env::var("HEATMAP_CLICKHOUSE_USER") {
            config.clickhouse_user = user;
        }
        if let Ok(password) = std::env::var("HEATMAP_CLICKHOUSE_PASSWORD") {
            config.clickhouse_password = password;
        }
        if let Ok(database) = std::env::var("HEATMAP_CLICKHOUSE_DATABASE") {
            config.clickhouse_database = database;
        }
        if let Ok(origin) = std::env::var("HEATMAP_DASHBOARD_ORIGIN") {
            config.dashboard_origin = Some(origin);
        }
        if let Ok(val) = std::env::var("HEATMAP_CACHE_TTL") {
            if let Ok(t) = val.parse() {
                config.cache_ttl_secs = t;
            }
        }
        if let Ok(val) = std::env::var("HEATMAP_LOAD_ICU") {
            config.load_icu = val != "0" && val.to_lowercase() != "false";
        }
        if let Ok(val) = std::env::var("HEATMAP_QUERY_TIMEOUT") {
            if let Ok(t) = val.parse() {
                config.query_timeout_secs = t;
            }
        }

        config
    }

    /// Path of the embedded DuckDB database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("heatmap.duckdb")
    }
}
