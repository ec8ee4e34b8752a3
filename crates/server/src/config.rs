// Sync server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development. The database pool reads its own tuning variables in
// `db::pool`; everything else the server needs lives here.

use std::{net::SocketAddr, time::Duration};

const DEV_JWT_SECRET: &str = "roomsync_local_development_jwt_secret_must_be_32_chars";
const DEFAULT_DELETE_CONCURRENCY: usize = 8;
const DEFAULT_LIVE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveBackend {
    /// Hosted collaboration service reached over its REST interface.
    Http,
    /// In-process documents; local development only.
    Memory,
}

#[derive(Debug, Clone)]
pub struct LiveStoreConfig {
    pub backend: LiveBackend,
    pub base_url: String,
    pub secret_key: Option<String>,
    pub request_timeout: Duration,
}

/// Core sync server configuration.
///
/// Constructed via [`ServerConfig::from_env`] which reads environment
/// variables and falls back to development defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Secret for principal access tokens and room grants.
    pub jwt_secret: String,
    /// `whsec_`-prefixed signing secret shared with the live store.
    pub webhook_secret: Option<String>,
    pub database_url: Option<String>,
    pub live: LiveStoreConfig,
    /// `None` disables the periodic orphan sweep.
    pub sweep_interval: Option<Duration>,
    /// Upper bound on in-flight deletions during bulk cleanup.
    pub delete_concurrency: usize,
    pub cors_origins: Option<String>,
    pub log_filter: String,
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `ROOMSYNC_HOST` | `0.0.0.0` |
    /// | `ROOMSYNC_PORT` | `8080` |
    /// | `ROOMSYNC_JWT_SECRET` | dev-only placeholder |
    /// | `ROOMSYNC_WEBHOOK_SECRET` | *(none, webhooks rejected)* |
    /// | `ROOMSYNC_DATABASE_URL` | *(none)* |
    /// | `ROOMSYNC_LIVE_BACKEND` | `http` |
    /// | `ROOMSYNC_LIVE_BASE_URL` | `http://localhost:9000` |
    /// | `ROOMSYNC_LIVE_SECRET_KEY` | *(none)* |
    /// | `ROOMSYNC_LIVE_TIMEOUT_SECS` | `10` |
    /// | `ROOMSYNC_SWEEP_INTERVAL_SECS` | `0` (disabled) |
    /// | `ROOMSYNC_DELETE_CONCURRENCY` | `8` |
    /// | `ROOMSYNC_CORS_ORIGINS` | *(none, cors.rs uses dev defaults)* |
    /// | `ROOMSYNC_LOG_FILTER` | `info` |
    /// | `ROOMSYNC_LOG_FORMAT` | `text` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("ROOMSYNC_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("ROOMSYNC_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let jwt_secret = env("ROOMSYNC_JWT_SECRET").unwrap_or_else(|_| DEV_JWT_SECRET.into());
        let webhook_secret = non_empty(env("ROOMSYNC_WEBHOOK_SECRET").ok());
        let database_url = non_empty(env("ROOMSYNC_DATABASE_URL").ok());

        let backend = match env("ROOMSYNC_LIVE_BACKEND").ok().as_deref().map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("memory") => LiveBackend::Memory,
            _ => LiveBackend::Http,
        };
        let live = LiveStoreConfig {
            backend,
            base_url: env("ROOMSYNC_LIVE_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:9000".into()),
            secret_key: non_empty(env("ROOMSYNC_LIVE_SECRET_KEY").ok()),
            request_timeout: Duration::from_secs(
                env("ROOMSYNC_LIVE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(DEFAULT_LIVE_TIMEOUT_SECS),
            ),
        };

        let sweep_interval = env("ROOMSYNC_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let delete_concurrency = env("ROOMSYNC_DELETE_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_DELETE_CONCURRENCY);

        let cors_origins = env("ROOMSYNC_CORS_ORIGINS").ok();
        let log_filter = env("ROOMSYNC_LOG_FILTER").unwrap_or_else(|_| "info".into());
        let log_format = match env("ROOMSYNC_LOG_FORMAT").ok().as_deref().map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Self {
            listen_addr,
            jwt_secret,
            webhook_secret,
            database_url,
            live,
            sweep_interval,
            delete_concurrency,
            cors_origins,
            log_filter,
            log_format,
        }
    }

    /// Returns true when using the development-only JWT secret.
    pub fn is_dev_jwt_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
