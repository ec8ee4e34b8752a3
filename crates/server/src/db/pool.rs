// Connection pool for the canonical relational store.
//
// Settings come from `ROOMSYNC_DB_*`. TLS is mandatory unless
// `ROOMSYNC_DB_ALLOW_INSECURE` is set for a local database.

use std::env::VarError;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;

const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Permit plaintext connections (local development databases).
    pub allow_insecure: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: DEFAULT_MIN_CONNECTIONS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            allow_insecure: false,
        }
    }
}

impl PoolConfig {
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let number = |key: &str| env(key).ok().and_then(|value| value.trim().parse::<u64>().ok());

        let max_connections = number("ROOMSYNC_DB_MAX_CONNECTIONS")
            .and_then(|value| u32::try_from(value).ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);
        // A floor above the ceiling would make sqlx refuse to build the pool.
        let min_connections = number("ROOMSYNC_DB_MIN_CONNECTIONS")
            .and_then(|value| u32::try_from(value).ok())
            .unwrap_or(DEFAULT_MIN_CONNECTIONS)
            .min(max_connections);
        let acquire_timeout = Duration::from_secs(
            number("ROOMSYNC_DB_ACQUIRE_TIMEOUT_SECS")
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        );
        let allow_insecure = env("ROOMSYNC_DB_ALLOW_INSECURE")
            .map(|value| matches!(value.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Self { min_connections, max_connections, acquire_timeout, allow_insecure }
    }
}

/// Connect to the canonical store. Fails fast when the URL is malformed or
/// does not demand TLS.
pub async fn create_pg_pool(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let connect_options = database_url
        .parse::<PgConnectOptions>()
        .context("canonical store URL is not a valid PostgreSQL connection string")?;
    if !config.allow_insecure {
        require_tls(connect_options.get_ssl_mode())?;
    }

    PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(connect_options)
        .await
        .context("could not open a connection to the canonical store")
}

fn require_tls(mode: PgSslMode) -> Result<()> {
    match mode {
        PgSslMode::Require | PgSslMode::VerifyCa | PgSslMode::VerifyFull => Ok(()),
        mode => bail!(
            "canonical store connections must require TLS (sslmode={mode:?}); use sslmode=require or stricter, or ROOMSYNC_DB_ALLOW_INSECURE=1 against a local database"
        ),
    }
}

pub async fn check_pool_health(pool: &PgPool) -> Result<()> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await
        .context("canonical store did not answer a liveness query")?;
    Ok(())
}
