//! Opening the `PostgreSQL` pool from the engine's [`StorageConfig`].
//!
//! Queries are built at runtime, so the crate compiles without a live
//! database. A pool is only handed out after the embedded migrations have
//! run against it.

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use strategos_core::config::StorageConfig;

use crate::error::DbError;

/// Parse `storage.database_url`.
///
/// # Errors
///
/// Returns [`DbError::Config`] when the URL is not a `PostgreSQL`
/// connection string.
pub fn connect_options(storage: &StorageConfig) -> Result<PgConnectOptions, DbError> {
    storage
        .database_url
        .parse()
        .map_err(|err: sqlx::Error| DbError::Config(format!("invalid database URL: {err}")))
}

/// Pool sizing and timeouts from `storage`. A zero pool size is raised to
/// one connection.
pub fn pool_options(storage: &StorageConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(storage.max_connections.max(1))
        .acquire_timeout(storage.connect_timeout())
        .idle_timeout(storage.idle_timeout())
}

/// Connect with `storage` settings and apply pending migrations.
///
/// # Errors
///
/// [`DbError::Config`] for a bad URL, [`DbError::Postgres`] when no
/// connection can be made, and [`DbError::Migration`] when a migration
/// fails.
pub async fn open_pool(storage: &StorageConfig) -> Result<PgPool, DbError> {
    let options = connect_options(storage)?;
    let host = options.get_host().to_owned();
    let database = options.get_database().map(str::to_owned);

    let pool = pool_options(storage).connect_with(options).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!(
        host = %host,
        database = database.as_deref().unwrap_or("<default>"),
        max_connections = storage.max_connections,
        "PostgreSQL pool ready, migrations applied"
    );
    Ok(pool)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn options_follow_storage_config() {
        let storage = StorageConfig {
            max_connections: 0,
            connect_timeout_ms: 1_500,
            idle_timeout_ms: 60_000,
            ..StorageConfig::default()
        };
        let pool = pool_options(&storage);
        assert_eq!(pool.get_max_connections(), 1);
        assert_eq!(pool.get_acquire_timeout(), Duration::from_millis(1_500));
        assert_eq!(pool.get_idle_timeout(), Some(Duration::from_secs(60)));

        let options = connect_options(&storage).unwrap();
        assert_eq!(options.get_host(), "localhost");
        assert_eq!(options.get_database(), Some("strategos"));
    }

    #[test]
    fn malformed_url_is_a_config_error() {
        let storage = StorageConfig {
            database_url: "not a connection string".to_owned(),
            ..StorageConfig::default()
        };
        assert!(matches!(connect_options(&storage), Err(DbError::Config(_))));
    }
}
