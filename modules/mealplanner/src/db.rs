use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Initialize a connection pool to the PostgreSQL database
///
/// Pool sizing comes from `DB_MAX_CONNECTIONS` (default 10), `DB_MIN_CONNECTIONS`
/// (default 0) and `DB_ACQUIRE_TIMEOUT_SECS` (default 3). Tests should cap
/// connections at 1-2.
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let max_connections = env_or("DB_MAX_CONNECTIONS", 10u32);
    let min_connections = env_or("DB_MIN_CONNECTIONS", 0u32);
    let acquire_timeout_secs = env_or("DB_ACQUIRE_TIMEOUT_SECS", 3u64);

    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(min_connections)
        .acquire_timeout(Duration::from_secs(acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Apply the read-model migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./db/migrations").run(pool).await
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
