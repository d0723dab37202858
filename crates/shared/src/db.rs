//! Database pool construction

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Create the application connection pool.
///
/// Works against any PostgreSQL-compatible database, including pooled
/// endpoints (PgBouncer); statement caching stays at sqlx defaults.
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    tracing::debug!(max_connections = 20, "Database pool created");
    Ok(pool)
}
