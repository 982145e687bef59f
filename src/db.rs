use anyhow::Result;
use sea_orm::{DatabaseConnection, SqlxPostgresConnector};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

pub type DbPool = PgPool;
pub type OrmConn = DatabaseConnection;

/// Create the shared Postgres pool.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Wrap an existing pool in a SeaORM connection so both layers share connections.
pub fn orm_from_pool(pool: DbPool) -> OrmConn {
    SqlxPostgresConnector::from_sqlx_postgres_pool(pool)
}

/// Apply the SQL files in `migrations/`, embedded at compile time.
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
