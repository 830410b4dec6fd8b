use crate::config::StorageConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Schema version recorded in `PRAGMA user_version`.
pub const DB_VERSION: i64 = 2;

const SCHEMA: [&str; 7] = [
    r#"
    CREATE TABLE IF NOT EXISTS models (
        id          TEXT PRIMARY KEY,
        name        TEXT NOT NULL,
        timestamp   INTEGER NOT NULL,
        features    TEXT NOT NULL,
        model_data  TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS models_name ON models (name)",
    "CREATE INDEX IF NOT EXISTS models_timestamp ON models (timestamp)",
    r#"
    CREATE TABLE IF NOT EXISTS predictions (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        area        REAL NOT NULL,
        bedrooms    INTEGER NOT NULL,
        bathrooms   REAL NOT NULL,
        location    TEXT NOT NULL,
        age         INTEGER NOT NULL,
        price       INTEGER NOT NULL,
        model_id    TEXT NOT NULL,
        model_name  TEXT NOT NULL,
        is_fallback INTEGER NOT NULL DEFAULT 0,
        timestamp   INTEGER NOT NULL,
        error       TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS predictions_timestamp ON predictions (timestamp)",
    "CREATE INDEX IF NOT EXISTS predictions_model_id ON predictions (model_id)",
    r#"
    CREATE TABLE IF NOT EXISTS settings (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
];

pub async fn create_pool(config: &StorageConfig) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(&config.database_path)
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .connect_with(options)
        .await
}

pub async fn health_check(pool: &SqlitePool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT sqlite_version()")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

pub async fn schema_version(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await
}

/// Bring the schema up to [`DB_VERSION`]. Every statement is
/// `IF NOT EXISTS`, so rerunning against a current database is a no-op and
/// existing rows are never touched.
pub async fn upgrade(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let current = schema_version(pool).await?;

    let mut tx = pool.begin().await?;
    for statement in SCHEMA {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    if current < DB_VERSION {
        sqlx::query(&format!("PRAGMA user_version = {DB_VERSION}"))
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    if current < DB_VERSION {
        tracing::info!(from = current, to = DB_VERSION, "Upgraded database schema");
    }
    Ok(())
}
