//! Pool construction and startup migrations.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;

/// Error produced while connecting to or migrating the database.
#[derive(Debug, Error)]
pub enum DbError {
    /// The connect string could not be parsed, or the pool could not be established.
    #[error("database connection failed: {0}")]
    Connect(#[source] sqlx::Error),
    /// An embedded migration failed to apply.
    #[error("database migration failed: {0}")]
    Migrate(#[source] sqlx::migrate::MigrateError),
}

/// Open (creating if absent) the SQLite database at `db_path` in WAL mode and
/// run embedded migrations. Fails fast: an unusable path or a broken
/// migration is a startup-fatal condition, per the teacher's fail-fast
/// posture for misconfiguration.
pub async fn connect(db_path: &str) -> Result<SqlitePool, DbError> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{db_path}"))
        .map_err(DbError::Connect)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await
        .map_err(DbError::Connect)?;

    sqlx::migrate!("./migrations").run(&pool).await.map_err(DbError::Migrate)?;

    Ok(pool)
}
