//! hermes-db
//!
//! SQLite persistence for the Hermes gateway (§4.14): provider records, the
//! batched request/sync logs, issued API keys (hashed at rest), and
//! runtime-tunable settings. Every adapter here is a thin newtype over a
//! shared [`sqlx::SqlitePool`], implementing one of `hermes-core`'s storage
//! seams ([`hermes_core::catalog::ProviderStore`],
//! [`hermes_core::logbus::LogWriter`]) so the core algorithms never name
//! `sqlx` or a SQL dialect directly.
#![warn(missing_docs)]

/// Issued Hermes API keys: generation, hashed-at-rest storage, verification.
pub mod keys;
/// Request-log and sync-log persistence; implements the log batcher's write seam.
pub mod logs;
/// Pool construction and embedded startup migrations.
pub mod pool;
/// Provider CRUD; implements the catalog's storage seam.
pub mod providers;
/// Runtime-tunable settings, DB-backed overrides of env-derived defaults.
pub mod settings;

pub use keys::KeyRepository;
pub use logs::LogRepository;
pub use pool::{connect, DbError};
pub use providers::ProviderRepository;
pub use settings::SettingsRepository;

use std::sync::Arc;

use sqlx::SqlitePool;

/// All repositories built from one shared pool, for convenient one-shot
/// construction at startup.
pub struct Stores {
    /// Provider CRUD, wired into the catalog as its [`hermes_core::catalog::ProviderStore`].
    pub providers: Arc<ProviderRepository>,
    /// Request/sync log persistence, wired into the log batcher as its [`hermes_core::logbus::LogWriter`].
    pub logs: Arc<LogRepository>,
    /// Issued API key storage and verification.
    pub keys: Arc<KeyRepository>,
    /// Runtime-tunable settings.
    pub settings: Arc<SettingsRepository>,
    pool: SqlitePool,
}

impl Stores {
    /// Build every repository from one shared pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            providers: Arc::new(ProviderRepository::new(pool.clone())),
            logs: Arc::new(LogRepository::new(pool.clone())),
            keys: Arc::new(KeyRepository::new(pool.clone())),
            settings: Arc::new(SettingsRepository::new(pool.clone())),
            pool,
        }
    }

    /// Trivial connectivity check for `GET /health`.
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
