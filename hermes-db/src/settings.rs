//! Runtime-tunable settings store: typed accessors over a flat `settings`
//! key/value table, with in-process defaults when a key is absent (§4.11).

use hermes_types::{DispatcherSettings, SettingEntry, Settings};
use sqlx::SqlitePool;

const KEY_PERIODIC_SYNC_INTERVAL_HOURS: &str = "periodicSyncIntervalHours";
const KEY_CHAT_MAX_RETRIES: &str = "chatMaxRetries";
const KEY_INITIAL_PENALTY_MS: &str = "dispatcher_initial_penalty_ms";
const KEY_MAX_PENALTY_MS: &str = "dispatcher_max_penalty_ms";
const KEY_RESYNC_THRESHOLD: &str = "dispatcher_resync_threshold";
const KEY_RESYNC_COOLDOWN_MS: &str = "dispatcher_resync_cooldown_ms";

/// SQLite-backed settings store, read through at call time so admin writes
/// take effect without a restart.
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    /// Build a repository over the given pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn get_raw(&self, key: &str) -> Option<String> {
        sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, key, "failed to read setting");
                None
            })
    }

    async fn get_typed<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        match self.get_raw(key).await {
            Some(raw) => raw.parse().unwrap_or(default),
            None => default,
        }
    }

    /// Set one key/value pair, upserting the row.
    pub async fn set(&self, key: &str, value: &str) {
        if let Err(e) = sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        {
            tracing::error!(error = %e, key, "failed to write setting");
        }
    }

    /// List every stored key/value pair, for `GET /admin/settings`.
    pub async fn list(&self) -> Vec<SettingEntry> {
        sqlx::query_as::<_, (String, String)>("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "failed to list settings");
                Vec::new()
            })
            .into_iter()
            .map(|(key, value)| SettingEntry { key, value })
            .collect()
    }

    /// Persist every field of `settings`, the inverse of [`Self::resolve`].
    pub async fn set_all(&self, settings: &Settings) {
        self.set(KEY_PERIODIC_SYNC_INTERVAL_HOURS, &settings.periodic_sync_interval_hours.to_string())
            .await;
        self.set(KEY_CHAT_MAX_RETRIES, &settings.chat_max_retries.to_string()).await;
        self.set(KEY_INITIAL_PENALTY_MS, &settings.dispatcher.initial_penalty_ms.to_string())
            .await;
        self.set(KEY_MAX_PENALTY_MS, &settings.dispatcher.max_penalty_ms.to_string()).await;
        self.set(KEY_RESYNC_THRESHOLD, &settings.dispatcher.resync_threshold.to_string())
            .await;
        self.set(KEY_RESYNC_COOLDOWN_MS, &settings.dispatcher.resync_cooldown_ms.to_string())
            .await;
    }

    /// Resolve the full, typed [`Settings`] value: DB overrides layered onto
    /// the bootstrap env-derived defaults passed in by the caller.
    pub async fn resolve(&self, defaults: Settings) -> Settings {
        Settings {
            periodic_sync_interval_hours: self
                .get_typed(KEY_PERIODIC_SYNC_INTERVAL_HOURS, defaults.periodic_sync_interval_hours)
                .await,
            chat_max_retries: self.get_typed(KEY_CHAT_MAX_RETRIES, defaults.chat_max_retries).await,
            dispatcher: DispatcherSettings {
                initial_penalty_ms: self
                    .get_typed(KEY_INITIAL_PENALTY_MS, defaults.dispatcher.initial_penalty_ms)
                    .await,
                max_penalty_ms: self.get_typed(KEY_MAX_PENALTY_MS, defaults.dispatcher.max_penalty_ms).await,
                resync_threshold: self
                    .get_typed(KEY_RESYNC_THRESHOLD, defaults.dispatcher.resync_threshold)
                    .await,
                resync_cooldown_ms: self
                    .get_typed(KEY_RESYNC_COOLDOWN_MS, defaults.dispatcher.resync_cooldown_ms)
                    .await,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite pool");
        sqlx::migrate!("./migrations").run(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn resolve_falls_back_to_defaults_when_unset() {
        let pool = test_pool().await;
        let repo = SettingsRepository::new(pool);
        let resolved = repo.resolve(Settings::default()).await;
        assert_eq!(resolved.chat_max_retries, Settings::default().chat_max_retries);
    }

    #[tokio::test]
    async fn set_then_resolve_overrides_the_default() {
        let pool = test_pool().await;
        let repo = SettingsRepository::new(pool);
        repo.set(KEY_CHAT_MAX_RETRIES, "7").await;
        let resolved = repo.resolve(Settings::default()).await;
        assert_eq!(resolved.chat_max_retries, 7);
    }

    #[tokio::test]
    async fn set_twice_upserts_rather_than_duplicating() {
        let pool = test_pool().await;
        let repo = SettingsRepository::new(pool);
        repo.set(KEY_CHAT_MAX_RETRIES, "5").await;
        repo.set(KEY_CHAT_MAX_RETRIES, "9").await;
        let listed = repo.list().await;
        let matching: Vec<_> = listed.iter().filter(|e| e.key == KEY_CHAT_MAX_RETRIES).collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].value, "9");
    }
}
