//! SQLite-backed implementation of [`hermes_core::catalog::ProviderStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hermes_core::catalog::ProviderStore;
use hermes_types::{Provider, ProviderStatus};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

#[derive(FromRow)]
struct ProviderRow {
    id: Uuid,
    name: String,
    base_url: String,
    api_key: String,
    models: String,
    model_blacklist: String,
    status: String,
    created_at: DateTime<Utc>,
    last_synced_at: Option<DateTime<Utc>>,
    last_used_at: Option<DateTime<Utc>>,
}

fn status_to_str(status: ProviderStatus) -> &'static str {
    match status {
        ProviderStatus::Pending => "pending",
        ProviderStatus::Syncing => "syncing",
        ProviderStatus::Active => "active",
        ProviderStatus::Error => "error",
    }
}

fn status_from_str(s: &str) -> ProviderStatus {
    match s {
        "syncing" => ProviderStatus::Syncing,
        "active" => ProviderStatus::Active,
        "error" => ProviderStatus::Error,
        _ => ProviderStatus::Pending,
    }
}

impl From<ProviderRow> for Provider {
    fn from(row: ProviderRow) -> Self {
        Provider {
            id: row.id,
            name: row.name,
            base_url: row.base_url,
            api_key: row.api_key,
            models: serde_json::from_str(&row.models).unwrap_or_default(),
            model_blacklist: serde_json::from_str(&row.model_blacklist).unwrap_or_default(),
            status: status_from_str(&row.status),
            created_at: row.created_at,
            last_synced_at: row.last_synced_at,
            last_used_at: row.last_used_at,
        }
    }
}

/// SQLite-backed provider repository. Newtype over a shared pool, following
/// the corpus's one-adapter-per-pool repository pattern.
pub struct ProviderRepository {
    pool: SqlitePool,
}

impl ProviderRepository {
    /// Build a repository over the given pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProviderStore for ProviderRepository {
    async fn get(&self, id: Uuid) -> Option<Provider> {
        sqlx::query_as::<_, ProviderRow>("SELECT * FROM providers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "failed to fetch provider");
                None
            })
            .map(Provider::from)
    }

    async fn list(&self) -> Vec<Provider> {
        sqlx::query_as::<_, ProviderRow>("SELECT * FROM providers ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "failed to list providers");
                Vec::new()
            })
            .into_iter()
            .map(Provider::from)
            .collect()
    }

    async fn insert(&self, provider: Provider) {
        let models = serde_json::to_string(&provider.models).unwrap_or_else(|_| "[]".to_string());
        let blacklist = serde_json::to_string(&provider.model_blacklist).unwrap_or_else(|_| "[]".to_string());
        let result = sqlx::query(
            "INSERT INTO providers (id, name, base_url, api_key, models, model_blacklist, status, created_at, last_synced_at, last_used_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(provider.id)
        .bind(&provider.name)
        .bind(&provider.base_url)
        .bind(&provider.api_key)
        .bind(models)
        .bind(blacklist)
        .bind(status_to_str(provider.status))
        .bind(provider.created_at)
        .bind(provider.last_synced_at)
        .bind(provider.last_used_at)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::error!(error = %e, "failed to insert provider");
        }
    }

    async fn update(&self, provider: Provider) {
        let models = serde_json::to_string(&provider.models).unwrap_or_else(|_| "[]".to_string());
        let blacklist = serde_json::to_string(&provider.model_blacklist).unwrap_or_else(|_| "[]".to_string());
        let result = sqlx::query(
            "UPDATE providers SET name = ?, base_url = ?, api_key = ?, models = ?, model_blacklist = ?,
             status = ?, last_synced_at = ?, last_used_at = ? WHERE id = ?",
        )
        .bind(&provider.name)
        .bind(&provider.base_url)
        .bind(&provider.api_key)
        .bind(models)
        .bind(blacklist)
        .bind(status_to_str(provider.status))
        .bind(provider.last_synced_at)
        .bind(provider.last_used_at)
        .bind(provider.id)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::error!(error = %e, "failed to update provider");
        }
    }

    async fn delete(&self, id: Uuid) {
        if let Err(e) = sqlx::query("DELETE FROM providers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            tracing::error!(error = %e, "failed to delete provider");
        }
    }

    async fn find_by_name_and_base_url(&self, name: &str, base_url: &str) -> Option<Provider> {
        sqlx::query_as::<_, ProviderRow>(
            "SELECT * FROM providers WHERE lower(name) = lower(?) AND base_url = ? LIMIT 1",
        )
        .bind(name)
        .bind(base_url)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to look up provider by name/base_url");
            None
        })
        .map(Provider::from)
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
    async fn insert_then_get_round_trips_a_provider() {
        let pool = test_pool().await;
        let repo = ProviderRepository::new(pool);
        let mut provider = Provider::new("acme", "https://example.invalid", "sk-test");
        provider.models = vec!["gpt-4o-mini".to_string()];
        repo.insert(provider.clone()).await;

        let fetched = repo.get(provider.id).await.expect("provider present");
        assert_eq!(fetched.name, "acme");
        assert_eq!(fetched.models, vec!["gpt-4o-mini".to_string()]);
        assert_eq!(fetched.status, ProviderStatus::Pending);
    }

    #[tokio::test]
    async fn find_by_name_and_base_url_is_case_insensitive_on_name() {
        let pool = test_pool().await;
        let repo = ProviderRepository::new(pool);
        let provider = Provider::new("Acme", "https://example.invalid", "sk-test");
        repo.insert(provider).await;

        let found = repo.find_by_name_and_base_url("acme", "https://example.invalid").await;
        assert!(found.is_some());
        let missing = repo.find_by_name_and_base_url("acme", "https://other.invalid").await;
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn delete_removes_the_row() {
        let pool = test_pool().await;
        let repo = ProviderRepository::new(pool);
        let provider = Provider::new("acme", "https://example.invalid", "sk-test");
        let id = provider.id;
        repo.insert(provider).await;
        repo.delete(id).await;
        assert!(repo.get(id).await.is_none());
    }
}
