//! Hermes API key generation, hashed-at-rest storage, and verification.

use chrono::{DateTime, Utc};
use hermes_types::{IssuedKey, KeyRecord};
use rand::distr::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

const KEY_PREFIX: &str = "hk-";
const KEY_RANDOM_LEN: usize = 40;

fn hash_key(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

fn generate_plaintext() -> String {
    let random: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{KEY_PREFIX}{random}")
}

#[derive(FromRow)]
struct KeyRow {
    id: Uuid,
    description: String,
    created_at: DateTime<Utc>,
}

impl From<KeyRow> for KeyRecord {
    fn from(row: KeyRow) -> Self {
        KeyRecord {
            id: row.id,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

/// SQLite-backed store for issued Hermes API keys.
pub struct KeyRepository {
    pool: SqlitePool,
}

impl KeyRepository {
    /// Build a repository over the given pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Generate a new key, persist only its hash, and return the plaintext once.
    pub async fn create(&self, description: String) -> IssuedKey {
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let plaintext = generate_plaintext();
        let key_hash = hash_key(&plaintext);

        if let Err(e) = sqlx::query(
            "INSERT INTO hermes_keys (id, key_hash, description, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&key_hash)
        .bind(&description)
        .bind(created_at)
        .execute(&self.pool)
        .await
        {
            tracing::error!(error = %e, "failed to insert hermes key");
        }

        IssuedKey {
            id,
            key: plaintext,
            description,
            created_at,
        }
    }

    /// List issued keys, newest first, without plaintext material.
    pub async fn list(&self) -> Vec<KeyRecord> {
        sqlx::query_as::<_, KeyRow>("SELECT id, description, created_at FROM hermes_keys ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "failed to list hermes keys");
                Vec::new()
            })
            .into_iter()
            .map(KeyRecord::from)
            .collect()
    }

    /// Delete a key by id. Returns whether a row was actually removed.
    pub async fn delete(&self, id: Uuid) -> bool {
        match sqlx::query("DELETE FROM hermes_keys WHERE id = ?").bind(id).execute(&self.pool).await {
            Ok(result) => result.rows_affected() > 0,
            Err(e) => {
                tracing::error!(error = %e, "failed to delete hermes key");
                false
            }
        }
    }

    /// Verify a presented bearer token against the stored hashes.
    pub async fn verify(&self, presented: &str) -> bool {
        let hash = hash_key(presented);
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM hermes_keys WHERE key_hash = ?")
            .bind(hash)
            .fetch_one(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "failed to verify hermes key");
                0
            })
            > 0
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
    async fn created_key_verifies_and_deleted_key_does_not() {
        let pool = test_pool().await;
        let repo = KeyRepository::new(pool);
        let issued = repo.create("ci pipeline".to_string()).await;
        assert!(issued.key.starts_with(KEY_PREFIX));
        assert!(repo.verify(&issued.key).await);

        assert!(repo.delete(issued.id).await);
        assert!(!repo.verify(&issued.key).await);
    }

    #[tokio::test]
    async fn unknown_key_does_not_verify() {
        let pool = test_pool().await;
        let repo = KeyRepository::new(pool);
        assert!(!repo.verify("hk-not-a-real-key").await);
    }

    #[tokio::test]
    async fn list_excludes_plaintext_material() {
        let pool = test_pool().await;
        let repo = KeyRepository::new(pool);
        repo.create("test key".to_string()).await;
        let listed = repo.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].description, "test key");
    }
}
