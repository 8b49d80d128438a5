//! Provider catalog CRUD and the background model-sync worker (§4.6).
//!
//! Storage is reached only through [`ProviderStore`] — this module knows
//! nothing about SQL or the provider cache's concrete key shape, only the
//! [`CacheInvalidate`] and [`SyncLogSink`] seams. [`CatalogHandle`] is the
//! thin `Arc`-wrapping adapter that lets one catalog instance satisfy both
//! the dispatcher's [`crate::dispatcher::ProviderView`] and the proxy's
//! [`crate::proxy::ResyncTrigger`] without either of those modules knowing
//! the catalog exists.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hermes_types::{
    HermesError, ImportResult, Provider, ProviderCreateRequest, ProviderExport, ProviderPortable,
    ProviderStatus, ProviderUpdateRequest, SyncResult,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::cooldown::CooldownLedger;
use crate::dispatcher::ProviderView;
use crate::proxy::ResyncTrigger;

const LIST_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_INTERVAL: Duration = Duration::from_secs(5);
const MAX_ERROR_BODY_LOG_LEN: usize = 2000;

fn truncate(s: &str) -> String {
    if s.len() > MAX_ERROR_BODY_LOG_LEN {
        format!("{}...", &s[..MAX_ERROR_BODY_LOG_LEN])
    } else {
        s.to_string()
    }
}

/// Persistence seam for provider records, implemented by `hermes-db`.
#[async_trait]
pub trait ProviderStore: Send + Sync {
    /// Fetch one provider by id.
    async fn get(&self, id: Uuid) -> Option<Provider>;
    /// List every provider.
    async fn list(&self) -> Vec<Provider>;
    /// Insert a brand-new provider record.
    async fn insert(&self, provider: Provider);
    /// Overwrite an existing provider record.
    async fn update(&self, provider: Provider);
    /// Delete a provider record.
    async fn delete(&self, id: Uuid);
    /// Look up a provider by case-insensitive name and exact base URL, for import dedup.
    async fn find_by_name_and_base_url(&self, name: &str, base_url: &str) -> Option<Provider>;
}

/// Invalidation seam into the provider/model read caches (§4.9).
pub trait CacheInvalidate: Send + Sync {
    /// Drop any cached provider listing.
    fn invalidate_providers(&self);
    /// Drop any cached `/v1/models` listing.
    fn invalidate_models(&self);
}

/// One row to append to the sync log, pre-persistence (id/timestamp are
/// assigned by whatever eventually writes it — the log batcher).
#[derive(Debug, Clone)]
pub struct SyncLogEvent {
    /// Provider the sync ran against.
    pub provider_id: Uuid,
    /// Provider name at sync time (denormalized, survives provider deletion).
    pub provider_name: String,
    /// Model probed, or `"ALL"` for a whole-catalog list failure.
    pub model: String,
    /// Outcome.
    pub result: SyncResult,
    /// Human-readable detail.
    pub message: String,
}

/// Sink for sync-log rows, implemented by the log batcher.
pub trait SyncLogSink: Send + Sync {
    /// Record one sync-log row. Must not block.
    fn record(&self, event: SyncLogEvent);
}

#[derive(Deserialize)]
struct ModelsListResponse {
    data: Vec<ModelListItem>,
}

#[derive(Deserialize)]
struct ModelListItem {
    id: String,
}

/// Provider CRUD plus the guarded, per-provider background sync worker.
pub struct ProviderCatalog {
    store: Arc<dyn ProviderStore>,
    http: reqwest::Client,
    cooldown: Arc<CooldownLedger>,
    cache: Arc<dyn CacheInvalidate>,
    sync_log: Arc<dyn SyncLogSink>,
    in_flight: Mutex<HashSet<Uuid>>,
}

impl ProviderCatalog {
    /// Build a catalog over the given storage, cache, and log seams.
    #[must_use]
    pub fn new(
        store: Arc<dyn ProviderStore>,
        http: reqwest::Client,
        cooldown: Arc<CooldownLedger>,
        cache: Arc<dyn CacheInvalidate>,
        sync_log: Arc<dyn SyncLogSink>,
    ) -> Self {
        Self {
            store,
            http,
            cooldown,
            cache,
            sync_log,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Create a provider in `pending` status and launch its first sync.
    pub async fn create(self: &Arc<Self>, req: ProviderCreateRequest) -> Provider {
        let mut provider = Provider::new(req.name, req.base_url, req.api_key);
        provider.model_blacklist = req.model_blacklist;
        self.store.insert(provider.clone()).await;
        self.cache.invalidate_providers();
        self.spawn_sync(provider.id);
        provider
    }

    /// Apply field updates, reset to `pending` with an empty model list, and re-sync.
    pub async fn update(self: &Arc<Self>, id: Uuid, req: ProviderUpdateRequest) -> Result<Provider, HermesError> {
        let mut provider = self
            .store
            .get(id)
            .await
            .ok_or_else(|| HermesError::not_found(format!("provider {id}")))?;

        if let Some(name) = req.name {
            provider.name = name;
        }
        if let Some(base_url) = req.base_url {
            provider.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(api_key) = req.api_key {
            provider.api_key = api_key;
        }
        if let Some(blacklist) = req.model_blacklist {
            provider.model_blacklist = blacklist;
        }
        provider.status = ProviderStatus::Pending;
        provider.models = Vec::new();

        self.store.update(provider.clone()).await;
        self.cache.invalidate_providers();
        self.cache.invalidate_models();
        self.spawn_sync(id);
        Ok(provider)
    }

    /// Delete a provider and its cooldown state.
    pub async fn delete(&self, id: Uuid) -> Result<(), HermesError> {
        self.store
            .get(id)
            .await
            .ok_or_else(|| HermesError::not_found(format!("provider {id}")))?;
        self.store.delete(id).await;
        self.cooldown.clear_provider(id);
        self.cache.invalidate_providers();
        self.cache.invalidate_models();
        Ok(())
    }

    /// Import portable provider entries, skipping `(lower(name), base_url)` duplicates.
    pub async fn import(self: &Arc<Self>, entries: Vec<ProviderPortable>) -> ImportResult {
        let mut imported = 0usize;
        let mut skipped = 0usize;
        for entry in entries {
            let base_url = entry.base_url.trim_end_matches('/').to_string();
            if self
                .store
                .find_by_name_and_base_url(&entry.name, &base_url)
                .await
                .is_some()
            {
                skipped += 1;
                continue;
            }
            let mut provider = Provider::new(entry.name, base_url, entry.api_key);
            provider.model_blacklist = entry.model_blacklist;
            let id = provider.id;
            self.store.insert(provider).await;
            imported += 1;
            self.spawn_sync(id);
        }
        self.cache.invalidate_providers();
        ImportResult { imported, skipped }
    }

    /// Export every provider as a portable envelope.
    pub async fn export(&self) -> ProviderExport {
        let providers = self.store.list().await;
        ProviderExport {
            exported_at: Utc::now(),
            providers: providers
                .into_iter()
                .map(|p| ProviderPortable {
                    name: p.name,
                    base_url: p.base_url,
                    api_key: p.api_key,
                    model_blacklist: p.model_blacklist,
                })
                .collect(),
        }
    }

    /// Re-sync every provider, guarded the same way as a single sync so an
    /// already-running sync is never duplicated. Intended to be called by a
    /// periodic task every `periodic_sync_interval_hours`.
    pub async fn sync_all(self: &Arc<Self>) {
        let providers = self.store.list().await;
        for p in providers {
            self.spawn_sync(p.id);
        }
    }

    /// §4.6.3: if `model` is still present for `provider_id`, drop it and
    /// re-sync; otherwise this is a no-op (e.g. a stale retry from a request
    /// that already triggered the removal).
    pub async fn handle_model_not_found(self: &Arc<Self>, provider_id: Uuid, model: &str) {
        let Some(mut provider) = self.store.get(provider_id).await else {
            return;
        };
        let Some(pos) = provider.models.iter().position(|m| m == model) else {
            return;
        };
        provider.models.remove(pos);
        provider.status = ProviderStatus::Syncing;
        self.store.update(provider).await;
        self.cache.invalidate_providers();
        self.cache.invalidate_models();
        self.spawn_sync(provider_id);
    }

    fn spawn_sync(self: &Arc<Self>, provider_id: Uuid) {
        let catalog = self.clone();
        tokio::spawn(async move { catalog.sync_provider(provider_id).await });
    }

    /// Run a guarded background sync for one provider: skips silently if a
    /// sync for this id is already in flight.
    pub async fn sync_provider(self: Arc<Self>, provider_id: Uuid) {
        {
            let mut in_flight = self.in_flight.lock().expect("mutex poisoned");
            if !in_flight.insert(provider_id) {
                return;
            }
        }
        self.run_sync(provider_id).await;
        self.in_flight.lock().expect("mutex poisoned").remove(&provider_id);
    }

    async fn run_sync(&self, provider_id: Uuid) {
        let Some(mut provider) = self.store.get(provider_id).await else {
            return;
        };
        provider.status = ProviderStatus::Syncing;
        self.store.update(provider.clone()).await;
        self.cache.invalidate_providers();

        let identifiers = match self.fetch_model_list(&provider).await {
            Ok(ids) => ids,
            Err(message) => {
                provider.status = ProviderStatus::Error;
                self.store.update(provider.clone()).await;
                self.cache.invalidate_providers();
                self.sync_log.record(SyncLogEvent {
                    provider_id,
                    provider_name: provider.name.clone(),
                    model: "ALL".to_string(),
                    result: SyncResult::Failure,
                    message,
                });
                return;
            }
        };

        let mut seen = HashSet::new();
        let dedup: Vec<String> = identifiers.into_iter().filter(|id| seen.insert(id.clone())).collect();

        let mut valid: Vec<String> = Vec::new();
        for (i, model) in dedup.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(PROBE_INTERVAL).await;
            }

            let lower = model.to_lowercase();
            if provider.model_blacklist.iter().any(|b| b.eq_ignore_ascii_case(&model))
                || lower.contains("embedding")
                || lower.contains("embed")
            {
                continue;
            }

            match self.probe_model(&provider, &model).await {
                Ok(()) => {
                    valid.push(model.clone());
                    provider.models = valid.clone();
                    self.store.update(provider.clone()).await;
                    self.cache.invalidate_providers();
                    self.cooldown.clear(provider_id, &model);
                    self.sync_log.record(SyncLogEvent {
                        provider_id,
                        provider_name: provider.name.clone(),
                        model,
                        result: SyncResult::Success,
                        message: "verified".to_string(),
                    });
                }
                Err(message) => {
                    self.sync_log.record(SyncLogEvent {
                        provider_id,
                        provider_name: provider.name.clone(),
                        model,
                        result: SyncResult::Failure,
                        message,
                    });
                }
            }
        }

        provider.status = ProviderStatus::Active;
        provider.models = valid;
        provider.last_synced_at = Some(Utc::now());
        self.store.update(provider).await;
        self.cache.invalidate_providers();
        self.cache.invalidate_models();
    }

    async fn fetch_model_list(&self, provider: &Provider) -> Result<Vec<String>, String> {
        let response = self
            .http
            .get(format!("{}/models", provider.base_url))
            .bearer_auth(&provider.api_key)
            .timeout(LIST_TIMEOUT)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {status}: {}", truncate(&body)));
        }

        let parsed: ModelsListResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(parsed.data.into_iter().map(|m| m.id).collect())
    }

    async fn probe_model(&self, provider: &Provider, model: &str) -> Result<(), String> {
        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": "ping"}],
            "max_tokens": 1,
        });
        let response = self
            .http
            .post(format!("{}/chat/completions", provider.base_url))
            .bearer_auth(&provider.api_key)
            .timeout(PROBE_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(format!("HTTP {status}: {}", truncate(&body)))
        }
    }
}

/// Cheap `Arc`-wrapping handle letting one catalog satisfy both the
/// dispatcher's `ProviderView` and the proxy's `ResyncTrigger` seams.
#[derive(Clone)]
pub struct CatalogHandle(pub Arc<ProviderCatalog>);

#[async_trait]
impl ProviderView for CatalogHandle {
    async fn list_providers(&self) -> Vec<Provider> {
        self.0.store.list().await
    }

    async fn trigger_resync(&self, provider_id: Uuid) {
        self.0.clone().sync_provider(provider_id).await;
    }
}

impl ResyncTrigger for CatalogHandle {
    fn trigger_resync(&self, provider_id: Uuid) {
        self.0.spawn_sync(provider_id);
    }
}

#[async_trait]
impl crate::orchestrator::ModelNotFoundHandler for CatalogHandle {
    async fn handle_model_not_found(&self, provider_id: Uuid, model: &str) {
        self.0.handle_model_not_found(provider_id, model).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_types::ProviderStatus;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Mutex as AsyncMutex;

    struct MemStore {
        providers: AsyncMutex<Vec<Provider>>,
    }

    #[async_trait]
    impl ProviderStore for MemStore {
        async fn get(&self, id: Uuid) -> Option<Provider> {
            self.providers.lock().await.iter().find(|p| p.id == id).cloned()
        }
        async fn list(&self) -> Vec<Provider> {
            self.providers.lock().await.clone()
        }
        async fn insert(&self, provider: Provider) {
            self.providers.lock().await.push(provider);
        }
        async fn update(&self, provider: Provider) {
            let mut guard = self.providers.lock().await;
            if let Some(slot) = guard.iter_mut().find(|p| p.id == provider.id) {
                *slot = provider;
            }
        }
        async fn delete(&self, id: Uuid) {
            self.providers.lock().await.retain(|p| p.id != id);
        }
        async fn find_by_name_and_base_url(&self, name: &str, base_url: &str) -> Option<Provider> {
            self.providers
                .lock()
                .await
                .iter()
                .find(|p| p.name.eq_ignore_ascii_case(name) && p.base_url == base_url)
                .cloned()
        }
    }

    struct NoopCache;
    impl CacheInvalidate for NoopCache {
        fn invalidate_providers(&self) {}
        fn invalidate_models(&self) {}
    }

    struct RecordingLog {
        events: StdMutex<Vec<SyncLogEvent>>,
    }
    impl SyncLogSink for RecordingLog {
        fn record(&self, event: SyncLogEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn catalog_with_store(providers: Vec<Provider>) -> (Arc<ProviderCatalog>, Arc<RecordingLog>) {
        let store = Arc::new(MemStore {
            providers: AsyncMutex::new(providers),
        });
        let log = Arc::new(RecordingLog {
            events: StdMutex::new(Vec::new()),
        });
        let catalog = Arc::new(ProviderCatalog::new(
            store,
            reqwest::Client::new(),
            Arc::new(CooldownLedger::new(crate::cooldown::CooldownSettings::default())),
            Arc::new(NoopCache),
            log.clone(),
        ));
        (catalog, log)
    }

    #[tokio::test]
    async fn create_inserts_pending_provider() {
        let (catalog, _log) = catalog_with_store(vec![]);
        let req = ProviderCreateRequest {
            name: "acme".to_string(),
            base_url: "https://example.invalid/".to_string(),
            api_key: "sk-test".to_string(),
            model_blacklist: vec![],
        };
        let created = catalog.create(req).await;
        assert_eq!(created.status, ProviderStatus::Pending);
        assert_eq!(created.base_url, "https://example.invalid");
        // give the spawned first sync a moment; it will fail fast (bad host) and
        // flip status away from pending, but the creation contract itself holds.
        let stored = catalog.store.get(created.id).await;
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn update_resets_status_and_clears_models() {
        let mut existing = Provider::new("acme", "https://example.invalid", "sk-test");
        existing.status = ProviderStatus::Active;
        existing.models = vec!["gpt-4o-mini".to_string()];
        let id = existing.id;
        let (catalog, _log) = catalog_with_store(vec![existing]);

        let updated = catalog
            .update(
                id,
                ProviderUpdateRequest {
                    name: None,
                    base_url: None,
                    api_key: None,
                    model_blacklist: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, ProviderStatus::Pending);
        assert!(updated.models.is_empty());
    }

    #[tokio::test]
    async fn update_missing_provider_errors() {
        let (catalog, _log) = catalog_with_store(vec![]);
        let result = catalog
            .update(
                Uuid::new_v4(),
                ProviderUpdateRequest {
                    name: None,
                    base_url: None,
                    api_key: None,
                    model_blacklist: None,
                },
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn import_skips_existing_name_and_base_url_pairs() {
        let existing = Provider::new("Acme", "https://example.invalid", "sk-old");
        let (catalog, _log) = catalog_with_store(vec![existing]);
        let result = catalog
            .import(vec![
                ProviderPortable {
                    name: "acme".to_string(),
                    base_url: "https://example.invalid".to_string(),
                    api_key: "sk-new".to_string(),
                    model_blacklist: vec![],
                },
                ProviderPortable {
                    name: "other".to_string(),
                    base_url: "https://other.invalid".to_string(),
                    api_key: "sk-new".to_string(),
                    model_blacklist: vec![],
                },
            ])
            .await;
        assert_eq!(result.imported, 1);
        assert_eq!(result.skipped, 1);
    }

    #[tokio::test]
    async fn handle_model_not_found_removes_and_resyncs_only_if_present() {
        let mut provider = Provider::new("acme", "https://example.invalid", "sk-test");
        provider.status = ProviderStatus::Active;
        provider.models = vec!["gpt-4o-mini".to_string()];
        let id = provider.id;
        let (catalog, _log) = catalog_with_store(vec![provider]);

        catalog.handle_model_not_found(id, "does-not-exist").await;
        let unchanged = catalog.store.get(id).await.unwrap();
        assert_eq!(unchanged.status, ProviderStatus::Active);

        catalog.handle_model_not_found(id, "gpt-4o-mini").await;
        let changed = catalog.store.get(id).await.unwrap();
        assert!(!changed.models.contains(&"gpt-4o-mini".to_string()));
        assert_eq!(changed.status, ProviderStatus::Syncing);
    }
}
