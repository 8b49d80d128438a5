//! Provider/model read cache (§4.9).
//!
//! [`hermes_core::catalog::ProviderCatalog`] keeps its storage handle
//! private, so this wrapper holds its own `Arc<dyn ProviderStore>` over the
//! same underlying `ProviderRepository` and layers a pair of
//! [`TtlLruCache`]s in front of it. It is handed to the catalog as its
//! [`CacheInvalidate`] seam, so every provider CRUD path and sync outcome
//! busts both named caches the moment it changes the catalog.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hermes_core::catalog::{CacheInvalidate, CatalogHandle, ProviderStore};
use hermes_core::dispatcher::ProviderView;
use hermes_core::normalizer::build_alias_maps;
use hermes_core::ttl_lru::TtlLruCache;
use hermes_types::{CacheStatsInfo, ModelListEntry, Provider};
use uuid::Uuid;

const PROVIDERS_KEY: &str = "all";
const MODELS_KEY: &str = "all";

/// Read-through cache backing `GET /admin/providers` and `GET /v1/models`.
pub struct ProviderCache {
    store: Arc<dyn ProviderStore>,
    providers: TtlLruCache<&'static str, Vec<Provider>>,
    models: TtlLruCache<&'static str, Vec<ModelListEntry>>,
    providers_ttl: Duration,
    models_ttl: Duration,
}

impl ProviderCache {
    /// Build a cache over `store`, bounding each named cache at `max_size`
    /// entries (in practice just the one `"all"` key apiece, but the bound
    /// is shared with every other `TtlLruCache` in the process).
    #[must_use]
    pub fn new(store: Arc<dyn ProviderStore>, max_size: usize, providers_ttl: Duration, models_ttl: Duration) -> Self {
        Self {
            store,
            providers: TtlLruCache::new(max_size),
            models: TtlLruCache::new(max_size),
            providers_ttl,
            models_ttl,
        }
    }

    /// Every configured provider, served from cache when live.
    pub async fn list_providers(&self) -> Vec<Provider> {
        if let Some(hit) = self.providers.get(&PROVIDERS_KEY) {
            return hit;
        }
        let fresh = self.store.list().await;
        self.providers.set(PROVIDERS_KEY, fresh.clone(), self.providers_ttl);
        fresh
    }

    /// Canonical model ids across every provider, served from cache when live.
    pub async fn list_models(&self) -> Vec<ModelListEntry> {
        if let Some(hit) = self.models.get(&MODELS_KEY) {
            return hit;
        }
        let providers = self.store.list().await;
        let all_raw = providers.iter().flat_map(|p| p.models.iter().map(String::as_str));
        let alias_maps = build_alias_maps(all_raw);

        let mut ids: Vec<String> = alias_maps.canonical_to_variants.keys().cloned().collect();
        ids.sort();
        let created = chrono::Utc::now().timestamp();
        let entries: Vec<ModelListEntry> = ids
            .into_iter()
            .map(|id| ModelListEntry {
                id,
                object: "model",
                created,
                owned_by: "hermes-gateway",
            })
            .collect();

        self.models.set(MODELS_KEY, entries.clone(), self.models_ttl);
        entries
    }

    /// Population and hit/miss counters for both named caches.
    #[must_use]
    pub fn stats(&self) -> Vec<CacheStatsInfo> {
        let providers = self.providers.stats();
        let models = self.models.stats();
        vec![
            CacheStatsInfo {
                name: "providers".to_string(),
                size: providers.size,
                max_size: providers.max_size,
                hits: providers.hits,
                misses: providers.misses,
            },
            CacheStatsInfo {
                name: "models".to_string(),
                size: models.size,
                max_size: models.max_size,
                hits: models.hits,
                misses: models.misses,
            },
        ]
    }

    /// Drop both caches entirely.
    pub fn clear(&self) {
        self.providers.clear();
        self.models.clear();
    }
}

impl CacheInvalidate for ProviderCache {
    fn invalidate_providers(&self) {
        self.providers.clear();
    }

    fn invalidate_models(&self) {
        self.models.clear();
    }
}

/// The dispatcher's [`ProviderView`], reading the hot dispatch path through
/// [`ProviderCache`] instead of hitting the store on every request (§4.2
/// step 1, §4.9). Resync triggers still go straight to the catalog; caching
/// has nothing to say about that path.
pub struct CachedProviderView {
    cache: Arc<ProviderCache>,
    catalog: CatalogHandle,
}

impl CachedProviderView {
    /// Build a view over `cache` for reads and `catalog` for resync triggers.
    #[must_use]
    pub fn new(cache: Arc<ProviderCache>, catalog: CatalogHandle) -> Self {
        Self { cache, catalog }
    }
}

#[async_trait]
impl ProviderView for CachedProviderView {
    async fn list_providers(&self) -> Vec<Provider> {
        self.cache.list_providers().await
    }

    async fn trigger_resync(&self, provider_id: Uuid) {
        self.catalog.trigger_resync(provider_id).await;
    }
}
