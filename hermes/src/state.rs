//! Shared application state, built once at startup and cheaply cloned into
//! every handler (every field is `Arc`-backed, matching the teacher's
//! connector-registry construction in spirit: one owner builds the graph,
//! everything downstream just holds a handle into it).

use std::sync::Arc;

use hermes_core::breaker::CircuitBreaker;
use hermes_core::catalog::{CatalogHandle, ProviderCatalog};
use hermes_core::config::Config;
use hermes_core::cooldown::CooldownLedger;
use hermes_core::dispatcher::Dispatcher;
use hermes_core::logbus::LogBus;
use hermes_core::orchestrator::ChatOrchestrator;
use hermes_core::proxy::Proxy;
use hermes_core::ratelimit::SlidingWindowLimiter;
use hermes_core::scorer::RouterScorer;
use hermes_db::Stores;

use crate::cache::ProviderCache;

/// Everything a route handler or middleware layer needs.
#[derive(Clone)]
pub struct AppState {
    /// Immutable bootstrap configuration.
    pub config: Arc<Config>,
    /// Database-backed repositories.
    pub stores: Arc<Stores>,
    /// Candidate selection pipeline.
    pub dispatcher: Arc<Dispatcher>,
    /// Streaming-aware upstream proxy executor.
    pub proxy: Arc<Proxy>,
    /// Chat-completion retry loop wrapping `dispatcher` and `proxy`.
    pub orchestrator: Arc<ChatOrchestrator>,
    /// Provider CRUD and the background sync worker.
    pub catalog: Arc<ProviderCatalog>,
    /// `Arc`-wrapping adapter satisfying the dispatcher/proxy/orchestrator seams.
    pub catalog_handle: CatalogHandle,
    /// Per-provider circuit breaker.
    pub breaker: Arc<CircuitBreaker>,
    /// Per-`(provider, model)` cooldown ledger.
    pub cooldown: Arc<CooldownLedger>,
    /// Thompson-sampling router scorer.
    pub scorer: Arc<RouterScorer>,
    /// Edge sliding-window rate limiter.
    pub limiter: Arc<SlidingWindowLimiter>,
    /// Log batcher, event bus, and in-memory metrics.
    pub log_bus: Arc<LogBus>,
    /// TTL-LRU read cache in front of the provider store.
    pub cache: Arc<ProviderCache>,
    /// Shared HTTP client used for every upstream call.
    pub http: reqwest::Client,
}
