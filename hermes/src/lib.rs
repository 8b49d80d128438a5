//! Hermes: an OpenAI-compatible chat-completion gateway that dispatches
//! across multiple upstream providers with adaptive, circuit-broken routing.
//!
//! Split into a library and a thin [`main`](../bin/hermes.rs) so integration
//! tests can assemble an [`AppState`] directly against a test database and
//! drive [`routes::build_router`] in-process, the same way
//! `hermes-middleware`'s own tests drive individual layers with `tower::ServiceExt`.

pub mod cache;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use hermes_core::breaker::CircuitBreaker;
use hermes_core::catalog::{CatalogHandle, ProviderCatalog};
use hermes_core::config::Config;
use hermes_core::cooldown::{CooldownLedger, CooldownSettings};
use hermes_core::dispatcher::Dispatcher;
use hermes_core::logbus::{EventBus, LogBatcher, LogBus, Metrics};
use hermes_core::orchestrator::ChatOrchestrator;
use hermes_core::proxy::Proxy;
use hermes_core::ratelimit::SlidingWindowLimiter;
use hermes_core::scorer::RouterScorer;
use hermes_core::StreamHandle;
use hermes_db::Stores;
use hermes_types::Settings;
use tokio::sync::oneshot;

use crate::cache::{CachedProviderView, ProviderCache};
use crate::state::AppState;

const RATE_LIMIT_SLOTS: u32 = 12;

/// Everything [`main`] needs to run the server: the assembled state and the
/// background task handles that must be stopped on shutdown.
pub struct Application {
    /// Fully wired application state, ready for [`routes::build_router`].
    pub state: AppState,
    /// Periodic catalog resync loop.
    pub sync_handle: StreamHandle,
    /// Log batcher flush loop.
    pub batcher_handle: StreamHandle,
}

/// Wire up every core component, the database, and the background workers
/// from `config`. Split out of `main` so tests can build the same graph over
/// a throwaway database and a mocked upstream.
pub async fn build(config: Config) -> Application {
    let config = Arc::new(config);
    let pool = hermes_db::connect(&config.db_path).await.expect("database connection failed");
    build_with_pool(config, pool).await
}

/// Same as [`build`], but over an already-open pool (lets tests point at an
/// in-memory or temp-file database without going through `DB_PATH`).
pub async fn build_with_pool(config: Arc<Config>, pool: sqlx::SqlitePool) -> Application {
    let stores = Arc::new(Stores::new(pool));

    let settings = stores.settings.resolve(Settings::default()).await;
    tracing::info!(?settings, "resolved runtime settings");

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .build()
        .expect("failed to build shared http client");

    let breaker = Arc::new(CircuitBreaker::new(config.circuit_failure_threshold, config.circuit_recovery_timeout, 2));
    let cooldown = Arc::new(CooldownLedger::new(CooldownSettings {
        initial_penalty_ms: settings.dispatcher.initial_penalty_ms,
        max_penalty_ms: settings.dispatcher.max_penalty_ms,
        resync_threshold: settings.dispatcher.resync_threshold,
        resync_cooldown_ms: settings.dispatcher.resync_cooldown_ms,
    }));
    let scorer = Arc::new(RouterScorer::new());
    let limiter = Arc::new(SlidingWindowLimiter::new(
        config.rate_limit_max,
        config.rate_limit_window.as_secs(),
        RATE_LIMIT_SLOTS,
    ));

    // Built by hand rather than `LogBus::new` so the bootstrap `LOG_BATCH_SIZE`
    // tunable actually reaches the batcher.
    let log_bus = Arc::new(LogBus {
        batcher: Arc::new(LogBatcher::with_config(stores.logs.clone(), 2000, config.log_batch_size)),
        events: Arc::new(EventBus::new()),
        metrics: Arc::new(Metrics::new()),
    });

    let cache = Arc::new(ProviderCache::new(
        stores.providers.clone(),
        config.cache_max_size,
        config.cache_ttl_providers,
        config.cache_ttl_models,
    ));

    let catalog = Arc::new(ProviderCatalog::new(
        stores.providers.clone(),
        http.clone(),
        cooldown.clone(),
        cache.clone(),
        log_bus.clone(),
    ));
    let catalog_handle = CatalogHandle(catalog.clone());

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(CachedProviderView::new(cache.clone(), catalog_handle.clone())),
        cooldown.clone(),
        breaker.clone(),
        scorer.clone(),
        http.clone(),
    ));
    let proxy = Arc::new(Proxy::new(
        http.clone(),
        breaker.clone(),
        cooldown.clone(),
        scorer.clone(),
        log_bus.clone(),
        Arc::new(catalog_handle.clone()),
    ));
    let orchestrator = Arc::new(ChatOrchestrator::new(
        dispatcher.clone(),
        proxy.clone(),
        Arc::new(catalog_handle.clone()),
        settings.chat_max_retries,
    ));

    let state = AppState {
        config: config.clone(),
        stores,
        dispatcher,
        proxy,
        orchestrator,
        catalog: catalog.clone(),
        catalog_handle,
        breaker,
        cooldown,
        scorer,
        limiter,
        log_bus: log_bus.clone(),
        cache,
        http,
    };

    let batcher_handle = StreamHandle::new_abort_only(tokio::spawn(log_bus.batcher.clone().run(config.log_flush_interval)));
    let sync_handle = spawn_periodic_sync(catalog, settings.periodic_sync_interval_hours);

    Application {
        state,
        sync_handle,
        batcher_handle,
    }
}

/// Periodically re-sync every provider's model list in the background. Wrapped
/// in a cooperative [`StreamHandle`] so shutdown waits for the in-flight sync
/// round rather than cancelling it mid-write.
fn spawn_periodic_sync(catalog: Arc<ProviderCatalog>, interval_hours: u64) -> StreamHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel();
    let period = Duration::from_secs(interval_hours.max(1) * 3600);

    let task = tokio::spawn(async move {
        catalog.sync_all().await;
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await; // interval's first tick fires immediately; we already synced above
        loop {
            tokio::select! {
                _ = ticker.tick() => catalog.sync_all().await,
                _ = &mut stop_rx => break,
            }
        }
    });

    StreamHandle::new(task, stop_tx)
}
