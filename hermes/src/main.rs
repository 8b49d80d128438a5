//! Hermes: an OpenAI-compatible chat-completion gateway that dispatches
//! across multiple upstream providers with adaptive, circuit-broken routing.

mod cache;
mod error;
mod routes;
mod state;

use std::net::SocketAddr;
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
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cache::{CachedProviderView, ProviderCache};
use crate::state::AppState;

const RATE_LIMIT_SLOTS: u32 = 12;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "hermes=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env().expect("invalid configuration"));
    tracing::info!(port = config.port, db = %config.db_path, "starting hermes");

    let pool = hermes_db::connect(&config.db_path).await.expect("database connection failed");
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

    let app_state = AppState {
        config: config.clone(),
        stores: stores.clone(),
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

    let router = routes::build_router(app_state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await.expect("failed to bind listen address");
    tracing::info!(%addr, "hermes listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");

    sync_handle.stop().await;
    batcher_handle.abort();
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

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install ctrl_c handler");
    tracing::info!("shutdown signal received");
}
