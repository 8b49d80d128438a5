//! `GET /health` (§4.15): aggregates DB connectivity, breaker population,
//! provider population, recent latency percentiles, and cache stats into one
//! classification.

use axum::extract::State;
use axum::Json;
use hermes_core::breaker::State as BreakerState;
use hermes_types::{
    CacheHealth, CircuitBreakerHealth, DatabaseHealth, HealthResponse, HealthStatus, LatencyHealth,
    ProviderHealth, ProviderStatus,
};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected = state.stores.ping().await;

    let snapshots = state.breaker.snapshot_all();
    let open_keys: Vec<String> = snapshots
        .iter()
        .filter(|(_, s)| s.state == BreakerState::Open)
        .map(|(key, _)| key.clone())
        .collect();
    let half_open = snapshots.iter().filter(|(_, s)| s.state == BreakerState::HalfOpen).count();
    let circuit_breaker = CircuitBreakerHealth {
        total: snapshots.len(),
        open: open_keys.len(),
        half_open,
        open_keys,
    };

    let providers = state.cache.list_providers().await;
    let active = providers.iter().filter(|p| p.status == ProviderStatus::Active).count();
    let providers_health = ProviderHealth {
        active,
        total: providers.len(),
    };

    let metrics = state.log_bus.metrics.snapshot();
    let latency = LatencyHealth {
        p50: metrics.p50 as f64,
        p90: metrics.p90 as f64,
        p99: metrics.p99 as f64,
    };

    let cache = CacheHealth {
        caches: state.cache.stats(),
    };

    let status = if !connected {
        HealthStatus::Unhealthy
    } else if !circuit_breaker.open_keys.is_empty() || (providers_health.total > 0 && providers_health.active == 0) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        database: DatabaseHealth { connected },
        circuit_breaker,
        providers: providers_health,
        latency,
        cache,
    })
}
