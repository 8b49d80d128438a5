use serde::Serialize;

/// Overall health classification returned by `GET /health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Database reachable, at least one provider active, no breaker open.
    Healthy,
    /// Database reachable but at least one breaker is open, or no providers are active.
    Degraded,
    /// Database unreachable.
    Unhealthy,
}

/// Database connectivity summary.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseHealth {
    /// Whether a trivial query against the pool succeeded.
    pub connected: bool,
}

/// Circuit-breaker population summary.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerHealth {
    /// Total tracked breaker keys.
    pub total: usize,
    /// Keys currently open.
    pub open: usize,
    /// Keys currently half-open.
    pub half_open: usize,
    /// The open keys themselves, for quick operator inspection.
    pub open_keys: Vec<String>,
}

/// Provider population summary.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    /// Providers currently `active`.
    pub active: usize,
    /// Total configured providers.
    pub total: usize,
}

/// Latency percentile summary, in milliseconds.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LatencyHealth {
    /// 50th percentile latency.
    pub p50: f64,
    /// 90th percentile latency.
    pub p90: f64,
    /// 99th percentile latency.
    pub p99: f64,
}

/// Cache population summary, by cache name.
#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    /// Per-cache stats.
    pub caches: Vec<crate::admin::CacheStatsInfo>,
}

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall classification.
    pub status: HealthStatus,
    /// Crate version string.
    pub version: &'static str,
    /// Database connectivity.
    pub database: DatabaseHealth,
    /// Circuit-breaker summary.
    pub circuit_breaker: CircuitBreakerHealth,
    /// Provider summary.
    pub providers: ProviderHealth,
    /// Recent request latency percentiles.
    pub latency: LatencyHealth,
    /// Cache summary.
    pub cache: CacheHealth,
}
