use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A cooldown entry as exposed through `GET /admin/cooldowns`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownInfo {
    /// Provider the cooldown applies to.
    pub provider_id: Uuid,
    /// Model the cooldown applies to.
    pub model: String,
    /// Wall-clock ms at which the cooldown expires.
    pub until_ms: i64,
    /// Current backoff magnitude, in milliseconds.
    pub backoff_ms: u64,
    /// Whether this cooldown was operator-forced (never auto-cleared by a fresh sync).
    pub force: bool,
}

/// Breaker status for one key, as exposed through `GET /admin/circuit-breakers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitInfo {
    /// Breaker key, e.g. `provider:<id>`.
    pub key: String,
    /// Current state: `"closed"`, `"open"`, or `"half_open"`.
    pub state: String,
    /// Consecutive failures observed in the current window.
    pub consecutive_failures: u32,
    /// Consecutive successes observed while half-open.
    pub consecutive_successes: u32,
    /// Wall-clock ms the breaker last opened, if ever.
    pub opened_at_ms: Option<i64>,
    /// Wall-clock ms of the last recorded failure, if ever.
    pub last_failure_ms: Option<i64>,
}

/// Aggregate cache statistics as exposed through `GET /admin/cache/stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsInfo {
    /// Cache name (`"providers"`, `"models"`, `"general"`).
    pub name: String,
    /// Current number of live entries.
    pub size: usize,
    /// Configured maximum size.
    pub max_size: usize,
    /// Cumulative hit count.
    pub hits: u64,
    /// Cumulative miss count.
    pub misses: u64,
}

/// Request log row, as exposed through `GET /admin/logs/requests`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLogEntry {
    /// Log row id.
    pub id: i64,
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Requested model name, if applicable.
    pub model: Option<String>,
    /// Response status code.
    pub status: u16,
    /// Request duration in milliseconds.
    pub duration_ms: i64,
    /// Caller IP address, if known.
    pub ip: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Outcome of a single sync probe, as exposed through `GET /admin/logs/sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncResult {
    /// The probe (or overall sync) succeeded.
    Success,
    /// The probe (or overall sync) failed.
    Failure,
}

/// Sync log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLogEntry {
    /// Log row id.
    pub id: i64,
    /// Provider the sync ran against.
    pub provider_id: Uuid,
    /// Provider name at the time of the sync (denormalized for display after deletion).
    pub provider_name: String,
    /// Model probed, or `"ALL"` for a whole-catalog fetch failure.
    pub model: String,
    /// Outcome.
    pub result: SyncResult,
    /// Human-readable detail (truncated error body on failure).
    pub message: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Pagination parameters shared by log listing endpoints.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageParams {
    /// Maximum rows to return.
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Rows to skip before the returned page.
    #[serde(default)]
    pub offset: u32,
}

const fn default_limit() -> u32 {
    50
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

/// A paginated page of rows, with the total count of matching rows.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    /// Rows in this page.
    pub items: Vec<T>,
    /// Total rows matching the filter, ignoring pagination.
    pub total: u64,
}

/// Filters accepted by `GET /admin/logs/requests`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestLogFilter {
    /// Restrict to a specific model.
    pub model: Option<String>,
    /// Restrict to a specific status code.
    pub status: Option<u16>,
    /// Pagination.
    #[serde(flatten)]
    pub page: PageParams,
}

/// Filters accepted by `GET /admin/logs/sync`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncLogFilter {
    /// Restrict to a specific provider.
    pub provider_id: Option<Uuid>,
    /// Restrict to a specific result.
    pub result: Option<SyncResult>,
    /// Pagination.
    #[serde(flatten)]
    pub page: PageParams,
}

/// A generated Hermes API key, as returned immediately after creation.
///
/// The plaintext `key` is shown exactly once; only its hash is persisted.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedKey {
    /// Opaque key id.
    pub id: Uuid,
    /// Plaintext key material — present only in the creation response.
    pub key: String,
    /// Operator-supplied description.
    pub description: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A stored key record as listed through `GET /admin/keys` (no plaintext material).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Opaque key id.
    pub id: Uuid,
    /// Operator-supplied description.
    pub description: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Request body for `POST /admin/keys`.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyCreateRequest {
    /// Human-readable description shown in listings.
    pub description: String,
}

/// Generic success/error envelope used by admin write endpoints on failure.
#[derive(Debug, Clone, Serialize)]
pub struct AdminErrorEnvelope {
    /// Always `false`.
    pub success: bool,
    /// Human-readable error message.
    pub error: String,
}

impl AdminErrorEnvelope {
    /// Build an envelope from any displayable error.
    pub fn from_error(err: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            error: err.to_string(),
        }
    }
}
