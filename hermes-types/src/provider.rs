use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a stored provider record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum ProviderStatus {
    /// Created but not yet synced.
    Pending,
    /// A background catalog sync is currently running.
    Syncing,
    /// At least one model has been verified and the provider is eligible for routing.
    Active,
    /// The last sync attempt failed.
    Error,
}

impl ProviderStatus {
    /// Providers in this state may still be selected by the dispatcher.
    #[must_use]
    pub const fn is_dispatchable(self) -> bool {
        matches!(self, Self::Active | Self::Syncing)
    }
}

/// A configured upstream provider: endpoint, discovered models, and lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    /// Stable opaque identifier, assigned at creation.
    pub id: Uuid,
    /// Human-readable name, shown in admin views and logs.
    pub name: String,
    /// Upstream base URL, trailing slash stripped.
    pub base_url: String,
    /// Bearer key used to authenticate to the upstream.
    pub api_key: String,
    /// Model identifiers discovered and verified by the sync worker.
    pub models: Vec<String>,
    /// Model identifiers excluded from sync probing and selection.
    pub model_blacklist: Vec<String>,
    /// Current lifecycle status.
    pub status: ProviderStatus,
    /// When this record was created.
    pub created_at: DateTime<Utc>,
    /// When the catalog was last successfully synced, if ever.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// When this provider was last selected to serve a request.
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Provider {
    /// Build a new provider record in `pending` status, ready for first sync.
    #[must_use]
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            models: Vec::new(),
            model_blacklist: Vec::new(),
            status: ProviderStatus::Pending,
            created_at: Utc::now(),
            last_synced_at: None,
            last_used_at: None,
        }
    }

    /// Whether the catalog was synced within the last `minutes` minutes of `now`.
    #[must_use]
    pub fn synced_within(&self, now: DateTime<Utc>, minutes: i64) -> bool {
        self.last_synced_at
            .is_some_and(|t| now.signed_duration_since(t).num_minutes() < minutes)
    }
}

/// Request body for `POST /admin/providers`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderCreateRequest {
    /// Human-readable provider name.
    pub name: String,
    /// Upstream base URL.
    pub base_url: String,
    /// Bearer key used to authenticate to the upstream.
    pub api_key: String,
    /// Optional initial model blacklist.
    #[serde(default)]
    pub model_blacklist: Vec<String>,
}

/// Request body for `PUT /admin/providers/:id`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderUpdateRequest {
    /// New name, if changing.
    pub name: Option<String>,
    /// New base URL, if changing.
    pub base_url: Option<String>,
    /// New API key, if changing.
    pub api_key: Option<String>,
    /// New model blacklist, if changing.
    pub model_blacklist: Option<Vec<String>>,
}

/// A single provider entry in an import/export envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPortable {
    /// Provider name.
    pub name: String,
    /// Upstream base URL.
    #[serde(rename = "baseUrl")]
    pub base_url: String,
    /// Bearer key for the upstream.
    #[serde(rename = "apiKey")]
    pub api_key: String,
    /// Model blacklist.
    #[serde(rename = "modelBlacklist", default)]
    pub model_blacklist: Vec<String>,
}

/// Envelope returned by `GET /admin/providers/export` and accepted by import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderExport {
    /// Timestamp the export was generated.
    pub exported_at: DateTime<Utc>,
    /// Portable provider entries.
    pub providers: Vec<ProviderPortable>,
}

/// Outcome of an import operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResult {
    /// Number of providers created.
    pub imported: usize,
    /// Number of entries skipped as duplicates of an existing `(name, base_url)` pair.
    pub skipped: usize,
}
