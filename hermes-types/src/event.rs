use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// A single frame broadcast over `GET /admin/events`.
///
/// `data` is intentionally `serde_json::Value` rather than an enum: subscribers
/// are observability consumers, not typed clients, and the frame shapes for
/// `metrics_update`/`request`/`error` are small and evolve independently of the
/// core routing types.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// One of `"init"`, `"metrics_update"`, `"request"`, `"error"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Event payload.
    pub data: Value,
    /// Emission timestamp.
    pub ts: DateTime<Utc>,
}

impl Event {
    /// Build an event stamped with the current time.
    #[must_use]
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            ts: Utc::now(),
        }
    }
}
