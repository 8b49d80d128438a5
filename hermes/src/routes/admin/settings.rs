//! Runtime-tunable settings (§4.11, §4.13): DB-backed overrides of the
//! env-derived bootstrap defaults.

use axum::extract::State;
use axum::Json;
use hermes_core::cooldown::CooldownSettings;
use hermes_types::{SettingEntry, Settings};

use crate::state::AppState;

pub async fn list(State(state): State<AppState>) -> Json<Vec<SettingEntry>> {
    Json(state.stores.settings.list().await)
}

/// Persist every field of `settings` and apply the dispatcher-tunable subset
/// immediately. `periodic_sync_interval_hours` and `chat_max_retries` are
/// picked up by the background sync loop and the orchestrator on the next
/// restart; there's no live hook into either today.
pub async fn update(State(state): State<AppState>, Json(settings): Json<Settings>) -> Json<Settings> {
    state.stores.settings.set_all(&settings).await;
    state.cooldown.set_settings(CooldownSettings {
        initial_penalty_ms: settings.dispatcher.initial_penalty_ms,
        max_penalty_ms: settings.dispatcher.max_penalty_ms,
        resync_threshold: settings.dispatcher.resync_threshold,
        resync_cooldown_ms: settings.dispatcher.resync_cooldown_ms,
    });
    Json(settings)
}
