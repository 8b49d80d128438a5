//! Active provider/model cooldowns (§4.5, §4.13).

use axum::extract::{Path, State};
use axum::Json;
use hermes_types::CooldownInfo;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::state::AppState;

pub async fn list(State(state): State<AppState>) -> Json<Vec<CooldownInfo>> {
    let entries = state
        .cooldown
        .list()
        .into_iter()
        .map(|((provider_id, model), cooldown)| CooldownInfo {
            provider_id,
            model,
            until_ms: cooldown.until_ms,
            backoff_ms: cooldown.backoff_ms,
            force: cooldown.force,
        })
        .collect();
    Json(entries)
}

pub async fn clear(State(state): State<AppState>, Path((provider_id, model)): Path<(Uuid, String)>) -> Json<Value> {
    state.cooldown.clear(provider_id, &model);
    Json(json!({"success": true}))
}
