//! Provider/model cache inspection and invalidation (§4.9, §4.13).

use axum::extract::State;
use axum::Json;
use hermes_types::CacheStatsInfo;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn stats(State(state): State<AppState>) -> Json<Vec<CacheStatsInfo>> {
    Json(state.cache.stats())
}

pub async fn clear(State(state): State<AppState>) -> Json<Value> {
    state.cache.clear();
    Json(json!({"success": true}))
}
