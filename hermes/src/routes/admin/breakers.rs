//! Circuit breaker inspection and manual reset (§4.4, §4.13).

use axum::extract::{Path, State};
use axum::Json;
use hermes_core::breaker::State as BreakerState;
use hermes_types::CircuitInfo;
use serde_json::{json, Value};

use crate::state::AppState;

fn state_label(state: BreakerState) -> &'static str {
    match state {
        BreakerState::Closed => "closed",
        BreakerState::Open => "open",
        BreakerState::HalfOpen => "half_open",
    }
}

pub async fn list(State(state): State<AppState>) -> Json<Vec<CircuitInfo>> {
    let entries = state
        .breaker
        .snapshot_all()
        .into_iter()
        .map(|(key, snapshot)| CircuitInfo {
            key,
            state: state_label(snapshot.state).to_string(),
            consecutive_failures: snapshot.consecutive_failures,
            consecutive_successes: snapshot.consecutive_successes,
            opened_at_ms: None,
            last_failure_ms: None,
        })
        .collect();
    Json(entries)
}

pub async fn reset(State(state): State<AppState>, Path(key): Path<String>) -> Json<Value> {
    state.breaker.reset(&key);
    Json(json!({"success": true}))
}
