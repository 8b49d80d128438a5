//! Issued Hermes API key management (§4.13).

use axum::extract::{Path, State};
use axum::Json;
use hermes_types::{HermesError, IssuedKey, KeyCreateRequest, KeyRecord};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AdminError;
use crate::state::AppState;

pub async fn list(State(state): State<AppState>) -> Json<Vec<KeyRecord>> {
    Json(state.stores.keys.list().await)
}

pub async fn create(State(state): State<AppState>, Json(req): Json<KeyCreateRequest>) -> Json<IssuedKey> {
    Json(state.stores.keys.create(req.description).await)
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Value>, AdminError> {
    if state.stores.keys.delete(id).await {
        Ok(Json(json!({"success": true})))
    } else {
        Err(AdminError(HermesError::not_found(format!("key {id}"))))
    }
}
