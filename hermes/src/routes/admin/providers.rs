//! Provider CRUD, resync, and import/export (§4.13).

use axum::extract::{Path, State};
use axum::Json;
use hermes_core::proxy::ResyncTrigger;
use hermes_types::{ImportResult, Provider, ProviderCreateRequest, ProviderExport, ProviderUpdateRequest};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AdminError;
use crate::state::AppState;

pub async fn list(State(state): State<AppState>) -> Json<Vec<Provider>> {
    Json(state.cache.list_providers().await)
}

pub async fn create(State(state): State<AppState>, Json(req): Json<ProviderCreateRequest>) -> Json<Provider> {
    Json(state.catalog.create(req).await)
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ProviderUpdateRequest>,
) -> Result<Json<Provider>, AdminError> {
    state.catalog.update(id, req).await.map(Json).map_err(AdminError)
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Value>, AdminError> {
    state.catalog.delete(id).await.map_err(AdminError)?;
    Ok(Json(json!({"success": true})))
}

pub async fn resync(State(state): State<AppState>, Path(id): Path<Uuid>) -> Json<Value> {
    ResyncTrigger::trigger_resync(&state.catalog_handle, id);
    Json(json!({"success": true}))
}

pub async fn import(State(state): State<AppState>, Json(export): Json<ProviderExport>) -> Json<ImportResult> {
    Json(state.catalog.import(export.providers).await)
}

pub async fn export(State(state): State<AppState>) -> Json<ProviderExport> {
    Json(state.catalog.export().await)
}
