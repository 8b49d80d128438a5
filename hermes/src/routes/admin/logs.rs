//! Request and sync log browsing (§4.10, §4.13).

use axum::extract::{Query, State};
use axum::Json;
use hermes_types::{Page, RequestLogEntry, RequestLogFilter, SyncLogEntry, SyncLogFilter};

use crate::state::AppState;

pub async fn requests(State(state): State<AppState>, Query(filter): Query<RequestLogFilter>) -> Json<Page<RequestLogEntry>> {
    Json(state.stores.logs.list_request_logs(&filter).await)
}

pub async fn sync(State(state): State<AppState>, Query(filter): Query<SyncLogFilter>) -> Json<Page<SyncLogEntry>> {
    Json(state.stores.logs.list_sync_logs(&filter).await)
}
