//! The chat-completion surface (§4.13, §6): `POST /v1/chat/completions` and
//! `GET /v1/models`.

use axum::body::{Body, Bytes};
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use hermes_core::orchestrator::ChatOutcome;
use hermes_core::proxy::{ProxyBody, ProxyResponse};
use hermes_middleware::ResolvedModel;
use hermes_types::{ChatCompletionRequest, HermesError, ModelListResponse};

use crate::error::ChatError;
use crate::state::AppState;

/// Drive one chat-completion request through the orchestrator's retry loop
/// and relay whatever it produces: a buffered or streamed upstream body on
/// success, or an OpenAI-compatible error envelope otherwise.
pub async fn completions(State(state): State<AppState>, Extension(resolved): Extension<ResolvedModel>, body: Bytes) -> Response {
    let request: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => return ChatError(HermesError::InvalidArg(err.to_string())).into_response(),
    };
    resolved.set(request.model.clone());

    match state.orchestrator.handle(&request).await {
        ChatOutcome::Response(response) => relay(response),
        ChatOutcome::ModelNotFound { model } => ChatError(HermesError::ModelNotFound { model }).into_response(),
        ChatOutcome::UpstreamError => ChatError(HermesError::AllProvidersFailed(Vec::new())).into_response(),
    }
}

fn relay(response: ProxyResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = Response::builder().status(status);
    for (name, value) in &response.headers {
        builder = builder.header(name, value);
    }

    let built = match response.body {
        ProxyBody::Bytes(bytes) => builder.body(Body::from(bytes)),
        ProxyBody::Stream(stream) => {
            builder.body(Body::from_stream(stream.map(|chunk| chunk.map(Bytes::from))))
        }
    };

    built.unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// The canonical model ids currently advertised by any eligible provider.
pub async fn list_models(State(state): State<AppState>) -> Json<ModelListResponse> {
    let data = state.cache.list_models().await;
    Json(ModelListResponse { object: "list", data })
}
