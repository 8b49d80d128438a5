//! Request logging for the chat endpoint only, matching the original
//! gateway's `if path == "/v1/chat/completions"` gate in its top-level
//! request middleware: every other route is left unlogged.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use hermes_core::logbus::{LogBus, RequestLogEvent};
use std::net::SocketAddr;

const LOGGED_PATH: &str = "/v1/chat/completions";

/// Extension inserted before `next.run` so the chat handler can record which
/// model it resolved the request to, without the middleware parsing the body.
#[derive(Clone, Default)]
pub struct ResolvedModel(pub Arc<Mutex<Option<String>>>);

impl ResolvedModel {
    /// Record the resolved model name for the current request.
    pub fn set(&self, model: impl Into<String>) {
        *self.0.lock().expect("mutex poisoned") = Some(model.into());
    }

    fn take(&self) -> Option<String> {
        self.0.lock().expect("mutex poisoned").clone()
    }
}

/// Record method/path/model/status/duration for `/v1/chat/completions` calls.
pub async fn log_chat_requests(State(bus): State<Arc<LogBus>>, mut request: Request, next: Next) -> Response {
    bus.metrics.request_started();

    let path = request.uri().path().to_string();
    if path != LOGGED_PATH {
        let response = next.run(request).await;
        bus.metrics.request_finished();
        return response;
    }

    let method = request.method().to_string();
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    let resolved_model = ResolvedModel::default();
    request.extensions_mut().insert(resolved_model.clone());

    let started = Instant::now();
    let response = next.run(request).await;
    bus.metrics.request_finished();
    let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

    bus.record_request_log(RequestLogEvent {
        method,
        path,
        model: resolved_model.take(),
        status: response.status().as_u16(),
        duration_ms,
        ip,
        created_at: Utc::now(),
    });

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::extract::Extension;
    use axum::routing::get;
    use axum::Router;
    use hermes_core::catalog::SyncLogEvent;
    use std::sync::Mutex as StdMutex;
    use tower::ServiceExt;

    struct RecordingWriter {
        batches: StdMutex<Vec<Vec<RequestLogEvent>>>,
    }

    #[async_trait]
    impl hermes_core::logbus::LogWriter for RecordingWriter {
        async fn write_batch(&self, request_logs: Vec<RequestLogEvent>, _sync_logs: Vec<SyncLogEvent>) {
            self.batches.lock().unwrap().push(request_logs);
        }
    }

    async fn chat_handler(Extension(resolved): Extension<ResolvedModel>) -> &'static str {
        resolved.set("gpt-4o");
        "ok"
    }

    async fn other_handler() -> &'static str {
        "ok"
    }

    fn app(bus: Arc<LogBus>) -> Router {
        Router::new()
            .route("/v1/chat/completions", get(chat_handler))
            .route("/healthz", get(other_handler))
            .layer(axum::middleware::from_fn_with_state(bus, log_chat_requests))
    }

    #[tokio::test]
    async fn logs_chat_completions_with_the_resolved_model() {
        let writer = Arc::new(RecordingWriter { batches: StdMutex::new(Vec::new()) });
        let bus = Arc::new(LogBus::new(writer.clone()));
        let response = app(bus.clone())
            .oneshot(
                Request::builder()
                    .uri("/v1/chat/completions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_success());
        bus.batcher.flush().await;
        let batches = writer.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].model.as_deref(), Some("gpt-4o"));
        assert_eq!(batches[0][0].path, "/v1/chat/completions");
    }

    #[tokio::test]
    async fn does_not_log_other_routes() {
        let writer = Arc::new(RecordingWriter { batches: StdMutex::new(Vec::new()) });
        let bus = Arc::new(LogBus::new(writer.clone()));
        let response = app(bus.clone())
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_success());
        bus.batcher.flush().await;
        assert!(writer.batches.lock().unwrap().is_empty());
    }
}
