//! Live SSE event feed (§4.10, §4.13): request outcomes, sync results, and
//! provider mutations as they happen, prefixed by a synthetic snapshot frame.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::stream::{self, Stream};
use hermes_core::logbus::HEARTBEAT_INTERVAL;
use hermes_types::Event;
use serde_json::json;

use crate::state::AppState;

pub async fn stream(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let snapshot = state.log_bus.metrics.snapshot();
    let init = Event::new(
        "init",
        json!({
            "upstream_errors": snapshot.upstream_errors,
            "active_requests": snapshot.active_requests,
            "total_requests": snapshot.total_requests,
            "p50": snapshot.p50,
            "p90": snapshot.p90,
            "p99": snapshot.p99,
        }),
    );
    let rx = state.log_bus.events.subscribe();

    let frames = stream::once(async move { init }).chain(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    }));

    let sse_frames = futures::StreamExt::map(frames, |event| {
        Ok(SseEvent::default().event(event.kind.clone()).json_data(event).unwrap_or_default())
    });

    Sse::new(sse_frames).keep_alive(KeepAlive::new().interval(HEARTBEAT_INTERVAL).text("heartbeat"))
}
