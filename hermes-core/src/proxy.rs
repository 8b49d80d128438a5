//! Proxy executor: forwards a resolved request upstream and fans its outcome
//! back to the scorer, breaker, and cooldown ledger (§4.5).
//!
//! Like the dispatcher, the proxy depends on the rest of the system only
//! through narrow sinks (§9): an [`OutcomeSink`] for event-bus/log-batcher
//! fan-out, and a [`ResyncTrigger`] so a penalty that crosses the resync
//! threshold can kick off a catalog resync without the proxy knowing the
//! catalog exists.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::{Stream, StreamExt};
use hermes_types::{HermesError, Provider};
use serde_json::Value;
use uuid::Uuid;

use crate::breaker::CircuitBreaker;
use crate::cooldown::CooldownLedger;
use crate::dispatcher::breaker_key;
use crate::scorer::RouterScorer;

const READ_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_ERROR_BODY_LOG_LEN: usize = 2000;

/// One completed (or aborted) upstream call, reported for event-bus/log-batcher fan-out.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// Provider that served (or failed) the request.
    pub provider_id: Uuid,
    /// Provider's display name, for logs that don't want a second lookup.
    pub provider_name: String,
    /// The resolved upstream model identifier used.
    pub model: String,
    /// Whether this outcome counts as a success for scoring/breaker purposes.
    pub success: bool,
    /// Upstream HTTP status, when one was received.
    pub status: Option<u16>,
    /// Measured duration in milliseconds.
    pub duration_ms: u64,
    /// Truncated error detail, when `success` is false.
    pub error: Option<String>,
}

/// Sink for outcome fan-out, implemented by the log batcher / event bus.
pub trait OutcomeSink: Send + Sync {
    /// Record one outcome. Must not block: the batcher and event bus both
    /// promise non-blocking, best-effort enqueue.
    fn record(&self, outcome: Outcome);
}

/// Triggers a background catalog resync, implemented by whatever owns the
/// provider store. Must not block: implementations spawn their own task.
pub trait ResyncTrigger: Send + Sync {
    /// Ask for `provider_id` to be resynced in the background.
    fn trigger_resync(&self, provider_id: Uuid);
}

/// A proxied response, status and body mirroring the upstream call.
pub struct ProxyResponse {
    /// HTTP status code to return to the client.
    pub status: u16,
    /// Extra headers to attach (`X-Hermes-*` on success).
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: ProxyBody,
    /// Set when this non-2xx response indicates the requested model no
    /// longer exists upstream (§4.6.3) — the orchestrator owns invoking the
    /// catalog's `model_not_found` handler.
    pub model_not_found: bool,
}

/// A proxied response body: either fully buffered, or a live upstream stream.
pub enum ProxyBody {
    /// A complete, already-read body.
    Bytes(Vec<u8>),
    /// A live byte stream relayed verbatim from upstream.
    Stream(BoxByteStream),
}

/// Boxed byte stream type used for streaming proxy responses.
pub type BoxByteStream = Pin<Box<dyn Stream<Item = io::Result<Vec<u8>>> + Send>>;

fn truncate(s: &str) -> String {
    if s.len() > MAX_ERROR_BODY_LOG_LEN {
        format!("{}...", &s[..MAX_ERROR_BODY_LOG_LEN])
    } else {
        s.to_string()
    }
}

/// Forwards requests to upstream providers over a shared `reqwest::Client`
/// and reports every outcome to the shared core signals.
pub struct Proxy {
    http: reqwest::Client,
    breaker: Arc<CircuitBreaker>,
    cooldown: Arc<CooldownLedger>,
    scorer: Arc<RouterScorer>,
    sink: Arc<dyn OutcomeSink>,
    resync: Arc<dyn ResyncTrigger>,
}

impl Proxy {
    /// Build a proxy over a pre-configured shared client (connect/read/write/pool
    /// timeouts are set once when that client is constructed, at startup).
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        breaker: Arc<CircuitBreaker>,
        cooldown: Arc<CooldownLedger>,
        scorer: Arc<RouterScorer>,
        sink: Arc<dyn OutcomeSink>,
        resync: Arc<dyn ResyncTrigger>,
    ) -> Self {
        Self {
            http,
            breaker,
            cooldown,
            scorer,
            sink,
            resync,
        }
    }

    /// Forward `payload` (already rewritten to `resolved_model`) to `provider`.
    /// `selection_score` is the Thompson-sampling score that won dispatch, for
    /// the `X-Hermes-Score` response header — it is not recomputed here.
    pub async fn forward(
        &self,
        provider: &Provider,
        resolved_model: &str,
        payload: &Value,
        selection_score: f64,
    ) -> Result<ProxyResponse, HermesError> {
        let streaming = payload.get("stream").and_then(Value::as_bool).unwrap_or(false);
        let start = Instant::now();

        let mut request = self
            .http
            .post(format!("{}/chat/completions", provider.base_url))
            .bearer_auth(&provider.api_key)
            .json(payload);
        if !streaming {
            request = request.timeout(READ_TIMEOUT);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(err) => {
                let duration_ms = duration_ms(start);
                let error = err.to_string();
                self.record_outcome(provider, resolved_model, false, None, duration_ms, Some(truncate(&error)));
                return Err(if err.is_timeout() {
                    HermesError::provider_timeout(&provider.name)
                } else {
                    HermesError::provider(&provider.name, error)
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            let duration_ms = duration_ms(start);
            let body = response.bytes().await.unwrap_or_default();
            let body_text = String::from_utf8_lossy(&body).to_string();
            let model_not_found = status.as_u16() == 404 || body_text.contains("model_not_found");
            self.record_outcome(
                provider,
                resolved_model,
                false,
                Some(status.as_u16()),
                duration_ms,
                Some(truncate(&body_text)),
            );
            return Ok(ProxyResponse {
                status: status.as_u16(),
                headers: Vec::new(),
                body: ProxyBody::Bytes(body.to_vec()),
                model_not_found,
            });
        }

        if streaming {
            let byte_stream = response.bytes_stream().map(|chunk| {
                chunk
                    .map(|b| b.to_vec())
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
            });
            let guarded = GuardedStream {
                inner: Box::pin(byte_stream),
                recorded: AtomicBool::new(false),
                start,
                provider_id: provider.id,
                provider_name: provider.name.clone(),
                model: resolved_model.to_string(),
                breaker: self.breaker.clone(),
                cooldown: self.cooldown.clone(),
                scorer: self.scorer.clone(),
                sink: self.sink.clone(),
                resync: self.resync.clone(),
            };
            return Ok(ProxyResponse {
                status: status.as_u16(),
                headers: vec![
                    ("X-Hermes-Provider".to_string(), provider.name.clone()),
                    ("X-Hermes-Model".to_string(), resolved_model.to_string()),
                ],
                body: ProxyBody::Stream(Box::pin(guarded)),
                model_not_found: false,
            });
        }

        let duration_ms = duration_ms(start);
        let body = response.bytes().await.unwrap_or_default();
        self.record_outcome(provider, resolved_model, true, Some(status.as_u16()), duration_ms, None);

        Ok(ProxyResponse {
            status: status.as_u16(),
            headers: vec![
                ("X-Hermes-Provider".to_string(), provider.name.clone()),
                ("X-Hermes-Model".to_string(), resolved_model.to_string()),
                ("X-Hermes-Latency".to_string(), format!("{duration_ms}ms")),
                ("X-Hermes-Score".to_string(), format!("{selection_score:.4}")),
            ],
            body: ProxyBody::Bytes(body.to_vec()),
            model_not_found: false,
        })
    }

    fn record_outcome(
        &self,
        provider: &Provider,
        model: &str,
        success: bool,
        status: Option<u16>,
        duration_ms: u64,
        error: Option<String>,
    ) {
        record_outcome_shared(
            &self.breaker,
            &self.cooldown,
            &self.scorer,
            &self.sink,
            &self.resync,
            provider.id,
            &provider.name,
            model,
            success,
            status,
            duration_ms,
            error,
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn record_outcome_shared(
    breaker: &CircuitBreaker,
    cooldown: &CooldownLedger,
    scorer: &RouterScorer,
    sink: &Arc<dyn OutcomeSink>,
    resync: &Arc<dyn ResyncTrigger>,
    provider_id: Uuid,
    provider_name: &str,
    model: &str,
    success: bool,
    status: Option<u16>,
    duration_ms: u64,
    error: Option<String>,
) {
    let key = breaker_key(provider_id);
    if success {
        breaker.record_success(&key);
    } else {
        breaker.record_failure(&key);
        let outcome = cooldown.penalize(provider_id, model, Some(duration_ms), false);
        if outcome.should_resync {
            resync.trigger_resync(provider_id);
        }
    }
    scorer.update(provider_id, model, success, Some(duration_ms as f64));
    sink.record(Outcome {
        provider_id,
        provider_name: provider_name.to_string(),
        model: model.to_string(),
        success,
        status,
        duration_ms,
        error,
    });
}

fn duration_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Wraps the upstream byte stream so the outcome signal fires on every exit
/// path: clean end-of-stream, a mid-stream read error, or the client
/// disconnecting and dropping the stream before it ends (§9, grounded in
/// `stream::drop_impl`'s guard-releases-on-drop idiom).
struct GuardedStream {
    inner: BoxByteStream,
    recorded: AtomicBool,
    start: Instant,
    provider_id: Uuid,
    provider_name: String,
    model: String,
    breaker: Arc<CircuitBreaker>,
    cooldown: Arc<CooldownLedger>,
    scorer: Arc<RouterScorer>,
    sink: Arc<dyn OutcomeSink>,
    resync: Arc<dyn ResyncTrigger>,
}

impl GuardedStream {
    fn record_once(&self, success: bool, duration_ms: u64, error: Option<String>) {
        if self.recorded.swap(true, Ordering::SeqCst) {
            return;
        }
        record_outcome_shared(
            &self.breaker,
            &self.cooldown,
            &self.scorer,
            &self.sink,
            &self.resync,
            self.provider_id,
            &self.provider_name,
            &self.model,
            success,
            None,
            duration_ms,
            error,
        );
    }
}

impl Stream for GuardedStream {
    type Item = io::Result<Vec<u8>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(Some(Err(e))) => {
                let msg = e.to_string();
                self.record_once(false, 0, Some(truncate(&msg)));
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                let duration_ms = duration_ms(self.start);
                self.record_once(true, duration_ms, None);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for GuardedStream {
    fn drop(&mut self) {
        // A client disconnect drops this stream before it reaches `None`;
        // the read loop never observes that as an `Err`, so the guard must
        // fire here with duration 0 per §4.5.
        self.record_once(false, 0, Some("client disconnected".to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_types::ProviderStatus;
    use std::sync::Mutex as StdMutex;

    struct RecordingSink {
        outcomes: StdMutex<Vec<Outcome>>,
    }

    impl OutcomeSink for RecordingSink {
        fn record(&self, outcome: Outcome) {
            self.outcomes.lock().unwrap().push(outcome);
        }
    }

    struct NoopResync;
    impl ResyncTrigger for NoopResync {
        fn trigger_resync(&self, _provider_id: Uuid) {}
    }

    fn test_provider(base_url: &str) -> Provider {
        let mut p = Provider::new("acme", base_url, "sk-test");
        p.status = ProviderStatus::Active;
        p.models = vec!["gpt-4o-mini".to_string()];
        p
    }

    fn proxy_with_sink() -> (Proxy, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink {
            outcomes: StdMutex::new(Vec::new()),
        });
        let proxy = Proxy::new(
            reqwest::Client::new(),
            Arc::new(CircuitBreaker::with_defaults()),
            Arc::new(CooldownLedger::new(crate::cooldown::CooldownSettings::default())),
            Arc::new(RouterScorer::new()),
            sink.clone(),
            Arc::new(NoopResync),
        );
        (proxy, sink)
    }

    #[tokio::test]
    async fn connect_failure_records_failure_and_returns_provider_error() {
        let (proxy, sink) = proxy_with_sink();
        // Port 0 on loopback is never a live listener.
        let provider = test_provider("http://127.0.0.1:0");
        let payload = serde_json::json!({"model": "gpt-4o-mini", "messages": []});
        let result = proxy.forward(&provider, "gpt-4o-mini", &payload, 0.5).await;
        assert!(result.is_err());
        let outcomes = sink.outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].success);
    }
}
