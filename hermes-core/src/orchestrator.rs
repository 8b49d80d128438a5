//! Chat-completion retry loop wrapping the dispatcher and proxy executor (§4.3).

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use hermes_types::ChatCompletionRequest;
use uuid::Uuid;

use crate::dispatcher::Dispatcher;
use crate::proxy::{Proxy, ProxyResponse};

/// Seam for §4.6.3's `model_not_found` handler, implemented by the catalog.
#[async_trait]
pub trait ModelNotFoundHandler: Send + Sync {
    /// React to a provider reporting that `model` no longer exists.
    async fn handle_model_not_found(&self, provider_id: Uuid, model: &str);
}

/// Result of running the chat orchestration loop.
pub enum ChatOutcome {
    /// An upstream response (2xx or a terminal non-2xx) to pass through as-is.
    Response(ProxyResponse),
    /// No provider's catalog supports the requested model at all.
    ModelNotFound {
        /// The client-requested model string, for the error envelope.
        model: String,
    },
    /// Every attempt failed (dispatch exhaustion or all proxy calls errored)
    /// without ever producing a response to pass through.
    UpstreamError,
}

/// Wraps [`Dispatcher`] and [`Proxy`] in the retry loop described by §4.3.
pub struct ChatOrchestrator {
    dispatcher: Arc<Dispatcher>,
    proxy: Arc<Proxy>,
    model_not_found: Arc<dyn ModelNotFoundHandler>,
    max_retries: u32,
}

impl ChatOrchestrator {
    /// Build an orchestrator. `max_retries` is floored at 1 regardless of
    /// what `chat_max_retries` configuration supplies.
    #[must_use]
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        proxy: Arc<Proxy>,
        model_not_found: Arc<dyn ModelNotFoundHandler>,
        max_retries: u32,
    ) -> Self {
        Self {
            dispatcher,
            proxy,
            model_not_found,
            max_retries: max_retries.max(1),
        }
    }

    /// Run the dispatch → forward retry loop for one chat-completion request.
    pub async fn handle(&self, request: &ChatCompletionRequest) -> ChatOutcome {
        let mut tried_provider_ids: HashSet<Uuid> = HashSet::new();
        let mut last_response: Option<ProxyResponse> = None;

        for attempt in 0..self.max_retries {
            let selection = match self.dispatcher.select(&request.model, &tried_provider_ids).await {
                Ok(selection) => selection,
                Err(_reason) => {
                    if attempt == 0 {
                        return ChatOutcome::ModelNotFound {
                            model: request.model.clone(),
                        };
                    }
                    break;
                }
            };

            tried_provider_ids.insert(selection.provider.id);
            let payload = request.with_model(&selection.resolved_model);

            match self
                .proxy
                .forward(&selection.provider, &selection.resolved_model, &payload, selection.score)
                .await
            {
                Ok(response) => {
                    if response.model_not_found {
                        self.model_not_found
                            .handle_model_not_found(selection.provider.id, &selection.resolved_model)
                            .await;
                    }
                    if (200..300).contains(&response.status) {
                        return ChatOutcome::Response(response);
                    }
                    last_response = Some(response);
                }
                Err(_err) => {
                    // Network-layer failure: already signaled to breaker/cooldown/scorer
                    // inside the proxy. Just move on to the next attempt.
                }
            }
        }

        match last_response {
            Some(response) => ChatOutcome::Response(response),
            None => ChatOutcome::UpstreamError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::CircuitBreaker;
    use crate::cooldown::{CooldownLedger, CooldownSettings};
    use crate::dispatcher::ProviderView;
    use crate::proxy::{Outcome, OutcomeSink, ResyncTrigger};
    use crate::scorer::RouterScorer;
    use hermes_types::{Provider, ProviderStatus};
    use std::sync::Mutex as StdMutex;

    struct FixedView {
        providers: Vec<Provider>,
    }

    #[async_trait]
    impl ProviderView for FixedView {
        async fn list_providers(&self) -> Vec<Provider> {
            self.providers.clone()
        }
        async fn trigger_resync(&self, _provider_id: Uuid) {}
    }

    struct NoopSink;
    impl OutcomeSink for NoopSink {
        fn record(&self, _outcome: Outcome) {}
    }

    struct NoopResync;
    impl ResyncTrigger for NoopResync {
        fn trigger_resync(&self, _provider_id: Uuid) {}
    }

    struct RecordingHandler {
        calls: StdMutex<Vec<(Uuid, String)>>,
    }

    #[async_trait]
    impl ModelNotFoundHandler for RecordingHandler {
        async fn handle_model_not_found(&self, provider_id: Uuid, model: &str) {
            self.calls.lock().unwrap().push((provider_id, model.to_string()));
        }
    }

    fn orchestrator(providers: Vec<Provider>, max_retries: u32) -> (ChatOrchestrator, Arc<RecordingHandler>) {
        let view = Arc::new(FixedView { providers });
        let breaker = Arc::new(CircuitBreaker::with_defaults());
        let cooldown = Arc::new(CooldownLedger::new(CooldownSettings::default()));
        let scorer = Arc::new(RouterScorer::new());
        let dispatcher = Arc::new(Dispatcher::new(view, cooldown.clone(), breaker.clone(), scorer.clone(), reqwest::Client::new()));
        let proxy = Arc::new(Proxy::new(
            reqwest::Client::new(),
            breaker,
            cooldown,
            scorer,
            Arc::new(NoopSink),
            Arc::new(NoopResync),
        ));
        let handler = Arc::new(RecordingHandler {
            calls: StdMutex::new(Vec::new()),
        });
        (
            ChatOrchestrator::new(dispatcher, proxy, handler.clone(), max_retries),
            handler,
        )
    }

    fn request(model: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: model.to_string(),
            messages: vec![],
            stream: false,
            extra: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn unknown_model_on_first_attempt_returns_model_not_found() {
        let (orchestrator, _handler) = orchestrator(vec![], 3);
        let outcome = orchestrator.handle(&request("totally-unknown")).await;
        assert!(matches!(outcome, ChatOutcome::ModelNotFound { .. }));
    }

    #[tokio::test]
    async fn max_retries_is_floored_at_one() {
        let (orchestrator, _handler) = orchestrator(vec![], 0);
        // even with max_retries requested as 0, one attempt still runs and
        // reports model_not_found rather than looping zero times.
        let outcome = orchestrator.handle(&request("totally-unknown")).await;
        assert!(matches!(outcome, ChatOutcome::ModelNotFound { .. }));
    }

    #[tokio::test]
    async fn connect_failure_against_the_only_provider_surfaces_upstream_error() {
        let mut p = Provider::new("acme", "http://127.0.0.1:0", "sk-test");
        p.status = ProviderStatus::Active;
        p.models = vec!["gpt-4o-mini".to_string()];
        let (orchestrator, _handler) = orchestrator(vec![p], 3);
        let outcome = orchestrator.handle(&request("gpt-4o")).await;
        assert!(matches!(outcome, ChatOutcome::UpstreamError));
    }
}
