//! Candidate selection pipeline (§4.2).
//!
//! The dispatcher depends on nothing but small interface contracts (§9):
//! [`ProviderView`] gives it a read snapshot of the provider population plus
//! a trigger-resync capability, decoupling it from however providers are
//! actually stored (`hermes-db` behind a cache, in the real binary; an
//! in-memory stub in tests). Cooldown, breaker, and scorer are concrete
//! `hermes-core` types passed in directly — no trait needed, since nothing
//! depends back on the dispatcher.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hermes_types::Provider;
use rand::seq::IteratorRandom;
use serde_json::json;
use uuid::Uuid;

use crate::breaker::CircuitBreaker;
use crate::cooldown::CooldownLedger;
use crate::normalizer::{self, build_alias_maps};
use crate::scorer::RouterScorer;

/// Breaker key convention shared by the dispatcher and proxy/catalog callers.
#[must_use]
pub fn breaker_key(provider_id: Uuid) -> String {
    format!("provider:{provider_id}")
}

/// Read-only provider snapshot plus a trigger-resync capability, implemented
/// by whatever owns the actual provider store (cache + DB, in the real binary).
#[async_trait]
pub trait ProviderView: Send + Sync {
    /// Snapshot every configured provider, regardless of status.
    async fn list_providers(&self) -> Vec<Provider>;
    /// Ask the catalog to kick off a background resync for `provider_id`.
    /// Fire-and-forget: the dispatcher does not await the sync's completion.
    async fn trigger_resync(&self, provider_id: Uuid);
}

/// A successfully dispatched candidate.
#[derive(Debug, Clone)]
pub struct Selection {
    /// The chosen provider.
    pub provider: Provider,
    /// The concrete upstream-hosted model identifier to send.
    pub resolved_model: String,
    /// The Thompson-sampling score that won the decision.
    pub score: f64,
}

/// Why [`Dispatcher::select`] returned no candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoSelectionReason {
    /// No configured provider's catalog intersects the requested model's family.
    NoneSupport,
    /// At least one provider supports the family, but all were excluded,
    /// unavailable (cooldown/breaker), or already tried.
    AllExhausted,
}

/// Outcome of a dispatch decision.
pub type DispatchOutcome = Result<Selection, NoSelectionReason>;

/// Candidate filtering, availability checking, and Thompson-sampling scoring.
pub struct Dispatcher {
    view: Arc<dyn ProviderView>,
    cooldown: Arc<CooldownLedger>,
    breaker: Arc<CircuitBreaker>,
    scorer: Arc<RouterScorer>,
    http: reqwest::Client,
}

impl Dispatcher {
    /// Build a dispatcher over the given provider view and shared core signals.
    #[must_use]
    pub fn new(
        view: Arc<dyn ProviderView>,
        cooldown: Arc<CooldownLedger>,
        breaker: Arc<CircuitBreaker>,
        scorer: Arc<RouterScorer>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            view,
            cooldown,
            breaker,
            scorer,
            http,
        }
    }

    /// Select the best (provider, resolved model) pair for `model_name`,
    /// excluding any provider id already tried on a previous retry attempt.
    pub async fn select(&self, model_name: &str, excluded_provider_ids: &HashSet<Uuid>) -> DispatchOutcome {
        let providers = self.view.list_providers().await;

        let all_raw = providers.iter().flat_map(|p| p.models.iter().map(String::as_str));
        let alias_maps = build_alias_maps(all_raw);
        let own_canonical = normalizer::normalize(model_name).canonical;
        let canonical = alias_maps.resolve_canonical(model_name, &own_canonical).to_string();
        let variants: HashSet<String> = alias_maps
            .variants_for(&canonical)
            .cloned()
            .unwrap_or_default();

        if variants.is_empty() {
            return Err(NoSelectionReason::NoneSupport);
        }

        let candidates: Vec<&Provider> = providers
            .iter()
            .filter(|p| {
                p.status.is_dispatchable()
                    && !excluded_provider_ids.contains(&p.id)
                    && p.models.iter().any(|m| variants.contains(m))
            })
            .collect();

        if candidates.is_empty() {
            return Err(NoSelectionReason::NoneSupport);
        }

        let mut scored: Vec<Selection> = Vec::new();
        for provider in candidates {
            let intersection: Vec<&String> = provider.models.iter().filter(|m| variants.contains(*m)).collect();
            let Some(resolved_model) = intersection.into_iter().choose(&mut rand::rng()).cloned() else {
                continue;
            };

            if !self.is_available(provider, &resolved_model).await {
                continue;
            }

            let score = self.scorer.score(provider.id, &resolved_model);
            scored.push(Selection {
                provider: provider.clone(),
                resolved_model,
                score,
            });
        }

        scored
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .ok_or(NoSelectionReason::AllExhausted)
    }

    /// §4.2.1: cooldown + recent-sync trust + self-healing probe.
    async fn is_available(&self, provider: &Provider, model: &str) -> bool {
        if !self.breaker.is_allowed(&breaker_key(provider.id)) {
            return false;
        }

        let now = Utc::now();
        let Some(cooldown) = self.cooldown.get(provider.id, model) else {
            return true;
        };

        if !cooldown.force && provider.synced_within(now, 5) {
            self.cooldown.clear(provider.id, model);
            return true;
        }

        let now_ms = now.timestamp_millis();
        if cooldown.until_ms > now_ms {
            return false;
        }

        match self.probe(provider, model).await {
            Ok(()) => {
                self.cooldown.clear(provider.id, model);
                true
            }
            Err(_) => {
                self.cooldown.bump_probe_failure(provider.id, model);
                false
            }
        }
    }

    /// One-token self-healing probe against an expired cooldown.
    async fn probe(&self, provider: &Provider, model: &str) -> Result<(), ()> {
        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": "ping"}],
            "max_tokens": 1,
        });
        let result = self
            .http
            .post(format!("{}/chat/completions", provider.base_url))
            .bearer_auth(&provider.api_key)
            .timeout(Duration::from_secs(5))
            .json(&body)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => Ok(()),
            _ => Err(()),
        }
    }

    /// Ask the backing provider store to resync `provider_id` in the background.
    pub async fn trigger_resync(&self, provider_id: Uuid) {
        self.view.trigger_resync(provider_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_types::ProviderStatus;
    use std::sync::Mutex as StdMutex;

    struct FixedView {
        providers: Vec<Provider>,
        resynced: StdMutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl ProviderView for FixedView {
        async fn list_providers(&self) -> Vec<Provider> {
            self.providers.clone()
        }
        async fn trigger_resync(&self, provider_id: Uuid) {
            self.resynced.lock().unwrap().push(provider_id);
        }
    }

    fn active_provider(name: &str, models: &[&str]) -> Provider {
        let mut p = Provider::new(name, "https://example.invalid", "sk-test");
        p.status = ProviderStatus::Active;
        p.models = models.iter().map(|s| (*s).to_string()).collect();
        p.last_synced_at = Some(Utc::now());
        p
    }

    fn dispatcher(providers: Vec<Provider>) -> Dispatcher {
        let view = Arc::new(FixedView {
            providers,
            resynced: StdMutex::new(Vec::new()),
        });
        Dispatcher::new(
            view,
            Arc::new(CooldownLedger::new(crate::cooldown::CooldownSettings::default())),
            Arc::new(CircuitBreaker::with_defaults()),
            Arc::new(RouterScorer::new()),
            reqwest::Client::new(),
        )
    }

    #[tokio::test]
    async fn selects_the_only_provider_supporting_the_family() {
        let p = active_provider("acme", &["gpt-4o-mini"]);
        let pid = p.id;
        let d = dispatcher(vec![p]);
        let selection = d.select("gpt-4o", &HashSet::new()).await.expect("selected");
        assert_eq!(selection.provider.id, pid);
        assert_eq!(selection.resolved_model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn unknown_model_family_reports_none_support() {
        let p = active_provider("acme", &["gpt-4o-mini"]);
        let d = dispatcher(vec![p]);
        let err = d.select("totally-unknown-model", &HashSet::new()).await.unwrap_err();
        assert_eq!(err, NoSelectionReason::NoneSupport);
    }

    #[tokio::test]
    async fn excluded_provider_is_skipped_on_retry() {
        let p = active_provider("acme", &["claude-3-opus"]);
        let pid = p.id;
        let d = dispatcher(vec![p]);
        let mut excluded = HashSet::new();
        excluded.insert(pid);
        let err = d.select("claude-3-opus", &excluded).await.unwrap_err();
        assert_eq!(err, NoSelectionReason::NoneSupport);
    }

    #[tokio::test]
    async fn pending_provider_is_not_dispatchable() {
        let mut p = active_provider("acme", &["gpt-4o-mini"]);
        p.status = ProviderStatus::Pending;
        let d = dispatcher(vec![p]);
        let err = d.select("gpt-4o", &HashSet::new()).await.unwrap_err();
        assert_eq!(err, NoSelectionReason::NoneSupport);
    }

    #[tokio::test]
    async fn open_breaker_excludes_the_provider_as_all_exhausted() {
        let p = active_provider("acme", &["gpt-4o-mini"]);
        let pid = p.id;
        let d = dispatcher(vec![p]);
        for _ in 0..5 {
            d.breaker.record_failure(&breaker_key(pid));
        }
        let err = d.select("gpt-4o", &HashSet::new()).await.unwrap_err();
        assert_eq!(err, NoSelectionReason::AllExhausted);
    }
}
