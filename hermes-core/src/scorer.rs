//! Adaptive Thompson-sampling router scorer (§4.4).
//!
//! One [`RouterScorer`] instance tracks a Beta-distribution posterior per
//! `(provider_id, model)` arm, decaying stale evidence toward the uniform
//! prior so an upstream that recovers is not permanently punished.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use rand_distr::{Beta, Distribution};
use uuid::Uuid;

const HALF_LIFE_MS: f64 = 12.0 * 60.0 * 60.0 * 1000.0;
const LATENCY_SMOOTHING: f64 = 0.2;
const LATENCY_MIDPOINT_MS: f64 = 3000.0;
const SEED_LATENCY_MS: f64 = 800.0;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[derive(Clone, Copy)]
struct ArmState {
    alpha: f64,
    beta: f64,
    latency_ewma_ms: f64,
    samples: u64,
    successes: u64,
    failures: u64,
    last_updated_ms: i64,
}

impl Default for ArmState {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
            latency_ewma_ms: SEED_LATENCY_MS,
            samples: 0,
            successes: 0,
            failures: 0,
            last_updated_ms: now_ms(),
        }
    }
}

impl ArmState {
    /// Shrink `alpha`/`beta` toward the uniform prior by the elapsed-time decay factor.
    /// This does NOT touch `last_updated_ms` — only `update` advances it (§4.4, §9).
    fn decayed(self, now_ms: i64) -> Self {
        let elapsed_ms = (now_ms - self.last_updated_ms).max(0) as f64;
        let decay = 2f64.powf(-elapsed_ms / HALF_LIFE_MS);
        Self {
            alpha: 1.0 + (self.alpha - 1.0) * decay,
            beta: 1.0 + (self.beta - 1.0) * decay,
            ..self
        }
    }
}

/// A read-only snapshot of one arm's posterior, for admin/debug inspection.
#[derive(Debug, Clone, Copy)]
pub struct ArmSnapshot {
    /// Beta-distribution success parameter (including prior).
    pub alpha: f64,
    /// Beta-distribution failure parameter (including prior).
    pub beta: f64,
    /// Latency EWMA in milliseconds.
    pub latency_ewma_ms: f64,
    /// Total observed outcomes.
    pub samples: u64,
}

/// Process-wide Thompson-sampling scorer, one mutex over the whole arm map
/// (striping by key is acceptable per §5 but a single lock suffices at the
/// provider-count scale this gateway expects).
pub struct RouterScorer {
    arms: Mutex<HashMap<(Uuid, String), ArmState>>,
}

impl Default for RouterScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterScorer {
    /// Build an empty scorer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            arms: Mutex::new(HashMap::new()),
        }
    }

    /// Record an outcome for `(provider_id, model)`: decay, then increment
    /// alpha on success or beta on failure, update the latency EWMA if a
    /// latency sample was measured, and bump `last_updated`.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn update(&self, provider_id: Uuid, model: &str, success: bool, latency_ms: Option<f64>) {
        let mut arms = self.arms.lock().expect("mutex poisoned");
        let key = (provider_id, model.to_string());
        let now = now_ms();
        let mut state = arms.get(&key).copied().unwrap_or_default().decayed(now);

        if success {
            state.alpha += 1.0;
            state.successes += 1;
        } else {
            state.beta += 1.0;
            state.failures += 1;
        }
        if let Some(latency) = latency_ms {
            state.latency_ewma_ms = (1.0 - LATENCY_SMOOTHING) * state.latency_ewma_ms + LATENCY_SMOOTHING * latency;
        }
        state.samples += 1;
        state.last_updated_ms = now;

        arms.insert(key, state);
    }

    /// Draw a fresh Thompson-sampling score for `(provider_id, model)`. Each
    /// call draws a new posterior sample; `last_updated` is not advanced by
    /// scoring (§9) — only `update` ages the arm.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned, or if the decayed
    /// alpha/beta parameters are non-finite (cannot happen: both are always
    /// ≥ 1 by construction).
    pub fn score(&self, provider_id: Uuid, model: &str) -> f64 {
        let key = (provider_id, model.to_string());
        let state = {
            let arms = self.arms.lock().expect("mutex poisoned");
            arms.get(&key).copied().unwrap_or_default().decayed(now_ms())
        };

        let beta_dist = Beta::new(state.alpha, state.beta).expect("alpha, beta >= 1");
        let mut rng = rand::rng();
        let p: f64 = beta_dist.sample(&mut rng);

        let latency_mult = 1.0 / (1.0 + ((state.latency_ewma_ms - LATENCY_MIDPOINT_MS) / 1000.0).exp());
        let jitter: f64 = rng.random_range(0.0..0.005);

        p * 0.8 + p * 0.2 * latency_mult + jitter
    }

    /// Snapshot current posterior for `(provider_id, model)`, applying decay
    /// but not persisting it (read-only, for the admin surface).
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn snapshot(&self, provider_id: Uuid, model: &str) -> ArmSnapshot {
        let arms = self.arms.lock().expect("mutex poisoned");
        let state = arms
            .get(&(provider_id, model.to_string()))
            .copied()
            .unwrap_or_default()
            .decayed(now_ms());
        ArmSnapshot {
            alpha: state.alpha,
            beta: state.beta,
            latency_ewma_ms: state.latency_ewma_ms,
            samples: state.samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_and_beta_never_drop_below_one() {
        let scorer = RouterScorer::new();
        let p = Uuid::new_v4();
        for _ in 0..50 {
            scorer.update(p, "m", false, Some(5000.0));
        }
        let snap = scorer.snapshot(p, "m");
        assert!(snap.alpha >= 1.0);
        assert!(snap.beta >= 1.0);
    }

    #[test]
    fn success_increments_alpha_failure_increments_beta() {
        let scorer = RouterScorer::new();
        let p = Uuid::new_v4();
        scorer.update(p, "m", true, Some(100.0));
        let snap = scorer.snapshot(p, "m");
        assert!(snap.alpha > 1.0);
        assert_eq!(snap.beta, 1.0);

        let p2 = Uuid::new_v4();
        scorer.update(p2, "m", false, Some(100.0));
        let snap2 = scorer.snapshot(p2, "m");
        assert_eq!(snap2.alpha, 1.0);
        assert!(snap2.beta > 1.0);
    }

    #[test]
    fn latency_ewma_moves_toward_observed_samples() {
        let scorer = RouterScorer::new();
        let p = Uuid::new_v4();
        for _ in 0..20 {
            scorer.update(p, "m", true, Some(100.0));
        }
        let snap = scorer.snapshot(p, "m");
        assert!(snap.latency_ewma_ms < SEED_LATENCY_MS);
    }

    #[test]
    fn score_is_within_plausible_bounds() {
        let scorer = RouterScorer::new();
        let p = Uuid::new_v4();
        scorer.update(p, "m", true, Some(200.0));
        for _ in 0..100 {
            let s = scorer.score(p, "m");
            assert!(s >= 0.0 && s <= 1.01);
        }
    }

    #[test]
    fn unseen_arm_scores_from_the_uniform_prior() {
        let scorer = RouterScorer::new();
        let p = Uuid::new_v4();
        let s = scorer.score(p, "never-seen");
        assert!(s > 0.0 && s < 1.0);
    }
}
