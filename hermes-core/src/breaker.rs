//! Per-key three-state circuit breaker (§4.7).
//!
//! One [`CircuitBreaker`] instance is shared process-wide; every provider is
//! tracked under its own key (`provider:<id>`), guarded by a single mutex
//! protecting the whole map — consistent with the teacher's per-structure
//! mutex idiom, generalized here from per-connector blacklisting
//! (`borsa-middleware`'s `BlacklistConnector`) to an explicit state machine.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Breaker state for a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Calls are allowed; failures accumulate toward `failure_threshold`.
    Closed,
    /// Calls are rejected until `recovery_timeout` has elapsed since opening.
    Open,
    /// A limited probe window: successes close the breaker, any failure reopens it.
    HalfOpen,
}

struct Stats {
    state: State,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    last_failure_time: Option<Instant>,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            state: State::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: None,
            last_failure_time: None,
        }
    }
}

/// A point-in-time snapshot of one key's breaker stats, for admin inspection.
#[derive(Debug, Clone, Copy)]
pub struct CircuitSnapshot {
    /// Current state.
    pub state: State,
    /// Consecutive failures observed in `Closed`.
    pub consecutive_failures: u32,
    /// Consecutive successes observed in `HalfOpen`.
    pub consecutive_successes: u32,
}

/// Three-state circuit breaker keyed by provider.
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    success_threshold: u32,
    stats: Mutex<HashMap<String, Stats>>,
}

impl CircuitBreaker {
    /// Build a breaker with the given thresholds.
    #[must_use]
    pub fn new(failure_threshold: u32, recovery_timeout: Duration, success_threshold: u32) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            success_threshold: success_threshold.max(1),
            stats: Mutex::new(HashMap::new()),
        }
    }

    /// Build a breaker with the spec's documented defaults: 5 consecutive
    /// failures, 30s recovery, 2 consecutive successes to close.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(5, Duration::from_secs(30), 2)
    }

    /// Check whether a call against `key` is currently allowed.
    ///
    /// An `Open` breaker whose `recovery_timeout` has elapsed transitions to
    /// `HalfOpen` as part of this call — exactly one `is_allowed` observes
    /// that transition per recovery window, atomically under the map mutex.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn is_allowed(&self, key: &str) -> bool {
        let mut map = self.stats.lock().expect("mutex poisoned");
        let entry = map.entry(key.to_string()).or_default();
        match entry.state {
            State::Closed | State::HalfOpen => true,
            State::Open => {
                let elapsed = entry.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
                if elapsed >= self.recovery_timeout {
                    entry.state = State::HalfOpen;
                    entry.consecutive_successes = 0;
                    entry.consecutive_failures = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call against `key`.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn record_success(&self, key: &str) {
        let mut map = self.stats.lock().expect("mutex poisoned");
        let entry = map.entry(key.to_string()).or_default();
        match entry.state {
            State::Closed => {
                entry.consecutive_failures = 0;
            }
            State::HalfOpen => {
                entry.consecutive_successes += 1;
                if entry.consecutive_successes >= self.success_threshold {
                    entry.state = State::Closed;
                    entry.consecutive_failures = 0;
                    entry.consecutive_successes = 0;
                    entry.opened_at = None;
                }
            }
            State::Open => {}
        }
    }

    /// Record a failed call against `key`.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn record_failure(&self, key: &str) {
        let mut map = self.stats.lock().expect("mutex poisoned");
        let entry = map.entry(key.to_string()).or_default();
        let now = Instant::now();
        entry.last_failure_time = Some(now);
        match entry.state {
            State::Closed => {
                entry.consecutive_failures += 1;
                if entry.consecutive_failures >= self.failure_threshold {
                    entry.state = State::Open;
                    entry.opened_at = Some(now);
                }
            }
            State::HalfOpen => {
                entry.state = State::Open;
                entry.opened_at = Some(now);
                entry.consecutive_successes = 0;
                entry.consecutive_failures = self.failure_threshold;
            }
            State::Open => {}
        }
    }

    /// Force a key back to `Closed` with all counters reset (admin action).
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn reset(&self, key: &str) {
        let mut map = self.stats.lock().expect("mutex poisoned");
        map.insert(key.to_string(), Stats::default());
    }

    /// Snapshot every tracked key's current state, for `GET /admin/circuit-breakers`.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn snapshot_all(&self) -> Vec<(String, CircuitSnapshot)> {
        let map = self.stats.lock().expect("mutex poisoned");
        map.iter()
            .map(|(k, s)| {
                (
                    k.clone(),
                    CircuitSnapshot {
                        state: s.state,
                        consecutive_failures: s.consecutive_failures,
                        consecutive_successes: s.consecutive_successes,
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(5, Duration::from_millis(20), 2);
        for _ in 0..4 {
            breaker.record_failure("p");
            assert!(breaker.is_allowed("p"));
        }
        breaker.record_failure("p");
        assert!(!breaker.is_allowed("p"));
    }

    #[test]
    fn half_open_after_recovery_then_closes_on_two_successes() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10), 2);
        breaker.record_failure("p");
        assert!(!breaker.is_allowed("p"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.is_allowed("p")); // transitions to half-open
        breaker.record_success("p");
        assert!(breaker.is_allowed("p")); // still half-open
        breaker.record_success("p");
        // Now closed: a failure should take threshold=1 failure to reopen.
        breaker.record_failure("p");
        assert!(!breaker.is_allowed("p"));
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10), 2);
        breaker.record_failure("p");
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.is_allowed("p"));
        breaker.record_failure("p");
        assert!(!breaker.is_allowed("p"));
    }

    #[test]
    fn success_in_closed_resets_failure_count() {
        let breaker = CircuitBreaker::new(3, Duration::from_millis(10), 2);
        breaker.record_failure("p");
        breaker.record_failure("p");
        breaker.record_success("p");
        breaker.record_failure("p");
        breaker.record_failure("p");
        // only 2 consecutive since the reset, threshold is 3: still allowed
        assert!(breaker.is_allowed("p"));
    }

    #[test]
    fn reset_clears_state() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(30), 2);
        breaker.record_failure("p");
        assert!(!breaker.is_allowed("p"));
        breaker.reset("p");
        assert!(breaker.is_allowed("p"));
    }
}
