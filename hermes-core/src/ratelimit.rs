//! Sliding-window rate limiter at the ingress edge (§4.8).
//!
//! The window is divided into equal slots; `check` sums counts across the
//! trailing `slot_count` slots to approximate a sliding window without
//! storing a timestamp per request.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Outcome of a single [`SlidingWindowLimiter::check`] call.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    /// Whether the call is allowed.
    pub allowed: bool,
    /// Configured maximum requests per window.
    pub limit: u64,
    /// Requests remaining in the current window after this call, floored at 0.
    pub remaining: u64,
    /// Wall-clock ms at which the oldest counted slot fully expires.
    pub reset_at_ms: i64,
    /// Milliseconds the caller should wait before retrying; only meaningful when denied.
    pub retry_after_ms: i64,
}

struct Window {
    slots: HashMap<i64, u64>,
}

/// A sliding-window limiter keyed by arbitrary caller identity (API key, IP, ...).
pub struct SlidingWindowLimiter {
    max_requests: u64,
    slot_duration_ms: i64,
    slot_count: i64,
    windows: Mutex<HashMap<String, Window>>,
}

impl SlidingWindowLimiter {
    /// Build a limiter allowing `max_requests` per `window_seconds`, divided
    /// into `slot_count` equal slots (default semantics: 60s / 12 slots = 5s each).
    #[must_use]
    pub fn new(max_requests: u64, window_seconds: u64, slot_count: u32) -> Self {
        let slot_count = i64::from(slot_count.max(1));
        let window_ms = i64::try_from(window_seconds.max(1)).unwrap_or(i64::MAX) * 1000;
        Self {
            max_requests,
            slot_duration_ms: (window_ms / slot_count).max(1),
            slot_count,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn now_ms() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }

    /// Check and, if allowed, consume one unit of budget for `key`.
    ///
    /// `allowed` is exactly `sum(window) < max_requests` evaluated at entry.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Self::now_ms())
    }

    fn check_at(&self, key: &str, now_ms: i64) -> RateLimitDecision {
        let current_slot = now_ms / self.slot_duration_ms;
        let oldest_slot = current_slot - self.slot_count + 1;

        let mut windows = self.windows.lock().expect("mutex poisoned");
        let window = windows.entry(key.to_string()).or_insert_with(|| Window {
            slots: HashMap::new(),
        });
        window.slots.retain(|slot, _| *slot >= oldest_slot);

        let sum: u64 = window.slots.values().sum();
        let reset_at_ms = (oldest_slot + self.slot_count) * self.slot_duration_ms;

        if sum < self.max_requests {
            *window.slots.entry(current_slot).or_insert(0) += 1;
            let remaining = self.max_requests - (sum + 1);
            RateLimitDecision {
                allowed: true,
                limit: self.max_requests,
                remaining,
                reset_at_ms,
                retry_after_ms: 0,
            }
        } else {
            RateLimitDecision {
                allowed: false,
                limit: self.max_requests,
                remaining: 0,
                reset_at_ms,
                retry_after_ms: (reset_at_ms - now_ms).max(0),
            }
        }
    }

    /// Drop expired slots and empty keys. Intended to run every 5 minutes.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn cleanup(&self) {
        let now_ms = Self::now_ms();
        let current_slot = now_ms / self.slot_duration_ms;
        let oldest_slot = current_slot - self.slot_count + 1;
        let mut windows = self.windows.lock().expect("mutex poisoned");
        windows.retain(|_, window| {
            window.slots.retain(|slot, _| *slot >= oldest_slot);
            !window.slots.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_max_then_denies() {
        let limiter = SlidingWindowLimiter::new(3, 60, 12);
        for _ in 0..3 {
            assert!(limiter.check_at("k", 1_000_000).allowed);
        }
        let decision = limiter.check_at("k", 1_000_000);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert!(decision.retry_after_ms > 0);
    }

    #[test]
    fn distinct_keys_have_independent_budgets() {
        let limiter = SlidingWindowLimiter::new(1, 60, 12);
        assert!(limiter.check_at("a", 0).allowed);
        assert!(limiter.check_at("b", 0).allowed);
        assert!(!limiter.check_at("a", 0).allowed);
    }

    #[test]
    fn budget_recovers_once_the_window_slides_past() {
        let limiter = SlidingWindowLimiter::new(1, 60, 12);
        assert!(limiter.check_at("k", 0).allowed);
        assert!(!limiter.check_at("k", 1_000).allowed);
        // 70 seconds later the original slot has fully slid out of the window.
        assert!(limiter.check_at("k", 70_000).allowed);
    }

    #[test]
    fn cleanup_drops_empty_keys() {
        let limiter = SlidingWindowLimiter::new(5, 1, 1);
        let _ = limiter.check_at("k", 0);
        limiter.cleanup();
        // the single slot for "k" at t=0 is not expired relative to now_ms(), so
        // cleanup uses real wall-clock time; just assert it doesn't panic and the
        // key structure remains internally consistent by re-checking.
        let decision = limiter.check_at("k", 0);
        assert!(decision.limit == 5);
    }
}
