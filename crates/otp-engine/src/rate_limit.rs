//! Fixed-window request counting.
//!
//! A window opens at the first request for a key and lasts `window`. Up to
//! `max_requests` are admitted inside it; the next request after it closes
//! opens a fresh one. State is in memory and per process.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uberfix_config_and_utils::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    /// Issuance requests per client address.
    pub const fn per_client() -> Self {
        Self::new(100, Duration::from_secs(60 * 60))
    }

    /// Issuance requests per phone number.
    pub const fn per_phone() -> Self {
        Self::new(5, Duration::from_secs(10 * 60))
    }

    /// Verification attempts per phone number.
    pub const fn verify_attempts() -> Self {
        Self::new(5, Duration::from_secs(5 * 60))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Requests left in the current window.
    pub remaining: u32,
    /// When the current window closes, epoch milliseconds.
    pub reset_at_ms: i64,
    pub retry_after_secs: u64,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at_ms: i64,
}

#[derive(Debug)]
pub struct FixedWindowLimiter {
    policy: RateLimitPolicy,
    clock: Arc<dyn Clock>,
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    pub fn new(policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            clock,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Count one request for `key` and decide whether it is admitted.
    pub fn check(&self, key: &str) -> RateDecision {
        let now = self.clock.now_millis();
        let window_ms = i64::try_from(self.policy.window.as_millis()).unwrap_or(i64::MAX);
        let max = self.policy.max_requests;

        let mut windows = self.windows.lock();
        if windows.get(key).is_some_and(|w| now > w.reset_at_ms) {
            windows.remove(key);
        }

        let window = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            reset_at_ms: now.saturating_add(window_ms),
        });

        let allowed = window.count < max;
        if allowed {
            window.count += 1;
        }

        let remaining_ms = (window.reset_at_ms - now).max(0) as u64;
        RateDecision {
            allowed,
            remaining: max.saturating_sub(window.count),
            reset_at_ms: window.reset_at_ms,
            retry_after_secs: remaining_ms.div_ceil(1000),
        }
    }

    /// Drop closed windows. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let now = self.clock.now_millis();
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, w| now <= w.reset_at_ms);
        before - windows.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uberfix_config_and_utils::ManualClock;

    fn limiter(policy: RateLimitPolicy) -> (FixedWindowLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_millis(1_000_000));
        (FixedWindowLimiter::new(policy, clock.clone()), clock)
    }

    #[test]
    fn test_admits_up_to_max_then_rejects() {
        let (limiter, _clock) = limiter(RateLimitPolicy::per_phone());

        for expected_remaining in (0..5).rev() {
            let decision = limiter.check("phone:+201234567890");
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let rejected = limiter.check("phone:+201234567890");
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        assert_eq!(rejected.retry_after_secs, 600);
    }

    #[test]
    fn test_window_reopens_after_close() {
        let (limiter, clock) = limiter(RateLimitPolicy::verify_attempts());
        for _ in 0..5 {
            limiter.check("k");
        }

        clock.advance(Duration::from_secs(5 * 60));
        assert!(!limiter.check("k").allowed, "window still open at its last instant");

        clock.advance(Duration::from_millis(1));
        let decision = limiter.check("k");
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
    }

    #[test]
    fn test_retry_after_counts_down() {
        let (limiter, clock) = limiter(RateLimitPolicy::new(1, Duration::from_secs(60)));
        limiter.check("k");
        clock.advance(Duration::from_millis(30_500));

        assert_eq!(limiter.check("k").retry_after_secs, 30);
    }

    #[test]
    fn test_keys_are_independent_and_pruned() {
        let (limiter, clock) = limiter(RateLimitPolicy::new(1, Duration::from_secs(60)));
        assert!(limiter.check("a").allowed);
        assert!(limiter.check("b").allowed);
        assert!(!limiter.check("a").allowed);
        assert_eq!(limiter.tracked_keys(), 2);

        clock.advance(Duration::from_secs(61));
        assert_eq!(limiter.prune(), 2);
        assert_eq!(limiter.tracked_keys(), 0);
    }
}
