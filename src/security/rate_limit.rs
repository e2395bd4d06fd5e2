//! Fixed-window rate limiting.
//!
//! One counter per key (`user:<id>` or `ip:<addr>`). The first call in a
//! window opens it; calls up to `requests` are allowed; everything after is
//! rejected until the window expires and the next call reopens it.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Requests allowed per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub requests: u32,
    pub window_ms: u64,
}

impl RateLimit {
    pub fn new(requests: u32, window_ms: u64) -> Self {
        Self {
            requests,
            window_ms,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Rejected,
}

#[derive(Debug)]
struct WindowCounter {
    count: u32,
    window_reset_at: Instant,
}

/// Per-key fixed-window counters.
///
/// Each check runs under the map's entry lock, so concurrent requests on the
/// same key never admit more than `requests` calls per window.
#[derive(Debug, Default)]
pub struct RateLimiter {
    counters: DashMap<String, WindowCounter>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a call against `key` and decide whether it may proceed.
    pub fn check_and_consume(&self, key: &str, limit: RateLimit) -> RateDecision {
        self.check_and_consume_at(key, limit, Instant::now())
    }

    pub fn check_and_consume_at(&self, key: &str, limit: RateLimit, now: Instant) -> RateDecision {
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| WindowCounter {
                count: 0,
                window_reset_at: now,
            });
        let counter = entry.value_mut();

        if counter.count == 0 || now > counter.window_reset_at {
            counter.count = 1;
            counter.window_reset_at = now + limit.window();
            return RateDecision::Allowed;
        }

        if counter.count < limit.requests {
            counter.count += 1;
            RateDecision::Allowed
        } else {
            RateDecision::Rejected
        }
    }

    /// Drop counters whose window has expired.
    pub fn retain_active(&self, now: Instant) {
        self.counters.retain(|_, c| now <= c.window_reset_at);
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn nth_call_allowed_next_rejected() {
        let limiter = RateLimiter::new();
        let limit = RateLimit::new(3, 1000);
        let t0 = Instant::now();

        for i in 0..3 {
            let now = t0 + Duration::from_millis(i * 10);
            assert_eq!(limiter.check_and_consume_at("ip:1", limit, now), RateDecision::Allowed);
        }
        assert_eq!(
            limiter.check_and_consume_at("ip:1", limit, t0 + Duration::from_millis(999)),
            RateDecision::Rejected
        );
    }

    #[test]
    fn window_resets_after_expiry() {
        let limiter = RateLimiter::new();
        let limit = RateLimit::new(1, 1000);
        let t0 = Instant::now();

        assert_eq!(limiter.check_and_consume_at("k", limit, t0), RateDecision::Allowed);
        // Exactly at the reset instant the window is still closed.
        assert_eq!(
            limiter.check_and_consume_at("k", limit, t0 + Duration::from_millis(1000)),
            RateDecision::Rejected
        );
        assert_eq!(
            limiter.check_and_consume_at("k", limit, t0 + Duration::from_millis(1001)),
            RateDecision::Allowed
        );
        assert_eq!(
            limiter.check_and_consume_at("k", limit, t0 + Duration::from_millis(1002)),
            RateDecision::Rejected
        );
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new();
        let limit = RateLimit::new(1, 60_000);
        assert_eq!(limiter.check_and_consume("user:a", limit), RateDecision::Allowed);
        assert_eq!(limiter.check_and_consume("user:b", limit), RateDecision::Allowed);
        assert_eq!(limiter.check_and_consume("user:a", limit), RateDecision::Rejected);
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn retain_active_sweeps_expired_windows() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();
        limiter.check_and_consume_at("short", RateLimit::new(5, 10), t0);
        limiter.check_and_consume_at("long", RateLimit::new(5, 10_000), t0);

        limiter.retain_active(t0 + Duration::from_millis(50));
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn concurrent_checks_never_exceed_limit() {
        let limiter = Arc::new(RateLimiter::new());
        let limit = RateLimit::new(50, 60_000);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| limiter.check_and_consume("ip:shared", limit) == RateDecision::Allowed)
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
    }
}
