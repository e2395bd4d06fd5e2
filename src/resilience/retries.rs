//! Retry policy for upstream calls.
//!
//! `attempts` counts every upstream call, so the default of 1 means a single
//! attempt and no retry. Only idempotent methods are retried, and only after a
//! transport failure, a timeout or a 5xx response.

use axum::http::Method;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::resilience::backoff::Backoff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            backoff: Backoff::new(config.backoff_ms, config.max_backoff_ms),
        }
    }

    /// Same backoff, different attempt budget (route override).
    pub fn with_attempts(self, attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            ..self
        }
    }

    /// Attempts allowed for a request with this method.
    pub fn attempts_for(&self, method: &Method) -> u32 {
        if is_retryable(method) {
            self.attempts
        } else {
            1
        }
    }

    /// Delay before attempt number `attempt` (1-based; the first attempt has none).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt.saturating_sub(1))
    }
}

/// Idempotent methods are safe to replay.
pub fn is_retryable(method: &Method) -> bool {
    method.is_idempotent()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_means_single_attempt() {
        let policy = RetryPolicy::from_config(&RetryConfig::default());
        assert_eq!(policy.attempts_for(&Method::GET), 1);
    }

    #[test]
    fn never_retries_non_idempotent_methods() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            attempts: 3,
            backoff_ms: 10,
            max_backoff_ms: 100,
        });
        assert_eq!(policy.attempts_for(&Method::GET), 3);
        assert_eq!(policy.attempts_for(&Method::PUT), 3);
        assert_eq!(policy.attempts_for(&Method::POST), 1);
        assert_eq!(policy.attempts_for(&Method::PATCH), 1);
        assert_eq!(policy.with_attempts(0).attempts, 1);
    }

    #[test]
    fn first_attempt_has_no_delay() {
        let policy = RetryPolicy::from_config(&RetryConfig::default());
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert!(policy.delay_before(2) >= Duration::from_millis(100));
    }
}
