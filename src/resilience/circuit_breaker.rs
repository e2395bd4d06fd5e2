//! Circuit breaker for service protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: service assumed down, requests fail fast
//! - Half-Open: testing if service recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: first gate check after the reset timeout
//! Half-Open → Closed: probe request succeeds
//! Half-Open → Open: probe request fails
//! ```
//!
//! # Design Decisions
//! - Per-service circuit breaker (not global), created on first reference
//! - Fail fast in Open state (no waiting for timeout)
//! - Half-Open admits at most `half_open_max_probes` concurrent probes
//! - Only a request holding a probe slot gives one back
//! - A slot not returned within `reset_timeout` of its admission is reclaimed

use dashmap::DashMap;
use serde::Serialize;
use std::time::Instant;

use crate::config::CircuitBreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Result of a gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// `probe` is set when the call holds a half-open slot.
    Pass { probe: bool },
    Block,
}

#[derive(Debug, Clone)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    next_attempt_at: Option<Instant>,
    total_requests: u64,
    successful_requests: u64,
    probes_in_flight: u32,
    /// Slots still held after this instant are treated as abandoned.
    probe_deadline: Option<Instant>,
}

impl Default for BreakerState {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            next_attempt_at: None,
            total_requests: 0,
            successful_requests: 0,
            probes_in_flight: 0,
            probe_deadline: None,
        }
    }
}

/// Point-in-time view of one breaker for the observability API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub service: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub last_failure_ms_ago: Option<u64>,
    pub next_attempt_in_ms: Option<u64>,
}

/// All circuit breakers, keyed by service name.
///
/// Every transition happens under the entry lock for that service.
#[derive(Debug)]
pub struct CircuitBreakers {
    breakers: DashMap<String, BreakerState>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakers {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    /// Decide whether a call to `service` may proceed.
    pub fn gate(&self, service: &str) -> Gate {
        self.gate_at(service, Instant::now())
    }

    pub fn gate_at(&self, service: &str, now: Instant) -> Gate {
        let mut entry = self.breakers.entry(service.to_string()).or_default();
        let breaker = entry.value_mut();

        match breaker.state {
            CircuitState::Closed => Gate::Pass { probe: false },
            CircuitState::Open => {
                let due = breaker.next_attempt_at.map_or(true, |at| now >= at);
                if due {
                    tracing::info!(service = %service, "Circuit half-open, admitting probe");
                    breaker.state = CircuitState::HalfOpen;
                    breaker.probes_in_flight = 0;
                    self.admit_probe(breaker, now)
                } else {
                    Gate::Block
                }
            }
            CircuitState::HalfOpen => {
                let abandoned = breaker.probe_deadline.is_some_and(|at| now >= at);
                if abandoned && breaker.probes_in_flight > 0 {
                    tracing::warn!(
                        service = %service,
                        slots = breaker.probes_in_flight,
                        "Reclaiming abandoned probe slots"
                    );
                    breaker.probes_in_flight = 0;
                }
                if breaker.probes_in_flight < self.config.half_open_max_probes {
                    self.admit_probe(breaker, now)
                } else {
                    Gate::Block
                }
            }
        }
    }

    fn admit_probe(&self, breaker: &mut BreakerState, now: Instant) -> Gate {
        breaker.probes_in_flight += 1;
        breaker.probe_deadline = Some(now + self.config.reset_timeout());
        Gate::Pass { probe: true }
    }

    /// Count a call that reached the forwarder.
    pub fn record_attempt(&self, service: &str) {
        self.breakers
            .entry(service.to_string())
            .or_default()
            .total_requests += 1;
    }

    /// Feed the outcome of an upstream call into the state machine.
    ///
    /// `probe` is true when the call held a half-open slot from [`gate`](Self::gate).
    pub fn record_outcome(&self, service: &str, success: bool, probe: bool) {
        self.record_outcome_at(service, success, probe, Instant::now())
    }

    pub fn record_outcome_at(&self, service: &str, success: bool, probe: bool, now: Instant) {
        let mut entry = self.breakers.entry(service.to_string()).or_default();
        let breaker = entry.value_mut();
        if probe && breaker.state == CircuitState::HalfOpen {
            breaker.probes_in_flight = breaker.probes_in_flight.saturating_sub(1);
        }

        if success {
            breaker.consecutive_failures = 0;
            breaker.successful_requests += 1;
            if breaker.state == CircuitState::HalfOpen {
                tracing::info!(service = %service, "Circuit closed after successful probe");
                breaker.state = CircuitState::Closed;
                breaker.next_attempt_at = None;
                breaker.probes_in_flight = 0;
                breaker.probe_deadline = None;
            }
            return;
        }

        breaker.consecutive_failures += 1;
        breaker.last_failure_at = Some(now);
        if breaker.consecutive_failures >= self.config.failure_threshold {
            if breaker.state != CircuitState::Open {
                tracing::warn!(
                    service = %service,
                    failures = breaker.consecutive_failures,
                    reset_timeout_ms = self.config.reset_timeout_ms,
                    "Circuit opened"
                );
            }
            breaker.state = CircuitState::Open;
            breaker.next_attempt_at = Some(now + self.config.reset_timeout());
            breaker.probes_in_flight = 0;
            breaker.probe_deadline = None;
        }
    }

    /// Give back the half-open slot of a probe that never reached upstream.
    ///
    /// Only call this for a request whose gate returned `Pass { probe: true }`.
    pub fn release_probe(&self, service: &str) {
        if let Some(mut breaker) = self.breakers.get_mut(service) {
            if breaker.state == CircuitState::HalfOpen {
                breaker.probes_in_flight = breaker.probes_in_flight.saturating_sub(1);
            }
        }
    }

    /// Current state; unknown services are closed.
    pub fn state(&self, service: &str) -> CircuitState {
        self.breakers
            .get(service)
            .map(|b| b.state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Snapshot of every breaker, sorted by service name.
    pub fn snapshot(&self) -> Vec<CircuitBreakerSnapshot> {
        let now = Instant::now();
        let mut out: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| {
                let b = entry.value();
                CircuitBreakerSnapshot {
                    service: entry.key().clone(),
                    state: b.state,
                    consecutive_failures: b.consecutive_failures,
                    total_requests: b.total_requests,
                    successful_requests: b.successful_requests,
                    last_failure_ms_ago: b
                        .last_failure_at
                        .map(|t| now.saturating_duration_since(t).as_millis() as u64),
                    next_attempt_in_ms: b
                        .next_attempt_at
                        .filter(|_| b.state == CircuitState::Open)
                        .map(|t| t.saturating_duration_since(now).as_millis() as u64),
                }
            })
            .collect();
        out.sort_by(|a, b| a.service.cmp(&b.service));
        out
    }
}
