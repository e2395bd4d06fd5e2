//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to service:
//!     → circuit_breaker.rs (gate: fail fast while open)
//!     → forwarder enforces the per-attempt deadline
//!     → On failure: retries.rs (idempotent only, backoff.rs between attempts)
//!     → circuit_breaker.rs (record outcome of every attempt)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream call has a deadline
//! - Retries only for idempotent requests (GET, HEAD, PUT, DELETE, ...)
//! - Circuit breaker prevents cascading failures

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;

pub use circuit_breaker::{CircuitBreakerSnapshot, CircuitBreakers, CircuitState, Gate};
pub use retries::RetryPolicy;
