//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Request context in the pipeline:
//!     → cors.rs (response headers for the caller's origin)
//!     → auth.rs (credential → principal → scope/role check)
//!     → rate_limit.rs (fixed window per user or client IP)
//! Forwarding:
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-By / identity headers)
//! ```
//!
//! # Design Decisions
//! - Fail closed: any failed check aborts the request
//! - Token verification is pluggable; the default only decodes

pub mod auth;
pub mod cors;
pub mod headers;
pub mod rate_limit;

pub use auth::{AuthRequirement, Credential, DecodeOnlyResolver, Principal, PrincipalResolver};
pub use rate_limit::{RateDecision, RateLimit, RateLimiter};
