//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (method, path)
//!     → router.rs (exact lookup on METHOD:path)
//!     → matcher.rs (compiled patterns, registration order)
//!     → Return: RouteMatch (route + path params) or RouteNotFound
//!
//! Registration (any time):
//!     Route
//!     → compile pattern once
//!     → copy-on-write swap of the route table
//! ```
//!
//! # Design Decisions
//! - Patterns compiled at registration, never on the request path
//! - Deterministic: same input always matches same route
//! - First match wins (registration order)

pub mod matcher;
pub mod route;
pub mod router;

pub use matcher::PathPattern;
pub use route::Route;
pub use router::{RouteMatch, Router};
