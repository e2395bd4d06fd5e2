//! API gateway library.
//!
//! Routes requests to registered services through an ordered middleware
//! pipeline, balances across weighted instances and isolates upstream
//! failures with per-service circuit breakers. The single entry point is
//! [`Gateway::handle`]; transports live outside the core.

pub mod admin;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod security;

pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use http::{Gateway, GatewayResponse, HttpServer};
pub use lifecycle::Shutdown;
