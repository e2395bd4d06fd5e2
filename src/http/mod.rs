//! Request handling subsystem.
//!
//! # Data Flow
//! ```text
//! Transport (server.rs, optional)
//!     → gateway.rs (Gateway::handle)
//!     → context.rs (per-request state)
//!     → pipeline.rs (ordered middleware, first failure aborts)
//!     → forwarder.rs (select instance, call upstream, report to breaker)
//!     → response.rs (body interpretation, uniform failures)
//!     → back to the caller
//! ```

pub mod context;
pub mod forwarder;
pub mod gateway;
pub mod pipeline;
pub mod response;
pub mod server;

pub use context::RequestContext;
pub use forwarder::{HyperUpstream, UpstreamClient, UpstreamRequest, UpstreamResponse};
pub use gateway::{Gateway, GatewayBuilder, ServiceStatus};
pub use pipeline::{Middleware, MiddlewareKind, MiddlewareStep, Pipeline};
pub use response::{GatewayResponse, ResponseBody};
pub use server::HttpServer;
