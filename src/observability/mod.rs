//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Every request handled by the gateway produces:
//!     → logging.rs (structured log events, redacted headers)
//!     → metrics.rs (Prometheus counters, gauges, histograms)
//!     → aggregator.rs (bounded request log for the observability API)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Admin API / dashboards (summaries)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through logs and upstream headers
//! - Metrics are cheap (atomic increments)

pub mod aggregator;
pub mod logging;
pub mod metrics;

pub use aggregator::{MetricsAggregator, MetricsSummary, RequestMetricRecord, TimeRange};
