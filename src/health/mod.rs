//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe endpoints[0] + health_check_path of each instance
//!     → registry.record_probe (healthy / unhealthy, timestamp)
//! ```
//!
//! # Design Decisions
//! - One probe per instance per cycle, no retries
//! - Draining is operator-set and never overridden by probes
//! - Health state is per instance, not per endpoint

pub mod active;

pub use active::HealthMonitor;
