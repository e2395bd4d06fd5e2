//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched → service name identified
//!     → registry.rs (instances of the service)
//!     → Apply load balancing algorithm:
//!         - weighted.rs (weighted random over healthy instances)
//!     → pick one endpoint of the chosen instance uniformly
//!     → Return endpoint or ServiceUnavailable
//! ```
//!
//! # Design Decisions
//! - Strategy is stateless; the registry owns instance state
//! - Unhealthy and draining instances are excluded from selection
//! - Health status is per instance, not per endpoint

pub mod instance;
pub mod registry;
pub mod weighted;

pub use instance::{InstanceStatus, ServiceInstance};
pub use registry::{Registration, Selection, ServiceRegistry};
pub use weighted::WeightedRandom;

/// A strategy choosing one instance among those registered for a service.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Returns `None` when no instance is selectable.
    fn pick<'a>(&self, instances: &'a [ServiceInstance]) -> Option<&'a ServiceInstance>;
}
