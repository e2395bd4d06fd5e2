//! Service registry.
//!
//! # Responsibilities
//! - Manage instances grouped by service name
//! - Merge re-registrations by endpoint overlap
//! - Apply the load balancing strategy to pick an endpoint
//! - Accept status updates from the health checker and operators

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};
use url::Url;

use crate::error::{GatewayError, GatewayResult};
use crate::load_balancer::{
    instance::{InstanceStatus, ServiceInstance},
    weighted::WeightedRandom,
    LoadBalancer,
};

/// Whether a registration replaced an existing instance or added a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Replaced,
    Added,
}

/// The endpoint chosen for one upstream attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub service: String,
    pub version: String,
    pub endpoint: Url,
}

/// Registry of service instances plus the strategy used to pick among them.
///
/// The lock is never held across an await point.
#[derive(Debug)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, Vec<ServiceInstance>>>,
    strategy: Box<dyn LoadBalancer>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry {
    /// Create an empty registry using weighted random selection.
    pub fn new() -> Self {
        Self::with_strategy(Box::new(WeightedRandom::new()))
    }

    pub fn with_strategy(strategy: Box<dyn LoadBalancer>) -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            strategy,
        }
    }

    /// Register an instance, replacing the first one it shares an endpoint with.
    pub fn register(&self, instance: ServiceInstance) -> Registration {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        let instances = services.entry(instance.service_name.clone()).or_default();

        match instances.iter_mut().find(|i| i.shares_endpoint(&instance)) {
            Some(existing) => {
                tracing::info!(
                    service = %instance.service_name,
                    version = %instance.version,
                    endpoints = instance.endpoints.len(),
                    "Service instance replaced"
                );
                *existing = instance;
                Registration::Replaced
            }
            None => {
                tracing::info!(
                    service = %instance.service_name,
                    version = %instance.version,
                    endpoints = instance.endpoints.len(),
                    weight = instance.weight,
                    "Service instance registered"
                );
                instances.push(instance);
                Registration::Added
            }
        }
    }

    /// Healthy instances of a service.
    pub fn list_healthy(&self, service: &str) -> Vec<ServiceInstance> {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        services
            .get(service)
            .map(|instances| instances.iter().filter(|i| i.is_selectable()).cloned().collect())
            .unwrap_or_default()
    }

    /// Pick an instance with the strategy, then one of its endpoints uniformly.
    pub fn select(&self, service: &str) -> GatewayResult<Selection> {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        let unavailable = || GatewayError::ServiceUnavailable {
            service: service.to_string(),
        };

        let instances = services.get(service).ok_or_else(unavailable)?;
        let Some(instance) = self.strategy.pick(instances) else {
            tracing::debug!(service = %service, instances = instances.len(), "No healthy instances");
            return Err(unavailable());
        };

        let endpoint = instance.endpoints[fastrand::usize(..instance.endpoints.len())].clone();
        Ok(Selection {
            service: service.to_string(),
            version: instance.version.clone(),
            endpoint,
        })
    }

    /// Set the status of the instance owning `endpoint`. Returns false if none does.
    pub fn set_status(&self, service: &str, endpoint: &Url, status: InstanceStatus) -> bool {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        let Some(instance) = services
            .get_mut(service)
            .and_then(|list| list.iter_mut().find(|i| i.endpoints.contains(endpoint)))
        else {
            return false;
        };

        if instance.status != status {
            tracing::info!(service = %service, endpoint = %endpoint, from = ?instance.status, to = ?status, "Instance status changed");
        }
        instance.status = status;
        true
    }

    /// Apply a health probe result to the instance whose first endpoint is `probed`.
    ///
    /// Draining instances keep their status. Returns the previous and new
    /// status when an instance was updated.
    pub fn record_probe(
        &self,
        service: &str,
        probed: &Url,
        healthy: bool,
        checked_at_ms: u64,
    ) -> Option<(InstanceStatus, InstanceStatus)> {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        let instance = services
            .get_mut(service)?
            .iter_mut()
            .find(|i| i.endpoints.first() == Some(probed))?;

        instance.last_health_check_at = Some(checked_at_ms);
        let previous = instance.status;
        if previous != InstanceStatus::Draining {
            instance.status = if healthy {
                InstanceStatus::Healthy
            } else {
                InstanceStatus::Unhealthy
            };
        }
        Some((previous, instance.status))
    }

    /// Every registered instance (for health checking).
    pub fn all_instances(&self) -> Vec<ServiceInstance> {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        services.values().flatten().cloned().collect()
    }

    /// All services and their instances, ordered by service name.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<ServiceInstance>> {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        services
            .iter()
            .map(|(name, instances)| (name.clone(), instances.clone()))
            .collect()
    }
}
