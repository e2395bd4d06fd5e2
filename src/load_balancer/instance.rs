//! Service instance abstraction.
//!
//! # Responsibilities
//! - Represent one weighted deployment unit of a named service
//! - Hold its equivalent endpoints and health status
//! - Decide merge-by-endpoint-overlap on re-registration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

use crate::config::{ConfigError, ServiceConfig};

/// Health status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Healthy,
    Unhealthy,
    /// Set only by explicit calls; never chosen and never re-probed.
    Draining,
}

/// A single deployment unit of a service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceInstance {
    pub service_name: String,
    pub version: String,
    /// Equivalent base URLs; one is picked uniformly per request.
    pub endpoints: Vec<Url>,
    pub health_check_path: String,
    pub weight: u32,
    pub status: InstanceStatus,
    pub metadata: HashMap<String, String>,
    /// Milliseconds since the Unix epoch of the last probe.
    pub last_health_check_at: Option<u64>,
}

impl ServiceInstance {
    /// Create a healthy instance with weight 1.
    pub fn new(service_name: impl Into<String>, endpoints: Vec<Url>) -> Self {
        Self {
            service_name: service_name.into(),
            version: "v1".to_string(),
            endpoints,
            health_check_path: "/health".to_string(),
            weight: 1,
            status: InstanceStatus::Healthy,
            metadata: HashMap::new(),
            last_health_check_at: None,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_health_check_path(mut self, path: impl Into<String>) -> Self {
        self.health_check_path = path.into();
        self
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Only healthy instances take traffic.
    pub fn is_selectable(&self) -> bool {
        self.status == InstanceStatus::Healthy && !self.endpoints.is_empty()
    }

    /// True if the two instances list at least one common endpoint.
    pub fn shares_endpoint(&self, other: &ServiceInstance) -> bool {
        self.endpoints.iter().any(|e| other.endpoints.contains(e))
    }

    /// `endpoints[0] + health_check_path`.
    pub fn probe_url(&self) -> Option<String> {
        self.endpoints
            .first()
            .map(|base| join_path(base, &self.health_check_path))
    }
}

/// Append a request path (possibly with query) to an endpoint base URL.
pub fn join_path(base: &Url, path: &str) -> String {
    let base = base.as_str().trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

impl TryFrom<&ServiceConfig> for ServiceInstance {
    type Error = ConfigError;

    fn try_from(config: &ServiceConfig) -> Result<Self, Self::Error> {
        let endpoints = config
            .endpoints
            .iter()
            .map(|e| Url::parse(e))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::InvalidService {
                service: config.name.clone(),
                reason: format!("invalid endpoint: {}", e),
            })?;

        let mut instance = ServiceInstance::new(&config.name, endpoints)
            .with_weight(config.weight)
            .with_version(&config.version)
            .with_health_check_path(&config.health_check_path);
        instance.metadata = config.metadata.clone();
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn probe_url_joins_first_endpoint_and_path() {
        let instance = ServiceInstance::new("search", vec![url("http://10.0.0.1:3000"), url("http://10.0.0.2:3000")])
            .with_health_check_path("/healthz");
        assert_eq!(instance.probe_url().as_deref(), Some("http://10.0.0.1:3000/healthz"));

        let prefixed = ServiceInstance::new("search", vec![url("http://10.0.0.1:3000/api/")]);
        assert_eq!(prefixed.probe_url().as_deref(), Some("http://10.0.0.1:3000/api/health"));
    }

    #[test]
    fn endpoint_overlap() {
        let a = ServiceInstance::new("s", vec![url("http://a:1"), url("http://b:1")]);
        let b = ServiceInstance::new("s", vec![url("http://b:1")]);
        let c = ServiceInstance::new("s", vec![url("http://c:1")]);
        assert!(a.shares_endpoint(&b));
        assert!(!a.shares_endpoint(&c));
    }

    #[test]
    fn only_healthy_is_selectable() {
        let base = ServiceInstance::new("s", vec![url("http://a:1")]);
        assert!(base.is_selectable());
        assert!(!base.clone().with_status(InstanceStatus::Draining).is_selectable());
        assert!(!base.with_status(InstanceStatus::Unhealthy).is_selectable());
    }
}
