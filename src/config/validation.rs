//! Configuration validation.
//!
//! Serde handles the syntax; this module checks value ranges, that routes
//! reference configured services, that endpoints are absolute HTTP URLs and
//! that no two routes share a `(method, path)` key. Every problem is reported,
//! not just the first.

use std::collections::HashSet;
use thiserror::Error;
use url::Url;

use axum::http::Method;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("route {index}: invalid method {method:?}")]
    InvalidMethod { index: usize, method: String },

    #[error("route {index}: path {path:?} must start with '/'")]
    InvalidPath { index: usize, path: String },

    #[error("route {index}: unknown service {service:?}")]
    UnknownService { index: usize, service: String },

    #[error("route {index}: duplicate route {method} {path}")]
    DuplicateRoute { index: usize, method: String, path: String },

    #[error("route {index}: rate limit must allow at least one request per non-empty window")]
    InvalidRouteRateLimit { index: usize },

    #[error("service {service:?}: no endpoints")]
    NoEndpoints { service: String },

    #[error("service {service:?}: invalid endpoint {endpoint:?}")]
    InvalidEndpoint { service: String, endpoint: String },
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let positive: [(&'static str, u64); 6] = [
        ("timeouts.total_ms", config.timeouts.total_ms),
        ("timeouts.connect_ms", config.timeouts.connect_ms),
        ("circuit_breaker.failure_threshold", config.circuit_breaker.failure_threshold as u64),
        ("circuit_breaker.half_open_max_probes", config.circuit_breaker.half_open_max_probes as u64),
        ("retry.attempts", config.retry.attempts as u64),
        ("health_check.interval_secs", config.health_check.interval_secs),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }
    if config.rate_limit.enabled {
        if config.rate_limit.requests == 0 {
            errors.push(ValidationError::Zero { field: "rate_limit.requests" });
        }
        if config.rate_limit.window_ms == 0 {
            errors.push(ValidationError::Zero { field: "rate_limit.window_ms" });
        }
    }

    let mut service_names = HashSet::new();
    for service in &config.services {
        service_names.insert(service.name.as_str());
        if service.endpoints.is_empty() {
            errors.push(ValidationError::NoEndpoints {
                service: service.name.clone(),
            });
        }
        for endpoint in &service.endpoints {
            let valid = Url::parse(endpoint)
                .map(|u| matches!(u.scheme(), "http" | "https") && u.host().is_some())
                .unwrap_or(false);
            if !valid {
                errors.push(ValidationError::InvalidEndpoint {
                    service: service.name.clone(),
                    endpoint: endpoint.clone(),
                });
            }
        }
    }

    let mut seen = HashSet::new();
    for (index, route) in config.routes.iter().enumerate() {
        let method = route.method.to_ascii_uppercase();
        if Method::from_bytes(method.as_bytes()).is_err() || method.is_empty() {
            errors.push(ValidationError::InvalidMethod {
                index,
                method: route.method.clone(),
            });
        }
        if !route.path.starts_with('/') {
            errors.push(ValidationError::InvalidPath {
                index,
                path: route.path.clone(),
            });
        }
        if !service_names.contains(route.service.as_str()) {
            errors.push(ValidationError::UnknownService {
                index,
                service: route.service.clone(),
            });
        }
        if !seen.insert((method.clone(), route.path.clone())) {
            errors.push(ValidationError::DuplicateRoute {
                index,
                method,
                path: route.path.clone(),
            });
        }
        if let Some(limit) = &route.rate_limit {
            if limit.requests == 0 || limit.window_ms == 0 {
                errors.push(ValidationError::InvalidRouteRateLimit { index });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
