//! Route definition.

use axum::http::Method;
use std::time::Duration;

use crate::config::{ConfigError, RouteConfig};
use crate::routing::matcher::PathPattern;
use crate::security::{headers::HeaderTransform, AuthRequirement, RateLimit};

/// A registered route. Identified by `(method, pattern)`, immutable once added.
#[derive(Debug, Clone)]
pub struct Route {
    pub method: Method,
    pub pattern: PathPattern,
    pub service_name: String,
    /// Replaces the global total timeout.
    pub timeout: Option<Duration>,
    /// Replaces the global attempt count.
    pub retry_attempts: Option<u32>,
    /// Names of the pipeline steps that run for this route; empty runs all.
    pub middleware: Vec<String>,
    pub auth: AuthRequirement,
    pub rate_limit: Option<RateLimit>,
    pub request_transform: HeaderTransform,
    pub response_transform: HeaderTransform,
    /// Adds `Cache-Control: max-age` to successful responses lacking one.
    pub cache_ttl: Option<Duration>,
}

impl Route {
    /// Create a route with no overrides.
    pub fn new(
        method: Method,
        path: &str,
        service_name: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            method,
            pattern: PathPattern::compile(path)?,
            service_name: service_name.into(),
            timeout: None,
            retry_attempts: None,
            middleware: Vec::new(),
            auth: AuthRequirement::default(),
            rate_limit: None,
            request_transform: HeaderTransform::default(),
            response_transform: HeaderTransform::default(),
            cache_ttl: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    pub fn with_middleware<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.middleware = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_auth(mut self, auth: AuthRequirement) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_rate_limit(mut self, limit: RateLimit) -> Self {
        self.rate_limit = Some(limit);
        self
    }

    pub fn with_request_transform(mut self, transform: HeaderTransform) -> Self {
        self.request_transform = transform;
        self
    }

    pub fn with_response_transform(mut self, transform: HeaderTransform) -> Self {
        self.response_transform = transform;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Registration key, `METHOD:pattern`.
    pub fn key(&self) -> String {
        route_key(&self.method, self.pattern.as_str())
    }

    /// True if the named pipeline step runs for this route.
    pub fn runs_step(&self, name: &str) -> bool {
        self.middleware.is_empty() || self.middleware.iter().any(|m| m == name)
    }
}

pub(crate) fn route_key(method: &Method, path: &str) -> String {
    format!("{}:{}", method, path)
}

impl TryFrom<&RouteConfig> for Route {
    type Error = ConfigError;

    fn try_from(config: &RouteConfig) -> Result<Self, Self::Error> {
        let method = Method::from_bytes(config.method.to_uppercase().as_bytes()).map_err(|e| {
            ConfigError::InvalidRoute {
                pattern: config.path.clone(),
                reason: e.to_string(),
            }
        })?;

        let mut route = Route::new(method, &config.path, &config.service)?
            .with_middleware(config.middleware.iter().cloned());

        if let Some(ms) = config.timeout_ms {
            route = route.with_timeout(Duration::from_millis(ms));
        }
        if let Some(attempts) = config.retry_attempts {
            route = route.with_retry_attempts(attempts);
        }
        if let Some(auth) = &config.auth {
            route.auth = AuthRequirement {
                required: auth.required,
                scopes: auth.scopes.clone(),
                roles: auth.roles.clone(),
            };
        }
        if let Some(limit) = &config.rate_limit {
            route = route.with_rate_limit(RateLimit::new(limit.requests, limit.window_ms));
        }
        for (transform, source) in [
            (&mut route.request_transform, &config.request_headers),
            (&mut route.response_transform, &config.response_headers),
        ] {
            if let Some(source) = source {
                // Sorted so config order does not depend on map iteration.
                let mut set: Vec<_> = source.set.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                set.sort();
                transform.set = set;
                transform.remove = source.remove.clone();
            }
        }
        if let Some(secs) = config.cache_ttl_secs {
            route = route.with_cache_ttl(Duration::from_secs(secs));
        }
        Ok(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[test]
    fn builds_route_from_config() {
        let config = parse_config(
            r#"
[[routes]]
method = "post"
path = "/orders/{id}"
service = "orders"
timeout_ms = 1500
retry_attempts = 3
middleware = ["authentication", "logging"]
cache_ttl_secs = 60

[routes.auth]
required = true
roles = ["admin"]

[routes.rate_limit]
requests = 5
window_ms = 1000

[routes.response_headers]
set = { "x-b" = "2", "x-a" = "1" }
remove = ["server"]

[[services]]
name = "orders"
endpoints = ["http://127.0.0.1:9000"]
"#,
        )
        .unwrap();

        let route = Route::try_from(&config.routes[0]).unwrap();
        assert_eq!(route.method, Method::POST);
        assert_eq!(route.key(), "POST:/orders/{id}");
        assert_eq!(route.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(route.retry_attempts, Some(3));
        assert!(route.auth.required);
        assert_eq!(route.auth.roles, vec!["admin"]);
        assert_eq!(route.rate_limit, Some(RateLimit::new(5, 1000)));
        assert_eq!(
            route.response_transform.set,
            vec![("x-a".to_string(), "1".to_string()), ("x-b".to_string(), "2".to_string())]
        );
        assert_eq!(route.response_transform.remove, vec!["server"]);
        assert_eq!(route.cache_ttl, Some(Duration::from_secs(60)));
        assert!(route.runs_step("logging"));
        assert!(!route.runs_step("rate-limit"));
    }

    #[test]
    fn empty_middleware_list_runs_everything() {
        let route = Route::new(Method::GET, "/x", "svc").unwrap();
        assert!(route.runs_step("cors"));
        assert!(route.runs_step("anything"));
    }
}
