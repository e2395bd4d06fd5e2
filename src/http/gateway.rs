//! The gateway facade.
//!
//! # Responsibilities
//! - Own every registry (routes, services, breakers, rate limits, pipeline)
//! - Expose registration and the single request entry point, [`Gateway::handle`]
//! - Turn any failure into the uniform response and record every request
//! - Serve the read-only observability API
//!
//! # Request flow
//! ```text
//! handle(method, path, headers, body)
//!     → router.match_route          (404 on miss)
//!     → pipeline.run                (cors, auth, rate limit, breaker gate, ...)
//!     → forwarder.forward           (select, call, report outcome)
//!     → response transform, cache hint, CORS headers
//!     → metrics aggregator + Prometheus
//! ```

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderValue, Method};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use url::Url;
use uuid::Uuid;

use crate::config::validation::validate_config;
use crate::config::{ConfigError, GatewayConfig};
use crate::error::{GatewayError, GatewayResult};
use crate::health::HealthMonitor;
use crate::http::context::RequestContext;
use crate::http::forwarder::{Forwarder, HyperUpstream, UpstreamClient, UpstreamResponse};
use crate::http::pipeline::{MiddlewareStep, Pipeline, StepEnv};
use crate::http::response::{GatewayResponse, ResponseBody};
use crate::load_balancer::{
    InstanceStatus, LoadBalancer, Registration, ServiceInstance, ServiceRegistry,
};
use crate::observability::{metrics, MetricsAggregator, MetricsSummary, RequestMetricRecord, TimeRange};
use crate::resilience::{CircuitBreakerSnapshot, CircuitBreakers, RetryPolicy};
use crate::routing::{Route, Router};
use crate::security::{
    cors::cors_headers, headers::strip_hop_by_hop, headers::X_REQUEST_ID, DecodeOnlyResolver,
    PrincipalResolver, RateLimiter,
};

/// Health overview of one service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub service: String,
    pub healthy_instances: usize,
    pub total_instances: usize,
    pub instances: Vec<ServiceInstance>,
}

/// Builder for a [`Gateway`] with non-default collaborators.
pub struct GatewayBuilder {
    config: GatewayConfig,
    resolver: Option<Arc<dyn PrincipalResolver>>,
    upstream: Option<Arc<dyn UpstreamClient>>,
    strategy: Option<Box<dyn LoadBalancer>>,
    steps: Option<Vec<MiddlewareStep>>,
}

impl GatewayBuilder {
    pub fn resolver(mut self, resolver: Arc<dyn PrincipalResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn upstream(mut self, upstream: Arc<dyn UpstreamClient>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    pub fn strategy(mut self, strategy: Box<dyn LoadBalancer>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Replace the default pipeline steps.
    pub fn steps(mut self, steps: Vec<MiddlewareStep>) -> Self {
        self.steps = Some(steps);
        self
    }

    /// Validate the config, then build the gateway and register its routes and services.
    pub fn build(self) -> Result<Gateway, ConfigError> {
        let config = self.config;
        validate_config(&config).map_err(ConfigError::Validation)?;
        let registry = Arc::new(match self.strategy {
            Some(strategy) => ServiceRegistry::with_strategy(strategy),
            None => ServiceRegistry::new(),
        });
        let breakers = Arc::new(CircuitBreakers::new(config.circuit_breaker.clone()));
        let upstream = self
            .upstream
            .unwrap_or_else(|| Arc::new(HyperUpstream::new(&config.timeouts)));
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(DecodeOnlyResolver::from_config(&config.auth)));
        let pipeline = match self.steps {
            Some(steps) => Pipeline::with_steps(steps),
            None => Pipeline::default(),
        };

        let forwarder = Forwarder::new(
            registry.clone(),
            breakers.clone(),
            upstream,
            RetryPolicy::from_config(&config.retry),
            config.timeouts.total(),
            config.gateway.name.clone(),
        );

        let gateway = Gateway {
            router: Router::new(),
            registry,
            limiter: RateLimiter::new(),
            breakers,
            pipeline,
            resolver,
            forwarder,
            aggregator: MetricsAggregator::new(),
            config,
        };

        for service in &gateway.config.services {
            gateway.register_service(ServiceInstance::try_from(service)?);
        }
        for route in &gateway.config.routes {
            gateway.add_route(Route::try_from(route)?);
        }
        Ok(gateway)
    }
}

/// The API gateway.
pub struct Gateway {
    config: GatewayConfig,
    router: Router,
    registry: Arc<ServiceRegistry>,
    limiter: RateLimiter,
    breakers: Arc<CircuitBreakers>,
    pipeline: Pipeline,
    resolver: Arc<dyn PrincipalResolver>,
    forwarder: Forwarder,
    aggregator: MetricsAggregator,
}

impl Gateway {
    /// Gateway with default collaborators.
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder {
            config,
            resolver: None,
            upstream: None,
            strategy: None,
            steps: None,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn add_route(&self, route: Route) {
        self.router.register(route);
    }

    pub fn register_service(&self, instance: ServiceInstance) -> Registration {
        self.registry.register(instance)
    }

    /// Explicit status change, e.g. draining an instance before removal.
    pub fn set_instance_status(&self, service: &str, endpoint: &Url, status: InstanceStatus) -> bool {
        self.registry.set_status(service, endpoint, status)
    }

    pub fn add_middleware(&self, step: MiddlewareStep) {
        self.pipeline.add(step);
    }

    /// A health monitor bound to this gateway's service registry.
    pub fn health_monitor(&self) -> HealthMonitor {
        HealthMonitor::new(self.registry.clone(), self.config.health_check.clone())
    }

    /// Drop rate limit counters whose window has passed.
    pub fn prune_rate_limits(&self) {
        self.limiter.retain_active(Instant::now());
    }

    /// Handle one inbound request. Never fails; failures become responses.
    pub async fn handle(&self, method: Method, path: &str, headers: HeaderMap, body: Bytes) -> GatewayResponse {
        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        };

        let (mut response, service, user_id) = match self.router.match_route(&method, path) {
            Ok(matched) => {
                let mut ctx = RequestContext::new(
                    request_id.clone(),
                    method.clone(),
                    path,
                    query,
                    headers,
                    body.clone(),
                    matched,
                );
                let mut response = match self.process(&mut ctx).await {
                    Ok(upstream) => self.success_response(&ctx, upstream),
                    Err(err) => GatewayResponse::failure(err),
                };
                response.headers.extend(ctx.response_headers.clone());
                let user_id = ctx.principal.as_ref().map(|p| p.user_id.clone());
                (response, ctx.route.service_name.clone(), user_id)
            }
            Err(err) => {
                let mut response = GatewayResponse::failure(err);
                if self.config.cors.enabled {
                    response.headers.extend(cors_headers(&self.config.cors, &headers));
                }
                (response, String::new(), None)
            }
        };

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers.insert(X_REQUEST_ID, value);
        }
        let elapsed = started.elapsed();
        response.duration_ms = elapsed.as_millis() as u64;

        self.record(&method, path, &service, &request_id, body.len(), user_id, &response);
        metrics::record_request(method.as_str(), &service, response.status.as_u16(), elapsed);
        response
    }

    async fn process(&self, ctx: &mut RequestContext) -> GatewayResult<UpstreamResponse> {
        let env = StepEnv {
            config: &self.config,
            resolver: self.resolver.as_ref(),
            limiter: &self.limiter,
            breakers: &self.breakers,
        };

        if let Err(err) = self.pipeline.run(ctx, &env) {
            self.release_probe(ctx);
            return Err(err);
        }

        let result = self.forwarder.forward(ctx).await;
        if let Err(GatewayError::ServiceUnavailable { .. }) = &result {
            self.release_probe(ctx);
        }
        result
    }

    fn release_probe(&self, ctx: &RequestContext) {
        if ctx.breaker_probe {
            self.breakers.release_probe(&ctx.route.service_name);
        }
    }

    fn success_response(&self, ctx: &RequestContext, upstream: UpstreamResponse) -> GatewayResponse {
        let mut headers = upstream.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::CONTENT_LENGTH);
        ctx.route.response_transform.apply(&mut headers);

        if let Some(ttl) = ctx.route.cache_ttl {
            if upstream.status.is_success() && !headers.contains_key(header::CACHE_CONTROL) {
                if let Ok(value) = HeaderValue::from_str(&format!("max-age={}", ttl.as_secs())) {
                    headers.insert(header::CACHE_CONTROL, value);
                }
            }
        }

        let body = ResponseBody::from_upstream(&headers, &upstream.body);
        GatewayResponse {
            status: upstream.status,
            headers,
            body,
            duration_ms: 0,
            error: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        method: &Method,
        path: &str,
        service: &str,
        request_id: &str,
        request_bytes: usize,
        user_id: Option<String>,
        response: &GatewayResponse,
    ) {
        if self.config.logging.log_requests {
            match &response.error {
                Some(err) => tracing::warn!(
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    service = %service,
                    status = response.status.as_u16(),
                    duration_ms = response.duration_ms,
                    error_kind = err.kind(),
                    error = %err,
                    "Request failed"
                ),
                None => tracing::info!(
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    service = %service,
                    status = response.status.as_u16(),
                    duration_ms = response.duration_ms,
                    "Request completed"
                ),
            }
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        self.aggregator.record(RequestMetricRecord {
            timestamp,
            method: method.to_string(),
            path: path.to_string(),
            service_name: service.to_string(),
            status_code: response.status.as_u16(),
            duration_ms: response.duration_ms,
            request_bytes,
            response_bytes: response.body.len(),
            error_message: response.error.as_ref().map(ToString::to_string),
            user_id,
        });
    }

    /// Rollup over the retained request log.
    pub fn get_metrics(&self, range: Option<TimeRange>) -> MetricsSummary {
        self.aggregator.summarize(range)
    }

    /// Retained request records, oldest first.
    pub fn recent_requests(&self) -> Vec<RequestMetricRecord> {
        self.aggregator.records()
    }

    pub fn get_service_status(&self) -> Vec<ServiceStatus> {
        self.registry
            .snapshot()
            .into_iter()
            .map(|(service, instances)| ServiceStatus {
                healthy_instances: instances.iter().filter(|i| i.is_selectable()).count(),
                total_instances: instances.len(),
                service,
                instances,
            })
            .collect()
    }

    pub fn get_circuit_breaker_status(&self) -> Vec<CircuitBreakerSnapshot> {
        self.breakers.snapshot()
    }
}
