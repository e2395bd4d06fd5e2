//! Upstream forwarding.
//!
//! # Responsibilities
//! - Pick an endpoint through the service registry
//! - Build upstream headers (hop-by-hop stripped, identity added, route transform)
//! - Enforce the per-attempt deadline
//! - Report every attempt's outcome to the circuit breaker
//! - Retry idempotent requests with backoff while the breaker stays closed
//!
//! # Design Decisions
//! - Transport sits behind [`UpstreamClient`] so tests can count calls
//! - Response bodies are buffered; the gateway may parse JSON
//! - `success = status < 500`; 4xx does not trip the breaker

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::TimeoutConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::http::context::RequestContext;
use crate::load_balancer::{instance::join_path, ServiceRegistry};
use crate::resilience::{CircuitBreakers, CircuitState, RetryPolicy};
use crate::security::headers::upstream_headers;

/// A fully prepared upstream call.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A buffered upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Connection(String),

    #[error("response body not received within {0}ms")]
    ReadTimeout(u64),

    #[error("failed reading response body: {0}")]
    Body(String),
}

pub type UpstreamFuture<'a> =
    Pin<Box<dyn Future<Output = Result<UpstreamResponse, TransportError>> + Send + 'a>>;

/// Performs upstream HTTP calls.
pub trait UpstreamClient: Send + Sync {
    fn send(&self, request: UpstreamRequest) -> UpstreamFuture<'_>;
}

/// Default transport over the hyper-util legacy client.
pub struct HyperUpstream {
    client: Client<HttpConnector, Body>,
    read_timeout: Duration,
}

impl HyperUpstream {
    pub fn new(timeouts: &TimeoutConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeouts.connect()));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            read_timeout: timeouts.read(),
        }
    }
}

impl UpstreamClient for HyperUpstream {
    fn send(&self, request: UpstreamRequest) -> UpstreamFuture<'_> {
        Box::pin(async move {
            let mut builder = Request::builder()
                .method(request.method)
                .uri(&request.url);
            if let Some(headers) = builder.headers_mut() {
                *headers = request.headers;
            }
            let req = builder
                .body(Body::from(request.body))
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

            let response = self
                .client
                .request(req)
                .await
                .map_err(|e| TransportError::Connection(e.to_string()))?;
            let (parts, body) = response.into_parts();

            let body = tokio::time::timeout(
                self.read_timeout,
                axum::body::to_bytes(Body::new(body), usize::MAX),
            )
            .await
            .map_err(|_| TransportError::ReadTimeout(self.read_timeout.as_millis() as u64))?
            .map_err(|e| TransportError::Body(e.to_string()))?;

            Ok(UpstreamResponse {
                status: parts.status,
                headers: parts.headers,
                body,
            })
        })
    }
}

/// Sends matched requests to a healthy instance of the route's service.
pub struct Forwarder {
    registry: Arc<ServiceRegistry>,
    breakers: Arc<CircuitBreakers>,
    client: Arc<dyn UpstreamClient>,
    retry: RetryPolicy,
    total_timeout: Duration,
    forwarded_by: String,
}

impl Forwarder {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        breakers: Arc<CircuitBreakers>,
        client: Arc<dyn UpstreamClient>,
        retry: RetryPolicy,
        total_timeout: Duration,
        forwarded_by: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            breakers,
            client,
            retry,
            total_timeout,
            forwarded_by: forwarded_by.into(),
        }
    }

    /// Forward the request, returning the upstream response unchanged.
    ///
    /// 5xx responses are returned as `Ok` once retries are exhausted; only
    /// transport failures and deadlines become errors.
    pub async fn forward(&self, ctx: &RequestContext) -> GatewayResult<UpstreamResponse> {
        let route = &ctx.route;
        let service = route.service_name.as_str();
        let deadline = route.timeout.unwrap_or(self.total_timeout);
        let policy = match route.retry_attempts {
            Some(attempts) => self.retry.with_attempts(attempts),
            None => self.retry,
        };
        let max_attempts = policy.attempts_for(&ctx.method);

        let mut headers = upstream_headers(
            &ctx.headers,
            &self.forwarded_by,
            &ctx.request_id,
            ctx.principal.as_ref(),
        );
        route.request_transform.apply(&mut headers);
        let path = ctx.path_and_query();

        let mut attempt = 1;
        let mut probe = ctx.breaker_probe;
        loop {
            let selection = self.registry.select(service)?;
            let request = UpstreamRequest {
                method: ctx.method.clone(),
                url: join_path(&selection.endpoint, &path),
                headers: headers.clone(),
                body: ctx.body.clone(),
            };

            tracing::debug!(
                request_id = %ctx.request_id,
                service = %service,
                url = %request.url,
                attempt,
                "Forwarding request"
            );

            self.breakers.record_attempt(service);
            let endpoint = selection.endpoint.to_string();
            let outcome = match tokio::time::timeout(deadline, self.client.send(request)).await {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(TransportError::ReadTimeout(timeout_ms))) => {
                    Err(GatewayError::UpstreamTimeout { endpoint, timeout_ms })
                }
                Ok(Err(e)) => Err(GatewayError::UpstreamError {
                    endpoint,
                    reason: e.to_string(),
                }),
                Err(_) => Err(GatewayError::UpstreamTimeout {
                    endpoint,
                    timeout_ms: deadline.as_millis() as u64,
                }),
            };

            let success = matches!(&outcome, Ok(r) if !r.status.is_server_error());
            self.breakers.record_outcome(service, success, probe);
            probe = false;

            let retry = !success
                && attempt < max_attempts
                && self.breakers.state(service) == CircuitState::Closed;

            match &outcome {
                Ok(response) if !success => tracing::warn!(
                    request_id = %ctx.request_id,
                    service = %service,
                    status = %response.status,
                    attempt,
                    retry,
                    "Upstream returned server error"
                ),
                Err(e) => tracing::warn!(
                    request_id = %ctx.request_id,
                    service = %service,
                    error = %e,
                    attempt,
                    retry,
                    "Upstream call failed"
                ),
                Ok(_) => {}
            }

            if !retry {
                return outcome;
            }

            attempt += 1;
            tokio::time::sleep(policy.delay_before(attempt)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CircuitBreakerConfig, RetryConfig};
    use crate::load_balancer::ServiceInstance;
    use crate::routing::{Route, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use url::Url;

    /// Replays scripted outcomes and records every request.
    #[derive(Default)]
    struct Scripted {
        outcomes: Mutex<Vec<Result<u16, ()>>>,
        seen: Mutex<Vec<UpstreamRequest>>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<u16, ()>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                ..Self::default()
            }
        }
    }

    impl UpstreamClient for Scripted {
        fn send(&self, request: UpstreamRequest) -> UpstreamFuture<'_> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.seen.lock().unwrap().push(request);
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                let next = {
                    let mut outcomes = self.outcomes.lock().unwrap();
                    if outcomes.is_empty() { Ok(200) } else { outcomes.remove(0) }
                };
                match next {
                    Ok(status) => Ok(UpstreamResponse {
                        status: StatusCode::from_u16(status).unwrap(),
                        headers: HeaderMap::new(),
                        body: Bytes::from_static(b"ok"),
                    }),
                    Err(()) => Err(TransportError::Connection("connection refused".into())),
                }
            })
        }
    }

    struct Setup {
        forwarder: Forwarder,
        breakers: Arc<CircuitBreakers>,
        client: Arc<Scripted>,
    }

    fn setup(client: Scripted, attempts: u32, threshold: u32) -> Setup {
        let registry = Arc::new(ServiceRegistry::new());
        registry.register(ServiceInstance::new("svc", vec![Url::parse("http://10.0.0.1:8080/base").unwrap()]));
        let breakers = Arc::new(CircuitBreakers::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            ..CircuitBreakerConfig::default()
        }));
        let client = Arc::new(client);
        let retry = RetryPolicy::from_config(&RetryConfig {
            attempts,
            backoff_ms: 1,
            max_backoff_ms: 2,
        });
        let forwarder = Forwarder::new(
            registry,
            breakers.clone(),
            client.clone(),
            retry,
            Duration::from_millis(200),
            "api-gateway",
        );
        Setup { forwarder, breakers, client }
    }

    fn context(method: Method, route: Route, query: Option<&str>) -> RequestContext {
        let router = Router::new();
        let path = route.pattern.as_str().to_string();
        router.register(route);
        let matched = router.match_route(&method, &path).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("connection", "close".parse().unwrap());
        headers.insert("accept", "application/json".parse().unwrap());
        RequestContext::new("req-42".into(), method, &path, query, headers, Bytes::from_static(b"payload"), matched)
    }

    #[tokio::test]
    async fn builds_upstream_request() {
        let s = setup(Scripted::new(vec![Ok(201)]), 1, 5);
        let route = Route::new(Method::POST, "/orders", "svc")
            .unwrap()
            .with_request_transform(crate::security::headers::HeaderTransform::new().set("x-tenant", "acme"));
        let ctx = context(Method::POST, route, Some("page=2"));

        let response = s.forwarder.forward(&ctx).await.unwrap();
        assert_eq!(response.status, StatusCode::CREATED);

        let seen = s.client.seen.lock().unwrap();
        let sent = &seen[0];
        assert_eq!(sent.url, "http://10.0.0.1:8080/base/orders?page=2");
        assert_eq!(sent.body, Bytes::from_static(b"payload"));
        assert!(sent.headers.get("connection").is_none());
        assert_eq!(sent.headers["x-request-id"], "req-42");
        assert_eq!(sent.headers["x-forwarded-by"], "api-gateway");
        assert_eq!(sent.headers["x-tenant"], "acme");
        assert_eq!(sent.headers["accept"], "application/json");
    }

    #[tokio::test]
    async fn server_errors_count_as_failures_but_pass_through() {
        let s = setup(Scripted::new(vec![Ok(503)]), 1, 5);
        let ctx = context(Method::GET, Route::new(Method::GET, "/x", "svc").unwrap(), None);

        let response = s.forwarder.forward(&ctx).await.unwrap();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        let snapshot = s.breakers.snapshot();
        assert_eq!(snapshot[0].consecutive_failures, 1);
        assert_eq!(snapshot[0].total_requests, 1);
    }

    #[tokio::test]
    async fn idempotent_requests_retry_until_success() {
        let s = setup(Scripted::new(vec![Err(()), Ok(502), Ok(200)]), 3, 5);
        let ctx = context(Method::GET, Route::new(Method::GET, "/x", "svc").unwrap(), None);

        let response = s.forwarder.forward(&ctx).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(s.client.calls.load(Ordering::SeqCst), 3);
        assert_eq!(s.breakers.snapshot()[0].consecutive_failures, 0);
    }

    #[tokio::test]
    async fn post_is_never_retried() {
        let s = setup(Scripted::new(vec![Err(()), Ok(200)]), 3, 5);
        let ctx = context(Method::POST, Route::new(Method::POST, "/x", "svc").unwrap(), None);

        let err = s.forwarder.forward(&ctx).await.unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamError { .. }));
        assert_eq!(s.client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_stop_once_the_breaker_opens() {
        let s = setup(Scripted::new(vec![Err(()), Err(()), Err(())]), 3, 2);
        let ctx = context(Method::GET, Route::new(Method::GET, "/x", "svc").unwrap(), None);

        assert!(s.forwarder.forward(&ctx).await.is_err());
        assert_eq!(s.client.calls.load(Ordering::SeqCst), 2);
        assert_eq!(s.breakers.state("svc"), CircuitState::Open);
    }

    #[tokio::test]
    async fn deadline_expiry_is_a_timeout() {
        let client = Scripted {
            delay: Some(Duration::from_millis(500)),
            ..Scripted::default()
        };
        let s = setup(client, 1, 5);
        let route = Route::new(Method::GET, "/slow", "svc")
            .unwrap()
            .with_timeout(Duration::from_millis(20));
        let ctx = context(Method::GET, route, None);

        let err = s.forwarder.forward(&ctx).await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::UpstreamTimeout {
                endpoint: "http://10.0.0.1:8080/base".into(),
                timeout_ms: 20
            }
        );
        assert_eq!(s.breakers.snapshot()[0].consecutive_failures, 1);
    }
}
