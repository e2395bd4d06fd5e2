//! Middleware pipeline.
//!
//! # Responsibilities
//! - Hold the ordered list of request-processing steps
//! - Run them strictly in sequence against the request context
//! - Stop at the first failure
//!
//! # Default order
//! ```text
//! cors(1) → authentication(2) → rate-limit(3) → circuit-breaker(4) → logging(5) → metrics(6)
//! ```
//!
//! # Design Decisions
//! - Steps are a tagged enum; custom steps are trait objects
//! - Sorted once when a step is added, never per request
//! - Copy-on-write list so requests never wait on registration

use arc_swap::ArcSwap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::http::context::RequestContext;
use crate::observability::{logging, metrics};
use crate::resilience::{CircuitBreakers, Gate};
use crate::security::{
    auth::{authorize, extract_credential},
    cors::cors_headers,
    PrincipalResolver, RateDecision, RateLimit, RateLimiter,
};

pub const CORS: &str = "cors";
pub const AUTHENTICATION: &str = "authentication";
pub const RATE_LIMIT: &str = "rate-limit";
pub const CIRCUIT_BREAKER: &str = "circuit-breaker";
pub const LOGGING: &str = "logging";
pub const METRICS: &str = "metrics";

/// Metadata key under which the metrics step stores its start timestamp.
pub const METRICS_STARTED_AT: &str = "metrics.started_at_ms";

/// A user-supplied pipeline step.
pub trait Middleware: Send + Sync {
    /// Inspect or modify the context; an error aborts the request.
    fn handle(&self, ctx: &mut RequestContext) -> GatewayResult<()>;
}

#[derive(Clone)]
pub enum MiddlewareKind {
    Cors,
    Authentication,
    RateLimit,
    CircuitBreaker,
    Logging,
    Metrics,
    Custom(Arc<dyn Middleware>),
}

impl fmt::Debug for MiddlewareKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MiddlewareKind::Cors => f.write_str("Cors"),
            MiddlewareKind::Authentication => f.write_str("Authentication"),
            MiddlewareKind::RateLimit => f.write_str("RateLimit"),
            MiddlewareKind::CircuitBreaker => f.write_str("CircuitBreaker"),
            MiddlewareKind::Logging => f.write_str("Logging"),
            MiddlewareKind::Metrics => f.write_str("Metrics"),
            MiddlewareKind::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A named step with its position in the chain (lower runs first).
#[derive(Debug, Clone)]
pub struct MiddlewareStep {
    pub name: String,
    pub priority: i32,
    pub kind: MiddlewareKind,
}

impl MiddlewareStep {
    pub fn new(name: impl Into<String>, priority: i32, kind: MiddlewareKind) -> Self {
        Self {
            name: name.into(),
            priority,
            kind,
        }
    }

    pub fn custom(name: impl Into<String>, priority: i32, middleware: impl Middleware + 'static) -> Self {
        Self::new(name, priority, MiddlewareKind::Custom(Arc::new(middleware)))
    }

    pub fn default_steps() -> Vec<MiddlewareStep> {
        vec![
            Self::new(CORS, 1, MiddlewareKind::Cors),
            Self::new(AUTHENTICATION, 2, MiddlewareKind::Authentication),
            Self::new(RATE_LIMIT, 3, MiddlewareKind::RateLimit),
            Self::new(CIRCUIT_BREAKER, 4, MiddlewareKind::CircuitBreaker),
            Self::new(LOGGING, 5, MiddlewareKind::Logging),
            Self::new(METRICS, 6, MiddlewareKind::Metrics),
        ]
    }
}

/// Shared gateway state the built-in steps read and update.
pub struct StepEnv<'a> {
    pub config: &'a GatewayConfig,
    pub resolver: &'a dyn PrincipalResolver,
    pub limiter: &'a RateLimiter,
    pub breakers: &'a CircuitBreakers,
}

#[derive(Debug)]
pub struct Pipeline {
    steps: ArcSwap<Vec<MiddlewareStep>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::with_steps(MiddlewareStep::default_steps())
    }
}

impl Pipeline {
    /// A pipeline with no steps.
    pub fn empty() -> Self {
        Self::with_steps(Vec::new())
    }

    pub fn with_steps(mut steps: Vec<MiddlewareStep>) -> Self {
        steps.sort_by_key(|s| s.priority);
        Self {
            steps: ArcSwap::from_pointee(steps),
        }
    }

    /// Insert a step; equal priorities keep insertion order.
    pub fn add(&self, step: MiddlewareStep) {
        tracing::info!(name = %step.name, priority = step.priority, "Middleware added");
        self.steps.rcu(|steps| {
            let mut next = Vec::clone(steps);
            next.push(step.clone());
            next.sort_by_key(|s| s.priority);
            next
        });
    }

    /// Step names in execution order.
    pub fn names(&self) -> Vec<String> {
        self.steps.load().iter().map(|s| s.name.clone()).collect()
    }

    /// Run every step the route enables, in order, stopping at the first error.
    pub fn run(&self, ctx: &mut RequestContext, env: &StepEnv<'_>) -> GatewayResult<()> {
        let steps = self.steps.load();
        let route = ctx.route.clone();
        for step in steps.iter().filter(|s| route.runs_step(&s.name)) {
            if let Err(err) = run_step(&step.kind, ctx, env) {
                tracing::debug!(
                    request_id = %ctx.request_id,
                    step = %step.name,
                    error = %err,
                    "Pipeline aborted"
                );
                return Err(err);
            }
        }
        Ok(())
    }
}

fn run_step(kind: &MiddlewareKind, ctx: &mut RequestContext, env: &StepEnv<'_>) -> GatewayResult<()> {
    match kind {
        MiddlewareKind::Cors => {
            if env.config.cors.enabled {
                let headers = cors_headers(&env.config.cors, &ctx.headers);
                ctx.response_headers.extend(headers);
            }
            Ok(())
        }
        MiddlewareKind::Authentication => authenticate(ctx, env),
        MiddlewareKind::RateLimit => rate_limit(ctx, env),
        MiddlewareKind::CircuitBreaker => {
            let service = &ctx.route.service_name;
            match env.breakers.gate(service) {
                Gate::Pass { probe } => {
                    ctx.breaker_probe = probe;
                    Ok(())
                }
                Gate::Block => {
                    metrics::record_circuit_open(service);
                    Err(GatewayError::CircuitOpen {
                        service: service.clone(),
                    })
                }
            }
        }
        MiddlewareKind::Logging => {
            let settings = &env.config.logging;
            if settings.log_requests {
                let headers = settings
                    .log_headers
                    .then(|| logging::redact_headers(&ctx.headers, &settings.redact_headers));
                tracing::info!(
                    request_id = %ctx.request_id,
                    method = %ctx.method,
                    path = %ctx.path,
                    service = %ctx.route.service_name,
                    client_ip = %ctx.client_ip(),
                    user_id = ctx.principal.as_ref().map(|p| p.user_id.as_str()),
                    headers = ?headers,
                    "Request accepted"
                );
            }
            Ok(())
        }
        MiddlewareKind::Metrics => {
            let now_ms = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default();
            ctx.metadata
                .insert(METRICS_STARTED_AT.to_string(), Value::from(now_ms));
            Ok(())
        }
        MiddlewareKind::Custom(middleware) => middleware.handle(ctx),
    }
}

fn authenticate(ctx: &mut RequestContext, env: &StepEnv<'_>) -> GatewayResult<()> {
    if !ctx.route.auth.required {
        return Ok(());
    }

    let auth = &env.config.auth;
    let credential = extract_credential(&ctx.headers, auth.mode, &auth.api_key_header)
        .ok_or(GatewayError::AuthRequired)?;
    let principal = env.resolver.resolve(credential)?;
    authorize(&principal, &ctx.route.auth)?;

    tracing::debug!(request_id = %ctx.request_id, user_id = %principal.user_id, "Authenticated");
    ctx.principal = Some(principal);
    Ok(())
}

fn rate_limit(ctx: &mut RequestContext, env: &StepEnv<'_>) -> GatewayResult<()> {
    let global = &env.config.rate_limit;
    let limit = match ctx.route.rate_limit {
        Some(limit) => limit,
        None if global.enabled => RateLimit::new(global.requests, global.window_ms),
        None => return Ok(()),
    };

    let (kind, key) = match &ctx.principal {
        Some(principal) => ("user", format!("user:{}", principal.user_id)),
        None => ("ip", format!("ip:{}", ctx.client_ip())),
    };

    match env.limiter.check_and_consume(&key, limit) {
        RateDecision::Allowed => Ok(()),
        RateDecision::Rejected => {
            tracing::warn!(request_id = %ctx.request_id, key = %key, "Rate limit exceeded");
            metrics::record_rate_limited(kind);
            Err(GatewayError::RateLimited { key })
        }
    }
}
