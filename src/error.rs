//! Gateway error taxonomy.
//!
//! Every failure on the request path is a [`GatewayError`]. Only
//! [`GatewayError::RouteNotFound`] changes the status code seen by the caller;
//! the rest collapse into one generic 500 response and are only
//! distinguishable through logs, metrics and [`GatewayResponse::error`].
//!
//! [`GatewayResponse::error`]: crate::http::response::GatewayResponse

use axum::http::StatusCode;
use thiserror::Error;

/// Errors raised while routing, filtering or forwarding a request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// No registered route matches the method and path.
    #[error("no route matches {method} {path}")]
    RouteNotFound { method: String, path: String },

    /// The route requires authentication but no credential was supplied.
    #[error("authentication required")]
    AuthRequired,

    /// The credential could not be decoded or resolved to a principal.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// The principal lacks a scope the route requires.
    #[error("insufficient scope: missing {0}")]
    InsufficientScope(String),

    /// The principal holds none of the roles the route accepts.
    #[error("insufficient role: requires one of [{0}]")]
    InsufficientRole(String),

    /// The fixed window for this key is exhausted.
    #[error("rate limit exceeded for {key}")]
    RateLimited { key: String },

    /// The circuit breaker for the target service is open.
    #[error("circuit open for service {service}")]
    CircuitOpen { service: String },

    /// The service has no selectable instance.
    #[error("no healthy instance available for service {service}")]
    ServiceUnavailable { service: String },

    /// The upstream call exceeded its deadline.
    #[error("upstream {endpoint} timed out after {timeout_ms}ms")]
    UpstreamTimeout { endpoint: String, timeout_ms: u64 },

    /// The upstream call failed at the transport level.
    #[error("upstream {endpoint} failed: {reason}")]
    UpstreamError { endpoint: String, reason: String },
}

impl GatewayError {
    /// Stable, machine-friendly name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::RouteNotFound { .. } => "route_not_found",
            GatewayError::AuthRequired => "auth_required",
            GatewayError::InvalidToken(_) => "invalid_token",
            GatewayError::InsufficientScope(_) => "insufficient_scope",
            GatewayError::InsufficientRole(_) => "insufficient_role",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::CircuitOpen { .. } => "circuit_open",
            GatewayError::ServiceUnavailable { .. } => "service_unavailable",
            GatewayError::UpstreamTimeout { .. } => "upstream_timeout",
            GatewayError::UpstreamError { .. } => "upstream_error",
        }
    }

    /// Status code returned to the caller.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Result type for request-path operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_route_not_found_escapes_the_500_collapse() {
        let not_found = GatewayError::RouteNotFound {
            method: "GET".into(),
            path: "/missing".into(),
        };
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let others = [
            GatewayError::AuthRequired,
            GatewayError::InvalidToken("bad".into()),
            GatewayError::RateLimited { key: "ip:1.2.3.4".into() },
            GatewayError::CircuitOpen { service: "x".into() },
            GatewayError::UpstreamTimeout { endpoint: "http://a".into(), timeout_ms: 10 },
        ];
        for err in others {
            assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR, "{}", err.kind());
        }
    }

    #[test]
    fn messages_carry_context() {
        let err = GatewayError::CircuitOpen { service: "search".into() };
        assert_eq!(err.to_string(), "circuit open for service search");
        assert_eq!(err.kind(), "circuit_open");
    }
}
