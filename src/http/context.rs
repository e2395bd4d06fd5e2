//! Per-request state carried through the pipeline and forwarder.

use axum::body::Bytes;
use axum::http::{HeaderMap, Method};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::routing::{Route, RouteMatch};
use crate::security::Principal;

/// Mutable context owned by one request.
#[derive(Debug)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    /// Path without the query string.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub route: Arc<Route>,
    pub path_params: HashMap<String, String>,
    pub started_at: Instant,
    /// Set by the authentication step.
    pub principal: Option<Principal>,
    /// Scratch space for middleware.
    pub metadata: HashMap<String, Value>,
    /// Headers merged into whatever response is finally returned.
    pub response_headers: HeaderMap,
    /// This request holds a half-open probe slot.
    pub breaker_probe: bool,
}

impl RequestContext {
    pub fn new(
        request_id: String,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: HeaderMap,
        body: Bytes,
        matched: RouteMatch,
    ) -> Self {
        Self {
            request_id,
            method,
            path: path.to_string(),
            query: query.map(str::to_string),
            headers,
            body,
            route: matched.route,
            path_params: matched.params,
            started_at: Instant::now(),
            principal: None,
            metadata: HashMap::new(),
            response_headers: HeaderMap::new(),
            breaker_probe: false,
        }
    }

    /// Client address from `X-Forwarded-For` (first hop), then `X-Real-IP`.
    pub fn client_ip(&self) -> String {
        client_ip(&self.headers)
    }

    /// Path and query as sent upstream.
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(q) if !q.is_empty() => format!("{}?{}", self.path, q),
            _ => self.path.clone(),
        }
    }
}

pub fn client_ip(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or("unknown")
        .to_string()
}
