//! Gateway responses.
//!
//! # Responsibilities
//! - Interpret upstream bodies (JSON only when declared, otherwise text)
//! - Build the fixed failure bodies (404 and the generic 500)
//!
//! # Design Decisions
//! - Failure kinds never leak into the body; they ride on `error`
//! - Undecodable JSON is passed through as text

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::GatewayError;

/// A response body as the gateway understands it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Empty,
    Json(Value),
    Text(String),
    /// Non-UTF-8 payloads, passed through untouched.
    Binary(Vec<u8>),
}

impl ResponseBody {
    /// Decode an upstream body according to its declared content type.
    pub fn from_upstream(headers: &HeaderMap, body: &Bytes) -> Self {
        if body.is_empty() {
            return ResponseBody::Empty;
        }

        let declared_json = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(is_json_content_type)
            .unwrap_or(false);
        if declared_json {
            if let Ok(value) = serde_json::from_slice(body) {
                return ResponseBody::Json(value);
            }
        }

        match std::str::from_utf8(body) {
            Ok(text) => ResponseBody::Text(text.to_string()),
            Err(_) => ResponseBody::Binary(body.to_vec()),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        match self {
            ResponseBody::Empty => Bytes::new(),
            ResponseBody::Json(value) => Bytes::from(value.to_string()),
            ResponseBody::Text(text) => Bytes::from(text.clone()),
            ResponseBody::Binary(bytes) => Bytes::from(bytes.clone()),
        }
    }

    /// Encoded size in bytes.
    pub fn len(&self) -> usize {
        match self {
            ResponseBody::Empty => 0,
            ResponseBody::Json(value) => value.to_string().len(),
            ResponseBody::Text(text) => text.len(),
            ResponseBody::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// `application/json` and any `+json` structured suffix.
fn is_json_content_type(value: &str) -> bool {
    let mime = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || mime.ends_with("+json")
}

/// The result of `Gateway::handle`.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
    pub duration_ms: u64,
    /// The real failure behind a 404 or 500, if any.
    pub error: Option<GatewayError>,
}

impl GatewayResponse {
    /// Response for a failed request: 404 for unknown routes, otherwise the fixed 500.
    pub fn failure(error: GatewayError) -> Self {
        let status = error.status_code();
        let body = if status == StatusCode::NOT_FOUND {
            json!({
                "error": "Not Found",
                "message": "No route matches the requested method and path",
            })
        } else {
            json!({
                "error": "Internal Server Error",
                "message": "The gateway could not complete the request",
            })
        };

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            status,
            headers,
            body: ResponseBody::Json(body),
            duration_ms: 0,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(content_type: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        h
    }

    #[test]
    fn json_only_when_declared() {
        let body = Bytes::from_static(br#"{"hits":3}"#);
        assert_eq!(
            ResponseBody::from_upstream(&headers("application/json; charset=utf-8"), &body),
            ResponseBody::Json(json!({"hits": 3}))
        );
        assert_eq!(
            ResponseBody::from_upstream(&headers("application/problem+json"), &body),
            ResponseBody::Json(json!({"hits": 3}))
        );
        assert_eq!(
            ResponseBody::from_upstream(&headers("text/plain"), &body),
            ResponseBody::Text(r#"{"hits":3}"#.into())
        );
    }

    #[test]
    fn undecodable_json_passes_through_as_text() {
        let body = Bytes::from_static(b"{not json");
        assert_eq!(
            ResponseBody::from_upstream(&headers("application/json"), &body),
            ResponseBody::Text("{not json".into())
        );
        assert_eq!(ResponseBody::from_upstream(&HeaderMap::new(), &Bytes::new()), ResponseBody::Empty);
        assert_eq!(
            ResponseBody::from_upstream(&HeaderMap::new(), &Bytes::from_static(&[0xff, 0xfe])),
            ResponseBody::Binary(vec![0xff, 0xfe])
        );
    }

    #[test]
    fn failures_use_fixed_bodies() {
        let rate_limited = GatewayResponse::failure(GatewayError::RateLimited { key: "ip:1".into() });
        let circuit_open = GatewayResponse::failure(GatewayError::CircuitOpen { service: "x".into() });
        assert_eq!(rate_limited.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(rate_limited.body, circuit_open.body);
        assert!(!rate_limited.body.to_bytes().is_empty());
        assert_eq!(rate_limited.error.as_ref().map(GatewayError::kind), Some("rate_limited"));

        let missing = GatewayResponse::failure(GatewayError::RouteNotFound {
            method: "GET".into(),
            path: "/nope".into(),
        });
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
    }
}
