//! Header manipulation for upstream calls.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers (case-insensitive, `HeaderMap` names are lowercase)
//! - Add `X-Forwarded-By`, `X-Request-ID` and caller identity headers
//! - Apply per-route header transforms
//!
//! `host` and `content-length` are dropped as well: the upstream client derives
//! both from the target URL and the buffered body.

use axum::http::header::{HeaderName, HeaderValue};
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::security::auth::Principal;

pub const X_FORWARDED_BY: &str = "x-forwarded-by";
pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_USER_ID: &str = "x-user-id";
pub const X_USER_EMAIL: &str = "x-user-email";
pub const X_USER_ROLES: &str = "x-user-roles";

const IDENTITY_HEADERS: [&str; 3] = [X_USER_ID, X_USER_EMAIL, X_USER_ROLES];

/// Connection-scoped headers that must never be forwarded.
pub const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers in place.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Build the header set sent upstream from the inbound headers.
pub fn upstream_headers(
    inbound: &HeaderMap,
    forwarded_by: &str,
    request_id: &str,
    principal: Option<&Principal>,
) -> HeaderMap {
    let mut headers = inbound.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove("host");
    headers.remove("content-length");

    insert_str(&mut headers, X_FORWARDED_BY, forwarded_by);
    insert_str(&mut headers, X_REQUEST_ID, request_id);

    // Identity headers only ever come from the resolved principal.
    for name in IDENTITY_HEADERS {
        headers.remove(name);
    }

    if let Some(principal) = principal {
        insert_str(&mut headers, X_USER_ID, &principal.user_id);
        if let Some(email) = &principal.email {
            insert_str(&mut headers, X_USER_EMAIL, email);
        }
        insert_str(&mut headers, X_USER_ROLES, &principal.roles.join(","));
    }
    headers
}

/// Insert a header, silently skipping values that are not valid header text.
pub fn insert_str(headers: &mut HeaderMap, name: &str, value: &str) {
    match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
        (Ok(name), Ok(value)) => {
            headers.insert(name, value);
        }
        _ => tracing::debug!(header = %name, "Skipping invalid header"),
    }
}

/// Header set/remove operations applied to a request or response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HeaderTransform {
    pub set: Vec<(String, String)>,
    pub remove: Vec<String>,
}

impl HeaderTransform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set.push((name.into(), value.into()));
        self
    }

    pub fn remove(mut self, name: impl Into<String>) -> Self {
        self.remove.push(name.into());
        self
    }

    /// Removals run before sets, so a transform can replace a header.
    pub fn apply(&self, headers: &mut HeaderMap) {
        for name in &self.remove {
            headers.remove(name.as_str());
        }
        for (name, value) in &self.set {
            insert_str(headers, name, value);
        }
    }
}
