//! CORS response headers.
//!
//! The pipeline's first step computes these from the request `Origin` and
//! stores them on the request context; they are merged into whatever response
//! the gateway finally produces, error responses included.

use axum::http::header::{self, HeaderValue};
use axum::http::HeaderMap;

use crate::config::CorsConfig;
use crate::security::headers::insert_str;

/// Compute CORS headers for a request carrying `request_headers`.
pub fn cors_headers(config: &CorsConfig, request_headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    let origin = request_headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());

    let wildcard = config.allowed_origins.iter().any(|o| o == "*");
    let allow_origin = match origin {
        // Credentialed responses may not use the wildcard.
        Some(origin) if wildcard && config.allow_credentials => Some(origin),
        _ if wildcard => Some("*"),
        Some(origin) if config.allowed_origins.iter().any(|o| o == origin) => Some(origin),
        _ => None,
    };

    let Some(allow_origin) = allow_origin else {
        return out;
    };

    insert_str(&mut out, "access-control-allow-origin", allow_origin);
    if allow_origin != "*" {
        out.insert(header::VARY, HeaderValue::from_static("Origin"));
    }
    if !config.allowed_methods.is_empty() {
        insert_str(&mut out, "access-control-allow-methods", &config.allowed_methods.join(", "));
    }
    if !config.allowed_headers.is_empty() {
        insert_str(&mut out, "access-control-allow-headers", &config.allowed_headers.join(", "));
    }
    if !config.exposed_headers.is_empty() {
        insert_str(&mut out, "access-control-expose-headers", &config.exposed_headers.join(", "));
    }
    if config.allow_credentials {
        out.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
    }
    if let Some(max_age) = config.max_age_secs {
        insert_str(&mut out, "access-control-max-age", &max_age.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_origin(origin: &'static str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::ORIGIN, HeaderValue::from_static(origin));
        h
    }

    #[test]
    fn wildcard_allows_any_origin() {
        let out = cors_headers(&CorsConfig::default(), &with_origin("https://app.example"));
        assert_eq!(out["access-control-allow-origin"], "*");
        assert!(out.contains_key("access-control-allow-methods"));
        assert!(!out.contains_key(header::VARY));
    }

    #[test]
    fn explicit_list_echoes_matching_origin_only() {
        let config = CorsConfig {
            allowed_origins: vec!["https://app.example".into()],
            ..CorsConfig::default()
        };
        let out = cors_headers(&config, &with_origin("https://app.example"));
        assert_eq!(out["access-control-allow-origin"], "https://app.example");
        assert_eq!(out[header::VARY], "Origin");

        let denied = cors_headers(&config, &with_origin("https://evil.example"));
        assert!(denied.is_empty());
    }

    #[test]
    fn credentials_never_pair_with_wildcard() {
        let config = CorsConfig {
            allow_credentials: true,
            ..CorsConfig::default()
        };
        let out = cors_headers(&config, &with_origin("https://app.example"));
        assert_eq!(out["access-control-allow-origin"], "https://app.example");
        assert_eq!(out["access-control-allow-credentials"], "true");
    }
}
