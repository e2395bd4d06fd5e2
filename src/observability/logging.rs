//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Redact sensitive headers before they are logged
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - `RUST_LOG` overrides the configured level

use axum::http::HeaderMap;
use std::collections::BTreeMap;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &LoggingConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", config.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    }
}

/// Header map rendered for logs, with redacted values masked.
///
/// Repeated headers are joined with `", "`.
pub fn redact_headers(headers: &HeaderMap, redact: &[String]) -> BTreeMap<String, String> {
    headers
        .keys()
        .map(|name| {
            let name = name.as_str();
            let shown = if redact.iter().any(|r| r.eq_ignore_ascii_case(name)) {
                "[REDACTED]".to_string()
            } else {
                headers
                    .get_all(name)
                    .iter()
                    .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            (name.to_string(), shown)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn masks_configured_headers_case_insensitively() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer secret"));
        headers.insert("x-api-key", HeaderValue::from_static("k"));
        headers.insert("accept", HeaderValue::from_static("*/*"));

        let shown = redact_headers(&headers, &["Authorization".into(), "X-API-KEY".into()]);
        assert_eq!(shown["authorization"], "[REDACTED]");
        assert_eq!(shown["x-api-key"], "[REDACTED]");
        assert_eq!(shown["accept"], "*/*");
    }

    #[test]
    fn repeated_headers_keep_every_value() {
        let mut headers = HeaderMap::new();
        headers.append("accept", HeaderValue::from_static("text/html"));
        headers.append("accept", HeaderValue::from_static("application/json"));
        headers.append("cookie", HeaderValue::from_static("a=1"));
        headers.append("cookie", HeaderValue::from_static("b=2"));

        let shown = redact_headers(&headers, &["cookie".into()]);
        assert_eq!(shown.len(), 2);
        assert_eq!(shown["accept"], "text/html, application/json");
        assert_eq!(shown["cookie"], "[REDACTED]");
    }
}
