//! Route path pattern matching.
//!
//! # Responsibilities
//! - Compile route paths with `{name}` and `*` markers into anchored regexes
//! - Match request paths and capture named parameters
//!
//! # Design Decisions
//! - `{name}` matches exactly one path segment
//! - `*` matches any run of characters, including `/`
//! - Every other character is literal
//! - Patterns without markers never compile a regex; they are exact keys

use regex::Regex;
use std::collections::HashMap;

use crate::config::ConfigError;

/// A compiled route path.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    regex: Option<Regex>,
    params: Vec<String>,
}

impl PathPattern {
    pub fn compile(raw: &str) -> Result<Self, ConfigError> {
        if !is_template(raw) {
            return Ok(Self {
                raw: raw.to_string(),
                regex: None,
                params: Vec::new(),
            });
        }

        let invalid = |reason: &str| ConfigError::InvalidRoute {
            pattern: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut expr = String::from("^");
        let mut params = Vec::new();
        let mut rest = raw;
        while let Some(idx) = rest.find(['{', '*']) {
            expr.push_str(&regex::escape(&rest[..idx]));
            if rest[idx..].starts_with('*') {
                expr.push_str(".*");
                rest = &rest[idx + 1..];
                continue;
            }

            let close = rest[idx..]
                .find('}')
                .ok_or_else(|| invalid("unclosed '{'"))?;
            let name = &rest[idx + 1..idx + close];
            if name.is_empty() || name.contains(['{', '/']) {
                return Err(invalid("parameter names must be non-empty single segments"));
            }
            params.push(name.to_string());
            expr.push_str("([^/]+)");
            rest = &rest[idx + close + 1..];
        }
        expr.push_str(&regex::escape(rest));
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| invalid(&e.to_string()))?;
        Ok(Self {
            raw: raw.to_string(),
            regex: Some(regex),
            params,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_exact(&self) -> bool {
        self.regex.is_none()
    }

    /// Match a request path, returning captured parameters on success.
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let Some(regex) = &self.regex else {
            return (self.raw == path).then(HashMap::new);
        };

        let caps = regex.captures(path)?;
        Some(
            self.params
                .iter()
                .zip(caps.iter().skip(1))
                .filter_map(|(name, m)| m.map(|m| (name.clone(), m.as_str().to_string())))
                .collect(),
        )
    }
}

/// True if the path contains `{name}` or `*` markers.
pub fn is_template(path: &str) -> bool {
    path.contains(['{', '*'])
}
