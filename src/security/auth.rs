//! Credential extraction and principal resolution.
//!
//! The gateway never verifies token signatures itself. Resolution goes through
//! the [`PrincipalResolver`] trait; [`DecodeOnlyResolver`] is the default and
//! only decodes the JWT payload (honouring `exp` when present) or looks up a
//! configured static API key. Deployments needing real verification plug in
//! their own resolver.

use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{AuthConfig, AuthMode};
use crate::error::{GatewayError, GatewayResult};

/// The authenticated caller attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub scopes: Vec<String>,
}

/// Authentication policy of a route.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthRequirement {
    pub required: bool,
    /// Every listed scope must be granted.
    pub scopes: Vec<String>,
    /// At least one listed role must be held.
    pub roles: Vec<String>,
}

impl AuthRequirement {
    pub fn required() -> Self {
        Self {
            required: true,
            ..Self::default()
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }
}

/// A raw credential lifted from request headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential<'a> {
    Bearer(&'a str),
    ApiKey(&'a str),
}

/// Turns a credential into a principal.
pub trait PrincipalResolver: Send + Sync {
    fn resolve(&self, credential: Credential<'_>) -> GatewayResult<Principal>;
}

/// Find the credential the configured mode accepts.
pub fn extract_credential<'a>(
    headers: &'a HeaderMap,
    mode: AuthMode,
    api_key_header: &str,
) -> Option<Credential<'a>> {
    let bearer = || {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| {
                v.strip_prefix("Bearer ")
                    .or_else(|| v.strip_prefix("bearer "))
            })
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(Credential::Bearer)
    };
    let api_key = || {
        headers
            .get(api_key_header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(Credential::ApiKey)
    };

    match mode {
        AuthMode::Bearer => bearer(),
        AuthMode::ApiKey => api_key(),
        AuthMode::Either => bearer().or_else(api_key),
    }
}

/// Check a resolved principal against a route's scopes and roles.
pub fn authorize(principal: &Principal, requirement: &AuthRequirement) -> GatewayResult<()> {
    if let Some(missing) = requirement
        .scopes
        .iter()
        .find(|s| !principal.scopes.contains(s))
    {
        return Err(GatewayError::InsufficientScope(missing.clone()));
    }

    if !requirement.roles.is_empty()
        && !requirement.roles.iter().any(|r| principal.roles.contains(r))
    {
        return Err(GatewayError::InsufficientRole(requirement.roles.join(", ")));
    }

    Ok(())
}

/// Decodes JWT payloads without verifying signatures and resolves static API keys.
#[derive(Debug, Default)]
pub struct DecodeOnlyResolver {
    api_keys: HashMap<String, Principal>,
}

impl DecodeOnlyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        let api_keys = config
            .api_keys
            .iter()
            .map(|k| {
                (
                    k.key.clone(),
                    Principal {
                        user_id: k.user_id.clone(),
                        email: k.email.clone(),
                        roles: k.roles.clone(),
                        scopes: k.scopes.clone(),
                    },
                )
            })
            .collect();
        Self { api_keys }
    }

    pub fn with_api_key(mut self, key: impl Into<String>, principal: Principal) -> Self {
        self.api_keys.insert(key.into(), principal);
        self
    }

    fn decode_jwt(&self, token: &str) -> GatewayResult<Principal> {
        let mut parts = token.split('.');
        let payload = match (parts.next(), parts.next()) {
            (Some(_header), Some(payload)) if !payload.is_empty() => payload,
            _ => return Err(GatewayError::InvalidToken("malformed token".into())),
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| GatewayError::InvalidToken(format!("payload is not base64url: {}", e)))?;
        let claims: Value = serde_json::from_slice(&bytes)
            .map_err(|e| GatewayError::InvalidToken(format!("payload is not JSON: {}", e)))?;

        if let Some(exp) = claims.get("exp").and_then(Value::as_u64) {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            if exp <= now {
                return Err(GatewayError::InvalidToken("token expired".into()));
            }
        }

        let user_id = match claims.get("sub") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(GatewayError::InvalidToken("missing sub claim".into())),
        };

        Ok(Principal {
            user_id,
            email: claims.get("email").and_then(Value::as_str).map(str::to_string),
            roles: string_list(claims.get("roles").or_else(|| claims.get("role"))),
            scopes: string_list(
                claims
                    .get("scope")
                    .or_else(|| claims.get("scopes"))
                    .or_else(|| claims.get("scp")),
            ),
        })
    }
}

/// Claims may carry lists as arrays or as space-separated strings.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

impl PrincipalResolver for DecodeOnlyResolver {
    fn resolve(&self, credential: Credential<'_>) -> GatewayResult<Principal> {
        match credential {
            Credential::Bearer(token) => self.decode_jwt(token),
            Credential::ApiKey(key) => self
                .api_keys
                .get(key)
                .cloned()
                .ok_or_else(|| GatewayError::InvalidToken("unknown API key".into())),
        }
    }
}

#[cfg(test)]
pub(crate) fn encode_test_jwt(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.sig", header, payload)
}
