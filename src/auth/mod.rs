//! # Credential Resolver
//!
//! Produces bearer tokens for the secret store data plane.
//!
//! Resolution order (see [`DefaultCredential`]):
//! 1. explicit service principal (client id + secret + tenant)
//! 2. ambient managed identity
//! 3. developer identity from the `az` CLI

mod chain;
mod client_secret;
mod developer_cli;
mod managed_identity;

pub use chain::DefaultCredential;
pub use client_secret::ClientSecretCredential;
pub use developer_cli::DeveloperCliCredential;
pub use managed_identity::ManagedIdentityCredential;

use crate::error::AuthError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use zeroize::Zeroizing;

/// Bearer token with its expiry
#[derive(Clone)]
pub struct AccessToken {
    pub token: Zeroizing<String>,
    pub expires_on: DateTime<Utc>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("expires_on", &self.expires_on)
            .finish_non_exhaustive()
    }
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: Zeroizing::new(token.into()),
            expires_on,
        }
    }

    /// True when the token expires within `margin` from now
    #[must_use]
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expires_on - margin <= Utc::now()
    }
}

/// Source of bearer tokens
#[async_trait]
pub trait TokenCredential: Send + Sync + std::fmt::Debug {
    /// Short label used in diagnostics
    fn source_name(&self) -> &'static str;

    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken, AuthError>;
}

/// Fixed token, for local emulators and tests
#[derive(Debug, Clone)]
pub struct StaticTokenCredential {
    token: AccessToken,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(token, Utc::now() + Duration::hours(1)),
        }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    fn source_name(&self) -> &'static str {
        "static"
    }

    async fn get_token(&self, _scopes: &[&str]) -> Result<AccessToken, AuthError> {
        Ok(self.token.clone())
    }
}

/// Convert an OAuth2 v2 scope into a v1 resource (`.../.default` -> `...`)
pub(crate) fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

/// Token payload shared by the Entra ID and managed identity endpoints
///
/// The identity endpoints encode `expires_in`/`expires_on` either as numbers
/// or as numeric strings.
#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<serde_json::Value>,
    #[serde(default)]
    pub expires_on: Option<serde_json::Value>,
}

impl TokenResponse {
    pub(crate) fn into_access_token(self) -> AccessToken {
        let expires_on = self
            .expires_on
            .as_ref()
            .and_then(json_seconds)
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .or_else(|| {
                self.expires_in
                    .as_ref()
                    .and_then(json_seconds)
                    .map(|secs| Utc::now() + Duration::seconds(secs))
            })
            .unwrap_or_else(|| Utc::now() + Duration::hours(1));
        AccessToken::new(self.access_token, expires_on)
    }
}

fn json_seconds(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
