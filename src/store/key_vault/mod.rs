//! # Azure Key Vault REST Client
//!
//! Talks to the Key Vault secrets data plane over plain REST.
//!
//! Every request carries a bearer token from the configured [`TokenCredential`]
//! and the configured `api-version`. Responses are mapped onto the neutral
//! [`StoreError`] so nothing above this module depends on the HTTP shape.

mod operations;
mod requests;
mod responses;

use crate::auth::TokenCredential;
use crate::config::ProviderConfig;
use crate::error::{StoreError, StoreErrorKind};
use crate::observability::metrics;
use reqwest::Method;
use responses::KeyVaultErrorResponse;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, Span};

/// Key Vault client bound to one vault
#[derive(Debug, Clone)]
pub struct KeyVaultClient {
    http: reqwest::Client,
    store_name: String,
    vault_url: String,
    api_version: String,
    scope: String,
    credential: Arc<dyn TokenCredential>,
}

impl KeyVaultClient {
    /// Create a client for `store_name`
    ///
    /// The endpoint is `https://{store}.{suffix}` unless the configuration
    /// overrides it or `store_name` already is a URL.
    pub fn new(
        store_name: &str,
        credential: Arc<dyn TokenCredential>,
        config: &ProviderConfig,
    ) -> Result<Self, StoreError> {
        let http = build_http_client(config)?;
        Ok(Self::with_http_client(http, store_name, credential, config))
    }

    /// Create a client that shares an existing connection pool
    pub fn with_http_client(
        http: reqwest::Client,
        store_name: &str,
        credential: Arc<dyn TokenCredential>,
        config: &ProviderConfig,
    ) -> Self {
        let vault_url = config.vault_url(store_name);
        debug!(vault.name = store_name, vault.url = %vault_url, "Created Key Vault client");
        Self {
            http,
            store_name: store_name.to_string(),
            vault_url,
            api_version: config.key_vault_api_version.clone(),
            scope: config.key_vault_scope.clone(),
            credential,
        }
    }

    #[must_use]
    pub fn vault_url(&self) -> &str {
        &self.vault_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.vault_url, path.trim_start_matches('/'))
    }

    /// Send an authenticated request
    ///
    /// `target` is either a vault-relative path or an absolute `nextLink`,
    /// which already carries its own `api-version`.
    async fn make_request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        target: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response, StoreError> {
        let token = self.credential.get_token(&[self.scope.as_str()]).await?;

        let url = if target.starts_with("http://") || target.starts_with("https://") {
            target.to_string()
        } else {
            self.url(target)
        };

        let mut request = self
            .http
            .request(method, &url)
            .bearer_auth(token.token.as_str());
        if !url.contains("api-version=") {
            request = request.query(&[("api-version", self.api_version.as_str())]);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        request.send().await.map_err(StoreError::from)
    }
}

/// HTTP client with the configured per-request timeout
pub(crate) fn build_http_client(config: &ProviderConfig) -> Result<reqwest::Client, StoreError> {
    reqwest::Client::builder()
        .timeout(config.http_timeout())
        .build()
        .map_err(|err| {
            StoreError::new(
                StoreErrorKind::Other,
                format!("failed to build HTTP client: {err}"),
            )
        })
}

/// Turn a non-success response into a [`StoreError`]
///
/// Key Vault answers errors as `{"error": {"code", "message"}}`; anything else
/// falls back to the raw body.
async fn handle_error_response(response: reqwest::Response) -> StoreError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<KeyVaultErrorResponse>(&body) {
        Ok(parsed) if !parsed.error.code.is_empty() => {
            format!("{} ({status}): {}", parsed.error.code, parsed.error.message)
        }
        Ok(parsed) => format!("HTTP {status}: {}", parsed.error.message),
        Err(_) if body.is_empty() => format!("HTTP {status}"),
        Err(_) => format!("HTTP {status}: {body}"),
    };
    StoreError::from_status(status, message)
}

/// Read a JSON response body
async fn parse_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, StoreError> {
    response.json::<T>().await.map_err(|err| {
        StoreError::new(
            StoreErrorKind::Other,
            format!("failed to parse Key Vault response: {err}"),
        )
    })
}

/// Times one store call and records span fields and metrics when it ends
pub(crate) struct OperationTracker {
    operation: &'static str,
    start: Instant,
    span: Span,
}

impl OperationTracker {
    pub(crate) fn new(operation: &'static str, span: Span) -> Self {
        Self {
            operation,
            start: Instant::now(),
            span,
        }
    }

    pub(crate) fn record_success(&self) {
        let elapsed = self.start.elapsed();
        self.span
            .record("operation.duration_ms", u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
        self.span.record("operation.success", true);
        metrics::record_store_operation(self.operation, elapsed.as_secs_f64());
    }

    pub(crate) fn record_error(&self, error: &StoreError) {
        let elapsed = self.start.elapsed();
        self.span
            .record("operation.duration_ms", u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
        self.span.record("operation.success", false);
        self.span.record("error.message", error.message.as_str());
        metrics::record_store_operation(self.operation, elapsed.as_secs_f64());
        metrics::increment_store_operation_errors(self.operation);
    }

    /// Record the outcome of `result` and hand it back
    pub(crate) fn finish<T>(&self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        match &result {
            Ok(_) => self.record_success(),
            Err(err) => self.record_error(err),
        }
        result
    }
}
