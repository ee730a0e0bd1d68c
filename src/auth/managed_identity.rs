//! Ambient managed identity credential.
//!
//! Uses the App Service identity endpoint when `IDENTITY_ENDPOINT` and
//! `IDENTITY_HEADER` are present, otherwise the instance metadata service.

use super::{scope_to_resource, AccessToken, TokenCredential, TokenResponse};
use crate::config::ManagedIdentityConfig;
use crate::constants::IMDS_TOKEN_ENDPOINT;
use crate::error::AuthError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";
/// IMDS answers in milliseconds when present; anything slower means "not here"
const IMDS_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ManagedIdentityCredential {
    http: reqwest::Client,
    config: ManagedIdentityConfig,
    imds_endpoint: String,
}

impl ManagedIdentityCredential {
    pub fn new(http: reqwest::Client, config: ManagedIdentityConfig) -> Self {
        Self {
            http,
            config,
            imds_endpoint: IMDS_TOKEN_ENDPOINT.to_string(),
        }
    }

    /// Point the IMDS flavour at a different endpoint
    #[must_use]
    pub fn with_imds_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.imds_endpoint = endpoint.into();
        self
    }

    fn build_request(&self, resource: &str) -> reqwest::RequestBuilder {
        let mut query = vec![("resource", resource.to_string())];
        if let Some(client_id) = &self.config.client_id {
            query.push(("client_id", client_id.clone()));
        }

        match (&self.config.endpoint, &self.config.header) {
            (Some(endpoint), Some(header)) => {
                debug!(endpoint = %endpoint, "Requesting token from identity endpoint");
                query.push(("api-version", APP_SERVICE_API_VERSION.to_string()));
                self.http
                    .get(endpoint)
                    .query(&query)
                    .header("X-IDENTITY-HEADER", header.as_str())
            }
            _ => {
                debug!("Requesting token from instance metadata service");
                query.push(("api-version", IMDS_API_VERSION.to_string()));
                self.http
                    .get(&self.imds_endpoint)
                    .query(&query)
                    .header("Metadata", "true")
                    .timeout(IMDS_PROBE_TIMEOUT)
            }
        }
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    fn source_name(&self) -> &'static str {
        "managed identity"
    }

    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken, AuthError> {
        let scope = scopes
            .first()
            .ok_or_else(|| AuthError::Request("managed identity requires a scope".to_string()))?;
        let resource = scope_to_resource(scope);

        let response = self
            .build_request(resource)
            .send()
            .await
            .map_err(|err| AuthError::Unavailable(format!("identity endpoint unreachable: {err}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Unauthorized { status, body });
        }

        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|err| AuthError::Parse(err.to_string()))?;

        Ok(payload.into_access_token())
    }
}
