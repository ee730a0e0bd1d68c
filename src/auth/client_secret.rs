//! Service principal credential (OAuth2 client credentials grant).

use super::{AccessToken, TokenCredential, TokenResponse};
use crate::config::ClientSecretConfig;
use crate::error::AuthError;
use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ClientSecretCredential {
    http: reqwest::Client,
    authority_host: String,
    config: ClientSecretConfig,
}

impl ClientSecretCredential {
    pub fn new(http: reqwest::Client, authority_host: &str, config: ClientSecretConfig) -> Self {
        Self {
            http,
            authority_host: authority_host.trim_end_matches('/').to_string(),
            config,
        }
    }

    fn token_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host, self.config.tenant_id
        )
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    fn source_name(&self) -> &'static str {
        "client secret"
    }

    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken, AuthError> {
        let scope = scopes.join(" ");
        debug!(
            tenant_id = %self.config.tenant_id,
            client_id = %self.config.client_id,
            "Requesting token with client credentials"
        );

        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("scope", scope.as_str()),
            ("grant_type", "client_credentials"),
        ];

        let response = self
            .http
            .post(self.token_endpoint())
            .form(&params)
            .send()
            .await
            .map_err(|err| AuthError::Request(err.to_string()))?;

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
