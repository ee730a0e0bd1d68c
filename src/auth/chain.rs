//! Ordered credential chain with a per-scope token cache.

use super::{
    AccessToken, ClientSecretCredential, DeveloperCliCredential, ManagedIdentityCredential,
    TokenCredential,
};
use crate::config::ProviderConfig;
use crate::constants::TOKEN_REFRESH_MARGIN_SECS;
use crate::error::AuthError;
use async_trait::async_trait;
use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Tries each source in order; the first token wins and is cached until it
/// comes within [`TOKEN_REFRESH_MARGIN_SECS`] of expiry.
#[derive(Debug)]
pub struct DefaultCredential {
    sources: Vec<Arc<dyn TokenCredential>>,
    cache: Mutex<HashMap<String, AccessToken>>,
}

impl DefaultCredential {
    pub fn new(sources: Vec<Arc<dyn TokenCredential>>) -> Self {
        Self {
            sources,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Build the standard chain from configuration
    #[must_use]
    pub fn from_config(config: &ProviderConfig, http: &reqwest::Client) -> Self {
        let mut sources: Vec<Arc<dyn TokenCredential>> = Vec::new();

        if let Some(client_secret) = &config.client_secret {
            sources.push(Arc::new(ClientSecretCredential::new(
                http.clone(),
                &config.authority_host,
                client_secret.clone(),
            )));
        }
        sources.push(Arc::new(ManagedIdentityCredential::new(
            http.clone(),
            config.managed_identity.clone(),
        )));
        if config.enable_developer_credential {
            sources.push(Arc::new(DeveloperCliCredential::default()));
        }

        Self::new(sources)
    }

    async fn cached(&self, key: &str) -> Option<AccessToken> {
        let cache = self.cache.lock().await;
        cache
            .get(key)
            .filter(|token| !token.expires_within(Duration::seconds(TOKEN_REFRESH_MARGIN_SECS)))
            .cloned()
    }
}

#[async_trait]
impl TokenCredential for DefaultCredential {
    fn source_name(&self) -> &'static str {
        "default chain"
    }

    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken, AuthError> {
        let key = scopes.join(" ");
        if let Some(token) = self.cached(&key).await {
            return Ok(token);
        }

        let mut attempts = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            match source.get_token(scopes).await {
                Ok(token) => {
                    info!(source = source.source_name(), "Acquired access token");
                    self.cache.lock().await.insert(key, token.clone());
                    return Ok(token);
                }
                Err(err) => {
                    debug!(source = source.source_name(), error = %err, "Credential source failed");
                    attempts.push(format!("{}: {err}", source.source_name()));
                }
            }
        }

        Err(AuthError::NoCredential { attempts })
    }
}
