//! # Provider Configuration
//!
//! Credential, endpoint, recovery and logging settings.
//!
//! All settings have defaults (see [`crate::constants`]) and can be
//! overridden via environment variables.

use super::{env_var_opt, env_var_or_default, env_var_or_default_bool, env_var_or_default_str};
use crate::constants::{
    DEFAULT_AUTHORITY_HOST, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_KEY_VAULT_API_VERSION,
    DEFAULT_KEY_VAULT_DNS_SUFFIX, DEFAULT_KEY_VAULT_SCOPE, DEFAULT_RECOVERY_INITIAL_INTERVAL_MS,
    DEFAULT_RECOVERY_MAX_ATTEMPTS, DEFAULT_RECOVERY_MAX_INTERVAL_MS,
};
use crate::provider::secret::RecoveryPolicy;
use std::time::Duration;
use zeroize::Zeroizing;

/// Explicit service principal (client id + secret + tenant)
#[derive(Clone)]
pub struct ClientSecretConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: Zeroizing<String>,
}

impl std::fmt::Debug for ClientSecretConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecretConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Ambient identity settings
///
/// When `endpoint` and `header` are both set the App Service style identity
/// endpoint is used, otherwise the instance metadata service.
#[derive(Clone, Default)]
pub struct ManagedIdentityConfig {
    pub endpoint: Option<String>,
    pub header: Option<Zeroizing<String>>,
    /// User-assigned identity client id
    pub client_id: Option<String>,
}

impl std::fmt::Debug for ManagedIdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedIdentityConfig")
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Provider-level configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Explicit identity, tried first
    pub client_secret: Option<ClientSecretConfig>,
    /// Ambient identity, tried second
    pub managed_identity: ManagedIdentityConfig,
    /// Allow the `az` CLI as a last resort
    pub enable_developer_credential: bool,
    pub authority_host: String,
    /// Host suffix used to build `https://{store}.{suffix}`
    pub key_vault_dns_suffix: String,
    /// Endpoint override for local or mock vaults; may contain `{store}`
    pub key_vault_endpoint: Option<String>,
    pub key_vault_api_version: String,
    pub key_vault_scope: String,
    pub recovery_max_attempts: u32,
    pub recovery_initial_interval_ms: u64,
    pub recovery_max_interval_ms: u64,
    pub http_timeout_secs: u64,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            client_secret: None,
            managed_identity: ManagedIdentityConfig::default(),
            enable_developer_credential: true,
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            key_vault_dns_suffix: DEFAULT_KEY_VAULT_DNS_SUFFIX.to_string(),
            key_vault_endpoint: None,
            key_vault_api_version: DEFAULT_KEY_VAULT_API_VERSION.to_string(),
            key_vault_scope: DEFAULT_KEY_VAULT_SCOPE.to_string(),
            recovery_max_attempts: DEFAULT_RECOVERY_MAX_ATTEMPTS,
            recovery_initial_interval_ms: DEFAULT_RECOVERY_INITIAL_INTERVAL_MS,
            recovery_max_interval_ms: DEFAULT_RECOVERY_MAX_INTERVAL_MS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl ProviderConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        let client_id = env_var_opt("AZURE_CLIENT_ID");

        let client_secret = match (
            env_var_opt("AZURE_TENANT_ID"),
            client_id.clone(),
            env_var_opt("AZURE_CLIENT_SECRET"),
        ) {
            (Some(tenant_id), Some(client_id), Some(secret)) => Some(ClientSecretConfig {
                tenant_id,
                client_id,
                client_secret: Zeroizing::new(secret),
            }),
            _ => None,
        };

        Self {
            client_secret,
            managed_identity: ManagedIdentityConfig {
                endpoint: env_var_opt("IDENTITY_ENDPOINT"),
                header: env_var_opt("IDENTITY_HEADER").map(Zeroizing::new),
                client_id,
            },
            enable_developer_credential: env_var_or_default_bool(
                "ENABLE_DEVELOPER_CREDENTIAL",
                true,
            ),
            authority_host: env_var_or_default_str("AZURE_AUTHORITY_HOST", DEFAULT_AUTHORITY_HOST),
            key_vault_dns_suffix: env_var_or_default_str(
                "KEY_VAULT_DNS_SUFFIX",
                DEFAULT_KEY_VAULT_DNS_SUFFIX,
            ),
            key_vault_endpoint: env_var_opt("KEY_VAULT_ENDPOINT"),
            key_vault_api_version: env_var_or_default_str(
                "KEY_VAULT_API_VERSION",
                DEFAULT_KEY_VAULT_API_VERSION,
            ),
            key_vault_scope: env_var_or_default_str("KEY_VAULT_SCOPE", DEFAULT_KEY_VAULT_SCOPE),
            recovery_max_attempts: env_var_or_default(
                "RECOVERY_MAX_ATTEMPTS",
                DEFAULT_RECOVERY_MAX_ATTEMPTS,
            ),
            recovery_initial_interval_ms: env_var_or_default(
                "RECOVERY_INITIAL_INTERVAL_MS",
                DEFAULT_RECOVERY_INITIAL_INTERVAL_MS,
            ),
            recovery_max_interval_ms: env_var_or_default(
                "RECOVERY_MAX_INTERVAL_MS",
                DEFAULT_RECOVERY_MAX_INTERVAL_MS,
            ),
            http_timeout_secs: env_var_or_default("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS),
            log_level: env_var_or_default_str("LOG_LEVEL", "info"),
            log_format: env_var_or_default("LOG_FORMAT", LogFormat::Text),
        }
    }

    /// Build the store endpoint for a logical store name
    ///
    /// A store name that is already an `https://` URL is used verbatim.
    #[must_use]
    pub fn vault_url(&self, store_name: &str) -> String {
        if store_name.starts_with("https://") || store_name.starts_with("http://") {
            return store_name.trim_end_matches('/').to_string();
        }
        match &self.key_vault_endpoint {
            Some(endpoint) => endpoint
                .replace("{store}", store_name)
                .trim_end_matches('/')
                .to_string(),
            None => format!("https://{store_name}.{}", self.key_vault_dns_suffix),
        }
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Bounded polling budget for soft-delete recovery
    #[must_use]
    pub fn recovery_policy(&self) -> RecoveryPolicy {
        RecoveryPolicy::new(
            self.recovery_max_attempts,
            Duration::from_millis(self.recovery_initial_interval_ms),
            Duration::from_millis(self.recovery_max_interval_ms),
        )
    }
}
