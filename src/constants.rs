//! # Constants
//!
//! Shared constants used throughout the provider.
//!
//! These values represent reasonable defaults and can be overridden via
//! environment variables where applicable (see [`crate::config`]).

/// Key Vault REST API version used for every data-plane request
pub const DEFAULT_KEY_VAULT_API_VERSION: &str = "7.4";

/// Host suffix appended to a store name to build its endpoint
pub const DEFAULT_KEY_VAULT_DNS_SUFFIX: &str = "vault.azure.net";

/// OAuth2 scope requested for Key Vault data-plane access
pub const DEFAULT_KEY_VAULT_SCOPE: &str = "https://vault.azure.net/.default";

/// Entra ID authority used by the client-secret credential
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Instance metadata endpoint for managed identity tokens
pub const IMDS_TOKEN_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// Maximum number of polls while waiting for a soft-deleted secret to become active
pub const DEFAULT_RECOVERY_MAX_ATTEMPTS: u32 = 10;

/// First delay between recovery polls (milliseconds)
pub const DEFAULT_RECOVERY_INITIAL_INTERVAL_MS: u64 = 1000;

/// Upper bound for the delay between recovery polls (milliseconds)
pub const DEFAULT_RECOVERY_MAX_INTERVAL_MS: u64 = 10_000;

/// Per-request HTTP timeout (seconds)
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Tokens this close to expiry are refreshed instead of reused (seconds)
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 300;

/// Key Vault secret names are limited to 127 characters
pub const MAX_SECRET_NAME_LENGTH: usize = 127;

/// Key Vault rejects secret values above 25 KiB
pub const MAX_SECRET_VALUE_BYTES: usize = 25 * 1024;

/// Default location of the harness state file
pub const DEFAULT_STATE_PATH: &str = ".kvsecret/state.json";

/// State file format version
pub const STATE_VERSION: u32 = 1;
