//! # Errors
//!
//! Error taxonomy shared by the credential resolver, the store clients and the
//! provider contract.
//!
//! - [`AuthError`]: no credential source produced a token
//! - [`StoreError`]: neutral store failure, independent of any client library
//! - [`ProviderError`]: what a provider operation hands back to the engine
//! - [`EngineError`]: orchestration failures (state file, manifest, resources)

use crate::provider::CheckFailure;
use std::path::PathBuf;
use thiserror::Error;

/// Credential resolution failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Every credential source in the chain failed
    #[error("no credential source succeeded: {}", .attempts.join("; "))]
    NoCredential { attempts: Vec<String> },

    /// Token endpoint answered with a non-success status
    #[error("token endpoint rejected the request: {status} {body}")]
    Unauthorized { status: u16, body: String },

    /// Transport failure talking to the identity endpoint
    #[error("failed to request token: {0}")]
    Request(String),

    /// Token endpoint answered with something we could not read
    #[error("failed to parse token response: {0}")]
    Parse(String),

    /// Developer CLI credential failed or is not installed
    #[error("developer CLI credential failed: {0}")]
    Cli(String),

    /// A credential source is not configured in this environment
    #[error("credential unavailable: {0}")]
    Unavailable(String),
}

/// Classification of a store failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Record does not exist in the requested state
    NotFound,
    /// Record is in a conflicting state (e.g. recovery in progress)
    Conflict,
    /// Network failure, throttling or a 5xx answer
    Unavailable,
    /// Caller is not allowed to perform the operation
    Forbidden,
    /// No bearer token could be obtained; see [`StoreError::auth`]
    Auth,
    /// Store rejected the request as malformed
    BadRequest,
    /// Anything else
    Other,
}

/// Neutral store error with a human-readable message
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub status: Option<u16>,
    pub message: String,
    /// Credential failure behind a [`StoreErrorKind::Auth`] error
    pub auth: Option<AuthError>,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            auth: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::NotFound, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Unavailable, message)
    }

    /// Map an HTTP status to a store error
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            404 => StoreErrorKind::NotFound,
            409 => StoreErrorKind::Conflict,
            401 | 403 => StoreErrorKind::Forbidden,
            400 => StoreErrorKind::BadRequest,
            408 | 429 | 500..=599 => StoreErrorKind::Unavailable,
            _ => StoreErrorKind::Other,
        };
        Self {
            kind,
            status: Some(status),
            message: message.into(),
            auth: None,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == StoreErrorKind::NotFound
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind == StoreErrorKind::Unavailable
    }
}

impl From<AuthError> for StoreError {
    fn from(err: AuthError) -> Self {
        Self {
            kind: StoreErrorKind::Auth,
            status: None,
            message: err.to_string(),
            auth: Some(err),
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), err.to_string());
        }
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return Self::unavailable(err.to_string());
        }
        Self::new(StoreErrorKind::Other, err.to_string())
    }
}

/// Errors surfaced by provider contract operations
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// A soft-deleted secret did not come back within the attempt budget
    #[error("failed to recover soft-deleted secret {name} in {store} after {attempts} attempt(s): {message}")]
    Recovery {
        store: String,
        name: String,
        attempts: u32,
        message: String,
    },

    /// Transient store failure; the engine owns the retry decision
    #[error("secret store {store} unavailable while handling {name}: {source}")]
    StoreUnavailable {
        store: String,
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("secret store {store} failed for {name}: {source}")]
    Store {
        store: String,
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("invalid inputs: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Validation(Vec<CheckFailure>),

    #[error("failed to convert resource state: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// Attach the secret identity to a store failure
    ///
    /// Credential failures surface as [`ProviderError::Auth`].
    pub fn store(store: &str, name: &str, mut source: StoreError) -> Self {
        if let Some(auth) = source.auth.take() {
            return Self::Auth(auth);
        }
        if source.is_transient() {
            Self::StoreUnavailable {
                store: store.to_string(),
                name: name.to_string(),
                source,
            }
        } else {
            Self::Store {
                store: store.to_string(),
                name: name.to_string(),
                source,
            }
        }
    }
}

/// Errors from the orchestration harness
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to access state file {}: {source}", .path.display())]
    StateIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state file {} is not valid: {source}", .path.display())]
    StateFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("state file version {found} is newer than supported version {supported}")]
    UnsupportedStateVersion { found: u32, supported: u32 },

    #[error("invalid manifest: {0}")]
    Manifest(String),

    #[error("failed to parse manifest: {0}")]
    ManifestFormat(#[from] serde_yaml::Error),

    /// Two manifest entries share a resource name or a secret identity
    #[error("duplicate resource: {0}")]
    Duplicate(String),

    /// A rename would soft-delete a secret another resource now manages
    #[error("resource {resource} moves away from {secret}, which resource {claimant} now manages; apply the rename and the new claim separately")]
    Handoff {
        resource: String,
        secret: String,
        claimant: String,
    },

    #[error("resource {resource} failed: {source}")]
    Provider {
        resource: String,
        #[source]
        source: ProviderError,
    },
}
