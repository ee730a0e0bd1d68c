//! # Secret Stores
//!
//! The primitive operations the lifecycle provider is built from.
//!
//! A secret name in a store is in one of three states:
//! - **Active**: returned by [`SecretStore::get_secret`]
//! - **Soft-deleted**: returned by [`SecretStore::get_deleted_secret`], blocks reuse of the name
//! - **Absent**: neither
//!
//! Implementations:
//! - `key_vault`: Azure Key Vault over REST
//! - `memory`: in-process store with the same state model ([`RemoteState`])

pub mod key_vault;
pub mod memory;

pub use key_vault::KeyVaultClient;
pub use memory::{InMemorySecretStore, StoreOperation};

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Remote state of a secret name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteState {
    Active,
    SoftDeleted,
    Absent,
}

/// An active secret (latest version)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    /// Version URL assigned by the store
    pub id: String,
    pub name: String,
    pub value: Option<String>,
    pub content_type: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub enabled: bool,
}

/// A soft-deleted secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedSecretRecord {
    pub name: String,
    pub recovery_id: Option<String>,
    pub deleted_date: Option<DateTime<Utc>>,
    pub scheduled_purge_date: Option<DateTime<Utc>>,
}

/// Payload for writing a new secret version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetSecretParameters {
    pub value: String,
    pub content_type: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub enabled: bool,
}

impl SetSecretParameters {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            content_type: None,
            tags: BTreeMap::new(),
            enabled: true,
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[must_use]
    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Primitive secret store operations
///
/// Every call is a network round trip for remote stores. Gets return
/// `Ok(None)` when the record is not in the requested state.
#[async_trait]
pub trait SecretStore: Send + Sync + std::fmt::Debug {
    /// Logical store name this client is bound to
    fn store_name(&self) -> &str;

    async fn get_secret(&self, name: &str) -> Result<Option<SecretRecord>, StoreError>;

    async fn get_deleted_secret(&self, name: &str)
        -> Result<Option<DeletedSecretRecord>, StoreError>;

    /// Begin recovery of a soft-deleted secret; the secret may not be
    /// gettable until some time after this returns
    async fn recover_deleted_secret(&self, name: &str) -> Result<(), StoreError>;

    /// Write a new version (creates the secret when absent)
    async fn set_secret(
        &self,
        name: &str,
        parameters: &SetSecretParameters,
    ) -> Result<SecretRecord, StoreError>;

    /// Soft-delete an active secret
    async fn delete_secret(&self, name: &str) -> Result<(), StoreError>;

    /// Names of all soft-deleted secrets
    async fn list_deleted_secrets(&self) -> Result<Vec<String>, StoreError>;
}
