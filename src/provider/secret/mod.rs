//! # Secret Lifecycle Provider
//!
//! Reconciles one secret-store entry against desired inputs using only the
//! primitive store operations.
//!
//! ## Remote states
//!
//! ```text
//!            set                 delete
//!  Absent ---------> Active ------------> SoftDeleted
//!                      ^                      |
//!                      +------ recover -------+
//! ```
//!
//! The provider never purges. A soft-deleted name blocks writes, so `create`
//! recovers it first ([`RecoveryPolicy`]). Deletes go through
//! [`BestEffortDelete`].
//!
//! ## Rename
//!
//! A change of `storeName` or `name` is handled inside `update`, never as an
//! engine replacement: the new identity is written first and only then is the
//! old one deleted, so at worst both exist for a while.

mod cleanup;
mod recovery;

pub use cleanup::{BestEffortDelete, DeleteOutcome};
pub use recovery::RecoveryPolicy;

use super::{CheckFailure, CheckResult, CreateResult, DiffResult, ResourceProvider, UpdateResult};
use crate::cache::ClientCache;
use crate::constants::{MAX_SECRET_NAME_LENGTH, MAX_SECRET_VALUE_BYTES};
use crate::error::ProviderError;
use crate::observability::metrics;
use crate::store::{SecretStore, SetSecretParameters};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};

/// Composite key of a secret
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SecretIdentity {
    pub store_name: String,
    pub name: String,
}

impl SecretIdentity {
    /// Same remote secret; vault and secret names are case-insensitive
    #[must_use]
    pub fn is_same_secret(&self, other: &SecretIdentity) -> bool {
        self.store_name.eq_ignore_ascii_case(&other.store_name)
            && self.name.eq_ignore_ascii_case(&other.name)
    }

    /// Case-folded copy, for sets keyed by remote secret
    #[must_use]
    pub fn folded(&self) -> SecretIdentity {
        SecretIdentity {
            store_name: self.store_name.to_ascii_lowercase(),
            name: self.name.to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for SecretIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.store_name, self.name)
    }
}

/// Desired state of a secret
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretInputs {
    pub name: String,
    /// Absent is the empty string, which is a valid value
    #[serde(default)]
    pub value: String,
    pub store_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Frozen: `update` performs no store writes
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ignore_change: bool,
}

impl fmt::Debug for SecretInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretInputs")
            .field("name", &self.name)
            .field("store_name", &self.store_name)
            .field("value_len", &self.value.len())
            .field("content_type", &self.content_type)
            .field("tags", &self.tags)
            .field("ignore_change", &self.ignore_change)
            .finish()
    }
}

impl SecretInputs {
    pub fn new(
        store_name: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            store_name: store_name.into(),
            content_type: None,
            tags: BTreeMap::new(),
            ignore_change: false,
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

    #[must_use]
    pub fn frozen(mut self) -> Self {
        self.ignore_change = true;
        self
    }

    #[must_use]
    pub fn identity(&self) -> SecretIdentity {
        SecretIdentity {
            store_name: self.store_name.clone(),
            name: self.name.clone(),
        }
    }

    /// `self` laid over `previous`, for outputs of a frozen update
    ///
    /// Unset optional fields keep their previous value and tags are merged,
    /// so the outputs keep describing what the store still holds.
    #[must_use]
    pub fn merged_onto(&self, previous: &SecretInputs) -> SecretInputs {
        let mut tags = previous.tags.clone();
        tags.extend(self.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        SecretInputs {
            name: self.name.clone(),
            value: self.value.clone(),
            store_name: self.store_name.clone(),
            content_type: self
                .content_type
                .clone()
                .or_else(|| previous.content_type.clone()),
            tags,
            ignore_change: self.ignore_change || previous.ignore_change,
        }
    }

    /// Content type written to the store; defaults to the secret name
    #[must_use]
    pub fn effective_content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or(&self.name)
    }
}

/// Observed state: the inputs as written plus the store-assigned version id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretOutputs {
    pub id: String,
    #[serde(flatten)]
    pub inputs: SecretInputs,
}

impl SecretOutputs {
    #[must_use]
    pub fn identity(&self) -> SecretIdentity {
        self.inputs.identity()
    }
}

/// Lifecycle provider for secret-store entries
#[derive(Debug)]
pub struct SecretProvider {
    cache: Arc<ClientCache>,
    recovery: RecoveryPolicy,
    cleanup: BestEffortDelete,
}

impl SecretProvider {
    pub fn new(cache: Arc<ClientCache>, recovery: RecoveryPolicy) -> Self {
        Self {
            cache,
            recovery,
            cleanup: BestEffortDelete,
        }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<ClientCache> {
        &self.cache
    }

    async fn client(&self, identity: &SecretIdentity) -> Result<Arc<dyn SecretStore>, ProviderError> {
        self.cache
            .get_client(&identity.store_name)
            .await
            .map_err(|err| ProviderError::store(&identity.store_name, &identity.name, err))
    }

    /// True when `identity` is currently soft-deleted
    async fn is_soft_deleted(&self, identity: &SecretIdentity) -> Result<bool, ProviderError> {
        let client = self.client(identity).await?;
        let deleted = client
            .get_deleted_secret(&identity.name)
            .await
            .map_err(|err| ProviderError::store(&identity.store_name, &identity.name, err))?;
        Ok(deleted.is_some())
    }

    async fn create_inner(&self, next: &SecretInputs) -> Result<CreateResult<SecretOutputs>, ProviderError> {
        let identity = next.identity();
        let client = self.client(&identity).await?;
        let store_err = |err| ProviderError::store(&identity.store_name, &identity.name, err);

        if client
            .get_deleted_secret(&identity.name)
            .await
            .map_err(store_err)?
            .is_some()
        {
            info!("Secret is soft-deleted, recovering before write");
            recovery::recover_secret(client.as_ref(), &identity.name, &self.recovery)
                .await
                .map_err(|failure| match failure.auth {
                    Some(auth) => ProviderError::Auth(auth),
                    None => ProviderError::Recovery {
                        store: identity.store_name.clone(),
                        name: identity.name.clone(),
                        attempts: failure.attempts,
                        message: failure.message,
                    },
                })?;
            metrics::increment_recoveries();
        }

        let parameters = SetSecretParameters::new(next.value.clone())
            .with_content_type(next.effective_content_type())
            .with_tags(next.tags.clone());
        let record = client
            .set_secret(&identity.name, &parameters)
            .await
            .map_err(store_err)?;

        Ok(CreateResult {
            id: record.id.clone(),
            outputs: SecretOutputs {
                id: record.id,
                inputs: next.clone(),
            },
        })
    }

    async fn update_inner(
        &self,
        id: &str,
        previous: &SecretOutputs,
        next: &SecretInputs,
    ) -> Result<(UpdateResult<SecretOutputs>, &'static str), ProviderError> {
        if previous.inputs.ignore_change || next.ignore_change {
            debug!("Secret is frozen, skipping store writes");
            return Ok((
                CreateResult {
                    id: id.to_string(),
                    outputs: SecretOutputs {
                        id: id.to_string(),
                        inputs: next.merged_onto(&previous.inputs),
                    },
                },
                "frozen",
            ));
        }

        let result = self.create_inner(next).await?;

        let old = previous.identity();
        if !old.is_same_secret(&next.identity()) {
            info!(old = %old, new = %next.identity(), "Secret identity changed, removing old secret");
            self.cleanup
                .run(&self.cache, &old.store_name, &old.name, "renamed")
                .await;
        }

        Ok((result, "ok"))
    }
}

fn outcome<T>(result: &Result<T, ProviderError>) -> &'static str {
    if result.is_ok() {
        "ok"
    } else {
        "error"
    }
}

#[async_trait]
impl ResourceProvider for SecretProvider {
    type Inputs = SecretInputs;
    type Outputs = SecretOutputs;

    fn type_name(&self) -> &'static str {
        "keyvault:secret"
    }

    fn prior_inputs(&self, outputs: &SecretOutputs) -> Option<SecretInputs> {
        Some(outputs.inputs.clone())
    }

    async fn check(&self, _previous: Option<&SecretInputs>, next: &SecretInputs) -> CheckResult {
        let mut failures = Vec::new();

        if next.name.is_empty() {
            failures.push(CheckFailure::new("name", "must not be empty"));
        } else if next.name.len() > MAX_SECRET_NAME_LENGTH {
            failures.push(CheckFailure::new(
                "name",
                format!("must be at most {MAX_SECRET_NAME_LENGTH} characters"),
            ));
        }
        if next
            .name
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '-'))
        {
            failures.push(CheckFailure::new(
                "name",
                "may only contain 0-9, a-z, A-Z and -",
            ));
        }
        if next.store_name.is_empty() {
            failures.push(CheckFailure::new("storeName", "must not be empty"));
        }
        if next.value.len() > MAX_SECRET_VALUE_BYTES {
            failures.push(CheckFailure::new(
                "value",
                format!("must be at most {MAX_SECRET_VALUE_BYTES} bytes"),
            ));
        }

        CheckResult { failures }
    }

    async fn diff(
        &self,
        _id: &str,
        previous: &SecretOutputs,
        next: &SecretInputs,
    ) -> Result<DiffResult, ProviderError> {
        let span = info_span!(
            "provider.secret.diff",
            secret.name = %next.name,
            vault.name = %next.store_name
        );

        async {
            let prev = &previous.inputs;
            let mut changed = Vec::new();
            if prev.name != next.name {
                changed.push("name".to_string());
            }
            if prev.store_name != next.store_name {
                changed.push("storeName".to_string());
            }
            if prev.value != next.value {
                changed.push("value".to_string());
            }
            if prev.effective_content_type() != next.effective_content_type() {
                changed.push("contentType".to_string());
            }
            let soft_deleted = self.is_soft_deleted(&next.identity()).await;
            metrics::record_provider_operation("diff", outcome(&soft_deleted));
            if soft_deleted? {
                changed.push("softDeleted".to_string());
            }

            debug!(?changed, "Computed diff");
            Ok(DiffResult {
                changes: !changed.is_empty(),
                replace: false,
                changed,
            })
        }
        .instrument(span)
        .await
    }

    async fn create(&self, next: &SecretInputs) -> Result<CreateResult<SecretOutputs>, ProviderError> {
        let span = info_span!(
            "provider.secret.create",
            secret.name = %next.name,
            vault.name = %next.store_name
        );

        async {
            let result = self.create_inner(next).await;
            metrics::record_provider_operation("create", outcome(&result));
            result
        }
        .instrument(span)
        .await
    }

    async fn update(
        &self,
        id: &str,
        previous: &SecretOutputs,
        next: &SecretInputs,
    ) -> Result<UpdateResult<SecretOutputs>, ProviderError> {
        let span = info_span!(
            "provider.secret.update",
            secret.name = %next.name,
            vault.name = %next.store_name
        );

        async {
            match self.update_inner(id, previous, next).await {
                Ok((result, label)) => {
                    metrics::record_provider_operation("update", label);
                    Ok(result)
                }
                Err(err) => {
                    metrics::record_provider_operation("update", "error");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn delete(&self, _id: &str, outputs: &SecretOutputs) -> Result<(), ProviderError> {
        let span = info_span!(
            "provider.secret.delete",
            secret.name = %outputs.inputs.name,
            vault.name = %outputs.inputs.store_name
        );

        async {
            let identity = outputs.identity();
            let outcome = self
                .cleanup
                .run(&self.cache, &identity.store_name, &identity.name, "resource deleted")
                .await;
            let label = match outcome {
                DeleteOutcome::Deleted => "ok",
                DeleteOutcome::AlreadyAbsent => "absent",
                DeleteOutcome::Failed => "swallowed",
            };
            metrics::record_provider_operation("delete", label);
            Ok(())
        }
        .instrument(span)
        .await
    }
}
