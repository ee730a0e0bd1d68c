//! # Secret Façade
//!
//! Entry point for code that just wants a value in the store: normalizes the
//! name and wraps the desired state in a [`Resource`] node for the lifecycle
//! provider.

use crate::provider::secret::{SecretInputs, SecretProvider};
use crate::provider::Resource;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Make `name` safe for the store
///
/// Every character outside `[0-9A-Za-z-]` becomes `-`, runs of `-` collapse
/// and leading or trailing `-` are dropped: `app.db..password` becomes
/// `app-db-password`.
#[must_use]
pub fn normalize_secret_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c.is_ascii_alphanumeric() { c } else { '-' };
        if c == '-' && (normalized.is_empty() || normalized.ends_with('-')) {
            continue;
        }
        normalized.push(c);
    }
    while normalized.ends_with('-') {
        normalized.pop();
    }
    normalized
}

/// A value to publish
#[derive(Clone, Default)]
pub struct PublishRequest {
    pub name: String,
    pub value: String,
    pub store_name: String,
    pub content_type: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub ignore_change: bool,
    /// Key of the node in persisted state; the normalized name when unset
    pub resource_name: Option<String>,
}

impl std::fmt::Debug for PublishRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishRequest")
            .field("name", &self.name)
            .field("store_name", &self.store_name)
            .field("content_type", &self.content_type)
            .field("resource_name", &self.resource_name)
            .finish_non_exhaustive()
    }
}

impl PublishRequest {
    pub fn new(
        store_name: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            store_name: store_name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct SecretFacade {
    provider: Arc<SecretProvider>,
}

impl SecretFacade {
    pub fn new(provider: Arc<SecretProvider>) -> Self {
        Self { provider }
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<SecretProvider> {
        &self.provider
    }

    /// Build the resource node for `request`
    ///
    /// `content_type` is passed through as given, so an unset one falls back
    /// to the normalized name when written.
    #[must_use]
    pub fn publish(&self, request: PublishRequest) -> Resource<SecretProvider> {
        let name = normalize_secret_name(&request.name);
        let resource_name = request.resource_name.unwrap_or_else(|| name.clone());

        let inputs = SecretInputs {
            name,
            value: request.value,
            store_name: request.store_name,
            content_type: request.content_type,
            tags: request.tags,
            ignore_change: request.ignore_change,
        };
        Resource::new(resource_name, inputs, Arc::clone(&self.provider))
    }
}
