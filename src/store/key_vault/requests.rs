//! Request payloads for the Key Vault secrets API.
//!
//! API Reference: https://learn.microsoft.com/rest/api/keyvault/secrets/set-secret/set-secret

use crate::store::SetSecretParameters;
use serde::Serialize;
use std::collections::BTreeMap;

/// Body of `PUT /secrets/{name}`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SetSecretRequest<'a> {
    pub value: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<&'a str>,
    #[serde(skip_serializing_if = "no_tags")]
    pub tags: &'a BTreeMap<String, String>,
    pub attributes: SecretAttributesRequest,
}

#[allow(clippy::trivially_copy_pass_by_ref, reason = "serde passes a reference to the field")]
fn no_tags(tags: &&BTreeMap<String, String>) -> bool {
    tags.is_empty()
}

#[derive(Debug, Serialize)]
pub(super) struct SecretAttributesRequest {
    pub enabled: bool,
}

impl<'a> From<&'a SetSecretParameters> for SetSecretRequest<'a> {
    fn from(parameters: &'a SetSecretParameters) -> Self {
        Self {
            value: &parameters.value,
            content_type: parameters.content_type.as_deref(),
            tags: &parameters.tags,
            attributes: SecretAttributesRequest {
                enabled: parameters.enabled,
            },
        }
    }
}
