//! Response payloads for the Key Vault secrets API.

use crate::store::{DeletedSecretRecord, SecretRecord};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

/// `SecretBundle`, returned by get/set/recover
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SecretBundle {
    pub id: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub attributes: Option<SecretAttributes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SecretAttributes {
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// `DeletedSecretBundle`, returned by get-deleted and delete
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DeletedSecretBundle {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub recovery_id: Option<String>,
    #[serde(default)]
    pub deleted_date: Option<i64>,
    #[serde(default)]
    pub scheduled_purge_date: Option<i64>,
}

/// Page of `GET /deletedsecrets`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DeletedSecretListResult {
    #[serde(default)]
    pub value: Vec<DeletedSecretBundle>,
    #[serde(default)]
    pub next_link: Option<String>,
}

/// `{"error": {"code": "...", "message": "..."}}`
#[derive(Debug, Deserialize)]
pub(super) struct KeyVaultErrorResponse {
    pub error: KeyVaultError,
}

#[derive(Debug, Deserialize)]
pub(super) struct KeyVaultError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Secret name from an identifier such as
/// `https://vault/secrets/{name}/{version}` or `https://vault/deletedsecrets/{name}`
pub(super) fn name_from_id(id: &str) -> Option<&str> {
    let (_, rest) = id
        .split_once("/deletedsecrets/")
        .or_else(|| id.split_once("/secrets/"))?;
    rest.split('/').next().filter(|name| !name.is_empty())
}

fn timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
}

impl SecretBundle {
    pub(super) fn into_record(self, fallback_name: &str) -> SecretRecord {
        let name = name_from_id(&self.id).unwrap_or(fallback_name).to_string();
        SecretRecord {
            name,
            value: self.value,
            content_type: self.content_type,
            tags: self.tags.unwrap_or_default(),
            enabled: self
                .attributes
                .and_then(|a| a.enabled)
                .unwrap_or(true),
            id: self.id,
        }
    }
}

impl DeletedSecretBundle {
    pub(super) fn into_record(self, fallback_name: &str) -> DeletedSecretRecord {
        let name = self
            .recovery_id
            .as_deref()
            .or(self.id.as_deref())
            .and_then(name_from_id)
            .unwrap_or(fallback_name)
            .to_string();
        DeletedSecretRecord {
            name,
            recovery_id: self.recovery_id,
            deleted_date: timestamp(self.deleted_date),
            scheduled_purge_date: timestamp(self.scheduled_purge_date),
        }
    }
}
