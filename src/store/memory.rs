//! # In-Memory Secret Store
//!
//! Process-local store with the same Active / Soft-deleted / Absent model as
//! Key Vault, used by the test suite and by `kvsecretctl --in-memory`.
//!
//! Behaviour mirrors the service where it matters to the lifecycle provider:
//! - writing a soft-deleted name fails with `Conflict`
//! - recovery completes asynchronously, after a configurable number of polls
//! - deleting an absent name fails with `NotFound`
//!
//! Every call is appended to an operation journal so tests can assert on
//! ordering.

use super::{DeletedSecretRecord, RemoteState, SecretRecord, SecretStore, SetSecretParameters};
use crate::error::{StoreError, StoreErrorKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

/// One primitive call observed by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOperation {
    Get(String),
    GetDeleted(String),
    Recover(String),
    Set(String),
    Delete(String),
    ListDeleted,
}

impl StoreOperation {
    /// True for calls that change remote state
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Recover(_) | Self::Set(_) | Self::Delete(_))
    }
}

#[derive(Debug, Clone)]
enum EntryState {
    Active,
    SoftDeleted { deleted_date: DateTime<Utc> },
    /// `None` never completes
    Recovering { polls_remaining: Option<u32> },
}

#[derive(Debug, Clone)]
struct Entry {
    record: SecretRecord,
    state: EntryState,
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<String, Entry>,
    journal: Vec<StoreOperation>,
    recovery_polls: u32,
    unrecoverable: HashSet<String>,
    set_failure: Option<StoreError>,
    delete_failure: Option<StoreError>,
}

#[derive(Debug)]
pub struct InMemorySecretStore {
    store_name: String,
    inner: Mutex<Inner>,
}

impl InMemorySecretStore {
    pub fn new(store_name: impl Into<String>) -> Self {
        Self {
            store_name: store_name.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Number of `get_secret` polls a recovering secret stays invisible for
    #[must_use]
    pub fn with_recovery_latency(self, polls: u32) -> Self {
        self.lock().recovery_polls = polls;
        self
    }

    /// Recovery of `name` starts but never completes
    #[must_use]
    pub fn with_unrecoverable(self, name: impl Into<String>) -> Self {
        self.lock().unrecoverable.insert(name.into());
        self
    }

    /// Make every subsequent `set_secret` fail with `error` (`None` clears it)
    pub fn fail_sets(&self, error: Option<StoreError>) {
        self.lock().set_failure = error;
    }

    /// Make every subsequent `delete_secret` fail with `error` (`None` clears it)
    pub fn fail_deletes(&self, error: Option<StoreError>) {
        self.lock().delete_failure = error;
    }

    /// Insert an active secret without journaling it
    pub fn seed_active(&self, name: &str, value: &str) -> SecretRecord {
        let record = self.new_version(name, &SetSecretParameters::new(value));
        self.lock().entries.insert(
            name.to_string(),
            Entry {
                record: record.clone(),
                state: EntryState::Active,
            },
        );
        record
    }

    /// Insert a soft-deleted secret without journaling it
    pub fn seed_soft_deleted(&self, name: &str, value: &str) {
        let record = self.new_version(name, &SetSecretParameters::new(value));
        self.lock().entries.insert(
            name.to_string(),
            Entry {
                record,
                state: EntryState::SoftDeleted {
                    deleted_date: Utc::now(),
                },
            },
        );
    }

    /// State of `name` as an outside observer sees it
    ///
    /// A secret whose recovery has not completed is still soft-deleted.
    #[must_use]
    pub fn state(&self, name: &str) -> RemoteState {
        match self.lock().entries.get(name).map(|entry| &entry.state) {
            Some(EntryState::Active) => RemoteState::Active,
            Some(EntryState::SoftDeleted { .. } | EntryState::Recovering { .. }) => {
                RemoteState::SoftDeleted
            }
            None => RemoteState::Absent,
        }
    }

    /// Latest version of an active secret, without journaling
    #[must_use]
    pub fn peek(&self, name: &str) -> Option<SecretRecord> {
        self.lock()
            .entries
            .get(name)
            .filter(|entry| matches!(entry.state, EntryState::Active))
            .map(|entry| entry.record.clone())
    }

    #[must_use]
    pub fn journal(&self) -> Vec<StoreOperation> {
        self.lock().journal.clone()
    }

    /// Number of journaled calls that changed remote state
    #[must_use]
    pub fn writes(&self) -> usize {
        self.lock().journal.iter().filter(|op| op.is_write()).count()
    }

    pub fn clear_journal(&self) {
        self.lock().journal.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn new_version(&self, name: &str, parameters: &SetSecretParameters) -> SecretRecord {
        let version = Uuid::new_v4().simple().to_string();
        SecretRecord {
            id: format!(
                "https://{}.vault.azure.net/secrets/{name}/{version}",
                self.store_name
            ),
            name: name.to_string(),
            value: Some(parameters.value.clone()),
            content_type: parameters.content_type.clone(),
            tags: parameters.tags.clone(),
            enabled: parameters.enabled,
        }
    }
}

fn soft_deleted_conflict(name: &str) -> StoreError {
    StoreError::from_status(
        409,
        format!("Secret {name} is currently in a deleted but recoverable state"),
    )
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    fn store_name(&self) -> &str {
        &self.store_name
    }

    async fn get_secret(&self, name: &str) -> Result<Option<SecretRecord>, StoreError> {
        let mut inner = self.lock();
        inner.journal.push(StoreOperation::Get(name.to_string()));

        let Some(entry) = inner.entries.get_mut(name) else {
            return Ok(None);
        };
        if let EntryState::Recovering {
            polls_remaining: Some(remaining),
        } = &mut entry.state
        {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(None);
            }
            debug!(secret.name = name, "Recovery completed");
            entry.state = EntryState::Active;
        }
        Ok(matches!(entry.state, EntryState::Active).then(|| entry.record.clone()))
    }

    async fn get_deleted_secret(
        &self,
        name: &str,
    ) -> Result<Option<DeletedSecretRecord>, StoreError> {
        let mut inner = self.lock();
        inner
            .journal
            .push(StoreOperation::GetDeleted(name.to_string()));

        Ok(match inner.entries.get(name) {
            Some(Entry {
                state: EntryState::SoftDeleted { deleted_date },
                ..
            }) => Some(DeletedSecretRecord {
                name: name.to_string(),
                recovery_id: Some(format!(
                    "https://{}.vault.azure.net/deletedsecrets/{name}",
                    self.store_name
                )),
                deleted_date: Some(*deleted_date),
                scheduled_purge_date: Some(*deleted_date + chrono::Duration::days(90)),
            }),
            _ => None,
        })
    }

    async fn recover_deleted_secret(&self, name: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.journal.push(StoreOperation::Recover(name.to_string()));

        let polls_remaining = if inner.unrecoverable.contains(name) {
            None
        } else {
            Some(inner.recovery_polls)
        };
        match inner.entries.get_mut(name) {
            Some(entry) => match entry.state {
                EntryState::SoftDeleted { .. } => {
                    entry.state = EntryState::Recovering { polls_remaining };
                    Ok(())
                }
                EntryState::Recovering { .. } => Err(StoreError::from_status(
                    409,
                    format!("Secret {name} is already being recovered"),
                )),
                EntryState::Active => Err(StoreError::not_found(format!(
                    "Deleted secret {name} not found"
                ))),
            },
            None => Err(StoreError::not_found(format!(
                "Deleted secret {name} not found"
            ))),
        }
    }

    async fn set_secret(
        &self,
        name: &str,
        parameters: &SetSecretParameters,
    ) -> Result<SecretRecord, StoreError> {
        let record = self.new_version(name, parameters);
        let mut inner = self.lock();
        inner.journal.push(StoreOperation::Set(name.to_string()));

        if let Some(error) = inner.set_failure.clone() {
            return Err(error);
        }
        match inner.entries.get(name).map(|entry| &entry.state) {
            Some(EntryState::SoftDeleted { .. } | EntryState::Recovering { .. }) => {
                Err(soft_deleted_conflict(name))
            }
            _ => {
                inner.entries.insert(
                    name.to_string(),
                    Entry {
                        record: record.clone(),
                        state: EntryState::Active,
                    },
                );
                Ok(record)
            }
        }
    }

    async fn delete_secret(&self, name: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.journal.push(StoreOperation::Delete(name.to_string()));

        if let Some(error) = inner.delete_failure.clone() {
            return Err(error);
        }
        match inner.entries.get_mut(name) {
            Some(entry) if matches!(entry.state, EntryState::Active) => {
                entry.state = EntryState::SoftDeleted {
                    deleted_date: Utc::now(),
                };
                Ok(())
            }
            _ => Err(StoreError::new(
                StoreErrorKind::NotFound,
                format!("Secret {name} not found"),
            )),
        }
    }

    async fn list_deleted_secrets(&self) -> Result<Vec<String>, StoreError> {
        let mut inner = self.lock();
        inner.journal.push(StoreOperation::ListDeleted);
        Ok(inner
            .entries
            .iter()
            .filter(|(_, entry)| matches!(entry.state, EntryState::SoftDeleted { .. }))
            .map(|(name, _)| name.clone())
            .collect())
    }
}
