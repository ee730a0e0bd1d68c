//! State file management
//!
//! Observed state of every applied resource lives in one JSON document
//! (`.kvsecret/state.json` by default). Saves go through a temporary file and
//! a rename so a crash never leaves a half-written state.

use crate::constants::STATE_VERSION;
use crate::error::EngineError;
use crate::provider::secret::SecretOutputs;
use crate::provider::ResourceState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// All persisted resources, keyed by logical resource name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateFile {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceState<SecretOutputs>>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
        }
    }
}

impl StateFile {
    #[must_use]
    pub fn get(&self, resource: &str) -> Option<&ResourceState<SecretOutputs>> {
        self.resources.get(resource)
    }

    pub fn set(&mut self, resource: impl Into<String>, state: ResourceState<SecretOutputs>) {
        self.resources.insert(resource.into(), state);
        self.updated_at = Utc::now();
    }

    pub fn remove(&mut self, resource: &str) -> Option<ResourceState<SecretOutputs>> {
        let removed = self.resources.remove(resource);
        if removed.is_some() {
            self.updated_at = Utc::now();
        }
        removed
    }
}

/// Loads and saves a [`StateFile`] at a fixed path
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> EngineError {
        EngineError::StateIo {
            path: self.path.clone(),
            source,
        }
    }

    /// Load the state; a missing file is an empty state
    pub async fn load(&self) -> Result<StateFile, EngineError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "State file not found, starting empty");
                return Ok(StateFile::default());
            }
            Err(err) => return Err(self.io_error(err)),
        };

        let state: StateFile =
            serde_json::from_str(&content).map_err(|source| EngineError::StateFormat {
                path: self.path.clone(),
                source,
            })?;

        if state.version > STATE_VERSION {
            return Err(EngineError::UnsupportedStateVersion {
                found: state.version,
                supported: STATE_VERSION,
            });
        }

        debug!(resources = state.resources.len(), "Loaded state");
        Ok(state)
    }

    /// Write the state atomically
    pub async fn save(&self, state: &StateFile) -> Result<(), EngineError> {
        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .map_err(|err| self.io_error(err))?;
        }

        let content =
            serde_json::to_string_pretty(state).map_err(|source| EngineError::StateFormat {
                path: self.path.clone(),
                source,
            })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, content)
            .await
            .map_err(|err| self.io_error(err))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|err| self.io_error(err))?;

        debug!(resources = state.resources.len(), path = %self.path.display(), "Saved state");
        Ok(())
    }
}
