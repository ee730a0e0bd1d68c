//! Desired state as YAML
//!
//! ```yaml
//! secrets:
//!   - name: app.db.password
//!     storeName: vault-a
//!     valueFromEnv: DB_PASSWORD
//!     tags:
//!       team: payments
//!   - name: feature-flags
//!     resource: flags
//!     storeName: vault-a
//!     value: '{"beta": true}'
//!     contentType: application/json
//!     ignoreChange: true
//! ```

use crate::error::EngineError;
use crate::facade::PublishRequest;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub secrets: Vec<ManifestSecret>,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ManifestSecret {
    pub name: String,
    /// Stable key in state; renaming `name` under the same key updates in place
    #[serde(default)]
    pub resource: Option<String>,
    pub store_name: String,
    #[serde(default)]
    pub value: Option<String>,
    /// Read the value from this environment variable
    #[serde(default)]
    pub value_from_env: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub ignore_change: bool,
}

impl std::fmt::Debug for ManifestSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestSecret")
            .field("name", &self.name)
            .field("resource", &self.resource)
            .field("store_name", &self.store_name)
            .field("value_from_env", &self.value_from_env)
            .finish_non_exhaustive()
    }
}

impl Manifest {
    pub fn from_yaml_str(content: &str) -> Result<Self, EngineError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub async fn from_path(path: &Path) -> Result<Self, EngineError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|err| {
            EngineError::Manifest(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Resolve values and build one publish request per entry
    ///
    /// `lookup` resolves `valueFromEnv` (the process environment in the CLI).
    pub fn into_requests<F>(self, lookup: F) -> Result<Vec<PublishRequest>, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.secrets
            .into_iter()
            .map(|secret| {
                let value = match (secret.value, secret.value_from_env) {
                    (Some(_), Some(_)) => {
                        return Err(EngineError::Manifest(format!(
                            "secret {}: value and valueFromEnv are mutually exclusive",
                            secret.name
                        )));
                    }
                    (Some(value), None) => value,
                    (None, Some(var)) => lookup(&var).ok_or_else(|| {
                        EngineError::Manifest(format!(
                            "secret {}: environment variable {var} is not set",
                            secret.name
                        ))
                    })?,
                    (None, None) => String::new(),
                };

                Ok(PublishRequest {
                    name: secret.name,
                    value,
                    store_name: secret.store_name,
                    content_type: secret.content_type,
                    tags: secret.tags,
                    ignore_change: secret.ignore_change,
                    resource_name: secret.resource,
                })
            })
            .collect()
    }
}
