//! Graph node wrapper: one logical resource, its desired inputs and the
//! provider that reconciles it.

use super::{ProviderError, ResourceProvider};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Persisted observed state of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceState<O> {
    pub id: String,
    pub outputs: O,
    pub updated_at: DateTime<Utc>,
}

impl<O> ResourceState<O> {
    pub fn new(id: impl Into<String>, outputs: O) -> Self {
        Self {
            id: id.into(),
            outputs,
            updated_at: Utc::now(),
        }
    }
}

/// What reconciling a resource did (or would do)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Replace,
    Delete,
    NoOp,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::NoOp => "no-op",
        };
        f.pad(label)
    }
}

#[derive(Debug, Clone)]
pub struct ApplyOutcome<O> {
    pub action: Action,
    pub state: ResourceState<O>,
}

/// A resource node
pub struct Resource<P: ResourceProvider> {
    name: String,
    inputs: P::Inputs,
    provider: Arc<P>,
}

impl<P: ResourceProvider> fmt::Debug for Resource<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("type", &self.provider.type_name())
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<P: ResourceProvider> Resource<P> {
    pub fn new(name: impl Into<String>, inputs: P::Inputs, provider: Arc<P>) -> Self {
        Self {
            name: name.into(),
            inputs,
            provider,
        }
    }

    /// Logical name, the key in persisted state
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn inputs(&self) -> &P::Inputs {
        &self.inputs
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Decide what [`Resource::apply`] would do, without writing anything
    pub async fn plan(
        &self,
        prior: Option<&ResourceState<P::Outputs>>,
    ) -> Result<(Action, Vec<String>), ProviderError> {
        let previous = prior.and_then(|prior| self.provider.prior_inputs(&prior.outputs));
        self.provider
            .check(previous.as_ref(), &self.inputs)
            .await
            .into_result()?;

        let Some(prior) = prior else {
            return Ok((Action::Create, Vec::new()));
        };
        let diff = self
            .provider
            .diff(&prior.id, &prior.outputs, &self.inputs)
            .await?;
        let action = match (diff.changes, diff.replace) {
            (false, _) => Action::NoOp,
            (true, true) => Action::Replace,
            (true, false) => Action::Update,
        };
        Ok((action, diff.changed))
    }

    /// Reconcile the remote record against the desired inputs
    ///
    /// Replacement creates the new record before deleting the old one.
    pub async fn apply(
        &self,
        prior: Option<&ResourceState<P::Outputs>>,
    ) -> Result<ApplyOutcome<P::Outputs>, ProviderError> {
        let (action, changed) = self.plan(prior).await?;
        debug!(
            resource = %self.name,
            resource.type = self.provider.type_name(),
            %action,
            ?changed,
            "Planned resource"
        );

        let state = match (action, prior) {
            (Action::NoOp, Some(prior)) => prior.clone(),
            (Action::Update, Some(prior)) => {
                let result = self
                    .provider
                    .update(&prior.id, &prior.outputs, &self.inputs)
                    .await?;
                ResourceState::new(result.id, result.outputs)
            }
            (Action::Replace, Some(prior)) => {
                let result = self.provider.create(&self.inputs).await?;
                self.provider.delete(&prior.id, &prior.outputs).await?;
                ResourceState::new(result.id, result.outputs)
            }
            _ => {
                let result = self.provider.create(&self.inputs).await?;
                ResourceState::new(result.id, result.outputs)
            }
        };

        if action != Action::NoOp {
            info!(resource = %self.name, %action, id = %state.id, "Applied resource");
        }
        Ok(ApplyOutcome { action, state })
    }

    /// Delete the remote record behind `state`
    pub async fn destroy(&self, state: &ResourceState<P::Outputs>) -> Result<(), ProviderError> {
        destroy(&*self.provider, &self.name, state).await
    }
}

/// Delete a resource known only from persisted state
pub async fn destroy<P: ResourceProvider>(
    provider: &P,
    name: &str,
    state: &ResourceState<P::Outputs>,
) -> Result<(), ProviderError> {
    provider.delete(&state.id, &state.outputs).await?;
    info!(resource = %name, id = %state.id, "Destroyed resource");
    Ok(())
}
