//! # Orchestration Harness
//!
//! Drives the Provider Contract the way a host provisioning engine would:
//! desired resources come from publish requests, observed state from a
//! [`StateStore`].
//!
//! - `plan` diffs desired against state and reports what `apply` would do
//! - `apply` reconciles every desired resource (distinct identities run
//!   concurrently), then deletes resources that are in state but no longer
//!   desired. State is saved even when some resources fail.
//! - `destroy` deletes everything in state
//!
//! One logical resource is never touched by two operations at once, and a
//! secret still claimed by a desired resource is never deleted: an orphaned
//! state entry for it is dropped without touching the store, and a rename
//! away from it is rejected.

mod manifest;
mod state;

pub use manifest::{Manifest, ManifestSecret};
pub use state::{StateFile, StateStore};

use crate::error::EngineError;
use crate::facade::{PublishRequest, SecretFacade};
use crate::provider::secret::{SecretIdentity, SecretProvider};
use crate::provider::{destroy, Action, Resource};
use futures::future::join_all;
use std::collections::BTreeSet;
use tracing::{error, info, info_span, Instrument};

/// One line of a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChange {
    pub resource: String,
    pub action: Action,
    /// Properties that differ
    pub changed: Vec<String>,
}

/// What happened to one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReport {
    pub resource: String,
    pub action: Action,
    pub id: Option<String>,
}

/// A resource that failed; its previous state is kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFailure {
    pub resource: String,
    pub action: Action,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub applied: Vec<ResourceReport>,
    pub failed: Vec<ResourceFailure>,
}

impl RunReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Resources whose action was not a no-op
    #[must_use]
    pub fn changed(&self) -> usize {
        self.applied
            .iter()
            .filter(|report| report.action != Action::NoOp)
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct Engine {
    facade: SecretFacade,
    state: StateStore,
}

impl Engine {
    pub fn new(facade: SecretFacade, state: StateStore) -> Self {
        Self { facade, state }
    }

    #[must_use]
    pub fn state_store(&self) -> &StateStore {
        &self.state
    }

    /// Build resource nodes, rejecting duplicate resource names or identities
    fn resources(
        &self,
        requests: Vec<PublishRequest>,
    ) -> Result<Vec<Resource<SecretProvider>>, EngineError> {
        let mut names = BTreeSet::new();
        let mut identities = BTreeSet::new();
        let mut resources = Vec::with_capacity(requests.len());

        for request in requests {
            let resource = self.facade.publish(request);
            if !names.insert(resource.name().to_string()) {
                return Err(EngineError::Duplicate(resource.name().to_string()));
            }
            let identity = resource.inputs().identity();
            if !identities.insert(identity.folded()) {
                return Err(EngineError::Duplicate(identity.to_string()));
            }
            resources.push(resource);
        }
        Ok(resources)
    }

    /// What `apply` would do
    pub async fn plan(
        &self,
        requests: Vec<PublishRequest>,
    ) -> Result<Vec<PlannedChange>, EngineError> {
        let resources = self.resources(requests)?;
        let state = self.state.load().await?;
        let claims = claims(&resources);
        check_handoffs(&state, &resources, &claims)?;

        let plans = join_all(resources.iter().map(|resource| {
            let prior = state.get(resource.name());
            async move {
                resource
                    .plan(prior)
                    .await
                    .map(|(action, changed)| PlannedChange {
                        resource: resource.name().to_string(),
                        action,
                        changed,
                    })
                    .map_err(|source| EngineError::Provider {
                        resource: resource.name().to_string(),
                        source,
                    })
            }
        }))
        .await;

        let mut changes = plans.into_iter().collect::<Result<Vec<_>, _>>()?;
        let retained = retained(&claims);
        changes.extend(orphans(&state, &resources).map(|resource| {
            let handed_over = state
                .get(&resource)
                .is_some_and(|prior| retained.contains(&prior.outputs.identity().folded()));
            PlannedChange {
                resource,
                action: Action::Delete,
                changed: if handed_over {
                    vec!["handedOver".to_string()]
                } else {
                    Vec::new()
                },
            }
        }));
        Ok(changes)
    }

    /// Reconcile desired resources, then delete orphans
    pub async fn apply(&self, requests: Vec<PublishRequest>) -> Result<RunReport, EngineError> {
        let resources = self.resources(requests)?;
        let mut state = self.state.load().await?;
        let claims = claims(&resources);
        check_handoffs(&state, &resources, &claims)?;
        let mut report = RunReport::default();

        let outcomes = join_all(resources.iter().map(|resource| {
            let prior = state.get(resource.name()).cloned();
            let span = info_span!("engine.apply", resource = %resource.name());
            async move {
                let expected = if prior.is_some() {
                    Action::Update
                } else {
                    Action::Create
                };
                (
                    resource.name().to_string(),
                    expected,
                    resource.apply(prior.as_ref()).await,
                )
            }
            .instrument(span)
        }))
        .await;

        for (resource, expected, outcome) in outcomes {
            match outcome {
                Ok(outcome) => {
                    report.applied.push(ResourceReport {
                        resource: resource.clone(),
                        action: outcome.action,
                        id: Some(outcome.state.id.clone()),
                    });
                    state.set(resource, outcome.state);
                }
                Err(err) => {
                    error!(resource = %resource, error = %err, "Failed to apply resource");
                    report.failed.push(ResourceFailure {
                        resource,
                        action: expected,
                        error: err.to_string(),
                    });
                }
            }
        }

        let orphaned: Vec<String> = orphans(&state, &resources).collect();
        self.delete_all(&mut state, orphaned, &retained(&claims), &mut report)
            .await;

        self.state.save(&state).await?;
        info!(
            changed = report.changed(),
            failed = report.failed.len(),
            "Apply finished"
        );
        Ok(report)
    }

    /// Apply one request without touching any other resource in state
    pub async fn publish(&self, request: PublishRequest) -> Result<ResourceReport, EngineError> {
        let resource = self.facade.publish(request);
        let mut state = self.state.load().await?;

        // Every other resource in state stays managed
        let mut claims: Vec<(String, SecretIdentity)> = state
            .resources
            .iter()
            .filter(|(name, _)| name.as_str() != resource.name())
            .map(|(name, prior)| (name.clone(), prior.outputs.identity()))
            .collect();
        let identity = resource.inputs().identity();
        if let Some((owner, _)) = claims.iter().find(|(_, id)| id.is_same_secret(&identity)) {
            return Err(EngineError::Duplicate(format!(
                "{identity} is already managed by resource {owner}"
            )));
        }
        claims.push((resource.name().to_string(), identity));
        check_handoffs(&state, std::slice::from_ref(&resource), &claims)?;

        let outcome = resource
            .apply(state.get(resource.name()))
            .await
            .map_err(|source| EngineError::Provider {
                resource: resource.name().to_string(),
                source,
            })?;

        let report = ResourceReport {
            resource: resource.name().to_string(),
            action: outcome.action,
            id: Some(outcome.state.id.clone()),
        };
        state.set(resource.name(), outcome.state);
        self.state.save(&state).await?;
        Ok(report)
    }

    /// Delete every resource in state
    pub async fn destroy(&self) -> Result<RunReport, EngineError> {
        let mut state = self.state.load().await?;
        let mut report = RunReport::default();

        let all: Vec<String> = state.resources.keys().cloned().collect();
        self.delete_all(&mut state, all, &BTreeSet::new(), &mut report)
            .await;

        self.state.save(&state).await?;
        info!(
            deleted = report.applied.len(),
            failed = report.failed.len(),
            "Destroy finished"
        );
        Ok(report)
    }

    /// Delete `names` from the store and from state
    ///
    /// Entries whose secret is in `retained` (case-folded) belong to another
    /// resource now; they only leave state.
    async fn delete_all(
        &self,
        state: &mut StateFile,
        names: Vec<String>,
        retained: &BTreeSet<SecretIdentity>,
        report: &mut RunReport,
    ) {
        let provider: &SecretProvider = self.facade.provider();

        let (handed_over, names): (Vec<String>, Vec<String>) =
            names.into_iter().partition(|name| {
                state
                    .get(name)
                    .is_some_and(|prior| retained.contains(&prior.outputs.identity().folded()))
            });
        for name in handed_over {
            info!(resource = %name, "Secret is managed by another resource, dropping state only");
            state.remove(&name);
            report.applied.push(ResourceReport {
                resource: name,
                action: Action::Delete,
                id: None,
            });
        }

        let results = join_all(names.into_iter().filter_map(|name| {
            let prior = state.get(&name)?.clone();
            Some(async move {
                let result = destroy(provider, &name, &prior).await;
                (name, result)
            })
        }))
        .await;

        for (name, result) in results {
            match result {
                Ok(()) => {
                    state.remove(&name);
                    report.applied.push(ResourceReport {
                        resource: name,
                        action: Action::Delete,
                        id: None,
                    });
                }
                Err(err) => {
                    error!(resource = %name, error = %err, "Failed to delete resource");
                    report.failed.push(ResourceFailure {
                        resource: name,
                        action: Action::Delete,
                        error: err.to_string(),
                    });
                }
            }
        }
    }
}

/// Resource name and identity of every desired resource
fn claims(resources: &[Resource<SecretProvider>]) -> Vec<(String, SecretIdentity)> {
    resources
        .iter()
        .map(|resource| (resource.name().to_string(), resource.inputs().identity()))
        .collect()
}

fn retained(claims: &[(String, SecretIdentity)]) -> BTreeSet<SecretIdentity> {
    claims.iter().map(|(_, identity)| identity.folded()).collect()
}

/// Reject a rename whose old secret is claimed by another resource
///
/// The rename's cleanup would soft-delete the claimed secret. Frozen
/// resources never clean up, so they may hand a secret over.
fn check_handoffs(
    state: &StateFile,
    resources: &[Resource<SecretProvider>],
    claims: &[(String, SecretIdentity)],
) -> Result<(), EngineError> {
    for resource in resources {
        let Some(prior) = state.get(resource.name()) else {
            continue;
        };
        let old = prior.outputs.identity();
        if old.is_same_secret(&resource.inputs().identity())
            || prior.outputs.inputs.ignore_change
            || resource.inputs().ignore_change
        {
            continue;
        }
        if let Some((claimant, _)) = claims
            .iter()
            .find(|(name, identity)| name != resource.name() && identity.is_same_secret(&old))
        {
            return Err(EngineError::Handoff {
                resource: resource.name().to_string(),
                secret: old.to_string(),
                claimant: claimant.clone(),
            });
        }
    }
    Ok(())
}

/// Resources in state that are not desired
fn orphans<'a>(
    state: &'a StateFile,
    resources: &'a [Resource<SecretProvider>],
) -> impl Iterator<Item = String> + 'a {
    state
        .resources
        .keys()
        .filter(|name| !resources.iter().any(|r| r.name() == name.as_str()))
        .cloned()
}
