//! # Provider Contract
//!
//! The operation set a custom, externally reconciled resource type exposes to
//! whatever drives it (the [`crate::engine`] harness, a test, a host engine).
//!
//! | operation | decides / does |
//! |-----------|----------------|
//! | `check`   | validate inputs before anything touches the store |
//! | `diff`    | no-op, in-place update or replace |
//! | `create`  | write a new remote record |
//! | `read`    | refresh outputs from the remote record |
//! | `update`  | move an existing record to new inputs |
//! | `delete`  | remove the remote record; already-gone is success |
//!
//! Every operation works on plain data. Nothing is held between calls except
//! what the caller persists as [`ResourceState`].

mod resource;
pub mod secret;

pub use resource::{destroy, Action, ApplyOutcome, Resource, ResourceState};

use crate::error::ProviderError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One rejected input property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckFailure {
    pub property: String,
    pub reason: String,
}

impl CheckFailure {
    pub fn new(property: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.property, self.reason)
    }
}

/// Result of `check`; empty `failures` means valid
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckResult {
    pub failures: Vec<CheckFailure>,
}

impl CheckResult {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }

    /// `Err(ProviderError::Validation)` when any property was rejected
    pub fn into_result(self) -> Result<(), ProviderError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ProviderError::Validation(self.failures))
        }
    }
}

/// Result of `diff`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    pub changes: bool,
    pub replace: bool,
    /// Properties that differ, for plan output
    pub changed: Vec<String>,
}

/// Result of `create` and `update`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateResult<O> {
    pub id: String,
    pub outputs: O,
}

pub type UpdateResult<O> = CreateResult<O>;

/// A custom resource type
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    type Inputs: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync;
    type Outputs: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync;

    /// Resource type name used in logs and plan output
    fn type_name(&self) -> &'static str;

    /// Inputs the persisted `outputs` were produced from, handed to `check`
    /// as `previous`; `None` unless overridden
    fn prior_inputs(&self, _outputs: &Self::Outputs) -> Option<Self::Inputs> {
        None
    }

    /// Validate `next` against the inputs recovered by `prior_inputs`; every
    /// input is accepted unless overridden
    async fn check(&self, _previous: Option<&Self::Inputs>, _next: &Self::Inputs) -> CheckResult {
        CheckResult::default()
    }

    async fn diff(
        &self,
        id: &str,
        previous: &Self::Outputs,
        next: &Self::Inputs,
    ) -> Result<DiffResult, ProviderError>;

    async fn create(&self, next: &Self::Inputs)
        -> Result<CreateResult<Self::Outputs>, ProviderError>;

    /// Outputs are returned unchanged unless overridden
    async fn read(&self, _id: &str, outputs: &Self::Outputs) -> Result<Self::Outputs, ProviderError> {
        Ok(outputs.clone())
    }

    async fn update(
        &self,
        id: &str,
        previous: &Self::Outputs,
        next: &Self::Inputs,
    ) -> Result<UpdateResult<Self::Outputs>, ProviderError>;

    /// Must succeed when the remote record is already gone
    async fn delete(&self, id: &str, outputs: &Self::Outputs) -> Result<(), ProviderError>;
}
