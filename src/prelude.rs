//! # Prelude
//!
//! Re-exports commonly used types and traits.
//!
//! ```rust
//! use keyvault_secret_provider::prelude::*;
//! ```

// Provider contract and the secret provider
pub use crate::provider::secret::{
    BestEffortDelete, RecoveryPolicy, SecretIdentity, SecretInputs, SecretOutputs, SecretProvider,
};
pub use crate::provider::{Action, Resource, ResourceProvider, ResourceState};

// Stores and the client cache
pub use crate::cache::{ClientCache, InMemoryStoreFactory, KeyVaultStoreFactory, StoreFactory};
pub use crate::store::{InMemorySecretStore, KeyVaultClient, SecretStore};

// Credentials
pub use crate::auth::{DefaultCredential, TokenCredential};

// Entry points
pub use crate::engine::{Engine, Manifest, StateStore};
pub use crate::facade::{normalize_secret_name, PublishRequest, SecretFacade};

// Configuration and errors
pub use crate::config::ProviderConfig;
pub use crate::error::{AuthError, EngineError, ProviderError, StoreError, StoreErrorKind};
