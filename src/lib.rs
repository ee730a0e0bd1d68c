//! Key Vault Secret Provider Library
//!
//! A custom reconciliation provider that manages Azure Key Vault secrets on
//! behalf of a declarative provisioning engine, including recovery of
//! soft-deleted names before a write.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keyvault_secret_provider::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = ProviderConfig::from_env();
//! let factory = Arc::new(KeyVaultStoreFactory::from_config(config.clone())?);
//! let cache = Arc::new(ClientCache::new(factory));
//! let provider = Arc::new(SecretProvider::new(cache, config.recovery_policy()));
//!
//! let facade = SecretFacade::new(provider);
//! let resource = facade.publish(PublishRequest::new("vault-a", "app.db.password", "s3cret"));
//! let outcome = resource.apply(None).await?;
//! println!("{} -> {}", outcome.action, outcome.state.id);
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! - [`auth`]: credential chain producing bearer tokens
//! - [`store`]: primitive secret store operations (Key Vault REST, in-memory)
//! - [`cache`]: per-context store client cache
//! - [`provider`]: Provider Contract and the secret lifecycle provider
//! - [`facade`]: name normalization and resource construction
//! - [`engine`]: plan / apply / destroy over a state file

pub mod auth;
pub mod cache;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod facade;
pub mod observability;
pub mod prelude;
pub mod provider;
pub mod store;
