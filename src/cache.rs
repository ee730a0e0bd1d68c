//! # Client Cache
//!
//! Maps a logical store name to a connected [`SecretStore`] client, creating
//! each client at most once for the lifetime of the cache.
//!
//! The cache is an explicit context object handed to the lifecycle provider,
//! so every test (or every CLI run) starts from a fresh one. It is
//! append-only: there is no eviction, and clients hold nothing but the shared
//! credential, which refreshes its own tokens.

use crate::auth::{DefaultCredential, TokenCredential};
use crate::config::ProviderConfig;
use crate::error::StoreError;
use crate::store::key_vault::build_http_client;
use crate::store::{InMemorySecretStore, KeyVaultClient, SecretStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;
use tracing::debug;

/// Builds a store client for a logical store name
pub trait StoreFactory: Send + Sync + std::fmt::Debug {
    fn create(&self, store_name: &str) -> Result<Arc<dyn SecretStore>, StoreError>;
}

/// Key Vault clients sharing one credential chain and connection pool
#[derive(Debug)]
pub struct KeyVaultStoreFactory {
    config: ProviderConfig,
    credential: Arc<dyn TokenCredential>,
    http: reqwest::Client,
}

impl KeyVaultStoreFactory {
    pub fn new(
        config: ProviderConfig,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Self, StoreError> {
        let http = build_http_client(&config)?;
        Ok(Self {
            config,
            credential,
            http,
        })
    }

    /// Use the default credential chain for `config`
    pub fn from_config(config: ProviderConfig) -> Result<Self, StoreError> {
        let http = build_http_client(&config)?;
        let credential: Arc<dyn TokenCredential> =
            Arc::new(DefaultCredential::from_config(&config, &http));
        Ok(Self {
            config,
            credential,
            http,
        })
    }
}

impl StoreFactory for KeyVaultStoreFactory {
    fn create(&self, store_name: &str) -> Result<Arc<dyn SecretStore>, StoreError> {
        Ok(Arc::new(KeyVaultClient::with_http_client(
            self.http.clone(),
            store_name,
            Arc::clone(&self.credential),
            &self.config,
        )))
    }
}

/// Hands out [`InMemorySecretStore`]s, keeping a handle to each for inspection
#[derive(Debug, Default)]
pub struct InMemoryStoreFactory {
    stores: Mutex<HashMap<String, Arc<InMemorySecretStore>>>,
    created: AtomicUsize,
}

impl InMemoryStoreFactory {
    /// Pre-register a store (e.g. one with seeded state or fault injection)
    #[must_use]
    pub fn with_store(self, store: Arc<InMemorySecretStore>) -> Self {
        self.stores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(store.store_name().to_string(), store);
        self
    }

    /// The store registered under `store_name`, if any
    #[must_use]
    pub fn store(&self, store_name: &str) -> Option<Arc<InMemorySecretStore>> {
        self.stores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(store_name)
            .cloned()
    }

    /// Number of times [`StoreFactory::create`] ran
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl StoreFactory for InMemoryStoreFactory {
    fn create(&self, store_name: &str) -> Result<Arc<dyn SecretStore>, StoreError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let store: Arc<dyn SecretStore> = self
            .stores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(store_name.to_string())
            .or_insert_with(|| Arc::new(InMemorySecretStore::new(store_name)))
            .clone();
        Ok(store)
    }
}

/// Store-name keyed client cache
#[derive(Debug)]
pub struct ClientCache {
    factory: Arc<dyn StoreFactory>,
    clients: RwLock<HashMap<String, Arc<dyn SecretStore>>>,
}

impl ClientCache {
    pub fn new(factory: Arc<dyn StoreFactory>) -> Self {
        Self {
            factory,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Cached client for `store_name`, built on first use
    ///
    /// Two callers racing on a cold entry may both build a client; the first
    /// one inserted wins and the other is dropped.
    pub async fn get_client(&self, store_name: &str) -> Result<Arc<dyn SecretStore>, StoreError> {
        if let Some(client) = self.clients.read().await.get(store_name) {
            return Ok(Arc::clone(client));
        }

        let client = self.factory.create(store_name)?;
        let mut clients = self.clients.write().await;
        let cached = clients
            .entry(store_name.to_string())
            .or_insert_with(|| {
                debug!(vault.name = store_name, "Cached new store client");
                client
            });
        Ok(Arc::clone(cached))
    }

    /// Number of cached clients
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}
