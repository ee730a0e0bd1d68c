//! Credential sources against the mock identity endpoints

mod common;

use common::{MockKeyVault, MOCK_CLIENT_SECRET, MOCK_IDENTITY_HEADER, MOCK_TOKEN};
use keyvault_secret_provider::auth::{
    ClientSecretCredential, DefaultCredential, ManagedIdentityCredential, TokenCredential,
};
use keyvault_secret_provider::config::{ClientSecretConfig, ManagedIdentityConfig, ProviderConfig};
use keyvault_secret_provider::constants::DEFAULT_KEY_VAULT_SCOPE;
use keyvault_secret_provider::cache::{ClientCache, KeyVaultStoreFactory};
use keyvault_secret_provider::error::{AuthError, ProviderError, StoreErrorKind};
use keyvault_secret_provider::provider::secret::{RecoveryPolicy, SecretInputs, SecretProvider};
use keyvault_secret_provider::provider::ResourceProvider;
use keyvault_secret_provider::store::{KeyVaultClient, SecretStore, SetSecretParameters};
use std::sync::Arc;
use zeroize::Zeroizing;

fn client_secret(secret: &str) -> ClientSecretConfig {
    ClientSecretConfig {
        tenant_id: "tenant".to_string(),
        client_id: "client".to_string(),
        client_secret: Zeroizing::new(secret.to_string()),
    }
}

#[tokio::test]
async fn test_client_secret_credential() {
    let mock = MockKeyVault::start().await;
    let credential = ClientSecretCredential::new(
        reqwest::Client::new(),
        &mock.authority_host(),
        client_secret(MOCK_CLIENT_SECRET),
    );

    let token = credential.get_token(&[DEFAULT_KEY_VAULT_SCOPE]).await.unwrap();
    assert_eq!(token.token.as_str(), MOCK_TOKEN);
    assert!(token.expires_on > chrono::Utc::now() + chrono::Duration::minutes(50));
}

#[tokio::test]
async fn test_client_secret_rejected() {
    let mock = MockKeyVault::start().await;
    let credential = ClientSecretCredential::new(
        reqwest::Client::new(),
        &mock.authority_host(),
        client_secret("wrong"),
    );

    match credential.get_token(&[DEFAULT_KEY_VAULT_SCOPE]).await.unwrap_err() {
        AuthError::Unauthorized { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("invalid_client"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_app_service_managed_identity() {
    let mock = MockKeyVault::start().await;
    let credential = ManagedIdentityCredential::new(
        reqwest::Client::new(),
        ManagedIdentityConfig {
            endpoint: Some(mock.identity_endpoint()),
            header: Some(Zeroizing::new(MOCK_IDENTITY_HEADER.to_string())),
            client_id: None,
        },
    );

    let token = credential.get_token(&[DEFAULT_KEY_VAULT_SCOPE]).await.unwrap();
    assert_eq!(token.token.as_str(), MOCK_TOKEN);
    assert!(token.expires_on > chrono::Utc::now());
}

#[tokio::test]
async fn test_imds_managed_identity() {
    let mock = MockKeyVault::start().await;
    let credential =
        ManagedIdentityCredential::new(reqwest::Client::new(), ManagedIdentityConfig::default())
            .with_imds_endpoint(mock.imds_endpoint());

    let token = credential.get_token(&[DEFAULT_KEY_VAULT_SCOPE]).await.unwrap();
    assert_eq!(token.token.as_str(), MOCK_TOKEN);
}

#[tokio::test]
async fn test_chain_falls_through_to_managed_identity() {
    let mock = MockKeyVault::start().await;
    let http = reqwest::Client::new();
    let sources: Vec<Arc<dyn TokenCredential>> = vec![
        Arc::new(ClientSecretCredential::new(
            http.clone(),
            &mock.authority_host(),
            client_secret("wrong"),
        )),
        Arc::new(
            ManagedIdentityCredential::new(http, ManagedIdentityConfig::default())
                .with_imds_endpoint(mock.imds_endpoint()),
        ),
    ];
    let chain = DefaultCredential::new(sources);

    let token = chain.get_token(&[DEFAULT_KEY_VAULT_SCOPE]).await.unwrap();
    assert_eq!(token.token.as_str(), MOCK_TOKEN);
}

#[tokio::test]
async fn test_chain_reports_every_failed_source() {
    let mock = MockKeyVault::start().await;
    let http = reqwest::Client::new();
    let sources: Vec<Arc<dyn TokenCredential>> = vec![
        Arc::new(ClientSecretCredential::new(
            http.clone(),
            &mock.authority_host(),
            client_secret("wrong"),
        )),
        Arc::new(ManagedIdentityCredential::new(
            http,
            ManagedIdentityConfig {
                endpoint: Some(mock.identity_endpoint()),
                header: Some(Zeroizing::new("bad-header".to_string())),
                client_id: None,
            },
        )),
    ];
    let chain = DefaultCredential::new(sources);

    match chain.get_token(&[DEFAULT_KEY_VAULT_SCOPE]).await.unwrap_err() {
        AuthError::NoCredential { attempts } => {
            assert_eq!(attempts.len(), 2);
            assert!(attempts[0].starts_with("client secret"));
            assert!(attempts[1].starts_with("managed identity"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_configured_chain_authenticates_store_calls() {
    let mock = MockKeyVault::start().await;
    let config = ProviderConfig {
        client_secret: Some(client_secret(MOCK_CLIENT_SECRET)),
        authority_host: mock.authority_host(),
        enable_developer_credential: false,
        ..ProviderConfig::default()
    };
    let http = reqwest::Client::new();
    let credential: Arc<dyn TokenCredential> =
        Arc::new(DefaultCredential::from_config(&config, &http));
    let client = KeyVaultClient::new(&mock.base_url, credential, &config).unwrap();

    client
        .set_secret("db-pass", &SetSecretParameters::new("v1"))
        .await
        .unwrap();
    assert_eq!(mock.active_value("db-pass").as_deref(), Some("v1"));
}

#[tokio::test]
async fn test_store_call_without_credential_is_auth_error() {
    let mock = MockKeyVault::start().await;
    let credential: Arc<dyn TokenCredential> = Arc::new(DefaultCredential::new(Vec::new()));
    let client = KeyVaultClient::new(&mock.base_url, credential, &ProviderConfig::default()).unwrap();

    let err = client.get_secret("db-pass").await.unwrap_err();
    assert_eq!(err.kind, StoreErrorKind::Auth);
    assert!(matches!(err.auth, Some(AuthError::NoCredential { .. })));
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn test_create_without_credential_is_auth_error() {
    let mock = MockKeyVault::start().await;
    let credential: Arc<dyn TokenCredential> = Arc::new(DefaultCredential::new(Vec::new()));
    let factory = KeyVaultStoreFactory::new(ProviderConfig::default(), credential).unwrap();
    let provider = SecretProvider::new(
        Arc::new(ClientCache::new(Arc::new(factory))),
        RecoveryPolicy::immediate(1),
    );

    let err = provider
        .create(&SecretInputs::new(mock.base_url.clone(), "db-pass", "v1"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, ProviderError::Auth(AuthError::NoCredential { .. })),
        "unexpected error: {err}"
    );
    assert!(mock.active_value("db-pass").is_none());
}
