//! Secret lifecycle provider semantics against the in-memory store

use keyvault_secret_provider::cache::{ClientCache, InMemoryStoreFactory};
use keyvault_secret_provider::error::{ProviderError, StoreError};
use keyvault_secret_provider::provider::secret::{
    RecoveryPolicy, SecretInputs, SecretOutputs, SecretProvider,
};
use keyvault_secret_provider::provider::ResourceProvider;
use keyvault_secret_provider::store::{InMemorySecretStore, RemoteState, StoreOperation};
use std::collections::BTreeMap;
use std::sync::Arc;

struct Harness {
    factory: Arc<InMemoryStoreFactory>,
    provider: SecretProvider,
}

impl Harness {
    fn new(stores: Vec<InMemorySecretStore>) -> Self {
        let factory = stores
            .into_iter()
            .fold(InMemoryStoreFactory::default(), |factory, store| {
                factory.with_store(Arc::new(store))
            });
        let factory = Arc::new(factory);
        let provider = SecretProvider::new(
            Arc::new(ClientCache::new(factory.clone())),
            RecoveryPolicy::immediate(5),
        );
        Self { factory, provider }
    }

    fn empty() -> Self {
        Self::new(Vec::new())
    }

    fn store(&self, name: &str) -> Arc<InMemorySecretStore> {
        self.factory.store(name).expect("store was never used")
    }
}

fn inputs(name: &str, value: &str) -> SecretInputs {
    SecretInputs::new("vault-a", name, value)
}

#[tokio::test]
async fn test_create_writes_value_and_defaults_content_type() {
    let harness = Harness::empty();

    let result = harness.provider.create(&inputs("db-pass", "v1")).await.unwrap();

    let record = harness.store("vault-a").peek("db-pass").unwrap();
    assert_eq!(result.id, record.id);
    assert_eq!(result.outputs.id, record.id);
    assert_eq!(result.outputs.inputs, inputs("db-pass", "v1"));
    assert_eq!(record.value.as_deref(), Some("v1"));
    assert_eq!(record.content_type.as_deref(), Some("db-pass"));
    assert!(record.enabled);
}

#[tokio::test]
async fn test_create_with_empty_value_writes_empty_secret() {
    let harness = Harness::empty();
    harness.provider.create(&inputs("empty", "")).await.unwrap();
    let record = harness.store("vault-a").peek("empty").unwrap();
    assert_eq!(record.value.as_deref(), Some(""));
}

#[tokio::test]
async fn test_create_twice_is_idempotent_apart_from_version() {
    let harness = Harness::empty();
    let desired = inputs("db-pass", "v1").with_content_type("text/plain");

    let first = harness.provider.create(&desired).await.unwrap();
    let second = harness.provider.create(&desired).await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(first.outputs.inputs, second.outputs.inputs);
    let record = harness.store("vault-a").peek("db-pass").unwrap();
    assert_eq!(record.value.as_deref(), Some("v1"));
    assert_eq!(record.content_type.as_deref(), Some("text/plain"));
}

#[tokio::test]
async fn test_create_recovers_soft_deleted_before_writing() {
    let store = InMemorySecretStore::new("vault-a").with_recovery_latency(2);
    store.seed_soft_deleted("X", "old");
    let harness = Harness::new(vec![store]);

    harness.provider.create(&inputs("X", "new")).await.unwrap();

    let store = harness.store("vault-a");
    assert_eq!(store.state("X"), RemoteState::Active);
    assert_eq!(store.peek("X").unwrap().value.as_deref(), Some("new"));

    let journal = store.journal();
    let recover = journal
        .iter()
        .position(|op| *op == StoreOperation::Recover("X".to_string()))
        .expect("recovery was not attempted");
    let set = journal
        .iter()
        .position(|op| *op == StoreOperation::Set("X".to_string()))
        .expect("value was not written");
    assert!(recover < set);
}

#[tokio::test]
async fn test_unrecoverable_secret_fails_without_writing() {
    let store = InMemorySecretStore::new("vault-a").with_unrecoverable("X");
    store.seed_soft_deleted("X", "old");
    let harness = Harness::new(vec![store]);

    let err = harness.provider.create(&inputs("X", "new")).await.unwrap_err();
    match err {
        ProviderError::Recovery {
            store,
            name,
            attempts,
            ..
        } => {
            assert_eq!(store, "vault-a");
            assert_eq!(name, "X");
            assert_eq!(attempts, 5);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!harness
        .store("vault-a")
        .journal()
        .contains(&StoreOperation::Set("X".to_string())));
}

#[tokio::test]
async fn test_transient_write_failure_is_store_unavailable_with_identity() {
    let store = InMemorySecretStore::new("vault-a");
    store.fail_sets(Some(StoreError::unavailable("503 Service Unavailable")));
    let harness = Harness::new(vec![store]);

    let err = harness.provider.create(&inputs("db-pass", "v1")).await.unwrap_err();
    assert!(matches!(err, ProviderError::StoreUnavailable { .. }));
    let message = err.to_string();
    assert!(message.contains("vault-a"));
    assert!(message.contains("db-pass"));
    assert!(message.contains("503 Service Unavailable"));
}

#[tokio::test]
async fn test_diff_detects_soft_deleted_record_with_unchanged_inputs() {
    let harness = Harness::empty();
    let created = harness.provider.create(&inputs("db-pass", "v1")).await.unwrap();

    let unchanged = harness
        .provider
        .diff(&created.id, &created.outputs, &inputs("db-pass", "v1"))
        .await
        .unwrap();
    assert!(!unchanged.changes);

    harness.store("vault-a").seed_soft_deleted("db-pass", "v1");
    let diff = harness
        .provider
        .diff(&created.id, &created.outputs, &inputs("db-pass", "v1"))
        .await
        .unwrap();
    assert!(diff.changes);
    assert!(!diff.replace);
    assert_eq!(diff.changed, vec!["softDeleted"]);
}

#[tokio::test]
async fn test_diff_compares_identity_value_and_content_type() {
    let harness = Harness::empty();
    let created = harness.provider.create(&inputs("db-pass", "v1")).await.unwrap();
    let outputs = &created.outputs;

    let cases = [
        (inputs("db-pass", "v2"), vec!["value"]),
        // The default content type follows the name
        (inputs("db-password", "v1"), vec!["name", "contentType"]),
        (SecretInputs::new("vault-b", "db-pass", "v1"), vec!["storeName"]),
        (
            inputs("db-pass", "v1").with_content_type("text/plain"),
            vec!["contentType"],
        ),
    ];
    for (next, expected) in cases {
        let diff = harness.provider.diff(&created.id, outputs, &next).await.unwrap();
        assert!(diff.changes, "{expected:?} change not detected");
        assert!(!diff.replace);
        assert_eq!(diff.changed, expected);
    }

    // An explicit content type equal to the default is not a change
    let same = inputs("db-pass", "v1").with_content_type("db-pass");
    assert!(!harness.provider.diff(&created.id, outputs, &same).await.unwrap().changes);
}

#[tokio::test]
async fn test_update_value_in_place_deletes_nothing() {
    let harness = Harness::empty();
    let created = harness.provider.create(&inputs("db-pass", "v1")).await.unwrap();

    let diff = harness
        .provider
        .diff(&created.id, &created.outputs, &inputs("db-pass", "v2"))
        .await
        .unwrap();
    assert!(diff.changes);
    assert!(!diff.replace);

    let updated = harness
        .provider
        .update(&created.id, &created.outputs, &inputs("db-pass", "v2"))
        .await
        .unwrap();
    assert_eq!(updated.outputs.inputs.value, "v2");
    assert_eq!(updated.outputs.inputs.name, "db-pass");
    assert_eq!(updated.outputs.inputs.store_name, "vault-a");

    let store = harness.store("vault-a");
    assert!(!store
        .journal()
        .iter()
        .any(|op| matches!(op, StoreOperation::Delete(_))));
    assert_eq!(store.peek("db-pass").unwrap().value.as_deref(), Some("v2"));
}

#[tokio::test]
async fn test_rename_writes_new_before_deleting_old() {
    let harness = Harness::empty();
    let created = harness.provider.create(&inputs("A", "v1")).await.unwrap();
    let store = harness.store("vault-a");
    store.clear_journal();

    harness
        .provider
        .update(&created.id, &created.outputs, &inputs("B", "v1"))
        .await
        .unwrap();

    assert_eq!(store.state("B"), RemoteState::Active);
    assert_eq!(store.state("A"), RemoteState::SoftDeleted);

    let writes: Vec<_> = store.journal().into_iter().filter(StoreOperation::is_write).collect();
    assert_eq!(
        writes,
        vec![
            StoreOperation::Set("B".to_string()),
            StoreOperation::Delete("A".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_store_move_deletes_from_old_store() {
    let harness = Harness::empty();
    let created = harness.provider.create(&inputs("db-pass", "v1")).await.unwrap();

    harness
        .provider
        .update(
            &created.id,
            &created.outputs,
            &SecretInputs::new("vault-b", "db-pass", "v1"),
        )
        .await
        .unwrap();

    assert_eq!(harness.store("vault-b").state("db-pass"), RemoteState::Active);
    assert_eq!(harness.store("vault-a").state("db-pass"), RemoteState::SoftDeleted);
}

#[tokio::test]
async fn test_rename_survives_cleanup_failure() {
    let harness = Harness::empty();
    let created = harness.provider.create(&inputs("A", "v1")).await.unwrap();
    let store = harness.store("vault-a");
    store.fail_deletes(Some(StoreError::unavailable("connection reset")));

    let updated = harness
        .provider
        .update(&created.id, &created.outputs, &inputs("B", "v1"))
        .await
        .unwrap();

    assert_eq!(updated.outputs.inputs.name, "B");
    assert_eq!(store.state("B"), RemoteState::Active);
    assert_eq!(store.state("A"), RemoteState::Active);
}

#[tokio::test]
async fn test_frozen_update_performs_no_writes() {
    let harness = Harness::empty();
    let created = harness.provider.create(&inputs("db-pass", "v1")).await.unwrap();
    let store = harness.store("vault-a");
    store.clear_journal();

    let next = inputs("db-pass", "v2").frozen();
    let updated = harness
        .provider
        .update(&created.id, &created.outputs, &next)
        .await
        .unwrap();

    assert_eq!(store.writes(), 0);
    assert_eq!(updated.id, created.id);
    assert_eq!(
        updated.outputs,
        SecretOutputs {
            id: created.id.clone(),
            inputs: next,
        }
    );
    assert_eq!(store.peek("db-pass").unwrap().value.as_deref(), Some("v1"));
}

#[tokio::test]
async fn test_frozen_update_keeps_previous_content_type_and_tags() {
    let harness = Harness::empty();
    let tags = BTreeMap::from([("team".to_string(), "payments".to_string())]);
    let created = harness
        .provider
        .create(
            &inputs("db-pass", "v1")
                .with_content_type("text/plain")
                .with_tags(tags.clone()),
        )
        .await
        .unwrap();
    let store = harness.store("vault-a");
    store.clear_journal();

    let updated = harness
        .provider
        .update(&created.id, &created.outputs, &inputs("db-pass", "v2").frozen())
        .await
        .unwrap();

    assert_eq!(store.writes(), 0);
    assert_eq!(updated.outputs.inputs.content_type.as_deref(), Some("text/plain"));
    assert_eq!(updated.outputs.inputs.tags, tags);
    assert!(updated.outputs.inputs.ignore_change);
    assert_eq!(store.peek("db-pass").unwrap().content_type.as_deref(), Some("text/plain"));

    let diff = harness
        .provider
        .diff(&updated.id, &updated.outputs, &updated.outputs.inputs)
        .await
        .unwrap();
    assert!(!diff.changes);
}

#[tokio::test]
async fn test_case_only_rename_deletes_nothing() {
    let harness = Harness::empty();
    let created = harness.provider.create(&inputs("DbPass", "v1")).await.unwrap();
    let store = harness.store("vault-a");
    store.clear_journal();

    let updated = harness
        .provider
        .update(&created.id, &created.outputs, &inputs("dbpass", "v1"))
        .await
        .unwrap();

    assert_eq!(updated.outputs.inputs.name, "dbpass");
    assert!(!store
        .journal()
        .iter()
        .any(|op| matches!(op, StoreOperation::Delete(_))));
    assert_eq!(store.state("DbPass"), RemoteState::Active);
}

#[tokio::test]
async fn test_previously_frozen_secret_stays_frozen() {
    let harness = Harness::empty();
    let created = harness
        .provider
        .create(&inputs("db-pass", "v1").frozen())
        .await
        .unwrap();
    let store = harness.store("vault-a");
    store.clear_journal();

    harness
        .provider
        .update(&created.id, &created.outputs, &inputs("renamed", "v2"))
        .await
        .unwrap();
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn test_delete_of_absent_secret_succeeds() {
    let harness = Harness::empty();
    let outputs = SecretOutputs {
        id: "https://vault-a.vault.azure.net/secrets/gone/1".to_string(),
        inputs: inputs("gone", "v1"),
    };
    harness.provider.delete(&outputs.id, &outputs).await.unwrap();
}

#[tokio::test]
async fn test_delete_swallows_store_failures() {
    let harness = Harness::empty();
    let created = harness.provider.create(&inputs("db-pass", "v1")).await.unwrap();
    harness
        .store("vault-a")
        .fail_deletes(Some(StoreError::from_status(403, "Forbidden")));

    harness
        .provider
        .delete(&created.id, &created.outputs)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_soft_deletes_active_secret() {
    let harness = Harness::empty();
    let created = harness.provider.create(&inputs("db-pass", "v1")).await.unwrap();
    harness
        .provider
        .delete(&created.id, &created.outputs)
        .await
        .unwrap();
    assert_eq!(harness.store("vault-a").state("db-pass"), RemoteState::SoftDeleted);
}

#[tokio::test]
async fn test_example_scenario() {
    let harness = Harness::empty();

    let created = harness.provider.create(&inputs("db-pass", "v1")).await.unwrap();
    assert!(created
        .id
        .starts_with("https://vault-a.vault.azure.net/secrets/db-pass/"));
    assert_eq!(created.outputs.inputs.value, "v1");

    let next = inputs("db-pass", "v2");
    let diff = harness
        .provider
        .diff(&created.id, &created.outputs, &next)
        .await
        .unwrap();
    assert!(diff.changes && !diff.replace);

    let updated = harness
        .provider
        .update(&created.id, &created.outputs, &next)
        .await
        .unwrap();
    assert_eq!(updated.outputs.inputs.value, "v2");
    assert_eq!(updated.outputs.identity(), created.outputs.identity());
    assert_eq!(harness.store("vault-a").writes(), 2);
}
