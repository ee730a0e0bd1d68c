//! # Secret Operations
//!
//! [`SecretStore`] implementation for the Key Vault REST API.

use super::requests::SetSecretRequest;
use super::responses::{DeletedSecretBundle, DeletedSecretListResult, SecretBundle};
use super::{handle_error_response, parse_json, KeyVaultClient, OperationTracker};
use crate::error::StoreError;
use crate::store::{DeletedSecretRecord, SecretRecord, SecretStore, SetSecretParameters};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use tracing::{debug, field, info, info_span, Instrument};

const NO_BODY: Option<&()> = None;

#[async_trait]
impl SecretStore for KeyVaultClient {
    fn store_name(&self) -> &str {
        &self.store_name
    }

    async fn get_secret(&self, name: &str) -> Result<Option<SecretRecord>, StoreError> {
        let span = info_span!(
            "keyvault.secret.get",
            secret.name = name,
            vault.name = %self.store_name,
            operation.duration_ms = field::Empty,
            operation.success = field::Empty,
            error.message = field::Empty,
        );
        let tracker = OperationTracker::new("get", span.clone());

        async {
            let result = async {
                let response = self
                    .make_request(Method::GET, &format!("secrets/{name}"), NO_BODY)
                    .await?;
                match response.status() {
                    StatusCode::NOT_FOUND => {
                        debug!("Secret not found");
                        Ok(None)
                    }
                    status if status.is_success() => {
                        let bundle: SecretBundle = parse_json(response).await?;
                        Ok(Some(bundle.into_record(name)))
                    }
                    _ => Err(handle_error_response(response).await),
                }
            }
            .await;
            tracker.finish(result)
        }
        .instrument(span)
        .await
    }

    async fn get_deleted_secret(
        &self,
        name: &str,
    ) -> Result<Option<DeletedSecretRecord>, StoreError> {
        let span = info_span!(
            "keyvault.secret.get_deleted",
            secret.name = name,
            vault.name = %self.store_name,
            operation.duration_ms = field::Empty,
            operation.success = field::Empty,
            error.message = field::Empty,
        );
        let tracker = OperationTracker::new("get_deleted", span.clone());

        async {
            let result = async {
                let response = self
                    .make_request(Method::GET, &format!("deletedsecrets/{name}"), NO_BODY)
                    .await?;
                match response.status() {
                    StatusCode::NOT_FOUND => Ok(None),
                    status if status.is_success() => {
                        let bundle: DeletedSecretBundle = parse_json(response).await?;
                        debug!("Found soft-deleted secret");
                        Ok(Some(bundle.into_record(name)))
                    }
                    _ => Err(handle_error_response(response).await),
                }
            }
            .await;
            tracker.finish(result)
        }
        .instrument(span)
        .await
    }

    async fn recover_deleted_secret(&self, name: &str) -> Result<(), StoreError> {
        let span = info_span!(
            "keyvault.secret.recover",
            secret.name = name,
            vault.name = %self.store_name,
            operation.duration_ms = field::Empty,
            operation.success = field::Empty,
            error.message = field::Empty,
        );
        let tracker = OperationTracker::new("recover", span.clone());

        async {
            let result = async {
                let response = self
                    .make_request(
                        Method::POST,
                        &format!("deletedsecrets/{name}/recover"),
                        NO_BODY,
                    )
                    .await?;
                if response.status().is_success() {
                    info!("Recovery of soft-deleted secret started");
                    Ok(())
                } else {
                    Err(handle_error_response(response).await)
                }
            }
            .await;
            tracker.finish(result)
        }
        .instrument(span)
        .await
    }

    async fn set_secret(
        &self,
        name: &str,
        parameters: &SetSecretParameters,
    ) -> Result<SecretRecord, StoreError> {
        let span = info_span!(
            "keyvault.secret.set",
            secret.name = name,
            vault.name = %self.store_name,
            operation.duration_ms = field::Empty,
            operation.success = field::Empty,
            error.message = field::Empty,
        );
        let tracker = OperationTracker::new("set", span.clone());

        async {
            let result = async {
                let body = SetSecretRequest::from(parameters);
                let response = self
                    .make_request(Method::PUT, &format!("secrets/{name}"), Some(&body))
                    .await?;
                if !response.status().is_success() {
                    return Err(handle_error_response(response).await);
                }
                let bundle: SecretBundle = parse_json(response).await?;
                let record = bundle.into_record(name);
                info!(
                    secret.id = %record.id,
                    value.len = parameters.value.len(),
                    "Wrote secret version"
                );
                Ok(record)
            }
            .await;
            tracker.finish(result)
        }
        .instrument(span)
        .await
    }

    async fn delete_secret(&self, name: &str) -> Result<(), StoreError> {
        let span = info_span!(
            "keyvault.secret.delete",
            secret.name = name,
            vault.name = %self.store_name,
            operation.duration_ms = field::Empty,
            operation.success = field::Empty,
            error.message = field::Empty,
        );
        let tracker = OperationTracker::new("delete", span.clone());

        async {
            let result = async {
                let response = self
                    .make_request(Method::DELETE, &format!("secrets/{name}"), NO_BODY)
                    .await?;
                if response.status().is_success() {
                    info!("Soft-deleted secret");
                    Ok(())
                } else {
                    Err(handle_error_response(response).await)
                }
            }
            .await;
            tracker.finish(result)
        }
        .instrument(span)
        .await
    }

    async fn list_deleted_secrets(&self) -> Result<Vec<String>, StoreError> {
        let span = info_span!(
            "keyvault.secret.list_deleted",
            vault.name = %self.store_name,
            operation.duration_ms = field::Empty,
            operation.success = field::Empty,
            error.message = field::Empty,
        );
        let tracker = OperationTracker::new("list_deleted", span.clone());

        async {
            let result = async {
                let mut names = Vec::new();
                let mut next = Some("deletedsecrets".to_string());

                while let Some(target) = next.take() {
                    let response = self.make_request(Method::GET, &target, NO_BODY).await?;
                    if !response.status().is_success() {
                        return Err(handle_error_response(response).await);
                    }
                    let page: DeletedSecretListResult = parse_json(response).await?;
                    names.extend(
                        page.value
                            .into_iter()
                            .map(|bundle| bundle.into_record(""))
                            .map(|record| record.name)
                            .filter(|name| !name.is_empty()),
                    );
                    next = page.next_link.filter(|link| !link.is_empty());
                }

                debug!(count = names.len(), "Listed soft-deleted secrets");
                Ok(names)
            }
            .await;
            tracker.finish(result)
        }
        .instrument(span)
        .await
    }
}
