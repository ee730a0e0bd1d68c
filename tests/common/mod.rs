//! Mock Key Vault and identity endpoints for integration tests
//!
//! One axum server on an ephemeral port serves:
//! - the Key Vault secrets API (`/secrets`, `/deletedsecrets`) with soft-delete
//! - an Entra ID token endpoint at `/authority/{tenant}/oauth2/v2.0/token`
//! - an App Service identity endpoint at `/msi/token`
//! - an IMDS endpoint at `/metadata/identity/oauth2/token`

#![allow(dead_code, reason = "each test binary uses a different subset")]

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Form, Router,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

pub const MOCK_TOKEN: &str = "mock-token";
pub const MOCK_CLIENT_SECRET: &str = "correct-secret";
pub const MOCK_IDENTITY_HEADER: &str = "identity-header";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub path: String,
    pub api_version: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Debug, Clone)]
struct StoredSecret {
    version: u32,
    value: String,
    content_type: Option<String>,
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct MockState {
    base_url: String,
    active: BTreeMap<String, StoredSecret>,
    deleted: BTreeMap<String, StoredSecret>,
    requests: Vec<RecordedRequest>,
    next_version: u32,
    deleted_page_size: usize,
    /// Status returned by every Key Vault call while set
    outage: Option<u16>,
}

type Shared = Arc<Mutex<MockState>>;

pub struct MockKeyVault {
    pub base_url: String,
    state: Shared,
    handle: JoinHandle<()>,
}

impl Drop for MockKeyVault {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl MockKeyVault {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let state: Shared = Arc::new(Mutex::new(MockState {
            base_url: base_url.clone(),
            deleted_page_size: 25,
            ..MockState::default()
        }));

        let app = Router::new()
            .route(
                "/secrets/{name}",
                get(get_secret).put(set_secret).delete(delete_secret),
            )
            .route("/deletedsecrets", get(list_deleted))
            .route("/deletedsecrets/{name}", get(get_deleted))
            .route("/deletedsecrets/{name}/recover", post(recover))
            .route("/authority/{tenant}/oauth2/v2.0/token", post(client_credentials_token))
            .route("/msi/token", get(app_service_token))
            .route("/metadata/identity/oauth2/token", get(imds_token))
            .with_state(Arc::clone(&state));

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            state,
            handle,
        }
    }

    pub fn authority_host(&self) -> String {
        format!("{}/authority", self.base_url)
    }

    pub fn identity_endpoint(&self) -> String {
        format!("{}/msi/token", self.base_url)
    }

    pub fn imds_endpoint(&self) -> String {
        format!("{}/metadata/identity/oauth2/token", self.base_url)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn set_deleted_page_size(&self, size: usize) {
        self.state.lock().unwrap().deleted_page_size = size;
    }

    pub fn set_outage(&self, status: Option<u16>) {
        self.state.lock().unwrap().outage = status;
    }

    pub fn seed_soft_deleted(&self, name: &str, value: &str) {
        let mut state = self.state.lock().unwrap();
        state.next_version += 1;
        let version = state.next_version;
        state.deleted.insert(
            name.to_string(),
            StoredSecret {
                version,
                value: value.to_string(),
                content_type: None,
                tags: BTreeMap::new(),
            },
        );
    }

    pub fn active_value(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .active
            .get(name)
            .map(|s| s.value.clone())
    }

    pub fn is_soft_deleted(&self, name: &str) -> bool {
        self.state.lock().unwrap().deleted.contains_key(name)
    }
}

fn record(
    state: &mut MockState,
    method: &'static str,
    path: String,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
) {
    state.requests.push(RecordedRequest {
        method,
        path,
        api_version: query.get("api-version").cloned(),
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });
}

fn error_response(status: StatusCode, code: &str, message: String) -> Response {
    (
        status,
        Json(json!({ "error": { "code": code, "message": message } })),
    )
        .into_response()
}

/// Common checks for Key Vault calls: bearer token and injected outages
fn guard(state: &MockState, headers: &HeaderMap) -> Option<Response> {
    if let Some(status) = state.outage {
        return Some(error_response(
            StatusCode::from_u16(status).unwrap(),
            "ServiceUnavailable",
            "The service is unavailable".to_string(),
        ));
    }
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {MOCK_TOKEN}"));
    (!authorized).then(|| {
        error_response(
            StatusCode::UNAUTHORIZED,
            "Unauthorized",
            "AKV10000: Request is missing a Bearer or PoP token.".to_string(),
        )
    })
}

fn bundle(base_url: &str, name: &str, secret: &StoredSecret) -> Value {
    json!({
        "value": secret.value,
        "id": format!("{base_url}/secrets/{name}/v{}", secret.version),
        "contentType": secret.content_type,
        "tags": secret.tags,
        "attributes": {
            "enabled": true,
            "created": 1_700_000_000,
            "updated": 1_700_000_000,
            "recoveryLevel": "Recoverable+Purgeable"
        }
    })
}

fn deleted_bundle(base_url: &str, name: &str, secret: &StoredSecret) -> Value {
    json!({
        "recoveryId": format!("{base_url}/deletedsecrets/{name}"),
        "id": format!("{base_url}/secrets/{name}/v{}", secret.version),
        "deletedDate": 1_700_000_000,
        "scheduledPurgeDate": 1_707_776_000
    })
}

async fn get_secret(
    State(state): State<Shared>,
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut state = state.lock().unwrap();
    record(&mut state, "GET", format!("/secrets/{name}"), &query, &headers);
    if let Some(response) = guard(&state, &headers) {
        return response;
    }
    match state.active.get(&name) {
        Some(secret) => Json(bundle(&state.base_url, &name, secret)).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            "SecretNotFound",
            format!("A secret with (name/id) {name} was not found in this key vault."),
        ),
    }
}

async fn set_secret(
    State(state): State<Shared>,
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().unwrap();
    record(&mut state, "PUT", format!("/secrets/{name}"), &query, &headers);
    if let Some(response) = guard(&state, &headers) {
        return response;
    }
    if state.deleted.contains_key(&name) {
        return error_response(
            StatusCode::CONFLICT,
            "Conflict",
            format!("Secret {name} is currently in a deleted but recoverable state, and its name cannot be reused; in this state, the secret can only be recovered or purged."),
        );
    }
    let Some(value) = body.get("value").and_then(Value::as_str) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "BadParameter",
            "value is required".to_string(),
        );
    };

    state.next_version += 1;
    let secret = StoredSecret {
        version: state.next_version,
        value: value.to_string(),
        content_type: body
            .get("contentType")
            .and_then(Value::as_str)
            .map(str::to_string),
        tags: body
            .get("tags")
            .and_then(|tags| serde_json::from_value(tags.clone()).ok())
            .unwrap_or_default(),
    };
    let response = bundle(&state.base_url, &name, &secret);
    state.active.insert(name, secret);
    Json(response).into_response()
}

async fn delete_secret(
    State(state): State<Shared>,
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut state = state.lock().unwrap();
    record(&mut state, "DELETE", format!("/secrets/{name}"), &query, &headers);
    if let Some(response) = guard(&state, &headers) {
        return response;
    }
    match state.active.remove(&name) {
        Some(secret) => {
            let response = deleted_bundle(&state.base_url, &name, &secret);
            state.deleted.insert(name, secret);
            Json(response).into_response()
        }
        None => error_response(
            StatusCode::NOT_FOUND,
            "SecretNotFound",
            format!("A secret with (name/id) {name} was not found in this key vault."),
        ),
    }
}

async fn get_deleted(
    State(state): State<Shared>,
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut state = state.lock().unwrap();
    record(&mut state, "GET", format!("/deletedsecrets/{name}"), &query, &headers);
    if let Some(response) = guard(&state, &headers) {
        return response;
    }
    match state.deleted.get(&name) {
        Some(secret) => Json(deleted_bundle(&state.base_url, &name, secret)).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            "SecretNotFound",
            format!("Deleted Secret not found: {name}"),
        ),
    }
}

async fn recover(
    State(state): State<Shared>,
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut state = state.lock().unwrap();
    record(
        &mut state,
        "POST",
        format!("/deletedsecrets/{name}/recover"),
        &query,
        &headers,
    );
    if let Some(response) = guard(&state, &headers) {
        return response;
    }
    match state.deleted.remove(&name) {
        Some(secret) => {
            let mut response = bundle(&state.base_url, &name, &secret);
            if let Some(object) = response.as_object_mut() {
                object.remove("value");
            }
            state.active.insert(name, secret);
            Json(response).into_response()
        }
        None => error_response(
            StatusCode::NOT_FOUND,
            "SecretNotFound",
            format!("Deleted Secret not found: {name}"),
        ),
    }
}

async fn list_deleted(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut state = state.lock().unwrap();
    record(&mut state, "GET", "/deletedsecrets".to_string(), &query, &headers);
    if let Some(response) = guard(&state, &headers) {
        return response;
    }

    let skip: usize = query
        .get("$skiptoken")
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let page: Vec<Value> = state
        .deleted
        .iter()
        .skip(skip)
        .take(state.deleted_page_size)
        .map(|(name, secret)| deleted_bundle(&state.base_url, name, secret))
        .collect();
    let next = skip + page.len();
    let next_link = (next < state.deleted.len()).then(|| {
        format!(
            "{}/deletedsecrets?api-version=7.4&$skiptoken={next}",
            state.base_url
        )
    });

    Json(json!({ "value": page, "nextLink": next_link })).into_response()
}

async fn client_credentials_token(
    Path(_tenant): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let valid = form.get("grant_type").map(String::as_str) == Some("client_credentials")
        && form.get("client_secret").map(String::as_str) == Some(MOCK_CLIENT_SECRET)
        && form.contains_key("scope");
    if !valid {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "invalid_client",
                "error_description": "AADSTS7000215: Invalid client secret provided."
            })),
        )
            .into_response();
    }
    Json(json!({
        "token_type": "Bearer",
        "expires_in": 3599,
        "access_token": MOCK_TOKEN
    }))
    .into_response()
}

fn managed_identity_token() -> Value {
    let expires_on = chrono::Utc::now().timestamp() + 3600;
    json!({
        "access_token": MOCK_TOKEN,
        "expires_on": expires_on.to_string(),
        "resource": "https://vault.azure.net",
        "token_type": "Bearer"
    })
}

async fn app_service_token(
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let header_ok = headers
        .get("x-identity-header")
        .and_then(|v| v.to_str().ok())
        == Some(MOCK_IDENTITY_HEADER);
    if !header_ok || query.get("resource").map(String::as_str) != Some("https://vault.azure.net") {
        return StatusCode::BAD_REQUEST.into_response();
    }
    Json(managed_identity_token()).into_response()
}

async fn imds_token(Query(query): Query<HashMap<String, String>>, headers: HeaderMap) -> Response {
    let metadata = headers.get("metadata").and_then(|v| v.to_str().ok()) == Some("true");
    if !metadata || !query.contains_key("resource") {
        return StatusCode::BAD_REQUEST.into_response();
    }
    Json(managed_identity_token()).into_response()
}
