//! Deterministic fakes for the collaborators behind the core's traits.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use works_bot::auth::identity::{Grant, IdentityProvider};
use works_bot::bot::client::BotApi;
use works_bot::bot::content::ImageInfoResponder;
use works_bot::config::{Config, SecretBackend, SecretNames};
use works_bot::errors::{SecretError, UpstreamError};
use works_bot::models::chat::{AttachmentSlot, OutgoingMessage, UploadReceipt};
use works_bot::models::token::TokenResponse;
use works_bot::notification::alert::AlertNotifier;
use works_bot::vault::memory::MemoryStore;
use works_bot::vault::SecretStore;
use works_bot::AppState;

pub const PRIVATE_KEY: &str = include_str!("../fixtures/service_account_key.pem");
pub const API_ID: &str = "bot-api-id-secret";

pub fn token_response(access: &str, refresh: Option<&str>) -> TokenResponse {
    TokenResponse {
        access_token: access.to_string(),
        refresh_token: refresh.map(String::from),
        token_type: Some("Bearer".into()),
        scope: None,
        expires_in: None,
    }
}

/// Credentials as provisioned before the first token update.
pub fn provisioned_store(refresh_marker: &str) -> MemoryStore {
    MemoryStore::with_secrets([
        ("lw-client-id", "client-1"),
        ("lw-client-secret", "client-secret-1"),
        ("lw-service-account-id", "sa.serviceaccount@example"),
        ("lw-privatekey", PRIVATE_KEY),
        ("lw-api-id", API_ID),
        ("lw-refresh-token", refresh_marker),
    ])
}

// ── Identity provider ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedGrant {
    pub grant_type: String,
    pub form: Vec<(String, String)>,
}

impl RecordedGrant {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Returns scripted responses in order and records every grant.
#[derive(Default)]
pub struct FakeIdp {
    responses: Mutex<VecDeque<Result<TokenResponse, UpstreamError>>>,
    grants: Mutex<Vec<RecordedGrant>>,
}

impl FakeIdp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, response: Result<TokenResponse, UpstreamError>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn grants(&self) -> Vec<RecordedGrant> {
        self.grants.lock().unwrap().clone()
    }

    pub fn grant_types(&self) -> Vec<String> {
        self.grants().into_iter().map(|g| g.grant_type).collect()
    }
}

#[async_trait]
impl IdentityProvider for FakeIdp {
    async fn exchange(&self, grant: Grant<'_>) -> Result<TokenResponse, UpstreamError> {
        self.grants.lock().unwrap().push(RecordedGrant {
            grant_type: grant.grant_type().to_string(),
            form: grant
                .form()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(UpstreamError::Malformed("no scripted response".into())))
    }
}

// ── Secret store ─────────────────────────────────────────────

/// Memory store that records every read and write.
pub struct RecordingStore {
    pub inner: MemoryStore,
    reads: Mutex<Vec<String>>,
    writes: Mutex<Vec<(String, String)>>,
}

impl RecordingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            reads: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecretStore for RecordingStore {
    async fn get(&self, name: &str) -> Result<String, SecretError> {
        self.reads.lock().unwrap().push(name.to_string());
        self.inner.get(name).await
    }

    async fn put(&self, name: &str, value: &str) -> Result<String, SecretError> {
        self.writes
            .lock()
            .unwrap()
            .push((name.to_string(), value.to_string()));
        self.inner.put(name, value).await
    }
}

// ── Bot API ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub message: OutgoingMessage,
    pub bot_id: String,
    pub user_id: String,
    pub access_token: String,
}

#[derive(Default)]
pub struct FakeBotApi {
    sent: Mutex<Vec<SentMessage>>,
    attachment: Mutex<Option<Bytes>>,
    fail_send_with: Mutex<Option<u16>>,
}

impl FakeBotApi {
    pub fn with_attachment(data: Vec<u8>) -> Self {
        let api = Self::default();
        *api.attachment.lock().unwrap() = Some(Bytes::from(data));
        api
    }

    pub fn failing_send(status: u16) -> Self {
        let api = Self::default();
        *api.fail_send_with.lock().unwrap() = Some(status);
        api
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl BotApi for FakeBotApi {
    async fn send_message(
        &self,
        message: &OutgoingMessage,
        bot_id: &str,
        user_id: &str,
        access_token: &str,
    ) -> Result<(), UpstreamError> {
        if let Some(status) = *self.fail_send_with.lock().unwrap() {
            return Err(UpstreamError::Status {
                status,
                body: "rejected".into(),
            });
        }
        self.sent.lock().unwrap().push(SentMessage {
            message: message.clone(),
            bot_id: bot_id.to_string(),
            user_id: user_id.to_string(),
            access_token: access_token.to_string(),
        });
        Ok(())
    }

    async fn get_attachment(
        &self,
        _bot_id: &str,
        _file_id: &str,
        _access_token: &str,
    ) -> Result<Bytes, UpstreamError> {
        self.attachment
            .lock()
            .unwrap()
            .clone()
            .ok_or(UpstreamError::Status {
                status: 404,
                body: "no such file".into(),
            })
    }

    async fn post_attachment_descriptor(
        &self,
        _bot_id: &str,
        _file_name: &str,
        _access_token: &str,
    ) -> Result<AttachmentSlot, UpstreamError> {
        Err(UpstreamError::Malformed("not scripted".into()))
    }

    async fn upload_file(
        &self,
        _upload_url: &str,
        _file_name: &str,
        _data: Bytes,
        _access_token: &str,
    ) -> Result<UploadReceipt, UpstreamError> {
        Err(UpstreamError::Malformed("not scripted".into()))
    }
}

// ── App wiring ───────────────────────────────────────────────

pub struct TestApp {
    pub state: Arc<AppState>,
    pub store: Arc<RecordingStore>,
    pub idp: Arc<FakeIdp>,
    pub api: Arc<FakeBotApi>,
}

pub fn test_app(store: MemoryStore, idp: FakeIdp, api: FakeBotApi) -> TestApp {
    let config = Config::with_backend(SecretBackend::Gcp {
        project_id: "test".into(),
    });
    assert_eq!(config.secret_names, SecretNames::default());

    let store = Arc::new(RecordingStore::new(store));
    let idp = Arc::new(idp);
    let api = Arc::new(api);
    let state = Arc::new(AppState::new(
        config,
        store.clone(),
        idp.clone(),
        api.clone(),
        Arc::new(ImageInfoResponder),
        AlertNotifier::disabled(),
    ));
    TestApp {
        state,
        store,
        idp,
        api,
    }
}
