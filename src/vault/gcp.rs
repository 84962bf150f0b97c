//! Google Secret Manager backend over the REST API.
//!
//! Reads resolve `versions/latest:access`; writes call `:addVersion`, so every
//! write creates a new immutable version. The OAuth token for Secret Manager
//! comes from the GCE/Cloud Run metadata server unless a static token is
//! configured.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::SecretStore;
use crate::errors::SecretError;

const SECRET_MANAGER_ENDPOINT: &str = "https://secretmanager.googleapis.com/v1";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Where the bearer token for Secret Manager comes from.
#[derive(Debug, Clone)]
pub enum GcpAuth {
    Metadata,
    Static(String),
}

pub struct GcpSecretStore {
    http: Client,
    endpoint: String,
    project_id: String,
    auth: GcpAuth,
}

#[derive(Deserialize)]
struct AccessResponse {
    payload: SecretPayload,
}

#[derive(Deserialize)]
struct SecretPayload {
    data: String,
}

#[derive(Deserialize)]
struct VersionResponse {
    name: String,
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
}

impl GcpSecretStore {
    pub fn new(project_id: String, auth: GcpAuth, timeout: Duration) -> Result<Self, SecretError> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            http,
            endpoint: SECRET_MANAGER_ENDPOINT.to_string(),
            project_id,
            auth,
        })
    }

    /// Point the store at a different API root (emulators, tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn secret_path(&self, name: &str) -> String {
        format!(
            "{}/projects/{}/secrets/{}",
            self.endpoint,
            urlencoding::encode(&self.project_id),
            urlencoding::encode(name)
        )
    }

    async fn bearer(&self) -> Result<String, SecretError> {
        match &self.auth {
            GcpAuth::Static(token) => Ok(token.clone()),
            GcpAuth::Metadata => {
                let resp = self
                    .http
                    .get(METADATA_TOKEN_URL)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await?;
                if !resp.status().is_success() {
                    return Err(SecretError::Backend(format!(
                        "metadata server returned {}",
                        resp.status()
                    )));
                }
                let token: MetadataToken = resp.json().await?;
                Ok(token.access_token)
            }
        }
    }

    async fn check(resp: reqwest::Response, name: &str) -> Result<reqwest::Response, SecretError> {
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SecretError::NotFound {
                name: name.to_string(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SecretError::Backend(format!(
                "secret manager returned {} for '{}': {}",
                status, name, body
            )));
        }
        Ok(resp)
    }
}

#[async_trait]
impl SecretStore for GcpSecretStore {
    async fn get(&self, name: &str) -> Result<String, SecretError> {
        let url = format!("{}/versions/latest:access", self.secret_path(name));
        let resp = self
            .http
            .get(&url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await?;
        let body: AccessResponse = Self::check(resp, name).await?.json().await?;

        let bytes = STANDARD
            .decode(body.payload.data.as_bytes())
            .map_err(|e| SecretError::Corrupt(format!("'{}' payload is not base64: {}", name, e)))?;
        String::from_utf8(bytes)
            .map_err(|_| SecretError::Corrupt(format!("'{}' payload is not UTF-8", name)))
    }

    async fn put(&self, name: &str, value: &str) -> Result<String, SecretError> {
        let url = format!("{}:addVersion", self.secret_path(name));
        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.bearer().await?)
            .json(&json!({ "payload": { "data": STANDARD.encode(value.as_bytes()) } }))
            .send()
            .await?;
        let body: VersionResponse = Self::check(resp, name).await?.json().await?;

        let version = body
            .name
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        tracing::debug!(secret = %name, version = %version, "added secret version");
        Ok(version)
    }
}
