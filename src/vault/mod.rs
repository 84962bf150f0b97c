pub mod file;
pub mod gcp;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, SecretBackend};
use crate::errors::SecretError;

/// Abstraction over versioned secret storage.
/// Implementations: GcpSecretStore (Secret Manager), FileStore (AES-256-GCM on disk),
/// MemoryStore (tests and local runs).
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Latest version of the named secret.
    async fn get(&self, name: &str) -> Result<String, SecretError>;

    /// Append a new version of the named secret. Returns the version id.
    async fn put(&self, name: &str, value: &str) -> Result<String, SecretError>;
}

/// One immutable version of a named credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub name: String,
    pub value: String,
    pub version: u64,
}

/// Build the store selected by configuration.
pub fn from_config(cfg: &Config) -> anyhow::Result<Arc<dyn SecretStore>> {
    let store: Arc<dyn SecretStore> = match &cfg.secret_backend {
        SecretBackend::Gcp { project_id } => {
            let auth = match &cfg.gcp_access_token {
                Some(token) => gcp::GcpAuth::Static(token.clone()),
                None => gcp::GcpAuth::Metadata,
            };
            Arc::new(gcp::GcpSecretStore::new(
                project_id.clone(),
                auth,
                cfg.http_timeout,
            )?)
        }
        SecretBackend::File { path, master_key } => {
            Arc::new(file::FileStore::new(path.clone(), master_key)?)
        }
    };
    Ok(store)
}
