use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CredentialRecord, SecretStore};
use crate::errors::SecretError;

/// Versioned in-process store. Every `put` appends a version; `get` returns the latest.
#[derive(Default)]
pub struct MemoryStore {
    secrets: Mutex<HashMap<String, Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from `(name, value)` pairs, one version each.
    pub fn with_secrets<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut secrets = HashMap::new();
        for (name, value) in entries {
            secrets
                .entry(name.to_string())
                .or_insert_with(Vec::new)
                .push(value.to_string());
        }
        Self {
            secrets: Mutex::new(secrets),
        }
    }

    /// Read a pinned version (1-based).
    pub fn get_version(&self, name: &str, version: u64) -> Option<CredentialRecord> {
        let guard = self.secrets.lock().ok()?;
        let index = usize::try_from(version).ok()?.checked_sub(1)?;
        guard.get(name)?.get(index).map(|value| CredentialRecord {
            name: name.to_string(),
            value: value.clone(),
            version,
        })
    }

    /// Number of versions written for `name`.
    pub fn version_count(&self, name: &str) -> usize {
        self.secrets
            .lock()
            .map(|g| g.get(name).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }

    fn poisoned() -> SecretError {
        SecretError::Backend("memory store lock poisoned".into())
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn get(&self, name: &str) -> Result<String, SecretError> {
        let guard = self.secrets.lock().map_err(|_| Self::poisoned())?;
        guard
            .get(name)
            .and_then(|versions| versions.last())
            .cloned()
            .ok_or_else(|| SecretError::NotFound {
                name: name.to_string(),
            })
    }

    async fn put(&self, name: &str, value: &str) -> Result<String, SecretError> {
        let mut guard = self.secrets.lock().map_err(|_| Self::poisoned())?;
        let versions = guard.entry(name.to_string()).or_default();
        versions.push(value.to_string());
        Ok(versions.len().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_appends_versions_and_get_returns_latest() {
        let store = MemoryStore::new();
        assert_eq!(store.put("token", "a").await.unwrap(), "1");
        assert_eq!(store.put("token", "b").await.unwrap(), "2");

        assert_eq!(store.get("token").await.unwrap(), "b");
        assert_eq!(store.get_version("token", 1).unwrap().value, "a");
        assert!(store.get_version("token", 0).is_none());
        assert!(store.get_version("token", 3).is_none());
        assert_eq!(store.version_count("token"), 2);
    }

    #[tokio::test]
    async fn test_missing_secret_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get("absent").await.unwrap_err();
        assert!(matches!(err, SecretError::NotFound { name } if name == "absent"));
    }
}
