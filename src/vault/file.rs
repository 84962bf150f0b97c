use std::collections::BTreeMap;
use std::path::PathBuf;

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use super::{CredentialRecord, SecretStore};
use crate::errors::SecretError;

/// One encrypted version as persisted on disk. Binary fields are base64.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SealedVersion {
    version: u64,
    created_at: DateTime<Utc>,
    encrypted_dek: String,
    dek_nonce: String,
    encrypted_secret: String,
    secret_nonce: String,
}

type SecretFile = BTreeMap<String, Vec<SealedVersion>>;

/// Local secret store: a JSON file of envelope-encrypted, versioned secrets.
/// Meant for development and single-host deployments without Secret Manager.
pub struct FileStore {
    path: PathBuf,
    cipher: EnvelopeCipher,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: PathBuf, master_key_hex: &str) -> anyhow::Result<Self> {
        Ok(Self {
            path,
            cipher: EnvelopeCipher::new(master_key_hex)?,
            write_lock: Mutex::new(()),
        })
    }

    async fn load(&self) -> Result<SecretFile, SecretError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| SecretError::Corrupt(format!("{}: {}", self.path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SecretFile::new()),
            Err(e) => Err(SecretError::Backend(format!(
                "cannot read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn save(&self, contents: &SecretFile) -> Result<(), SecretError> {
        let bytes = serde_json::to_vec_pretty(contents)
            .map_err(|e| SecretError::Backend(format!("serialize secret file: {}", e)))?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| SecretError::Backend(format!("cannot write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| SecretError::Backend(format!("cannot replace {}: {}", self.path.display(), e)))
    }

    /// Read a pinned version instead of the latest.
    pub async fn get_version(&self, name: &str, version: u64) -> Result<CredentialRecord, SecretError> {
        let contents = self.load().await?;
        let sealed = contents
            .get(name)
            .and_then(|versions| versions.iter().find(|v| v.version == version))
            .ok_or_else(|| SecretError::NotFound {
                name: format!("{}@{}", name, version),
            })?;
        Ok(CredentialRecord {
            name: name.to_string(),
            value: self.cipher.open(sealed)?,
            version,
        })
    }
}

#[async_trait]
impl SecretStore for FileStore {
    async fn get(&self, name: &str) -> Result<String, SecretError> {
        let contents = self.load().await?;
        let sealed = contents
            .get(name)
            .and_then(|versions| versions.last())
            .ok_or_else(|| SecretError::NotFound {
                name: name.to_string(),
            })?;
        self.cipher.open(sealed)
    }

    async fn put(&self, name: &str, value: &str) -> Result<String, SecretError> {
        let _guard = self.write_lock.lock().await;
        let mut contents = self.load().await?;
        let versions = contents.entry(name.to_string()).or_default();
        let version = versions.last().map(|v| v.version + 1).unwrap_or(1);
        versions.push(self.cipher.seal(value, version)?);
        self.save(&contents).await?;
        Ok(version.to_string())
    }
}

/// AES-256-GCM envelope encryption: a fresh data key per version, wrapped by the master key.
struct EnvelopeCipher {
    kek: Zeroizing<[u8; 32]>,
}

impl EnvelopeCipher {
    fn new(master_key_hex: &str) -> anyhow::Result<Self> {
        Ok(Self {
            kek: Zeroizing::new(parse_master_key(master_key_hex)?),
        })
    }

    fn seal(&self, plaintext: &str, version: u64) -> Result<SealedVersion, SecretError> {
        let mut dek = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut dek[..]);

        let secret_nonce = generate_nonce();
        let encrypted_secret = Aes256Gcm::new_from_slice(&dek[..])
            .map_err(|e| SecretError::Backend(format!("invalid key length: {:?}", e)))?
            .encrypt(Nonce::from_slice(&secret_nonce), plaintext.as_bytes())
            .map_err(|e| SecretError::Backend(format!("secret encryption failed: {}", e)))?;

        let dek_nonce = generate_nonce();
        let encrypted_dek = Aes256Gcm::new_from_slice(&self.kek[..])
            .map_err(|e| SecretError::Backend(format!("invalid key length: {:?}", e)))?
            .encrypt(Nonce::from_slice(&dek_nonce), &dek[..])
            .map_err(|e| SecretError::Backend(format!("DEK encryption failed: {}", e)))?;

        Ok(SealedVersion {
            version,
            created_at: Utc::now(),
            encrypted_dek: STANDARD.encode(encrypted_dek),
            dek_nonce: STANDARD.encode(dek_nonce),
            encrypted_secret: STANDARD.encode(encrypted_secret),
            secret_nonce: STANDARD.encode(secret_nonce),
        })
    }

    fn open(&self, sealed: &SealedVersion) -> Result<String, SecretError> {
        let decode = |field: &str, value: &str| {
            STANDARD
                .decode(value)
                .map_err(|e| SecretError::Corrupt(format!("{} is not base64: {}", field, e)))
        };
        let encrypted_dek = decode("encrypted_dek", &sealed.encrypted_dek)?;
        let dek_nonce = nonce_bytes(&decode("dek_nonce", &sealed.dek_nonce)?)?;
        let encrypted_secret = decode("encrypted_secret", &sealed.encrypted_secret)?;
        let secret_nonce = nonce_bytes(&decode("secret_nonce", &sealed.secret_nonce)?)?;

        let dek = Zeroizing::new(
            Aes256Gcm::new_from_slice(&self.kek[..])
                .map_err(|e| SecretError::Backend(format!("invalid key length: {:?}", e)))?
                .decrypt(Nonce::from_slice(&dek_nonce), encrypted_dek.as_slice())
                .map_err(|_| SecretError::Corrupt("DEK decryption failed (wrong master key?)".into()))?,
        );

        let plaintext = Aes256Gcm::new_from_slice(&dek[..])
            .map_err(|_| SecretError::Corrupt("unwrapped DEK has wrong length".into()))?
            .decrypt(Nonce::from_slice(&secret_nonce), encrypted_secret.as_slice())
            .map_err(|_| SecretError::Corrupt("secret decryption failed".into()))?;

        String::from_utf8(plaintext).map_err(|_| SecretError::Corrupt("secret is not UTF-8".into()))
    }
}

fn nonce_bytes(bytes: &[u8]) -> Result<[u8; 12], SecretError> {
    bytes
        .try_into()
        .map_err(|_| SecretError::Corrupt(format!("nonce must be 12 bytes, got {}", bytes.len())))
}

fn generate_nonce() -> [u8; 12] {
    let mut nonce = [0u8; 12];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

pub fn parse_master_key(hex: &str) -> anyhow::Result<[u8; 32]> {
    if hex.len() != 64 {
        anyhow::bail!(
            "WORKS_MASTER_KEY must be 64 hex chars (32 bytes), got {} chars",
            hex.len()
        );
    }
    let bytes = hex::decode(hex)?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}
