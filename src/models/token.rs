use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::errors::SecretError;

/// Service identity used to mint a JWT-bearer assertion.
/// Loaded from the secret store for each bootstrap attempt.
pub struct ServiceIdentity {
    pub client_id: String,
    pub service_account_id: String,
    pub private_key: Zeroizing<String>,
}

impl fmt::Debug for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceIdentity")
            .field("client_id", &self.client_id)
            .field("service_account_id", &self.service_account_id)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Stored value of the refresh-token credential.
///
/// The `init` sentinel is interpreted here and nowhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshMarker {
    /// No grant has been obtained yet; a bootstrap is required.
    Init,
    Token(String),
}

impl RefreshMarker {
    pub const SENTINEL: &'static str = "init";

    /// An empty stored value is neither the sentinel nor a usable token.
    pub fn from_stored(raw: &str) -> Result<Self, SecretError> {
        match raw.trim() {
            "" => Err(SecretError::Corrupt("stored refresh token is empty".into())),
            value if value == Self::SENTINEL => Ok(RefreshMarker::Init),
            value => Ok(RefreshMarker::Token(value.to_string())),
        }
    }
}

/// Token endpoint response body.
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    /// Seconds; the provider sends it as a string.
    #[serde(default)]
    pub expires_in: Option<serde_json::Value>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Access token plus the refresh token when the provider issued one.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub obtained_at: DateTime<Utc>,
}

impl TokenPair {
    pub fn from_response(resp: TokenResponse, obtained_at: DateTime<Utc>) -> Self {
        Self {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token.filter(|r| !r.is_empty()),
            obtained_at,
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}
