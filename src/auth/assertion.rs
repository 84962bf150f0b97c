//! JWT-bearer grant assertions (RFC 7523) signed with RS256.

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::errors::SigningError;
use crate::models::token::ServiceIdentity;

/// Assertion lifetime in seconds.
pub const ASSERTION_VALIDITY_SECS: i64 = 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    /// Client ID of the app.
    pub iss: String,
    /// Service account the token is issued for.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

impl AssertionClaims {
    pub fn new(issuer: &str, subject: &str, now: i64) -> Self {
        Self {
            iss: issuer.to_string(),
            sub: subject.to_string(),
            iat: now,
            exp: now + ASSERTION_VALIDITY_SECS,
        }
    }
}

/// Sign `{iss, sub, iat, exp}` with the PEM-encoded RSA private key.
///
/// `now` is unix seconds and is taken as given; no clock is read here.
pub fn build_assertion(
    issuer: &str,
    subject: &str,
    private_key: &str,
    now: i64,
) -> Result<String, SigningError> {
    let key = EncodingKey::from_rsa_pem(private_key.as_bytes()).map_err(SigningError::InvalidKey)?;
    let claims = AssertionClaims::new(issuer, subject, now);
    encode(&Header::new(Algorithm::RS256), &claims, &key).map_err(SigningError::Encode)
}

/// Assertion for a loaded service identity.
pub fn assert_identity(identity: &ServiceIdentity, now: i64) -> Result<String, SigningError> {
    build_assertion(
        &identity.client_id,
        &identity.service_account_id,
        &identity.private_key,
        now,
    )
}
