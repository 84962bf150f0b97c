//! HMAC-SHA256 webhook signatures.
//!
//! The platform signs the raw callback body with the bot's API ID and sends
//! the base64 digest in `X-WORKS-Signature`. Verification must run over the
//! exact request bytes; re-serialized JSON will not match.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-works-signature";

/// Base64 HMAC-SHA256 of `raw_body` keyed by `shared_secret`.
pub fn sign(raw_body: &[u8], shared_secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(shared_secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(raw_body);
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Constant-time check of `signature` against the body. Never errors.
pub fn verify(raw_body: &[u8], signature: &str, shared_secret: &str) -> bool {
    if signature.is_empty() {
        return false;
    }
    let expected = sign(raw_body, shared_secret);
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}
