use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Failures of the credential store backends.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret '{name}' not found")]
    NotFound { name: String },

    #[error("secret store error: {0}")]
    Backend(String),

    #[error("secret store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("secret payload is corrupt: {0}")]
    Corrupt(String),
}

/// Assertion construction failed. Fatal to the bootstrap attempt.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("invalid private signing key: {0}")]
    InvalidKey(#[source] jsonwebtoken::errors::Error),

    #[error("assertion encoding failed: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),
}

/// Identity provider or bot API call did not succeed.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

impl UpstreamError {
    /// HTTP status of a non-2xx response, if the call got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            UpstreamError::Transport(e) => e.status().map(|s| s.as_u16()),
            UpstreamError::Malformed(_) => None,
        }
    }
}

/// Cause of a failed bootstrap or refresh.
#[derive(Debug, Error)]
pub enum TokenFailure {
    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("identity provider granted no refresh token")]
    MissingRefreshToken,
}

/// Result of a failed `refresh_or_bootstrap` invocation.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("could not read refresh token state: {0}")]
    Lookup(#[source] SecretError),

    #[error("token bootstrap failed: {0}")]
    Bootstrap(#[source] TokenFailure),

    #[error("token refresh failed: {0}")]
    Refresh(#[source] TokenFailure),
}

impl TokenError {
    pub fn failure(&self) -> Option<&TokenFailure> {
        match self {
            TokenError::Lookup(_) => None,
            TokenError::Bootstrap(f) | TokenError::Refresh(f) => Some(f),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("webhook signature invalid")]
    SignatureInvalid,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

fn internal() -> (StatusCode, &'static str, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "internal_server_error",
        "internal server error".to_string(),
    )
}

fn secret_status(e: &SecretError) -> (StatusCode, &'static str, &'static str, String) {
    match e {
        SecretError::NotFound { name } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "configuration_error",
            "secret_not_found",
            format!("required credential '{}' is not provisioned", name),
        ),
        other => {
            tracing::error!("Secret store error: {}", other);
            internal()
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::SignatureInvalid => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "signature_invalid",
                "webhook signature verification failed".to_string(),
            ),
            AppError::BadRequest(reason) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "bad_request",
                reason.clone(),
            ),
            AppError::Token(e) => match e {
                TokenError::Lookup(inner) => secret_status(inner),
                TokenError::Bootstrap(f) | TokenError::Refresh(f) => match f {
                    TokenFailure::Secret(inner) => secret_status(inner),
                    TokenFailure::Upstream(_) | TokenFailure::MissingRefreshToken => (
                        StatusCode::BAD_GATEWAY,
                        "upstream_error",
                        "token_exchange_failed",
                        e.to_string(),
                    ),
                    TokenFailure::Signing(inner) => {
                        tracing::error!("Assertion signing error: {}", inner);
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "configuration_error",
                            "signing_failed",
                            "could not sign token assertion".to_string(),
                        )
                    }
                },
            },
            AppError::Secret(e) => secret_status(e),
            AppError::Upstream(e) => (
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                "upstream_failed",
                e.to_string(),
            ),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                internal()
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}
