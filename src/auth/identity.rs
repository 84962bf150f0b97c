use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::errors::UpstreamError;
use crate::models::token::TokenResponse;

pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
pub const REFRESH_TOKEN_GRANT: &str = "refresh_token";

/// OAuth2 grant exchanged at the token endpoint.
#[derive(Clone, Copy)]
pub enum Grant<'a> {
    JwtBearer {
        assertion: &'a str,
        client_id: &'a str,
        client_secret: &'a str,
        scope: &'a str,
    },
    RefreshToken {
        refresh_token: &'a str,
        client_id: &'a str,
        client_secret: &'a str,
    },
}

impl<'a> Grant<'a> {
    pub fn grant_type(&self) -> &'static str {
        match self {
            Grant::JwtBearer { .. } => JWT_BEARER_GRANT,
            Grant::RefreshToken { .. } => REFRESH_TOKEN_GRANT,
        }
    }

    /// Form fields of the token request.
    pub fn form(&self) -> Vec<(&'static str, &'a str)> {
        match *self {
            Grant::JwtBearer {
                assertion,
                client_id,
                client_secret,
                scope,
            } => vec![
                ("assertion", assertion),
                ("grant_type", JWT_BEARER_GRANT),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("scope", scope),
            ],
            Grant::RefreshToken {
                refresh_token,
                client_id,
                client_secret,
            } => vec![
                ("refresh_token", refresh_token),
                ("grant_type", REFRESH_TOKEN_GRANT),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ],
        }
    }
}

/// Token endpoint of the identity provider. One call, no retries.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn exchange(&self, grant: Grant<'_>) -> Result<TokenResponse, UpstreamError>;
}

/// Form-encoded token endpoint client.
pub struct TokenEndpointClient {
    http: Client,
    token_url: String,
}

impl TokenEndpointClient {
    pub fn new(token_url: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            http,
            token_url: token_url.into(),
        })
    }
}

#[async_trait]
impl IdentityProvider for TokenEndpointClient {
    async fn exchange(&self, grant: Grant<'_>) -> Result<TokenResponse, UpstreamError> {
        tracing::debug!(grant_type = grant.grant_type(), url = %self.token_url, "token exchange");

        let resp = self
            .http
            .post(&self.token_url)
            .form(&grant.form())
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            tracing::warn!(
                grant_type = grant.grant_type(),
                status = %status,
                "token endpoint rejected grant"
            );
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            UpstreamError::Malformed(format!("token response is not a token grant: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> TokenEndpointClient {
        TokenEndpointClient::new(
            format!("{}/oauth2/v2.0/token", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_jwt_bearer_grant_is_form_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/v2.0/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains(
                "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer",
            ))
            .and(body_string_contains("assertion=signed.jwt.value"))
            .and(body_string_contains("scope=bot%2Cbot.read"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"access_token":"A","refresh_token":"R","token_type":"Bearer","expires_in":"86400"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let resp = client(&server)
            .exchange(Grant::JwtBearer {
                assertion: "signed.jwt.value",
                client_id: "cid",
                client_secret: "csecret",
                scope: "bot,bot.read",
            })
            .await
            .unwrap();
        assert_eq!(resp.access_token, "A");
        assert_eq!(resp.refresh_token.as_deref(), Some("R"));
    }

    #[tokio::test]
    async fn test_refresh_grant_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=R1"))
            .and(body_string_contains("client_secret=csecret"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"access_token":"A2"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let resp = client(&server)
            .exchange(Grant::RefreshToken {
                refresh_token: "R1",
                client_id: "cid",
                client_secret: "csecret",
            })
            .await
            .unwrap();
        assert_eq!(resp.access_token, "A2");
        assert!(resp.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_rejection_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .exchange(Grant::RefreshToken {
                refresh_token: "revoked",
                client_id: "cid",
                client_secret: "csecret",
            })
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
    }

    #[tokio::test]
    async fn test_success_without_access_token_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"error":"server_error"}"#))
            .mount(&server)
            .await;

        let err = client(&server)
            .exchange(Grant::RefreshToken {
                refresh_token: "R",
                client_id: "cid",
                client_secret: "csecret",
            })
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Malformed(_)));
    }
}
