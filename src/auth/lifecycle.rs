//! Access/refresh token lifecycle.
//!
//! One invocation walks a small state machine:
//!
//! ```text
//! Uninitialized --(marker = init)--> Bootstrapping --ok--> Active
//!       |                                  \--err--> Failed
//!       \--(marker = token)--> Refreshing --ok--> Active
//!                                   \--err--> Failed
//! ```
//!
//! `Active` and `Failed` are terminal. Nothing is kept between invocations;
//! the next call re-reads the store from `Uninitialized`.
//!
//! Writes are ordered so the store never holds an access token without the
//! refresh token that belongs to it: a refresh token is always written before
//! the access token obtained with it. Two concurrent invocations are not
//! coordinated here; callers that may overlap must serialize them.

use chrono::Utc;

use super::assertion::assert_identity;
use super::identity::{Grant, IdentityProvider};
use crate::config::SecretNames;
use crate::errors::{TokenError, TokenFailure};
use crate::models::token::{RefreshMarker, ServiceIdentity, TokenPair};
use crate::vault::SecretStore;

/// Which grant an invocation used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantPath {
    Bootstrap,
    Refresh,
}

/// Summary of a successful invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenOutcome {
    pub path: GrantPath,
    /// A new refresh token was written.
    pub refresh_rotated: bool,
    /// Store version id of the new access token.
    pub access_version: String,
}

#[derive(Debug)]
pub enum TokenState {
    Uninitialized,
    Bootstrapping,
    Refreshing { refresh_token: String },
    Active(TokenOutcome),
    Failed(TokenError),
}

impl TokenState {
    /// Decode the stored refresh marker into the next state.
    pub fn from_marker(marker: RefreshMarker) -> Self {
        match marker {
            RefreshMarker::Init => TokenState::Bootstrapping,
            RefreshMarker::Token(refresh_token) => TokenState::Refreshing { refresh_token },
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TokenState::Active(_) | TokenState::Failed(_))
    }

    fn name(&self) -> &'static str {
        match self {
            TokenState::Uninitialized => "uninitialized",
            TokenState::Bootstrapping => "bootstrapping",
            TokenState::Refreshing { .. } => "refreshing",
            TokenState::Active(_) => "active",
            TokenState::Failed(_) => "failed",
        }
    }
}

/// Drives bootstrap and refresh against an identity provider and a secret store.
#[derive(Debug, Clone)]
pub struct TokenLifecycle {
    names: SecretNames,
    scope: String,
}

impl TokenLifecycle {
    pub fn new(names: SecretNames, scope: impl Into<String>) -> Self {
        Self {
            names,
            scope: scope.into(),
        }
    }

    pub fn names(&self) -> &SecretNames {
        &self.names
    }

    /// Bootstrap or refresh using the current wall clock for the assertion.
    pub async fn refresh_or_bootstrap(
        &self,
        idp: &dyn IdentityProvider,
        store: &dyn SecretStore,
    ) -> Result<TokenOutcome, TokenError> {
        self.refresh_or_bootstrap_at(idp, store, Utc::now().timestamp())
            .await
    }

    /// Same as [`refresh_or_bootstrap`](Self::refresh_or_bootstrap) with an explicit `now`
    /// (unix seconds) for the assertion's `iat`.
    pub async fn refresh_or_bootstrap_at(
        &self,
        idp: &dyn IdentityProvider,
        store: &dyn SecretStore,
        now: i64,
    ) -> Result<TokenOutcome, TokenError> {
        let mut state = TokenState::Uninitialized;
        loop {
            state = match state {
                TokenState::Active(outcome) => {
                    tracing::info!(
                        path = ?outcome.path,
                        refresh_rotated = outcome.refresh_rotated,
                        access_version = %outcome.access_version,
                        "access token updated"
                    );
                    return Ok(outcome);
                }
                TokenState::Failed(err) => {
                    tracing::warn!(error = %err, "token update failed");
                    return Err(err);
                }
                pending => {
                    let from = pending.name();
                    let next = self.step(pending, idp, store, now).await;
                    tracing::debug!(from, to = next.name(), "token state transition");
                    next
                }
            };
        }
    }

    /// Perform one transition.
    pub async fn step(
        &self,
        state: TokenState,
        idp: &dyn IdentityProvider,
        store: &dyn SecretStore,
        now: i64,
    ) -> TokenState {
        match state {
            TokenState::Uninitialized => {
                let marker = store
                    .get(&self.names.refresh_token)
                    .await
                    .and_then(|raw| RefreshMarker::from_stored(&raw));
                match marker {
                    Ok(marker) => TokenState::from_marker(marker),
                    Err(e) => TokenState::Failed(TokenError::Lookup(e)),
                }
            }
            TokenState::Bootstrapping => match self.bootstrap(idp, store, now).await {
                Ok(outcome) => TokenState::Active(outcome),
                Err(failure) => TokenState::Failed(TokenError::Bootstrap(failure)),
            },
            TokenState::Refreshing { refresh_token } => {
                match self.refresh(idp, store, &refresh_token).await {
                    Ok(outcome) => TokenState::Active(outcome),
                    Err(failure) => TokenState::Failed(TokenError::Refresh(failure)),
                }
            }
            terminal => terminal,
        }
    }

    async fn load_identity(&self, store: &dyn SecretStore) -> Result<ServiceIdentity, TokenFailure> {
        Ok(ServiceIdentity {
            client_id: store.get(&self.names.client_id).await?,
            service_account_id: store.get(&self.names.service_account_id).await?,
            private_key: store.get(&self.names.private_key).await?.into(),
        })
    }

    async fn bootstrap(
        &self,
        idp: &dyn IdentityProvider,
        store: &dyn SecretStore,
        now: i64,
    ) -> Result<TokenOutcome, TokenFailure> {
        tracing::info!("no refresh token on record, bootstrapping with JWT-bearer grant");

        let identity = self.load_identity(store).await?;
        let client_secret = store.get(&self.names.client_secret).await?;
        let assertion = assert_identity(&identity, now)?;

        let resp = idp
            .exchange(Grant::JwtBearer {
                assertion: &assertion,
                client_id: &identity.client_id,
                client_secret: &client_secret,
                scope: &self.scope,
            })
            .await?;
        let pair = TokenPair::from_response(resp, Utc::now());

        // Without a refresh token the next run would bootstrap again; persist nothing.
        let refresh_token = pair
            .refresh_token
            .as_deref()
            .ok_or(TokenFailure::MissingRefreshToken)?;

        store.put(&self.names.refresh_token, refresh_token).await?;
        let access_version = store.put(&self.names.access_token, &pair.access_token).await?;

        Ok(TokenOutcome {
            path: GrantPath::Bootstrap,
            refresh_rotated: true,
            access_version,
        })
    }

    async fn refresh(
        &self,
        idp: &dyn IdentityProvider,
        store: &dyn SecretStore,
        current_refresh: &str,
    ) -> Result<TokenOutcome, TokenFailure> {
        tracing::info!("refreshing access token");

        let client_id = store.get(&self.names.client_id).await?;
        let client_secret = store.get(&self.names.client_secret).await?;

        let resp = idp
            .exchange(Grant::RefreshToken {
                refresh_token: current_refresh,
                client_id: &client_id,
                client_secret: &client_secret,
            })
            .await?;
        let pair = TokenPair::from_response(resp, Utc::now());

        let rotated = pair
            .refresh_token
            .as_deref()
            .filter(|r| *r != current_refresh);
        if let Some(rotated) = rotated {
            tracing::info!("identity provider rotated the refresh token");
            store.put(&self.names.refresh_token, rotated).await?;
        }
        let access_version = store.put(&self.names.access_token, &pair.access_token).await?;

        Ok(TokenOutcome {
            path: GrantPath::Refresh,
            refresh_rotated: rotated.is_some(),
            access_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::memory::MemoryStore;

    #[test]
    fn test_marker_selects_path() {
        assert!(matches!(
            TokenState::from_marker(RefreshMarker::Init),
            TokenState::Bootstrapping
        ));
        assert!(matches!(
            TokenState::from_marker(RefreshMarker::Token("R".into())),
            TokenState::Refreshing { refresh_token } if refresh_token == "R"
        ));
    }

    #[tokio::test]
    async fn test_missing_refresh_marker_fails_from_uninitialized() {
        struct NoCalls;
        #[async_trait::async_trait]
        impl IdentityProvider for NoCalls {
            async fn exchange(
                &self,
                _grant: Grant<'_>,
            ) -> Result<crate::models::token::TokenResponse, crate::errors::UpstreamError> {
                panic!("identity provider must not be called");
            }
        }

        let lifecycle = TokenLifecycle::new(SecretNames::default(), "bot");
        let store = MemoryStore::new();
        let next = lifecycle
            .step(TokenState::Uninitialized, &NoCalls, &store, 0)
            .await;
        assert!(matches!(next, TokenState::Failed(TokenError::Lookup(_))));
        assert!(next.is_terminal());
    }
}
