//! works-bot — LINE WORKS bot backend.
//!
//! Library crate shared by the `works-bot` binary and the integration tests in `tests/`.

pub mod api;
pub mod auth;
pub mod bot;
pub mod cli;
pub mod config;
pub mod errors;
pub mod models;
pub mod notification;
pub mod vault;

use std::sync::Arc;

use auth::identity::{IdentityProvider, TokenEndpointClient};
use auth::lifecycle::TokenLifecycle;
use bot::client::{BotApi, HttpBotApi};
use bot::content::{ContentHandler, ImageInfoResponder};
use bot::dispatch::Dispatcher;
use config::Config;
use notification::alert::AlertNotifier;
use vault::SecretStore;

/// Shared application state passed to handlers.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn SecretStore>,
    pub idp: Arc<dyn IdentityProvider>,
    pub tokens: TokenLifecycle,
    pub dispatcher: Dispatcher,
    pub alerts: AlertNotifier,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn SecretStore>,
        idp: Arc<dyn IdentityProvider>,
        api: Arc<dyn BotApi>,
        handler: Arc<dyn ContentHandler>,
        alerts: AlertNotifier,
    ) -> Self {
        let tokens = TokenLifecycle::new(config.secret_names.clone(), config.scope.clone());
        let dispatcher = Dispatcher::new(store.clone(), api, handler, config.secret_names.clone());
        Self {
            config,
            store,
            idp,
            tokens,
            dispatcher,
            alerts,
        }
    }

    /// Wire the production collaborators from configuration.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let store = vault::from_config(&config)?;
        let idp = Arc::new(TokenEndpointClient::new(
            config.token_url.clone(),
            config.http_timeout,
        )?);
        let api = Arc::new(HttpBotApi::new(
            config.api_base_url.clone(),
            config.http_timeout,
            config.upload_timeout,
        )?);
        let alerts = AlertNotifier::new(
            config.alert_webhook_urls.clone(),
            config.alert_signing_secret.clone(),
        )?;
        Ok(Self::new(
            config,
            store,
            idp,
            api,
            Arc::new(ImageInfoResponder),
            alerts,
        ))
    }
}
