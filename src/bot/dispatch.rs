//! Inbound webhook handling.
//!
//! `authenticate` runs before anything else touches the request: the
//! signature is checked against the raw body with the bot's shared secret,
//! and only then are routing fields extracted. `process` reads the access
//! token fresh from the store, asks the content handler for a reply and
//! sends it.

use std::sync::Arc;

use axum::http::HeaderMap;
use bytes::Bytes;

use super::client::BotApi;
use super::content::{BotSession, ContentHandler};
use crate::auth::signature::{self, SIGNATURE_HEADER};
use crate::config::SecretNames;
use crate::errors::AppError;
use crate::models::chat::{ChatEvent, InboundEvent};
use crate::vault::SecretStore;

pub const BOT_ID_HEADER: &str = "x-works-botid";

#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn SecretStore>,
    api: Arc<dyn BotApi>,
    handler: Arc<dyn ContentHandler>,
    names: SecretNames,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn SecretStore>,
        api: Arc<dyn BotApi>,
        handler: Arc<dyn ContentHandler>,
        names: SecretNames,
    ) -> Self {
        Self {
            store,
            api,
            handler,
            names,
        }
    }

    /// Verify the signature and parse the event. Errors here reject the request.
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
        raw_body: Bytes,
    ) -> Result<InboundEvent, AppError> {
        let signature = header_str(headers, SIGNATURE_HEADER).ok_or_else(|| {
            tracing::warn!("webhook without signature header rejected");
            AppError::SignatureInvalid
        })?;

        let shared_secret = self.store.get(&self.names.api_id).await?;
        if !signature::verify(&raw_body, signature, &shared_secret) {
            tracing::warn!("webhook signature mismatch, rejecting");
            return Err(AppError::SignatureInvalid);
        }

        let bot_id = header_str(headers, BOT_ID_HEADER)
            .ok_or_else(|| AppError::BadRequest(format!("missing {} header", BOT_ID_HEADER)))?
            .to_string();
        let event: ChatEvent = serde_json::from_slice(&raw_body)
            .map_err(|e| AppError::BadRequest(format!("malformed event: {}", e)))?;

        Ok(InboundEvent {
            signature: signature.to_string(),
            raw_body,
            bot_id,
            event,
        })
    }

    /// Produce and send the reply for a verified event.
    /// Returns whether a message was sent.
    pub async fn process(&self, inbound: &InboundEvent) -> anyhow::Result<bool> {
        let access_token = self.store.get(&self.names.access_token).await?;
        let session = BotSession {
            bot_id: &inbound.bot_id,
            access_token: &access_token,
            api: self.api.as_ref(),
        };

        let Some(reply) = self.handler.reply(&inbound.event, &session).await? else {
            return Ok(false);
        };

        let Some(user_id) = inbound.event.source.user_id.as_deref() else {
            anyhow::bail!(
                "{} event has no source user to reply to",
                inbound.event.event_type
            );
        };
        self.api
            .send_message(&reply, &inbound.bot_id, user_id, &access_token)
            .await?;
        tracing::info!(bot_id = %inbound.bot_id, user_id, "reply sent");
        Ok(true)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
