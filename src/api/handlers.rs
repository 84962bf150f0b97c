use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};

use crate::errors::{AppError, TokenError, TokenFailure};
use crate::notification::alert::AlertEvent;
use crate::AppState;

// ── Handlers ─────────────────────────────────────────────────

/// Liveness stub.
pub async fn root() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// POST /update_token — bootstrap or refresh the access token.
///
/// Meant to be called by a single scheduler; overlapping calls can race on
/// the refresh token.
pub async fn update_token(State(state): State<Arc<AppState>>) -> Result<StatusCode, AppError> {
    match state
        .tokens
        .refresh_or_bootstrap(state.idp.as_ref(), state.store.as_ref())
        .await
    {
        Ok(_) => Ok(StatusCode::OK),
        Err(e) => {
            let (stage, status) = match &e {
                TokenError::Lookup(_) => ("lookup", None),
                TokenError::Bootstrap(f) => ("bootstrap", upstream_status(f)),
                TokenError::Refresh(f) => ("refresh", upstream_status(f)),
            };
            state
                .alerts
                .dispatch(AlertEvent::token_update_failed(stage, &e.to_string(), status));
            Err(e.into())
        }
    }
}

fn upstream_status(failure: &TokenFailure) -> Option<u16> {
    match failure {
        TokenFailure::Upstream(e) => e.status(),
        _ => None,
    }
}

/// POST /chat — bot platform callback.
///
/// Unauthenticated or malformed calls are rejected. Once an event is
/// verified the platform always gets `200 {}`; processing failures are
/// logged and reported through the alert notifier instead.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let inbound = state.dispatcher.authenticate(&headers, body).await?;
    tracing::debug!(
        bot_id = %inbound.bot_id,
        event_type = %inbound.event.event_type,
        "webhook verified"
    );

    if let Err(e) = state.dispatcher.process(&inbound).await {
        let user_id = inbound.event.source.user_id.as_deref();
        tracing::error!(
            bot_id = %inbound.bot_id,
            user_id = user_id.unwrap_or("-"),
            error = %format!("{:#}", e),
            "chat event processing failed"
        );
        state.alerts.dispatch(AlertEvent::chat_processing_failed(
            &inbound.bot_id,
            user_id,
            &format!("{:#}", e),
        ));
    }

    Ok(Json(json!({})))
}
