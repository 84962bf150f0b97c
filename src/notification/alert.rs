use anyhow::Result;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, info, warn};

// ── Alert Event Types ────────────────────────────────────────

/// A failure the HTTP contract cannot surface, reported to operators.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    /// Event type identifier, e.g. "chat_processing_failed".
    pub event_type: String,
    /// ISO-8601 timestamp of when the event occurred.
    pub timestamp: String,
    /// Event-specific details (bot, user, error).
    pub details: serde_json::Value,
}

impl AlertEvent {
    pub fn chat_processing_failed(bot_id: &str, user_id: Option<&str>, error: &str) -> Self {
        Self {
            event_type: "chat_processing_failed".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            details: serde_json::json!({
                "bot_id": bot_id,
                "user_id": user_id,
                "error": error,
            }),
        }
    }

    pub fn token_update_failed(stage: &str, error: &str, upstream_status: Option<u16>) -> Self {
        Self {
            event_type: "token_update_failed".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            details: serde_json::json!({
                "stage": stage,
                "error": error,
                "upstream_status": upstream_status,
            }),
        }
    }
}

// ── HMAC Signing ─────────────────────────────────────────────

/// Hex HMAC-SHA256 of `payload`, formatted as "sha256=<hex>".
fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

// ── Alert Notifier ───────────────────────────────────────────

/// Posts alert events to the configured URLs.
/// Deliveries run on a spawned task and are retried with a short back-off
/// (1s → 5s); a lost alert is logged, never surfaced to the caller.
#[derive(Clone)]
pub struct AlertNotifier {
    client: reqwest::Client,
    urls: Vec<String>,
    signing_secret: Option<String>,
}

impl AlertNotifier {
    pub fn new(urls: Vec<String>, signing_secret: Option<String>) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .user_agent(concat!("works-bot/", env!("CARGO_PKG_VERSION")))
                .build()?,
            urls,
            signing_secret,
        })
    }

    /// Notifier with no targets; `dispatch` only logs.
    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            urls: Vec::new(),
            signing_secret: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.urls.is_empty()
    }

    /// Deliver one event to one URL, retrying on failure.
    pub async fn send(&self, url: &str, event: &AlertEvent) -> Result<()> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| anyhow::anyhow!("alert serialize error: {}", e))?;
        let delivery_id = uuid::Uuid::new_v4().to_string();
        let signature = self
            .signing_secret
            .as_deref()
            .map(|s| hmac_sha256_hex(s, &payload));

        let backoff_secs: &[u64] = &[0, 1, 5];

        for (attempt, &delay) in backoff_secs.iter().enumerate() {
            if delay > 0 {
                debug!(url, attempt, delay_secs = delay, "retrying alert delivery");
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }

            let mut req = self
                .client
                .post(url)
                .header("content-type", "application/json")
                .header("x-works-bot-delivery-id", &delivery_id)
                .header("x-works-bot-event", &event.event_type);
            if let Some(ref sig) = signature {
                req = req.header("x-works-bot-signature", sig.as_str());
            }

            match req.body(payload.clone()).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!(
                        url,
                        event_type = %event.event_type,
                        delivery_id = %delivery_id,
                        attempt,
                        "alert delivered"
                    );
                    return Ok(());
                }
                Ok(resp) => {
                    warn!(
                        url,
                        event_type = %event.event_type,
                        attempt,
                        status = %resp.status(),
                        "alert delivery failed (non-2xx)"
                    );
                }
                Err(e) => {
                    warn!(
                        url,
                        event_type = %event.event_type,
                        attempt,
                        error = %e,
                        "alert request error"
                    );
                }
            }
        }

        Err(anyhow::anyhow!(
            "alert delivery failed after {} attempts: {}",
            backoff_secs.len(),
            url
        ))
    }

    /// Fire-and-forget delivery to every configured URL.
    pub fn dispatch(&self, event: AlertEvent) {
        if self.urls.is_empty() {
            debug!(event_type = %event.event_type, "no alert targets configured");
            return;
        }

        let notifier = self.clone();
        tokio::spawn(async move {
            for url in &notifier.urls {
                if let Err(e) = notifier.send(url, &event).await {
                    warn!(url, error = %e, "alert dispatch ultimately failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_chat_failure_event_fields() {
        let event = AlertEvent::chat_processing_failed("B1", Some("U1"), "bot API returned 401");
        assert_eq!(event.event_type, "chat_processing_failed");
        assert_eq!(event.details["bot_id"], "B1");
        assert_eq!(event.details["user_id"], "U1");
        assert_eq!(event.details["error"], "bot API returned 401");
        assert!(!event.timestamp.is_empty());
    }

    #[test]
    fn test_token_failure_event_fields() {
        let event = AlertEvent::token_update_failed("refresh", "invalid_grant", Some(400));
        assert_eq!(event.details["stage"], "refresh");
        assert_eq!(event.details["upstream_status"], 400);
    }

    #[test]
    fn test_hmac_signature_deterministic() {
        let sig1 = hmac_sha256_hex("secret123", b"payload");
        let sig2 = hmac_sha256_hex("secret123", b"payload");
        assert_eq!(sig1, sig2);
        assert!(sig1.starts_with("sha256="));
        assert_ne!(sig1, hmac_sha256_hex("secret124", b"payload"));
    }

    #[tokio::test]
    async fn test_send_signs_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/alerts"))
            .and(header("x-works-bot-event", "token_update_failed"))
            .and(header_exists("x-works-bot-signature"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/alerts", server.uri());
        let notifier = AlertNotifier::new(vec![url.clone()], Some("s3cret".into())).unwrap();
        let event = AlertEvent::token_update_failed("bootstrap", "boom", None);
        notifier.send(&url, &event).await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_notifier_dispatch_is_noop() {
        let notifier = AlertNotifier::disabled();
        assert!(!notifier.is_enabled());
        notifier.dispatch(AlertEvent::chat_processing_failed("B", None, "e"));
    }
}
