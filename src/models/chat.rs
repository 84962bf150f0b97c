use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Callback body posted by the bot platform.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: EventSource,
    #[serde(default, rename = "issuedTime")]
    pub issued_time: Option<String>,
    #[serde(default)]
    pub content: Option<Content>,
}

impl ChatEvent {
    pub fn is_message(&self) -> bool {
        self.event_type == "message"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventSource {
    /// Absent on channel-scoped events such as `join` and `leave`.
    #[serde(default, rename = "userId")]
    pub user_id: Option<String>,
    #[serde(default, rename = "channelId")]
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text {
        #[serde(default)]
        text: String,
    },
    Image {
        #[serde(rename = "fileId")]
        file_id: String,
    },
    File {
        #[serde(rename = "fileId")]
        file_id: String,
    },
    #[serde(other)]
    Other,
}

/// A verified inbound webhook call. `raw_body` holds the exact bytes the
/// signature was computed over.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub raw_body: Bytes,
    pub signature: String,
    pub bot_id: String,
    pub event: ChatEvent,
}

/// Body of `POST /bots/{botId}/users/{userId}/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub content: MessageContent,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: MessageContent::Text { text: text.into() },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "fileId")]
        file_id: String,
    },
}

/// Response of `POST /bots/{botId}/attachments`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttachmentSlot {
    #[serde(rename = "fileId")]
    pub file_id: String,
    #[serde(rename = "uploadUrl")]
    pub upload_url: String,
}

/// Response of the upload URL.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadReceipt {
    #[serde(rename = "fileId")]
    pub file_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_text_message_without_text_field() {
        let event: ChatEvent = serde_json::from_str(
            r#"{"type":"message","source":{"userId":"U1"},"content":{"type":"text"}}"#,
        )
        .unwrap();
        assert!(event.is_message());
        assert_eq!(event.source.user_id.as_deref(), Some("U1"));
        assert_eq!(event.content, Some(Content::Text { text: String::new() }));
    }

    #[test]
    fn test_parses_image_and_unknown_content() {
        let image: ChatEvent = serde_json::from_value(json!({
            "type": "message",
            "source": {"userId": "U1", "channelId": "C1"},
            "content": {"type": "image", "fileId": "F1"}
        }))
        .unwrap();
        assert_eq!(image.content, Some(Content::Image { file_id: "F1".into() }));
        assert_eq!(image.source.channel_id.as_deref(), Some("C1"));

        let sticker: ChatEvent = serde_json::from_value(json!({
            "type": "message",
            "source": {"userId": "U1"},
            "content": {"type": "sticker", "packageId": "1", "stickerId": "2"}
        }))
        .unwrap();
        assert_eq!(sticker.content, Some(Content::Other));
    }

    #[test]
    fn test_join_event_has_no_content() {
        let event: ChatEvent =
            serde_json::from_value(json!({"type": "join", "source": {"userId": "U9"}})).unwrap();
        assert!(!event.is_message());
        assert!(event.content.is_none());
    }

    #[test]
    fn test_channel_event_without_user() {
        let event: ChatEvent = serde_json::from_value(json!({
            "type": "leave",
            "source": {"channelId": "C1"},
            "issuedTime": "2024-01-01T00:00:00.000Z"
        }))
        .unwrap();
        assert!(event.source.user_id.is_none());
        assert_eq!(event.source.channel_id.as_deref(), Some("C1"));
    }

    #[test]
    fn test_outgoing_text_wire_shape() {
        let body = serde_json::to_value(OutgoingMessage::text("Please send an image.")).unwrap();
        assert_eq!(
            body,
            json!({"content": {"type": "text", "text": "Please send an image."}})
        );
    }
}
