//! Replies to chat events.
//!
//! The dispatcher hands each verified event to a [`ContentHandler`]; the
//! default [`ImageInfoResponder`] describes images and asks for one otherwise.

use std::io::Cursor;

use anyhow::Context;
use async_trait::async_trait;
use image::{GenericImageView, ImageReader, Limits};

use super::client::BotApi;
use crate::models::chat::{ChatEvent, Content, OutgoingMessage};

pub const ASK_FOR_IMAGE: &str = "Please send an image.";

const MAX_IMAGE_DIMENSION: u32 = 16384;

/// What a handler may use while producing a reply.
pub struct BotSession<'a> {
    pub bot_id: &'a str,
    pub access_token: &'a str,
    pub api: &'a dyn BotApi,
}

#[async_trait]
pub trait ContentHandler: Send + Sync {
    /// Reply to send back to the event's user, if any.
    async fn reply(
        &self,
        event: &ChatEvent,
        session: &BotSession<'_>,
    ) -> anyhow::Result<Option<OutgoingMessage>>;
}

pub struct ImageInfoResponder;

#[async_trait]
impl ContentHandler for ImageInfoResponder {
    async fn reply(
        &self,
        event: &ChatEvent,
        session: &BotSession<'_>,
    ) -> anyhow::Result<Option<OutgoingMessage>> {
        if !event.is_message() {
            tracing::debug!(event_type = %event.event_type, "ignoring non-message event");
            return Ok(None);
        }

        match &event.content {
            Some(Content::Image { file_id }) => {
                let data = session
                    .api
                    .get_attachment(session.bot_id, file_id, session.access_token)
                    .await
                    .context("failed to download image attachment")?;
                let text = tokio::task::spawn_blocking(move || describe_image(&data))
                    .await
                    .context("image description task panicked")??;
                Ok(Some(OutgoingMessage::text(text)))
            }
            _ => Ok(Some(OutgoingMessage::text(ASK_FOR_IMAGE))),
        }
    }
}

/// Human-readable size, format and color mode of an encoded image.
///
/// CPU-bound; call inside `spawn_blocking`.
pub fn describe_image(data: &[u8]) -> anyhow::Result<String> {
    let mut reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .context("cannot read image header")?;
    let format = reader.format().context("unrecognized image format")?;

    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_IMAGE_DIMENSION);
    limits.max_image_height = Some(MAX_IMAGE_DIMENSION);
    reader.limits(limits);

    let img = reader.decode().context("image decode failed")?;
    let (width, height) = img.dimensions();

    Ok(format!(
        "Size: ({}, {})\nFormat: {:?}\nMode: {:?}",
        width,
        height,
        format,
        img.color()
    ))
}
