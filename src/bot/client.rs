//! Bot platform REST client.
//!
//! Every call is bearer-authenticated with the current access token, makes a
//! single attempt with an explicit timeout and turns any non-2xx response
//! into `UpstreamError::Status`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{multipart, Client, RequestBuilder};
use serde_json::json;

use crate::errors::UpstreamError;
use crate::models::chat::{AttachmentSlot, OutgoingMessage, UploadReceipt};

#[async_trait]
pub trait BotApi: Send + Sync {
    async fn send_message(
        &self,
        message: &OutgoingMessage,
        bot_id: &str,
        user_id: &str,
        access_token: &str,
    ) -> Result<(), UpstreamError>;

    async fn get_attachment(
        &self,
        bot_id: &str,
        file_id: &str,
        access_token: &str,
    ) -> Result<Bytes, UpstreamError>;

    /// Register an attachment and obtain its upload URL.
    async fn post_attachment_descriptor(
        &self,
        bot_id: &str,
        file_name: &str,
        access_token: &str,
    ) -> Result<AttachmentSlot, UpstreamError>;

    /// Upload file content to a URL from `post_attachment_descriptor`.
    async fn upload_file(
        &self,
        upload_url: &str,
        file_name: &str,
        data: Bytes,
        access_token: &str,
    ) -> Result<UploadReceipt, UpstreamError>;
}

pub struct HttpBotApi {
    http: Client,
    base_url: String,
    upload_timeout: Duration,
}

impl HttpBotApi {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        upload_timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            upload_timeout,
        })
    }

    fn bot_url(&self, bot_id: &str, rest: &str) -> String {
        format!(
            "{}/bots/{}/{}",
            self.base_url,
            urlencoding::encode(bot_id),
            rest
        )
    }

    async fn execute(req: RequestBuilder) -> Result<reqwest::Response, UpstreamError> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "bot API call failed");
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl BotApi for HttpBotApi {
    async fn send_message(
        &self,
        message: &OutgoingMessage,
        bot_id: &str,
        user_id: &str,
        access_token: &str,
    ) -> Result<(), UpstreamError> {
        let url = self.bot_url(
            bot_id,
            &format!("users/{}/messages", urlencoding::encode(user_id)),
        );
        Self::execute(self.http.post(&url).bearer_auth(access_token).json(message)).await?;
        tracing::debug!(bot_id, user_id, "message sent");
        Ok(())
    }

    async fn get_attachment(
        &self,
        bot_id: &str,
        file_id: &str,
        access_token: &str,
    ) -> Result<Bytes, UpstreamError> {
        let url = self.bot_url(
            bot_id,
            &format!("attachments/{}", urlencoding::encode(file_id)),
        );
        let resp = Self::execute(
            self.http
                .get(&url)
                .bearer_auth(access_token)
                .timeout(self.upload_timeout),
        )
        .await?;
        Ok(resp.bytes().await?)
    }

    async fn post_attachment_descriptor(
        &self,
        bot_id: &str,
        file_name: &str,
        access_token: &str,
    ) -> Result<AttachmentSlot, UpstreamError> {
        let url = self.bot_url(bot_id, "attachments");
        let resp = Self::execute(
            self.http
                .post(&url)
                .bearer_auth(access_token)
                .json(&json!({ "fileName": file_name })),
        )
        .await?;
        resp.json()
            .await
            .map_err(|e| UpstreamError::Malformed(format!("attachment descriptor: {}", e)))
    }

    async fn upload_file(
        &self,
        upload_url: &str,
        file_name: &str,
        data: Bytes,
        access_token: &str,
    ) -> Result<UploadReceipt, UpstreamError> {
        let part = multipart::Part::bytes(data.to_vec()).file_name(file_name.to_string());
        let form = multipart::Form::new().part("FileData", part);
        let resp = Self::execute(
            self.http
                .post(upload_url)
                .bearer_auth(access_token)
                .multipart(form)
                .timeout(self.upload_timeout),
        )
        .await?;
        resp.json()
            .await
            .map_err(|e| UpstreamError::Malformed(format!("upload receipt: {}", e)))
    }
}
