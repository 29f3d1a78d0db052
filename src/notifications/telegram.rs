use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::config::AppConfig;
use crate::errors::ServiceError;

/// Telegram rejects longer message texts.
pub const MAX_MESSAGE_CHARS: usize = 4096;
pub const MAX_CAPTION_CHARS: usize = 1024;

#[derive(Debug, Deserialize)]
struct BotApiResponse {
    ok: bool,
    description: Option<String>,
}

/// Outbound half of the messaging bot.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BotApi: Send + Sync {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ServiceError>;

    /// Uploads `content` as a file named `file_name`.
    async fn send_document(
        &self,
        chat_id: &str,
        file_name: &str,
        content: Vec<u8>,
        caption: &str,
    ) -> Result<(), ServiceError>;
}

/// Telegram Bot API client.
#[derive(Clone)]
pub struct TelegramClient {
    bot_url: String,
    client: reqwest::Client,
}

impl TelegramClient {
    pub fn new(api_base: &str, token: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            bot_url: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
            client,
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, ServiceError> {
        let token = cfg.require_telegram_token()?;
        Self::new(&cfg.telegram_api_base, token, cfg.http_timeout())
    }

    async fn check(method: &str, response: reqwest::Response) -> Result<(), ServiceError> {
        let status = response.status();
        let body: Option<BotApiResponse> = response.json().await.ok();
        match body {
            Some(BotApiResponse { ok: true, .. }) if status.is_success() => Ok(()),
            Some(BotApiResponse { description, .. }) => {
                let detail = description.unwrap_or_else(|| status.to_string());
                warn!(status = status.as_u16(), "Bot API {} failed: {}", method, detail);
                Err(ServiceError::NotificationError(format!("{}: {}", method, detail)))
            }
            None => Err(ServiceError::NotificationError(format!(
                "{}: unreadable response ({})",
                method, status
            ))),
        }
    }
}

#[async_trait]
impl BotApi for TelegramClient {
    #[instrument(skip(self, text))]
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ServiceError> {
        let text = crate::payments::metadata::truncate_chars(text, MAX_MESSAGE_CHARS);
        let response = self
            .client
            .post(format!("{}/sendMessage", self.bot_url))
            .json(&json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await?;

        Self::check("sendMessage", response).await?;
        debug!("Message delivered to chat {}", chat_id);
        Ok(())
    }

    #[instrument(skip(self, content, caption), fields(bytes = content.len()))]
    async fn send_document(
        &self,
        chat_id: &str,
        file_name: &str,
        content: Vec<u8>,
        caption: &str,
    ) -> Result<(), ServiceError> {
        let document = reqwest::multipart::Part::bytes(content)
            .file_name(file_name.to_string())
            .mime_str("text/csv")
            .map_err(|e| ServiceError::InternalError(format!("multipart: {}", e)))?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text(
                "caption",
                crate::payments::metadata::truncate_chars(caption, MAX_CAPTION_CHARS),
            )
            .part("document", document);

        let response = self
            .client
            .post(format!("{}/sendDocument", self.bot_url))
            .multipart(form)
            .send()
            .await?;

        Self::check("sendDocument", response).await?;
        debug!("Document {} delivered to chat {}", file_name, chat_id);
        Ok(())
    }
}
