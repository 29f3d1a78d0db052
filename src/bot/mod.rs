//! Inbound bot commands for operators: exports delivered as chat file uploads.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::export::{self, ExportKind};
use crate::notifications::BotApi;
use crate::store::TieredStore;

/// Header carrying the secret configured with `setWebhook`.
pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

const HELP_TEXT: &str = "Available commands:\n\
/orders - export all orders as CSV\n\
/messages - export contact messages and tickets as CSV\n\
/help - show this message";

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    Orders,
    Messages,
    Help,
    Start,
}

impl BotCommand {
    /// Exact match on the trimmed text; anything else is not a command.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "/orders" => Some(BotCommand::Orders),
            "/messages" => Some(BotCommand::Messages),
            "/help" => Some(BotCommand::Help),
            "/start" => Some(BotCommand::Start),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Not a message, or not a command
    Ignored,
    /// Chat is not an admin chat
    Refused,
    Replied,
    Exported { rows: usize },
}

/// Answers operator commands sent to the bot.
#[derive(Clone)]
pub struct BotCommandHandler {
    bot: Arc<dyn BotApi>,
    store: TieredStore,
    admin_chats: Vec<String>,
}

impl BotCommandHandler {
    pub fn new(bot: Arc<dyn BotApi>, store: TieredStore, admin_chats: Vec<String>) -> Self {
        Self {
            bot,
            store,
            admin_chats,
        }
    }

    pub fn from_config(
        cfg: &AppConfig,
        bot: Arc<dyn BotApi>,
        store: TieredStore,
    ) -> Self {
        Self::new(bot, store, cfg.admin_chat_ids())
    }

    fn is_admin(&self, chat_id: &str) -> bool {
        self.admin_chats.iter().any(|id| id == chat_id)
    }

    #[instrument(skip(self, update), fields(update_id = update.update_id))]
    pub async fn handle(&self, update: Update) -> Result<CommandOutcome, ServiceError> {
        let Some(message) = update.message else {
            return Ok(CommandOutcome::Ignored);
        };
        let Some(command) = message.text.as_deref().and_then(BotCommand::parse) else {
            return Ok(CommandOutcome::Ignored);
        };
        let chat_id = message.chat.id.to_string();

        if !self.is_admin(&chat_id) {
            warn!(%chat_id, ?command, "Bot command from a non-admin chat");
            self.bot
                .send_message(&chat_id, "This chat is not authorized to use this bot.")
                .await?;
            return Ok(CommandOutcome::Refused);
        }

        info!(%chat_id, ?command, "Bot command");
        match command {
            BotCommand::Help | BotCommand::Start => {
                self.bot.send_message(&chat_id, HELP_TEXT).await?;
                Ok(CommandOutcome::Replied)
            }
            BotCommand::Orders => self.send_export(&chat_id, ExportKind::Orders).await,
            BotCommand::Messages => self.send_export(&chat_id, ExportKind::Messages).await,
        }
    }

    async fn send_export(&self, chat_id: &str, kind: ExportKind) -> Result<CommandOutcome, ServiceError> {
        let csv = export::export(&self.store, kind).await;
        if csv.rows == 0 {
            self.bot
                .send_message(chat_id, &format!("No {} yet.", kind.collection()))
                .await?;
            return Ok(CommandOutcome::Replied);
        }

        let caption = format!("{}: {} rows", csv.file_name, csv.rows);
        self.bot
            .send_document(chat_id, &csv.file_name, csv.content.into_bytes(), &caption)
            .await?;
        Ok(CommandOutcome::Exported { rows: csv.rows })
    }
}

/// Constant-time comparison of the configured and received secret tokens.
pub fn secret_matches(expected: Option<&str>, received: Option<&str>) -> bool {
    let Some(expected) = expected.filter(|s| !s.is_empty()) else {
        return true;
    };
    let Some(received) = received else {
        return false;
    };
    if expected.len() != received.len() {
        return false;
    }
    expected
        .bytes()
        .zip(received.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::telegram::MockBotApi;
    use crate::store::{Document, ORDERS_COLLECTION};
    use serde_json::json;

    fn update(chat_id: i64, text: &str) -> Update {
        serde_json::from_value(json!({
            "update_id": 1,
            "message": { "message_id": 7, "chat": { "id": chat_id, "type": "private" }, "text": text }
        }))
        .unwrap()
    }

    #[test]
    fn commands_match_exactly() {
        assert_eq!(BotCommand::parse(" /orders "), Some(BotCommand::Orders));
        assert_eq!(BotCommand::parse("/orders please"), None);
        assert_eq!(BotCommand::parse("/ORDERS"), None);
    }

    #[test]
    fn secret_is_optional_but_enforced_when_set() {
        assert!(secret_matches(None, None));
        assert!(secret_matches(Some("s3cret"), Some("s3cret")));
        assert!(!secret_matches(Some("s3cret"), Some("s3cres")));
        assert!(!secret_matches(Some("s3cret"), None));
    }

    #[tokio::test]
    async fn non_admin_chats_are_refused() {
        let mut bot = MockBotApi::new();
        bot.expect_send_message()
            .withf(|chat, text| chat == "555" && text.contains("not authorized"))
            .times(1)
            .returning(|_, _| Ok(()));
        bot.expect_send_document().times(0);

        let handler = BotCommandHandler::new(Arc::new(bot), TieredStore::local_only(), vec!["-100".into()]);
        let outcome = handler.handle(update(555, "/orders")).await.unwrap();
        assert_eq!(outcome, CommandOutcome::Refused);
    }

    #[tokio::test]
    async fn orders_command_uploads_csv() {
        let store = TieredStore::local_only();
        store
            .save(
                ORDERS_COLLECTION,
                Document::from_record("MX-1", &json!({ "orderNumber": "MX-1", "createdAt": "2026-01-01T00:00:00Z" }))
                    .unwrap(),
            )
            .await;

        let mut bot = MockBotApi::new();
        bot.expect_send_document()
            .withf(|chat, name, content, _| {
                chat == "-100" && name.ends_with(".csv") && content.starts_with("\u{FEFF}".as_bytes())
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let handler = BotCommandHandler::new(Arc::new(bot), store, vec!["-100".into()]);
        let outcome = handler.handle(update(-100, "/orders")).await.unwrap();
        assert_eq!(outcome, CommandOutcome::Exported { rows: 1 });
    }

    #[tokio::test]
    async fn plain_text_is_ignored() {
        let handler = BotCommandHandler::new(
            Arc::new(MockBotApi::new()),
            TieredStore::local_only(),
            vec!["-100".into()],
        );
        assert_eq!(
            handler.handle(update(-100, "hello")).await.unwrap(),
            CommandOutcome::Ignored
        );
    }
}
