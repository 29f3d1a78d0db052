mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;
use mx_storefront::{
    bot::{BotCommandHandler, CommandOutcome, Update},
    models::{ContactMessage, MessageKind, PaymentMethod},
    notifications::{BotApi, NotificationChannels, OrderNotifier, TelegramClient},
    store::{Document, TieredStore, MESSAGES_COLLECTION, ORDERS_COLLECTION},
};

fn telegram(server: &MockServer) -> Arc<dyn BotApi> {
    Arc::new(TelegramClient::new(&server.uri(), BOT_TOKEN, Duration::from_secs(2)).unwrap())
}

fn channels() -> NotificationChannels {
    NotificationChannels {
        orders_chat_id: Some("-100orders".into()),
        support_chat_id: None,
    }
}

fn update(chat_id: i64, text: &str) -> Update {
    serde_json::from_value(json!({
        "update_id": 991,
        "message": { "message_id": 5, "chat": { "id": chat_id, "type": "private" }, "text": text }
    }))
    .unwrap()
}

#[tokio::test]
async fn order_summary_is_posted_to_the_orders_chat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{}/sendMessage", BOT_TOKEN)))
        .and(body_partial_json(json!({ "chat_id": "-100orders" })))
        .and(body_string_contains("MX-TG1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": {} })))
        .expect(1)
        .mount(&server)
        .await;

    let remote = shared(MemoryStore::default());
    let store = TieredStore::new(Some(remote.clone()));
    let notifier = OrderNotifier::new(store.clone(), Some(telegram(&server)), channels());

    let outcome = notifier.notify_order(&order("MX-TG1", PaymentMethod::Card)).await;
    assert!(outcome.persisted);
    assert!(outcome.notified);
    assert!(remote
        .docs
        .contains_key(&(ORDERS_COLLECTION.to_string(), "MX-TG1".to_string())));
    assert_eq!(store.delivery("MX-TG1"), Some(Some(outcome)));
}

#[tokio::test]
async fn bot_failure_does_not_block_persistence() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{}/sendMessage", BOT_TOKEN)))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: chat not found"
        })))
        .mount(&server)
        .await;

    let remote = shared(MemoryStore::default());
    let store = TieredStore::new(Some(remote.clone()));
    let notifier = OrderNotifier::new(store.clone(), Some(telegram(&server)), channels());

    let outcome = notifier.notify_order(&order("MX-TG2", PaymentMethod::Cod)).await;
    assert!(outcome.persisted);
    assert!(!outcome.notified);
    assert_eq!(store.delivery("MX-TG2"), Some(Some(outcome)));
}

#[tokio::test]
async fn store_outage_still_notifies_and_queues_the_order() {
    let bot = Arc::new(RecordingBot::default());
    let remote = shared(MemoryStore::default());
    remote.set_offline(true);
    let store = TieredStore::new(Some(remote.clone()));
    let notifier = OrderNotifier::new(store.clone(), Some(bot.clone()), channels());

    let outcome = notifier.notify_order(&order("MX-TG3", PaymentMethod::Card)).await;
    assert!(!outcome.persisted);
    assert!(outcome.notified);
    assert_eq!(store.pending_count(), 1);
    assert_eq!(bot.messages().len(), 1);
}

#[tokio::test]
async fn support_messages_fall_back_to_the_orders_chat() {
    let bot = Arc::new(RecordingBot::default());
    let store = TieredStore::local_only();
    let notifier = OrderNotifier::new(store.clone(), Some(bot.clone()), channels());

    let message: ContactMessage = serde_json::from_value(json!({
        "type": "contact",
        "name": "Noa",
        "email": "noa@example.com",
        "message": "Do you ship to Eilat?"
    }))
    .unwrap();
    assert_eq!(message.kind, MessageKind::Contact);

    let outcome = notifier.notify_message(&message).await;
    assert!(outcome.notified);
    assert_eq!(bot.messages()[0].0, "-100orders");
    assert_eq!(store.list(MESSAGES_COLLECTION).await.len(), 1);
}

#[tokio::test]
async fn orders_command_uploads_a_csv_document() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{}/sendDocument", BOT_TOKEN)))
        .and(body_string_contains("MX-CSV1"))
        .and(body_string_contains("name=\"document\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": {} })))
        .expect(1)
        .mount(&server)
        .await;

    let store = TieredStore::local_only();
    store
        .save(
            ORDERS_COLLECTION,
            Document::from_record("MX-CSV1", &order("MX-CSV1", PaymentMethod::Card)).unwrap(),
        )
        .await;
    let handler = BotCommandHandler::new(telegram(&server), store, vec!["42".into()]);

    let outcome = handler.handle(update(42, "/orders")).await.unwrap();
    assert_eq!(outcome, CommandOutcome::Exported { rows: 1 });
}

#[tokio::test]
async fn commands_from_other_chats_are_refused() {
    let bot = Arc::new(RecordingBot::default());
    let handler = BotCommandHandler::new(bot.clone(), TieredStore::local_only(), vec!["42".into()]);

    let outcome = handler.handle(update(7, "/orders")).await.unwrap();
    assert_eq!(outcome, CommandOutcome::Refused);
    assert!(bot.documents().is_empty());
    assert_eq!(bot.messages()[0].0, "7");
}

#[tokio::test]
async fn non_commands_and_empty_exports() {
    let bot = Arc::new(RecordingBot::default());
    let handler = BotCommandHandler::new(bot.clone(), TieredStore::local_only(), vec!["42".into()]);

    assert_eq!(
        handler.handle(update(42, "/orders please")).await.unwrap(),
        CommandOutcome::Ignored
    );
    assert_eq!(
        handler.handle(update(42, "/messages")).await.unwrap(),
        CommandOutcome::Replied
    );
    assert!(bot.documents().is_empty());
    assert_eq!(bot.messages()[0].1, "No messages yet.");
}
