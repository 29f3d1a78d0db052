//! Best-effort fan-out of confirmed orders and contact messages.
//!
//! Nothing here returns an error to the caller: each side effect reports
//! success as a flag and logs its failure.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::config::AppConfig;
use crate::models::{ContactMessage, DeliveryOutcome, MessageKind, Order};
use crate::store::{Document, TieredStore, MESSAGES_COLLECTION, ORDERS_COLLECTION};

pub mod format;
pub mod telegram;

pub use telegram::{BotApi, TelegramClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Order,
    Contact,
    Ticket,
}

impl From<MessageKind> for NotificationKind {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Contact => NotificationKind::Contact,
            MessageKind::Ticket => NotificationKind::Ticket,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NotificationKind::Order => "order",
            NotificationKind::Contact => "contact",
            NotificationKind::Ticket => "ticket",
        })
    }
}

/// Bot chats by notification kind.
#[derive(Debug, Clone, Default)]
pub struct NotificationChannels {
    pub orders_chat_id: Option<String>,
    pub support_chat_id: Option<String>,
}

impl NotificationChannels {
    pub fn from_config(cfg: &AppConfig) -> Self {
        let clean = |v: &Option<String>| v.as_ref().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Self {
            orders_chat_id: clean(&cfg.telegram_orders_chat_id),
            support_chat_id: clean(&cfg.telegram_support_chat_id),
        }
    }

    /// Support messages fall back to the orders chat.
    pub fn chat_for(&self, kind: NotificationKind) -> Option<&str> {
        match kind {
            NotificationKind::Order => self.orders_chat_id.as_deref(),
            NotificationKind::Contact | NotificationKind::Ticket => self
                .support_chat_id
                .as_deref()
                .or(self.orders_chat_id.as_deref()),
        }
    }
}

/// Persists records and posts them to the bot, concurrently.
#[derive(Clone)]
pub struct OrderNotifier {
    store: TieredStore,
    bot: Option<Arc<dyn BotApi>>,
    channels: NotificationChannels,
}

impl OrderNotifier {
    pub fn new(store: TieredStore, bot: Option<Arc<dyn BotApi>>, channels: NotificationChannels) -> Self {
        Self { store, bot, channels }
    }

    /// A missing bot token disables posting, not the notifier.
    pub fn from_config(cfg: &AppConfig, store: TieredStore) -> Self {
        let bot: Option<Arc<dyn BotApi>> = match TelegramClient::from_config(cfg) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!("Bot notifications disabled: {}", e);
                None
            }
        };
        Self::new(store, bot, NotificationChannels::from_config(cfg))
    }

    pub fn store(&self) -> &TieredStore {
        &self.store
    }

    /// Persists the order and posts its summary; records the outcome on the order.
    #[instrument(skip(self, order), fields(order_number = %order.order_number, payment_method = %order.payment_method))]
    pub async fn notify_order(&self, order: &Order) -> DeliveryOutcome {
        let persist = self.persist(ORDERS_COLLECTION, &order.order_number, order);
        let post = self.post(NotificationKind::Order, format::format_order(order));
        let (persisted, notified) = tokio::join!(persist, post);

        let outcome = DeliveryOutcome { persisted, notified };
        self.store.record_delivery(&order.order_number, outcome);
        if outcome.is_complete() {
            info!("Order notification delivered");
        } else {
            warn!(persisted, notified, "Order notification incomplete");
        }
        outcome
    }

    /// Same fan-out for a contact message or ticket.
    #[instrument(skip(self, message), fields(kind = %message.kind))]
    pub async fn notify_message(&self, message: &ContactMessage) -> DeliveryOutcome {
        let id = format!(
            "{}-{}",
            message.created_at.timestamp_millis(),
            uuid::Uuid::new_v4().simple()
        );
        let persist = self.persist(MESSAGES_COLLECTION, &id, message);
        let post = self.post(message.kind.into(), format::format_message(message));
        let (persisted, notified) = tokio::join!(persist, post);

        let outcome = DeliveryOutcome { persisted, notified };
        if !outcome.is_complete() {
            warn!(persisted, notified, "Message notification incomplete");
        }
        outcome
    }

    /// Runs [`notify_order`](Self::notify_order) on its own task.
    pub fn spawn_order(&self, order: Order) -> JoinHandle<DeliveryOutcome> {
        let notifier = self.clone();
        tokio::spawn(async move { notifier.notify_order(&order).await })
    }

    pub fn spawn_message(&self, message: ContactMessage) -> JoinHandle<DeliveryOutcome> {
        let notifier = self.clone();
        tokio::spawn(async move { notifier.notify_message(&message).await })
    }

    async fn persist<T: Serialize>(&self, collection: &str, id: &str, record: &T) -> bool {
        match Document::from_record(id, record) {
            Ok(doc) => self.store.save(collection, doc).await.is_synced(),
            Err(e) => {
                error!("Could not encode {} record {}: {}", collection, id, e);
                false
            }
        }
    }

    async fn post(&self, kind: NotificationKind, text: String) -> bool {
        let Some(bot) = &self.bot else {
            return false;
        };
        let Some(chat_id) = self.channels.chat_for(kind) else {
            warn!(channel = %kind, "No chat configured for notification");
            return false;
        };
        match bot.send_message(chat_id, &text).await {
            Ok(()) => true,
            Err(e) => {
                error!(channel = %kind, "Bot notification failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ServiceError;
    use crate::models::{Customer, OrderItem, OrderStatus, PaymentMethod};
    use crate::store::MockDocumentStore;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use telegram::MockBotApi;

    fn order() -> Order {
        Order {
            order_number: "MX-ABC123".into(),
            customer: Customer {
                name: "Dana".into(),
                email: "dana@example.com".into(),
                phone: "050".into(),
                city: "Haifa".into(),
                street: "Herzl 1".into(),
                zip: "31000".into(),
            },
            items: vec![OrderItem {
                id: "mx-1".into(),
                name: "MX Scooter".into(),
                qty: 1,
                price: dec!(1899),
            }],
            subtotal: dec!(1899),
            discount: dec!(0),
            promo_code: None,
            total: dec!(1899),
            payment_method: PaymentMethod::Card,
            status: OrderStatus::Pending,
            payment_intent_id: Some("pi_123".into()),
            created_at: Utc::now(),
        }
    }

    fn channels() -> NotificationChannels {
        NotificationChannels {
            orders_chat_id: Some("-100orders".into()),
            support_chat_id: Some("-100support".into()),
        }
    }

    #[test]
    fn support_kinds_fall_back_to_orders_chat() {
        let only_orders = NotificationChannels {
            orders_chat_id: Some("-1".into()),
            support_chat_id: None,
        };
        assert_eq!(only_orders.chat_for(NotificationKind::Ticket), Some("-1"));
        assert_eq!(channels().chat_for(NotificationKind::Contact), Some("-100support"));
        assert_eq!(channels().chat_for(NotificationKind::Order), Some("-100orders"));
    }

    #[tokio::test]
    async fn both_side_effects_succeed() {
        let mut remote = MockDocumentStore::new();
        remote
            .expect_create()
            .withf(|collection, doc| collection == "orders" && doc.id == "MX-ABC123")
            .times(1)
            .returning(|_, d| Ok(d.id.clone()));
        let mut bot = MockBotApi::new();
        bot.expect_send_message()
            .withf(|chat, _| chat == "-100orders")
            .times(1)
            .returning(|_, _| Ok(()));

        let store = TieredStore::new(Some(Arc::new(remote)));
        let notifier = OrderNotifier::new(store.clone(), Some(Arc::new(bot)), channels());
        let outcome = notifier.notify_order(&order()).await;

        assert_eq!(outcome, DeliveryOutcome { persisted: true, notified: true });
        assert_eq!(store.delivery("MX-ABC123"), Some(Some(outcome)));
    }

    #[tokio::test]
    async fn failures_are_reported_not_raised() {
        let mut remote = MockDocumentStore::new();
        remote
            .expect_create()
            .returning(|_, _| Err(ServiceError::NetworkError("store down".into())));
        let mut bot = MockBotApi::new();
        bot.expect_send_message()
            .returning(|_, _| Err(ServiceError::NotificationError("bot down".into())));

        let store = TieredStore::new(Some(Arc::new(remote)));
        let notifier = OrderNotifier::new(store.clone(), Some(Arc::new(bot)), channels());
        let outcome = notifier.spawn_order(order()).await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::default());
        // still kept in the local tier for a later sync
        assert_eq!(store.pending_count(), 1);
    }

    #[tokio::test]
    async fn tickets_go_to_support_chat() {
        let mut bot = MockBotApi::new();
        bot.expect_send_message()
            .withf(|chat, text| chat == "-100support" && text.starts_with("New support ticket"))
            .times(1)
            .returning(|_, _| Ok(()));

        let notifier = OrderNotifier::new(TieredStore::local_only(), Some(Arc::new(bot)), channels());
        let outcome = notifier
            .notify_message(&ContactMessage {
                kind: MessageKind::Ticket,
                name: "Omar".into(),
                email: None,
                phone: Some("+972501234567".into()),
                subject: None,
                message: "Broken charger".into(),
                created_at: Utc::now(),
            })
            .await;

        assert!(outcome.notified);
        assert!(!outcome.persisted);
    }
}
