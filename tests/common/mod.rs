#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response};
use chrono::{TimeZone, Utc};
use dashmap::DashMap;
use rust_decimal_macros::dec;
use serde_json::Value;

use mx_storefront::{
    config::AppConfig,
    errors::ServiceError,
    models::{Customer, Order, OrderItem, OrderStatus, PaymentMethod},
    notifications::BotApi,
    store::{Document, DocumentStore},
};

pub const STRIPE_SECRET: &str = "sk_test_storefront";
pub const BOT_TOKEN: &str = "123456:TEST";

/// Configuration with every integration switched off.
pub fn base_config() -> AppConfig {
    AppConfig {
        environment: "test".to_string(),
        cod_processing_delay_ms: 0,
        http_timeout_secs: 2,
        stripe_max_network_retries: 0,
        ..AppConfig::default()
    }
}

pub fn stripe_config(api_base: &str) -> AppConfig {
    AppConfig {
        stripe_secret_key: Some(STRIPE_SECRET.to_string()),
        stripe_api_base: api_base.to_string(),
        ..base_config()
    }
}

pub fn customer() -> Customer {
    Customer {
        name: "Dana Levi".to_string(),
        email: "dana@example.com".to_string(),
        phone: "+972501234567".to_string(),
        city: "Haifa".to_string(),
        street: "Herzl 12".to_string(),
        zip: "3303112".to_string(),
    }
}

pub fn items() -> Vec<OrderItem> {
    vec![OrderItem {
        id: "mx-1".to_string(),
        name: "MX Scooter".to_string(),
        qty: 2,
        price: dec!(9.45),
    }]
}

pub fn order(order_number: &str, payment_method: PaymentMethod) -> Order {
    Order {
        order_number: order_number.to_string(),
        customer: customer(),
        items: items(),
        subtotal: dec!(18.90),
        discount: dec!(0),
        promo_code: None,
        total: dec!(18.90),
        payment_method,
        status: OrderStatus::Pending,
        payment_intent_id: None,
        created_at: Utc.with_ymd_and_hms(2026, 3, 9, 10, 30, 0).unwrap(),
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    serde_json::from_slice(&bytes).expect("JSON body")
}

pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    String::from_utf8(bytes.to_vec()).expect("UTF-8 body")
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("valid request")
}

/// Bot double recording every call.
#[derive(Default)]
pub struct RecordingBot {
    pub messages: Mutex<Vec<(String, String)>>,
    pub documents: Mutex<Vec<(String, String, Vec<u8>)>>,
    pub failing: AtomicBool,
}

impl RecordingBot {
    pub fn failing() -> Self {
        let bot = Self::default();
        bot.failing.store(true, Ordering::SeqCst);
        bot
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn documents(&self) -> Vec<(String, String, Vec<u8>)> {
        self.documents.lock().unwrap().clone()
    }
}

#[async_trait]
impl BotApi for RecordingBot {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ServiceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServiceError::NotificationError("bot is down".into()));
        }
        self.messages
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: &str,
        file_name: &str,
        content: Vec<u8>,
        _caption: &str,
    ) -> Result<(), ServiceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServiceError::NotificationError("bot is down".into()));
        }
        self.documents
            .lock()
            .unwrap()
            .push((chat_id.to_string(), file_name.to_string(), content));
        Ok(())
    }
}

/// Remote document store double that can be taken offline.
#[derive(Default)]
pub struct MemoryStore {
    pub docs: DashMap<(String, String), Document>,
    pub offline: AtomicBool,
}

impl MemoryStore {
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn stored(&self, collection: &str, id: &str) -> Option<Document> {
        self.docs
            .get(&(collection.to_string(), id.to_string()))
            .map(|entry| entry.value().clone())
    }

    fn check_online(&self) -> Result<(), ServiceError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(ServiceError::NetworkError("store unreachable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, collection: &str, doc: &Document) -> Result<String, ServiceError> {
        self.check_online()?;
        self.docs
            .insert((collection.to_string(), doc.id.clone()), doc.clone());
        Ok(doc.id.clone())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, ServiceError> {
        self.check_online()?;
        Ok(self
            .docs
            .iter()
            .filter(|entry| entry.key().0 == collection)
            .map(|entry| entry.value().clone())
            .collect())
    }

}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
