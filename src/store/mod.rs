//! Document persistence: a remote document store plus an in-process local tier.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ServiceError;

pub mod firestore;
pub mod tiered;

pub use firestore::FirestoreStore;
pub use tiered::{SaveOutcome, TieredStore};

pub const ORDERS_COLLECTION: &str = "orders";
pub const MESSAGES_COLLECTION: &str = "messages";
pub const PROMO_CODES_COLLECTION: &str = "promoCodes";

/// A decoded document: plain JSON fields keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
            updated_at: None,
        }
    }

    /// Builds a document from any serializable record that encodes as a JSON object.
    pub fn from_record<T: Serialize>(id: impl Into<String>, record: &T) -> Result<Self, ServiceError> {
        match serde_json::to_value(record)? {
            Value::Object(fields) => Ok(Self::new(id, fields)),
            other => Err(ServiceError::SerializationError(format!(
                "expected a JSON object, got {}",
                other
            ))),
        }
    }

    pub fn into_record<T: for<'de> Deserialize<'de>>(self) -> Result<T, ServiceError> {
        Ok(serde_json::from_value(Value::Object(self.fields))?)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Creation timestamp from the `createdAt` field, if it parses.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.str_field("createdAt")
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Operations the storefront needs from a document database.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Creates `doc` in `collection`, returning the stored document id.
    ///
    /// A document that already exists under `doc.id` counts as created, so
    /// re-sending a write whose response was lost succeeds.
    async fn create(&self, collection: &str, doc: &Document) -> Result<String, ServiceError>;

    /// Lists every document of `collection`.
    async fn list(&self, collection: &str) -> Result<Vec<Document>, ServiceError>;
}
