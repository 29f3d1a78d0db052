//! Shapes order details into processor metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Processor limit on a single metadata value.
pub const MAX_METADATA_VALUE_CHARS: usize = 500;
/// Processor limit on keys per object.
pub const MAX_METADATA_KEYS: usize = 50;
const MAX_METADATA_KEY_CHARS: usize = 40;

/// A line as summarised in processor metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    pub id: String,
    pub name: String,
    pub qty: u32,
}

/// Builds the metadata map for a payment intent.
///
/// Explicit `customer_name`, `customer_email` and `items` win over the same keys
/// in `extra`. Keys are truncated to the processor limits and the map is capped at
/// [`MAX_METADATA_KEYS`] entries in key order.
pub fn build_intent_metadata(
    customer_name: Option<&str>,
    customer_email: Option<&str>,
    items: &[ItemSummary],
    extra: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();

    if let Some(name) = customer_name.map(str::trim).filter(|n| !n.is_empty()) {
        metadata.insert("customer_name".to_string(), name.to_string());
    }
    if let Some(email) = customer_email.map(str::trim).filter(|e| !e.is_empty()) {
        metadata.insert("customer_email".to_string(), email.to_string());
    }
    if !items.is_empty() {
        metadata.insert("items".to_string(), summarize_items(items));
    }

    for (key, value) in extra {
        if metadata.len() >= MAX_METADATA_KEYS {
            break;
        }
        let key = truncate_chars(key.trim(), MAX_METADATA_KEY_CHARS);
        if !key.is_empty() {
            metadata.entry(key).or_insert_with(|| value.clone());
        }
    }

    metadata
        .into_iter()
        .map(|(k, v)| (k, truncate_chars(&v, MAX_METADATA_VALUE_CHARS)))
        .collect()
}

/// `"Name x2, Other x1"`
pub fn summarize_items(items: &[ItemSummary]) -> String {
    items
        .iter()
        .map(|item| format!("{} x{}", item.name.trim(), item.qty))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Truncates on a char boundary; Hebrew and Arabic text is multi-byte.
pub(crate) fn truncate_chars(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        value.chars().take(max).collect()
    }
}
