use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::errors::ServiceError;

/// Prefix of every order number.
pub const ORDER_NUMBER_PREFIX: &str = "MX-";

/// Largest subtotal or total accepted, in major units.
pub const MAX_ORDER_AMOUNT: i64 = 100_000_000;

/// How the customer pays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    /// Cash on delivery: unpaid until the courier collects
    Cod,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Cod => "cod",
        })
    }
}

/// Order status, set once at creation and changed by hand afterwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        })
    }
}

/// Contact and shipping details collected by the checkout form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[validate(custom = "not_blank")]
    pub name: String,
    #[validate(custom = "email_has_at")]
    pub email: String,
    #[validate(custom = "not_blank")]
    pub phone: String,
    #[validate(custom = "not_blank")]
    pub city: String,
    #[validate(custom = "not_blank")]
    pub street: String,
    #[validate(custom = "not_blank")]
    pub zip: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: String,
    pub name: String,
    pub qty: u32,
    /// Unit price in major units
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub price: Decimal,
}

impl OrderItem {
    /// `None` when `price * qty` overflows.
    pub fn line_total(&self) -> Option<Decimal> {
        self.price.checked_mul(Decimal::from(self.qty))
    }
}

/// Sum of the line totals, bounded by [`MAX_ORDER_AMOUNT`].
pub fn items_subtotal(items: &[OrderItem]) -> Result<Decimal, ServiceError> {
    let cap = Decimal::from(MAX_ORDER_AMOUNT);
    items
        .iter()
        .try_fold(Decimal::ZERO, |sum, item| {
            item.line_total()
                .and_then(|line| sum.checked_add(line))
                .filter(|sum| *sum <= cap)
        })
        .ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Order amount exceeds the maximum of {}",
                MAX_ORDER_AMOUNT
            ))
        })
}

/// A single checkout attempt, written once to the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Generated at confirmation time when the client leaves it empty
    #[serde(default)]
    pub order_number: String,
    pub customer: Customer,
    pub items: Vec<OrderItem>,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub discount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promo_code: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub total: Decimal,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Rejects orders that must never be recorded: no items, or nothing to pay.
    pub fn check_invariants(&self) -> Result<(), ServiceError> {
        if self.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "Order must contain at least one item".to_string(),
            ));
        }
        if let Some(item) = self.items.iter().find(|i| i.qty == 0) {
            return Err(ServiceError::ValidationError(format!(
                "Item '{}' has zero quantity",
                item.name
            )));
        }
        if self.items.iter().any(|i| i.price.is_sign_negative()) {
            return Err(ServiceError::ValidationError(
                "Item prices cannot be negative".to_string(),
            ));
        }
        items_subtotal(&self.items)?;
        if self.total <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Order total must be greater than zero".to_string(),
            ));
        }
        if self.total > Decimal::from(MAX_ORDER_AMOUNT) {
            return Err(ServiceError::ValidationError(format!(
                "Order total exceeds the maximum of {}",
                MAX_ORDER_AMOUNT
            )));
        }
        if !self.order_number.starts_with(ORDER_NUMBER_PREFIX) {
            return Err(ServiceError::ValidationError(format!(
                "Order number must start with {}",
                ORDER_NUMBER_PREFIX
            )));
        }
        self.customer.validate()?;
        Ok(())
    }
}

/// Result of the two fire-and-forget side effects of a confirmed order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryOutcome {
    pub persisted: bool,
    pub notified: bool,
}

impl DeliveryOutcome {
    pub fn is_complete(&self) -> bool {
        self.persisted && self.notified
    }
}

/// `MX-` followed by the millisecond timestamp in upper-case base 36.
///
/// Two orders in the same millisecond get the same number.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis().max(0) as u64;
    format!("{}{}", ORDER_NUMBER_PREFIX, to_base36(millis))
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

pub(crate) fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("required");
        err.message = Some("This field is required".into());
        return Err(err);
    }
    Ok(())
}

pub(crate) fn email_has_at(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if !trimmed.contains('@') {
        let mut err = ValidationError::new("email");
        err.message = Some("Email must contain @".into());
        return Err(err);
    }
    Ok(())
}
