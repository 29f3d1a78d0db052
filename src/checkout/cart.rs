use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::models::{items_subtotal, OrderItem, PromoBook, PromoCode};
use crate::payments::metadata::ItemSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    #[schema(value_type = f64)]
    pub subtotal: Decimal,
    #[schema(value_type = f64)]
    pub discount: Decimal,
    #[schema(value_type = f64)]
    pub total: Decimal,
}

/// Cart contents plus an optional applied promo code.
#[derive(Debug, Clone, Default)]
pub struct Cart {
    items: Vec<OrderItem>,
    promo: Option<PromoCode>,
}

impl Cart {
    pub fn new(items: Vec<OrderItem>) -> Self {
        Self { items, promo: None }
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn promo(&self) -> Option<&PromoCode> {
        self.promo.as_ref()
    }

    /// Looks `code` up at `now`; an invalid code leaves any previous promo in place.
    pub fn apply_promo(
        &mut self,
        book: &PromoBook,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<CartTotals, ServiceError> {
        let promo = book.lookup(code, now)?.clone();
        let previous = self.promo.replace(promo);
        self.totals().map_err(|e| {
            self.promo = previous;
            e
        })
    }

    pub fn clear_promo(&mut self) {
        self.promo = None;
    }

    /// Fails when the lines add up past the order amount cap.
    pub fn totals(&self) -> Result<CartTotals, ServiceError> {
        let subtotal = items_subtotal(&self.items)?;
        let discount = match &self.promo {
            Some(p) => p.discount_for(subtotal).ok_or_else(|| {
                ServiceError::ValidationError(format!("Cannot price a discount on {}", subtotal))
            })?,
            None => Decimal::ZERO,
        };
        Ok(CartTotals {
            subtotal,
            discount,
            total: subtotal - discount,
        })
    }

    pub fn summaries(&self) -> Vec<ItemSummary> {
        self.items
            .iter()
            .map(|item| ItemSummary {
                id: item.id.clone(),
                name: item.name.clone(),
                qty: item.qty,
            })
            .collect()
    }

    /// An order needs at least one line and something to pay. Returns the totals to charge.
    pub fn ensure_payable(&self) -> Result<CartTotals, ServiceError> {
        if self.items.is_empty() {
            return Err(ServiceError::ValidationError("Cart is empty".to_string()));
        }
        if self.items.iter().any(|i| i.qty == 0) {
            return Err(ServiceError::ValidationError(
                "Cart contains an item with zero quantity".to_string(),
            ));
        }
        let totals = self.totals()?;
        if totals.total <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Order total must be greater than zero".to_string(),
            ));
        }
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn scooter(qty: u32) -> OrderItem {
        OrderItem {
            id: "mx-1".into(),
            name: "MX Scooter".into(),
            qty,
            price: dec!(1899),
        }
    }

    #[test]
    fn totals_apply_percentage_discount() {
        let now = Utc::now();
        let book = PromoBook::new(vec![PromoCode {
            code: "WELCOME10".into(),
            percent: 10,
            expiry_hours: 24,
            created_at: now - Duration::hours(1),
        }]);
        let mut cart = Cart::new(vec![scooter(2)]);

        let totals = cart.apply_promo(&book, "welcome10", now).unwrap();
        assert_eq!(
            totals,
            CartTotals {
                subtotal: dec!(3798),
                discount: dec!(379.80),
                total: dec!(3418.20),
            }
        );
    }

    #[test]
    fn expired_promo_is_not_applied() {
        let now = Utc::now();
        let book = PromoBook::new(vec![PromoCode {
            code: "FLASH".into(),
            percent: 50,
            expiry_hours: 2,
            created_at: now - Duration::hours(3),
        }]);
        let mut cart = Cart::new(vec![scooter(1)]);

        assert!(cart.apply_promo(&book, "FLASH", now).is_err());
        assert!(cart.promo().is_none());
        assert_eq!(cart.totals().unwrap().total, dec!(1899));
    }

    #[test]
    fn empty_or_free_carts_are_not_payable() {
        assert!(Cart::new(vec![]).ensure_payable().is_err());
        assert!(Cart::new(vec![scooter(0)]).ensure_payable().is_err());
        assert!(Cart::new(vec![scooter(1)]).ensure_payable().is_ok());
    }

    #[test]
    fn oversized_cart_is_refused_instead_of_overflowing() {
        let mut item = scooter(3);
        item.price = Decimal::MAX;
        let cart = Cart::new(vec![item]);
        assert!(matches!(cart.totals(), Err(ServiceError::ValidationError(_))));
        assert!(cart.ensure_payable().is_err());
    }
}
