use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::ServiceError;

/// Percentage discount token with an expiry window counted from creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PromoCode {
    pub code: String,
    /// 1..=100
    pub percent: u8,
    /// 0 means the code never expires
    #[serde(default)]
    pub expiry_hours: u32,
    pub created_at: DateTime<Utc>,
}

impl PromoCode {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        (self.expiry_hours > 0)
            .then(|| self.created_at + Duration::hours(i64::from(self.expiry_hours)))
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map_or(false, |expiry| now >= expiry)
    }

    /// Discount on `subtotal`, rounded to agorot, never above the subtotal.
    /// `None` when the subtotal is too large to price.
    pub fn discount_for(&self, subtotal: Decimal) -> Option<Decimal> {
        let percent = Decimal::from(self.percent.min(100));
        let discount = subtotal.checked_mul(percent)? / Decimal::ONE_HUNDRED;
        Some(
            discount
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
                .min(subtotal)
                .max(Decimal::ZERO),
        )
    }
}

/// In-memory list of promo codes.
#[derive(Clone, Debug, Default)]
pub struct PromoBook {
    codes: Vec<PromoCode>,
}

impl PromoBook {
    pub fn new(codes: Vec<PromoCode>) -> Self {
        Self { codes }
    }

    /// Case-insensitive lookup that enforces the expiry window at `now`.
    pub fn lookup(&self, code: &str, now: DateTime<Utc>) -> Result<&PromoCode, ServiceError> {
        let wanted = code.trim();
        let promo = self
            .codes
            .iter()
            .find(|p| p.code.trim().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ServiceError::NotFound(format!("Unknown promo code '{}'", wanted)))?;

        if promo.percent == 0 || promo.percent > 100 {
            return Err(ServiceError::ValidationError(format!(
                "Promo code '{}' has an invalid percentage",
                promo.code
            )));
        }
        if promo.is_expired_at(now) {
            return Err(ServiceError::ValidationError(format!(
                "Promo code '{}' has expired",
                promo.code
            )));
        }
        Ok(promo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn promo(code: &str, percent: u8, expiry_hours: u32) -> PromoCode {
        PromoCode {
            code: code.into(),
            percent,
            expiry_hours,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn expiry_is_enforced_at_the_boundary() {
        let p = promo("SUMMER", 10, 24);
        let created = p.created_at;
        assert!(!p.is_expired_at(created + Duration::hours(23)));
        assert!(p.is_expired_at(created + Duration::hours(24)));
    }

    #[test]
    fn zero_hours_never_expires() {
        let p = promo("FOREVER", 5, 0);
        assert!(p.expires_at().is_none());
        assert!(!p.is_expired_at(p.created_at + Duration::days(3650)));
    }

    #[test]
    fn lookup_is_case_insensitive_and_checks_expiry() {
        let book = PromoBook::new(vec![promo("Welcome10", 10, 48), promo("OLD", 20, 1)]);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();

        assert_eq!(book.lookup(" welcome10 ", now).unwrap().percent, 10);
        assert_matches!(book.lookup("old", now), Err(ServiceError::ValidationError(_)));
        assert_matches!(book.lookup("nope", now), Err(ServiceError::NotFound(_)));
    }

    #[test]
    fn invalid_percent_is_rejected() {
        let book = PromoBook::new(vec![promo("BROKEN", 0, 0)]);
        assert!(book.lookup("BROKEN", Utc::now()).is_err());
    }

    #[test]
    fn discount_rounds_to_two_places() {
        assert_eq!(promo("P", 10, 0).discount_for(dec!(1899)), Some(dec!(189.90)));
        assert_eq!(promo("P", 15, 0).discount_for(dec!(19.99)), Some(dec!(3.00)));
        assert_eq!(promo("P", 100, 0).discount_for(dec!(50)), Some(dec!(50)));
    }

    #[test]
    fn discount_on_an_unpriceable_subtotal_is_none() {
        assert_eq!(promo("P", 10, 0).discount_for(Decimal::MAX), None);
    }
}
