//! Property-based tests for the money and CSV helpers.
//!
//! These run across wide input ranges to catch rounding and quoting edge
//! cases the example-based tests miss.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;

use mx_storefront::{
    export::{escape_field, parse_csv},
    models::{generate_order_number, PromoCode, ORDER_NUMBER_PREFIX},
    payments::amount::{to_minor_units, MIN_CHARGE_MINOR_UNITS},
};

/// Prices with up to four decimal places, from zero to a million.
fn price_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000_000).prop_map(|raw| Decimal::new(raw, 4))
}

fn currency_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("ils"), Just("usd"), Just("EUR"), Just("jpy"), Just("krw")]
}

/// Text mixing separators, quotes, line breaks and Hebrew letters.
fn field_strategy() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            Just(",".to_string()),
            Just("\"".to_string()),
            Just("\n".to_string()),
            Just("\r\n".to_string()),
            "[a-zA-Z0-9 ]{1,6}",
            "[א-ת]{1,6}",
        ],
        0..8,
    )
    .prop_map(|parts| parts.concat())
}

proptest! {
    #[test]
    fn minor_units_never_fall_below_the_processor_minimum(
        price in price_strategy(),
        currency in currency_strategy(),
    ) {
        if let Ok(amount) = to_minor_units(price, currency) {
            prop_assert!(amount.value >= MIN_CHARGE_MINOR_UNITS);
        }
    }

    #[test]
    fn minor_units_stay_within_half_a_unit(
        price in price_strategy(),
        currency in currency_strategy(),
    ) {
        if let Ok(amount) = to_minor_units(price, currency) {
            let scale = Decimal::from(10_i64.pow(amount.exponent));
            let diff = (Decimal::from(amount.value) - price * scale).abs();
            prop_assert!(diff <= Decimal::new(5, 1));
        }
    }

    #[test]
    fn minor_units_are_monotonic(a in price_strategy(), b in price_strategy()) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        if let (Ok(low), Ok(high)) = (to_minor_units(low, "ils"), to_minor_units(high, "ils")) {
            prop_assert!(low.value <= high.value);
        }
    }

    #[test]
    fn escaped_fields_parse_back_unchanged(fields in proptest::collection::vec(field_strategy(), 1..6)) {
        let line = fields.iter().map(|f| escape_field(f)).collect::<Vec<_>>().join(",");
        let records = parse_csv(&format!("{}\r\n", line));
        prop_assert_eq!(records.len(), 1);
        prop_assert_eq!(&records[0], &fields);
    }

    #[test]
    fn discount_never_exceeds_the_subtotal(subtotal in price_strategy(), percent in 1u8..=100) {
        let promo = PromoCode {
            code: "ANY".into(),
            percent,
            expiry_hours: 0,
            created_at: Utc::now(),
        };
        let discount = promo.discount_for(subtotal);
        prop_assert!(discount.is_some());
        let discount = discount.unwrap_or_default();
        prop_assert!(discount >= Decimal::ZERO);
        prop_assert!(discount <= subtotal);
    }

    #[test]
    fn order_numbers_sort_with_creation_time(secs in 1_600_000_000i64..2_000_000_000, gap in 1i64..86_400) {
        let earlier = generate_order_number(Utc.timestamp_opt(secs, 0).unwrap());
        let later = generate_order_number(Utc.timestamp_opt(secs + gap, 0).unwrap());
        prop_assert!(earlier.starts_with(ORDER_NUMBER_PREFIX));
        // Same digit count across this range, so lexical order follows time
        prop_assert_eq!(earlier.len(), later.len());
        prop_assert!(earlier < later);
    }
}
