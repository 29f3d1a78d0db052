//! Conversion of major-unit prices into the processor's minor units.
//!
//! Pure functions only: the long-lived server and the one-shot function
//! entry points both call [`to_minor_units`] and must agree bit for bit.

use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::Serialize;

use crate::errors::ServiceError;

/// Smallest charge the processor accepts, in minor units.
pub const MIN_CHARGE_MINOR_UNITS: i64 = 50;

/// Currencies the processor treats as having no subunit.
const ZERO_DECIMAL_CURRENCIES: &[&str] = &[
    "bif", "clp", "djf", "gnf", "jpy", "kmf", "krw", "mga", "pyg", "rwf", "ugx", "vnd", "vuv",
    "xaf", "xof", "xpf",
];

/// An amount ready to be sent to the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MinorAmount {
    pub value: i64,
    pub exponent: u32,
}

/// Number of decimal places between major and minor units.
pub fn currency_exponent(currency: &str) -> u32 {
    if ZERO_DECIMAL_CURRENCIES.contains(&currency.to_ascii_lowercase().as_str()) {
        0
    } else {
        2
    }
}

/// Lower-cases and checks an ISO 4217 code.
pub fn normalize_currency(currency: &str) -> Result<String, ServiceError> {
    let code = currency.trim().to_ascii_lowercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_lowercase()) {
        return Err(ServiceError::ValidationError(format!(
            "Currency must be a 3 letter ISO 4217 code (got '{}')",
            currency
        )));
    }
    Ok(code)
}

/// Converts a major-unit amount into minor units and enforces the processor minimum.
///
/// Rounding is half away from zero on the exact decimal value, so 18.995 ILS
/// always becomes 1900 agorot.
pub fn to_minor_units(major: Decimal, currency: &str) -> Result<MinorAmount, ServiceError> {
    let currency = normalize_currency(currency)?;
    let exponent = currency_exponent(&currency);

    let out_of_range = || ServiceError::InvalidAmount(format!("Amount {} is out of range", major));
    let scaled = major
        .checked_mul(Decimal::from(10_i64.pow(exponent)))
        .ok_or_else(out_of_range)?;
    let value = scaled
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(out_of_range)?;

    if value < MIN_CHARGE_MINOR_UNITS {
        return Err(ServiceError::InvalidAmount(format!(
            "Amount must be at least {} minor units (got {})",
            MIN_CHARGE_MINOR_UNITS, value
        )));
    }

    Ok(MinorAmount { value, exponent })
}
