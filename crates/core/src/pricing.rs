//! Per-message pricing resolution.
//!
//! A client either has an override row or falls back to the platform default.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::CoreError;
use crate::types::Money;

/// Platform default price per message (USD 0.0150).
pub const SYSTEM_DEFAULT_PRICE_PER_MESSAGE: Money = Decimal::from_parts(150, 0, 0, false, 4);

pub const SYSTEM_DEFAULT_CURRENCY: &str = "USD";

/// Largest price accepted, matching `NUMERIC(12,4)`.
pub const MAX_PRICE_PER_MESSAGE: Money = Decimal::from_parts(99_999_999, 0, 0, false, 0);

pub const MAX_NOTES_LENGTH: usize = 1_000;

/// The platform-wide fallback rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingDefaults {
    pub price_per_message: Money,
    pub currency: String,
}

impl Default for PricingDefaults {
    fn default() -> Self {
        Self {
            price_per_message: SYSTEM_DEFAULT_PRICE_PER_MESSAGE,
            currency: SYSTEM_DEFAULT_CURRENCY.to_string(),
        }
    }
}

/// An effective rate for a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPrice {
    pub price_per_message: Money,
    pub currency: String,
    /// True when no override exists and the platform default applies.
    pub is_default: bool,
}

/// Pick the override when present, otherwise the defaults.
pub fn resolve(override_price: Option<(Money, String)>, defaults: &PricingDefaults) -> ResolvedPrice {
    match override_price {
        Some((price, currency)) => ResolvedPrice {
            price_per_message: price,
            currency,
            is_default: false,
        },
        None => ResolvedPrice {
            price_per_message: defaults.price_per_message,
            currency: defaults.currency.clone(),
            is_default: true,
        },
    }
}

/// Price must be non-negative, fit the column, and use at most 4 decimals.
pub fn validate_price(price: Money) -> Result<(), CoreError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(CoreError::Validation(
            "price_per_message must be >= 0".to_string(),
        ));
    }
    if price > MAX_PRICE_PER_MESSAGE {
        return Err(CoreError::Validation(format!(
            "price_per_message must not exceed {MAX_PRICE_PER_MESSAGE}"
        )));
    }
    if price.normalize().scale() > 4 {
        return Err(CoreError::Validation(
            "price_per_message supports at most 4 decimal places".to_string(),
        ));
    }
    Ok(())
}

/// Normalize an ISO-4217 style code to upper case.
pub fn normalize_currency(currency: &str) -> Result<String, CoreError> {
    let code = currency.trim().to_ascii_uppercase();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code)
    } else {
        Err(CoreError::Validation(format!(
            "Invalid currency code '{currency}'"
        )))
    }
}

pub fn validate_notes(notes: Option<&str>) -> Result<(), CoreError> {
    match notes {
        Some(n) if n.chars().count() > MAX_NOTES_LENGTH => Err(CoreError::Validation(format!(
            "notes exceed maximum length of {MAX_NOTES_LENGTH} characters"
        ))),
        _ => Ok(()),
    }
}
