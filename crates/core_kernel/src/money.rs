//! Monetary validation with precise decimal arithmetic
//!
//! All amounts in the billing core are `rust_decimal::Decimal` values, never
//! floats. The checks here are pure and synchronous: they never touch the
//! store and have no failure mode beyond returning a validation error.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Currency codes following ISO 4217
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    USD,
    EUR,
    GBP,
    AUD,
    CAD,
    SGD,
}

impl Currency {
    /// Returns the ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::AUD => "AUD",
            Currency::CAD => "CAD",
            Currency::SGD => "SGD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Tolerance for additive consistency checks.
///
/// Monetary inputs arrive as already-resolved amounts that may have passed
/// through floating-point arithmetic upstream, so sums are compared within
/// one cent rather than exactly.
pub const AMOUNT_TOLERANCE: Decimal = dec!(0.01);

/// Errors raised by the monetary checks
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyCheckError {
    #[error("{field} must not be negative (got {amount})")]
    Negative { field: String, amount: Decimal },

    #[error("parts sum to {sum} but expected {total} (tolerance {tolerance})")]
    SumMismatch {
        sum: Decimal,
        total: Decimal,
        tolerance: Decimal,
    },
}

impl MoneyCheckError {
    /// The field path the check was applied to, when known
    pub fn field(&self) -> Option<&str> {
        match self {
            MoneyCheckError::Negative { field, .. } => Some(field),
            MoneyCheckError::SumMismatch { .. } => None,
        }
    }
}

/// Fails when `amount` is negative, naming the offending field.
pub fn ensure_non_negative(amount: Decimal, field: &str) -> Result<(), MoneyCheckError> {
    if amount < Decimal::ZERO {
        return Err(MoneyCheckError::Negative {
            field: field.to_string(),
            amount,
        });
    }
    Ok(())
}

/// Fails when the parts do not sum to `total` within `tolerance`.
///
/// The tolerance boundary is inclusive: a discrepancy of exactly the
/// tolerance passes, anything beyond it fails.
pub fn ensure_sums_to_total(
    parts: &[Decimal],
    total: Decimal,
    tolerance: Decimal,
) -> Result<(), MoneyCheckError> {
    let sum: Decimal = parts.iter().sum();
    if (sum - total).abs() > tolerance {
        return Err(MoneyCheckError::SumMismatch {
            sum,
            total,
            tolerance,
        });
    }
    Ok(())
}
