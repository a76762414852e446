//! Amount validation
//!
//! Domain primitive for monetary magnitudes with business rule validation.
//! All amounts are validated at construction time, ensuring invalid values
//! cannot exist in the system. Ledger entries carry signed `Decimal` values;
//! `validate_signed` applies the same rules to either sign.

use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

use super::Currency;

/// Maximum absolute value for any single amount (1 trillion)
const MAX_AMOUNT: &str = "1000000000000";

/// Amount represents a validated positive monetary magnitude.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - Scale never exceeds the currency's minor-unit exponent
/// - Absolute value never exceeds 1 trillion
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount(Decimal);

/// Errors that can occur when creating an Amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Amount must be non-zero")]
    Zero,

    #[error("Amount has too many decimal places for {currency} (max {max}, got {scale})")]
    TooManyDecimals {
        currency: Currency,
        max: u32,
        scale: u32,
    },

    #[error("Amount exceeds maximum allowed value ({MAX_AMOUNT})")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl Amount {
    /// Create a new Amount with validation against a currency's exponent.
    pub fn new(value: Decimal, currency: Currency) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }
        check_scale_and_ceiling(value, currency)?;
        Ok(Self(value))
    }

    /// Parse an Amount from its string form.
    pub fn parse(s: &str, currency: Currency) -> Result<Self, AmountError> {
        let decimal =
            Decimal::from_str(s).map_err(|e| AmountError::ParseError(e.to_string()))?;
        Amount::new(decimal, currency)
    }

    /// Get the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validate a signed entry amount: non-zero, within scale and ceiling.
pub fn validate_signed(value: Decimal, currency: Currency) -> Result<(), AmountError> {
    if value.is_zero() {
        return Err(AmountError::Zero);
    }
    check_scale_and_ceiling(value.abs(), currency)
}

fn check_scale_and_ceiling(magnitude: Decimal, currency: Currency) -> Result<(), AmountError> {
    // normalize() drops trailing zeros so "1.00" passes for JPY-style codes
    let scale = magnitude.normalize().scale();
    let max = currency.exponent();
    if scale > max {
        return Err(AmountError::TooManyDecimals {
            currency,
            max,
            scale,
        });
    }

    let ceiling = Decimal::from_str(MAX_AMOUNT).expect("Invalid MAX_AMOUNT constant");
    if magnitude > ceiling {
        return Err(AmountError::Overflow);
    }

    Ok(())
}
