//! Currency codes
//!
//! ISO 4217 alpha codes with their minor-unit exponents. Entry amounts are
//! validated against the exponent so a JPY leg cannot carry cents.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A validated three-letter currency code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

/// Errors that can occur when parsing a currency code
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CurrencyError {
    #[error("Invalid currency code: {0:?} (expected three ASCII letters)")]
    InvalidCode(String),
}

impl Currency {
    pub const USD: Currency = Currency(*b"USD");
    pub const EUR: Currency = Currency(*b"EUR");
    pub const GBP: Currency = Currency(*b"GBP");
    pub const JPY: Currency = Currency(*b"JPY");

    /// Parse and validate a currency code. Lowercase input is accepted
    /// and normalized.
    pub fn new(code: &str) -> Result<Self, CurrencyError> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_alphabetic()) {
            return Err(CurrencyError::InvalidCode(code.to_string()));
        }

        let mut normalized = [0u8; 3];
        for (i, b) in bytes.iter().enumerate() {
            normalized[i] = b.to_ascii_uppercase();
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        // Construction guarantees ASCII uppercase letters.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }

    /// Number of minor-unit decimal places for this currency.
    pub fn exponent(&self) -> u32 {
        match &self.0 {
            b"JPY" | b"KRW" | b"VND" | b"CLP" => 0,
            b"BHD" | b"KWD" | b"OMR" | b"JOD" | b"TND" => 3,
            _ => 2,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Currency {
    type Err = CurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = CurrencyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_parse() {
        let usd = Currency::new("USD").unwrap();
        assert_eq!(usd, Currency::USD);
        assert_eq!(usd.as_str(), "USD");
    }

    #[test]
    fn test_currency_normalizes_case() {
        let eur = Currency::new("eur").unwrap();
        assert_eq!(eur, Currency::EUR);
    }

    #[test]
    fn test_currency_rejects_bad_codes() {
        assert!(Currency::new("US").is_err());
        assert!(Currency::new("USDX").is_err());
        assert!(Currency::new("U$D").is_err());
        assert!(Currency::new("").is_err());
    }

    #[test]
    fn test_currency_exponent() {
        assert_eq!(Currency::USD.exponent(), 2);
        assert_eq!(Currency::JPY.exponent(), 0);
        assert_eq!(Currency::new("KWD").unwrap().exponent(), 3);
    }

    #[test]
    fn test_currency_serde_round_trip() {
        let json = serde_json::to_string(&Currency::GBP).unwrap();
        assert_eq!(json, r#""GBP""#);
        let parsed: Currency = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, Currency::GBP);
    }
}
