//! Account records
//!
//! Versioned, currency-denominated accounts. Balances are derived from
//! posted entries; the stored balance must always equal the opening balance
//! plus the sum of all posted entries (checked by reconciliation).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Currency;

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Frozen,
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Frozen => "frozen",
            AccountStatus::Closed => "closed",
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "frozen" => Ok(AccountStatus::Frozen),
            "closed" => Ok(AccountStatus::Closed),
            other => Err(format!("Unknown account status: {}", other)),
        }
    }
}

/// A ledger account snapshot.
///
/// `version` increases by one on every committed write that touches the
/// account; it is the optimistic-concurrency token for conditional writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub currency: Currency,
    pub balance: Decimal,
    /// Balance minus outstanding holds. Maintained in lockstep with
    /// `balance` until an authorization-hold feature lands.
    pub available_balance: Decimal,
    pub overdraft_limit: Decimal,
    pub opening_balance: Decimal,
    pub status: AccountStatus,
    pub version: i64,
    pub opened_at: DateTime<Utc>,
}

impl Account {
    /// Funds available to a debit: available balance plus overdraft room.
    pub fn headroom(&self) -> Decimal {
        self.available_balance + self.overdraft_limit
    }

    /// Whether a debit of `magnitude` would stay within the headroom.
    pub fn can_debit(&self, magnitude: Decimal) -> bool {
        self.headroom() >= magnitude
    }

    pub fn is_frozen(&self) -> bool {
        self.status == AccountStatus::Frozen
    }

    pub fn is_closed(&self) -> bool {
        self.status == AccountStatus::Closed
    }

    /// Age of the account in whole days at `now`.
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.opened_at).num_days()
    }
}

/// Parameters for opening an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub id: Uuid,
    pub currency: Currency,
    pub opening_balance: Decimal,
    pub overdraft_limit: Decimal,
}

impl NewAccount {
    pub fn new(id: Uuid, currency: Currency) -> Self {
        Self {
            id,
            currency,
            opening_balance: Decimal::ZERO,
            overdraft_limit: Decimal::ZERO,
        }
    }

    pub fn with_opening_balance(mut self, balance: Decimal) -> Self {
        self.opening_balance = balance;
        self
    }

    pub fn with_overdraft_limit(mut self, limit: Decimal) -> Self {
        self.overdraft_limit = limit;
        self
    }
}
