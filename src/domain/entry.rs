//! Ledger entries
//!
//! Immutable postings against a single account. Entries are never updated
//! or deleted; corrections happen through new reversal entries only.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Currency;

/// A posted ledger entry. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub account_id: Uuid,
    pub transaction_id: Uuid,
    /// Signed amount: positive credits the account, negative debits it.
    pub amount: Decimal,
    pub currency: Currency,
    /// Position of this leg within its transaction.
    pub sequence: i32,
    /// Store-assigned, strictly increasing per account. Ordering and cursor
    /// key for `list_entries`.
    pub journal_seq: i64,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn is_debit(&self) -> bool {
        self.amount.is_sign_negative()
    }
}

/// An entry to be written by `append_entries`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntry {
    pub account_id: Uuid,
    pub amount: Decimal,
    pub currency: Currency,
    pub sequence: i32,
}

/// Time filter for entry listings. `None` bounds are open.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl EntryRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn since(from: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: None,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        if let Some(from) = self.from {
            if at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if at >= to {
                return false;
            }
        }
        true
    }
}

/// Opaque resume point for `list_entries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryCursor(pub(crate) i64);

/// One page of a restartable entry scan.
#[derive(Debug, Clone)]
pub struct EntryPage {
    pub entries: Vec<LedgerEntry>,
    /// Present when more entries remain; pass back to continue the scan.
    pub next_cursor: Option<EntryCursor>,
}

impl EntryPage {
    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }
}
