//! Ledger Store
//!
//! Durable, versioned storage of accounts and immutable posted entries.
//! The store owns Account and LedgerEntry state exclusively; everything
//! above it goes through the conditional-write contract.

mod error;
mod memory;
mod postgres;

pub use error::LedgerError;
pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::{Account, EntryCursor, EntryPage, EntryRange, NewAccount, NewEntry};

/// Result of a successful conditional write.
#[derive(Debug, Clone)]
pub struct PostReceipt {
    pub transaction_id: Uuid,
    /// Balance of every touched account after the write, keyed by account.
    pub balances_after: BTreeMap<Uuid, Decimal>,
    /// Version of every touched account after the write.
    pub versions_after: BTreeMap<Uuid, i64>,
    pub posted_at: DateTime<Utc>,
}

/// Outcome of recomputing an account's balance from its entries.
///
/// A mismatch is a corruption signal. It is reported to the operator and
/// never silently corrected.
#[derive(Debug, Clone)]
pub struct ReconciliationReport {
    pub account_id: Uuid,
    pub stored_balance: Decimal,
    /// Opening balance plus the sum of all posted entries.
    pub computed_balance: Decimal,
    pub entry_count: u64,
    pub checked_at: DateTime<Utc>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.stored_balance == self.computed_balance
    }

    pub fn drift(&self) -> Decimal {
        self.stored_balance - self.computed_balance
    }
}

/// Storage contract for accounts and entries.
///
/// `append_entries` is the only mutation of balances: a conditional,
/// all-or-nothing multi-account write keyed on expected versions.
/// Implementations must apply either every entry or none, and must never
/// expose an intermediate balance to concurrent readers.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fetch an account snapshot.
    async fn get_account(&self, id: Uuid) -> Result<Account, LedgerError>;

    /// Open a new account. Rejects duplicate ids.
    async fn create_account(&self, new: NewAccount) -> Result<Account, LedgerError>;

    /// Conditionally append a balanced set of entries.
    ///
    /// Succeeds only if every touched account's current version matches
    /// `expected_versions`; on success atomically writes all entries and
    /// bumps every touched account's version and balances in one step. On
    /// mismatch nothing changes and the caller must refresh and retry.
    async fn append_entries(
        &self,
        transaction_id: Uuid,
        entries: Vec<NewEntry>,
        expected_versions: &BTreeMap<Uuid, i64>,
    ) -> Result<PostReceipt, LedgerError>;

    /// Lazy, finite, restartable scan of an account's entries ordered by
    /// journal sequence. Pass the returned cursor back to continue.
    async fn list_entries(
        &self,
        account_id: Uuid,
        range: EntryRange,
        cursor: Option<EntryCursor>,
        limit: usize,
    ) -> Result<EntryPage, LedgerError>;

    /// Recompute the account balance from entries and compare it to the
    /// stored balance.
    async fn reconcile_account(&self, account_id: Uuid) -> Result<ReconciliationReport, LedgerError>;

    /// All account ids, for reconciliation sweeps.
    async fn account_ids(&self) -> Result<Vec<Uuid>, LedgerError>;
}
