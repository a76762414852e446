//! Ledger Store errors

use uuid::Uuid;

use crate::domain::{AmountError, Currency};

/// Errors surfaced by a `LedgerStore` backend.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    #[error("Account already exists: {0}")]
    AccountExists(Uuid),

    /// Optimistic-concurrency failure: the caller's snapshot is stale.
    #[error("Version conflict on account {account_id}: expected {expected}, found {found}")]
    VersionConflict {
        account_id: Uuid,
        expected: i64,
        found: i64,
    },

    #[error("Entry currency {entry} does not match account {account_id} currency {account}")]
    CurrencyMismatch {
        account_id: Uuid,
        entry: Currency,
        account: Currency,
    },

    #[error("No expected version supplied for account {0}")]
    MissingExpectedVersion(Uuid),

    #[error("Empty entry set for transaction")]
    EmptyEntrySet,

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error("Malformed stored record: {0}")]
    Malformed(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl LedgerError {
    /// Version conflicts are the only error worth an automatic retry.
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, LedgerError::VersionConflict { .. })
    }
}
