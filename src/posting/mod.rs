//! Double-Entry Posting Engine
//!
//! Atomically commits a balanced set of legs against the Ledger Store.
//! Every precondition is checked against a consistent set of account
//! snapshots before any write; the write itself is the store's conditional
//! multi-account append, so all legs apply or none do.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{validate_signed, Account, Currency, Leg, NewEntry};
use crate::ledger::{LedgerError, LedgerStore, PostReceipt};

/// Errors from a commit attempt. All are detected before any write except
/// `VersionConflict`, which the store raises when a snapshot went stale.
#[derive(Debug, thiserror::Error)]
pub enum PostingError {
    #[error("Transaction has no legs")]
    EmptyLegs,

    #[error("Invalid leg: {0}")]
    InvalidLeg(String),

    #[error("Legs for currency {currency} sum to {net}, expected zero")]
    UnbalancedLegs { currency: Currency, net: Decimal },

    #[error("Leg currency {leg} does not match account {account_id} currency {account}")]
    CurrencyMismatch {
        account_id: Uuid,
        leg: Currency,
        account: Currency,
    },

    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    #[error("Account is closed: {0}")]
    AccountClosed(Uuid),

    #[error("Account is frozen: {0}")]
    AccountFrozen(Uuid),

    #[error("Insufficient funds on account {account_id}: required {required}, available {available}")]
    InsufficientFunds {
        account_id: Uuid,
        required: Decimal,
        available: Decimal,
    },

    #[error("Version conflict on account {account_id}: expected {expected}, found {found}")]
    VersionConflict {
        account_id: Uuid,
        expected: i64,
        found: i64,
    },

    #[error(transparent)]
    Store(LedgerError),
}

impl From<LedgerError> for PostingError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::VersionConflict {
                account_id,
                expected,
                found,
            } => PostingError::VersionConflict {
                account_id,
                expected,
                found,
            },
            LedgerError::AccountNotFound(id) => PostingError::AccountNotFound(id),
            other => PostingError::Store(other),
        }
    }
}

impl PostingError {
    /// Only version conflicts warrant an automatic retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PostingError::VersionConflict { .. })
    }
}

/// Validate leg shape: non-empty, non-zero amounts, zero-sum per currency.
///
/// Exposed so the router can reject malformed intents before creating a
/// transaction record.
pub fn validate_legs(legs: &[Leg]) -> Result<(), PostingError> {
    if legs.is_empty() {
        return Err(PostingError::EmptyLegs);
    }

    let mut per_currency: BTreeMap<Currency, Decimal> = BTreeMap::new();
    for leg in legs {
        validate_signed(leg.amount, leg.currency)
            .map_err(|e| PostingError::InvalidLeg(e.to_string()))?;
        *per_currency.entry(leg.currency).or_insert(Decimal::ZERO) += leg.amount;
    }

    for (currency, net) in per_currency {
        if !net.is_zero() {
            return Err(PostingError::UnbalancedLegs { currency, net });
        }
    }

    Ok(())
}

/// The posting engine. Stateless beyond its store handle; construct one per
/// wiring, inject everywhere (no process-wide instance).
#[derive(Clone)]
pub struct PostingEngine {
    store: Arc<dyn LedgerStore>,
}

impl PostingEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Commit a balanced leg set as `transaction_id`.
    ///
    /// Snapshots are acquired in ascending account-id order; the expected
    /// versions from those snapshots key the store's conditional write, so
    /// a concurrent commit on any shared account surfaces as
    /// `VersionConflict` with no state change.
    pub async fn commit(
        &self,
        transaction_id: Uuid,
        legs: &[Leg],
    ) -> Result<PostReceipt, PostingError> {
        validate_legs(legs)?;

        // Net movement per account: two legs on one account are allowed and
        // funds-checked jointly.
        let mut net: BTreeMap<Uuid, Decimal> = BTreeMap::new();
        for leg in legs {
            *net.entry(leg.account_id).or_insert(Decimal::ZERO) += leg.amount;
        }

        // Snapshot in ascending account-id order (BTreeMap iteration).
        let mut snapshots: BTreeMap<Uuid, Account> = BTreeMap::new();
        for account_id in net.keys() {
            let account = self.store.get_account(*account_id).await?;
            snapshots.insert(*account_id, account);
        }

        for leg in legs {
            let account = &snapshots[&leg.account_id];
            if account.is_closed() {
                return Err(PostingError::AccountClosed(account.id));
            }
            if leg.currency != account.currency {
                return Err(PostingError::CurrencyMismatch {
                    account_id: account.id,
                    leg: leg.currency,
                    account: account.currency,
                });
            }
            // Only debit legs gate on frozen: credits to a frozen account
            // still post.
            if leg.is_debit() && account.is_frozen() {
                return Err(PostingError::AccountFrozen(account.id));
            }
        }

        for (account_id, delta) in &net {
            if delta.is_sign_negative() {
                let account = &snapshots[account_id];
                let required = delta.abs();
                if !account.can_debit(required) {
                    return Err(PostingError::InsufficientFunds {
                        account_id: *account_id,
                        required,
                        available: account.headroom(),
                    });
                }
            }
        }

        let expected_versions: BTreeMap<Uuid, i64> = snapshots
            .iter()
            .map(|(id, account)| (*id, account.version))
            .collect();

        let entries: Vec<NewEntry> = legs
            .iter()
            .enumerate()
            .map(|(i, leg)| NewEntry {
                account_id: leg.account_id,
                amount: leg.amount,
                currency: leg.currency,
                sequence: i as i32,
            })
            .collect();

        let receipt = self
            .store
            .append_entries(transaction_id, entries, &expected_versions)
            .await?;

        tracing::debug!(
            transaction_id = %transaction_id,
            legs = legs.len(),
            "Legs committed"
        );

        Ok(receipt)
    }
}
