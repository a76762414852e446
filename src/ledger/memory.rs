//! In-memory Ledger Store
//!
//! Reference backend used by tests and demos. A single `RwLock` over the
//! whole book makes the conditional multi-account write trivially atomic;
//! the contract it implements is identical to the durable backend's.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    validate_signed, Account, AccountStatus, EntryCursor, EntryPage, EntryRange, LedgerEntry,
    NewAccount, NewEntry,
};

use super::{LedgerError, LedgerStore, PostReceipt, ReconciliationReport};

#[derive(Default)]
struct Book {
    accounts: BTreeMap<Uuid, Account>,
    /// Per-account entries, ordered by journal sequence.
    entries: HashMap<Uuid, Vec<LedgerEntry>>,
    journal_seq: i64,
}

/// In-memory `LedgerStore` backend.
#[derive(Default)]
pub struct MemoryLedgerStore {
    book: RwLock<Book>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Corrupt a stored balance directly, bypassing the entry trail.
    /// Exists only so tests can exercise the reconciliation mismatch path.
    #[cfg(test)]
    pub(crate) async fn corrupt_balance(&self, account_id: Uuid, delta: rust_decimal::Decimal) {
        let mut book = self.book.write().await;
        if let Some(account) = book.accounts.get_mut(&account_id) {
            account.balance += delta;
        }
    }

    /// Flip an account's status (operator action; not part of the posting
    /// path). Used to freeze/unfreeze/close accounts in tests and demos.
    pub async fn set_account_status(
        &self,
        account_id: Uuid,
        status: AccountStatus,
    ) -> Result<(), LedgerError> {
        let mut book = self.book.write().await;
        let account = book
            .accounts
            .get_mut(&account_id)
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        account.status = status;
        account.version += 1;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn get_account(&self, id: Uuid) -> Result<Account, LedgerError> {
        let book = self.book.read().await;
        book.accounts
            .get(&id)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(id))
    }

    async fn create_account(&self, new: NewAccount) -> Result<Account, LedgerError> {
        let mut book = self.book.write().await;
        if book.accounts.contains_key(&new.id) {
            return Err(LedgerError::AccountExists(new.id));
        }

        let account = Account {
            id: new.id,
            currency: new.currency,
            balance: new.opening_balance,
            available_balance: new.opening_balance,
            overdraft_limit: new.overdraft_limit,
            opening_balance: new.opening_balance,
            status: AccountStatus::Active,
            version: 0,
            opened_at: Utc::now(),
        };
        book.accounts.insert(new.id, account.clone());
        book.entries.insert(new.id, Vec::new());
        Ok(account)
    }

    async fn append_entries(
        &self,
        transaction_id: Uuid,
        entries: Vec<NewEntry>,
        expected_versions: &BTreeMap<Uuid, i64>,
    ) -> Result<PostReceipt, LedgerError> {
        if entries.is_empty() {
            return Err(LedgerError::EmptyEntrySet);
        }

        let mut book = self.book.write().await;

        // Validate everything before touching any state. Expected versions
        // are checked in ascending account order, mirroring the durable
        // backend's lock order.
        for (account_id, expected) in expected_versions {
            let account = book
                .accounts
                .get(account_id)
                .ok_or(LedgerError::AccountNotFound(*account_id))?;
            if account.version != *expected {
                return Err(LedgerError::VersionConflict {
                    account_id: *account_id,
                    expected: *expected,
                    found: account.version,
                });
            }
        }

        for entry in &entries {
            let account = book
                .accounts
                .get(&entry.account_id)
                .ok_or(LedgerError::AccountNotFound(entry.account_id))?;
            if !expected_versions.contains_key(&entry.account_id) {
                return Err(LedgerError::MissingExpectedVersion(entry.account_id));
            }
            if entry.currency != account.currency {
                return Err(LedgerError::CurrencyMismatch {
                    account_id: entry.account_id,
                    entry: entry.currency,
                    account: account.currency,
                });
            }
            validate_signed(entry.amount, entry.currency)?;
        }

        // All checks passed: apply under the same write guard, so no
        // intermediate state is ever observable.
        let posted_at = Utc::now();
        for entry in &entries {
            book.journal_seq += 1;
            let journal_seq = book.journal_seq;
            let stored = LedgerEntry {
                id: Uuid::new_v4(),
                account_id: entry.account_id,
                transaction_id,
                amount: entry.amount,
                currency: entry.currency,
                sequence: entry.sequence,
                journal_seq,
                created_at: posted_at,
            };
            book.entries.entry(entry.account_id).or_default().push(stored);

            let account = book
                .accounts
                .get_mut(&entry.account_id)
                .expect("account validated above");
            account.balance += entry.amount;
            account.available_balance += entry.amount;
        }

        let mut balances_after = BTreeMap::new();
        let mut versions_after = BTreeMap::new();
        for account_id in expected_versions.keys() {
            let account = book
                .accounts
                .get_mut(account_id)
                .expect("account validated above");
            account.version += 1;
            balances_after.insert(*account_id, account.balance);
            versions_after.insert(*account_id, account.version);
        }

        Ok(PostReceipt {
            transaction_id,
            balances_after,
            versions_after,
            posted_at,
        })
    }

    async fn list_entries(
        &self,
        account_id: Uuid,
        range: EntryRange,
        cursor: Option<EntryCursor>,
        limit: usize,
    ) -> Result<EntryPage, LedgerError> {
        let book = self.book.read().await;
        if !book.accounts.contains_key(&account_id) {
            return Err(LedgerError::AccountNotFound(account_id));
        }

        let after = cursor.map(|c| c.0).unwrap_or(0);
        let mut selected: Vec<LedgerEntry> = Vec::new();
        let mut more = false;

        if let Some(entries) = book.entries.get(&account_id) {
            for entry in entries {
                if entry.journal_seq <= after || !range.contains(entry.created_at) {
                    continue;
                }
                if selected.len() == limit {
                    more = true;
                    break;
                }
                selected.push(entry.clone());
            }
        }

        let next_cursor = if more {
            selected.last().map(|e| EntryCursor(e.journal_seq))
        } else {
            None
        };

        Ok(EntryPage {
            entries: selected,
            next_cursor,
        })
    }

    async fn reconcile_account(
        &self,
        account_id: Uuid,
    ) -> Result<ReconciliationReport, LedgerError> {
        let book = self.book.read().await;
        let account = book
            .accounts
            .get(&account_id)
            .ok_or(LedgerError::AccountNotFound(account_id))?;

        let mut computed = account.opening_balance;
        let mut entry_count = 0u64;
        if let Some(entries) = book.entries.get(&account_id) {
            for entry in entries {
                computed += entry.amount;
                entry_count += 1;
            }
        }

        Ok(ReconciliationReport {
            account_id,
            stored_balance: account.balance,
            computed_balance: computed,
            entry_count,
            checked_at: Utc::now(),
        })
    }

    async fn account_ids(&self) -> Result<Vec<Uuid>, LedgerError> {
        let book = self.book.read().await;
        Ok(book.accounts.keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Currency;
    use rust_decimal_macros::dec;

    fn usd_account(id: Uuid, opening: rust_decimal::Decimal) -> NewAccount {
        NewAccount::new(id, Currency::USD).with_opening_balance(opening)
    }

    fn entry(account_id: Uuid, amount: rust_decimal::Decimal, sequence: i32) -> NewEntry {
        NewEntry {
            account_id,
            amount,
            currency: Currency::USD,
            sequence,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_account() {
        let store = MemoryLedgerStore::new();
        let id = Uuid::new_v4();
        store.create_account(usd_account(id, dec!(100))).await.unwrap();

        let account = store.get_account(id).await.unwrap();
        assert_eq!(account.balance, dec!(100));
        assert_eq!(account.available_balance, dec!(100));
        assert_eq!(account.version, 0);

        let dup = store.create_account(usd_account(id, dec!(0))).await;
        assert!(matches!(dup, Err(LedgerError::AccountExists(_))));
    }

    #[tokio::test]
    async fn test_append_entries_updates_balances_and_versions() {
        let store = MemoryLedgerStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.create_account(usd_account(a, dec!(100))).await.unwrap();
        store.create_account(usd_account(b, dec!(10))).await.unwrap();

        let mut expected = BTreeMap::new();
        expected.insert(a, 0);
        expected.insert(b, 0);

        let receipt = store
            .append_entries(
                Uuid::new_v4(),
                vec![entry(a, dec!(-40.00), 0), entry(b, dec!(40.00), 1)],
                &expected,
            )
            .await
            .unwrap();

        assert_eq!(receipt.balances_after[&a], dec!(60.00));
        assert_eq!(receipt.balances_after[&b], dec!(50.00));
        assert_eq!(receipt.versions_after[&a], 1);
        assert_eq!(receipt.versions_after[&b], 1);
    }

    #[tokio::test]
    async fn test_append_entries_version_conflict_leaves_no_state() {
        let store = MemoryLedgerStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.create_account(usd_account(a, dec!(100))).await.unwrap();
        store.create_account(usd_account(b, dec!(0))).await.unwrap();

        let mut stale = BTreeMap::new();
        stale.insert(a, 3); // wrong
        stale.insert(b, 0);

        let result = store
            .append_entries(
                Uuid::new_v4(),
                vec![entry(a, dec!(-10.00), 0), entry(b, dec!(10.00), 1)],
                &stale,
            )
            .await;

        assert!(matches!(result, Err(LedgerError::VersionConflict { .. })));

        let account_a = store.get_account(a).await.unwrap();
        let account_b = store.get_account(b).await.unwrap();
        assert_eq!(account_a.balance, dec!(100));
        assert_eq!(account_b.balance, dec!(0));
        assert_eq!(account_a.version, 0);

        let page = store
            .list_entries(a, EntryRange::all(), None, 10)
            .await
            .unwrap();
        assert!(page.entries.is_empty());
    }

    #[tokio::test]
    async fn test_append_rejects_currency_mismatch() {
        let store = MemoryLedgerStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.create_account(usd_account(a, dec!(100))).await.unwrap();
        store
            .create_account(NewAccount::new(b, Currency::EUR))
            .await
            .unwrap();

        let mut expected = BTreeMap::new();
        expected.insert(a, 0);
        expected.insert(b, 0);

        let result = store
            .append_entries(
                Uuid::new_v4(),
                vec![entry(a, dec!(-10.00), 0), entry(b, dec!(10.00), 1)],
                &expected,
            )
            .await;

        assert!(matches!(result, Err(LedgerError::CurrencyMismatch { .. })));
    }

    #[tokio::test]
    async fn test_list_entries_is_restartable() {
        let store = MemoryLedgerStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.create_account(usd_account(a, dec!(1000))).await.unwrap();
        store.create_account(usd_account(b, dec!(0))).await.unwrap();

        for i in 0..5 {
            let mut expected = BTreeMap::new();
            expected.insert(a, i);
            expected.insert(b, i);
            store
                .append_entries(
                    Uuid::new_v4(),
                    vec![entry(a, dec!(-1.00), 0), entry(b, dec!(1.00), 1)],
                    &expected,
                )
                .await
                .unwrap();
        }

        let first = store
            .list_entries(a, EntryRange::all(), None, 2)
            .await
            .unwrap();
        assert_eq!(first.entries.len(), 2);
        assert!(!first.is_last());

        let second = store
            .list_entries(a, EntryRange::all(), first.next_cursor, 10)
            .await
            .unwrap();
        assert_eq!(second.entries.len(), 3);
        assert!(second.is_last());

        // no overlap between pages
        let first_seqs: Vec<i64> = first.entries.iter().map(|e| e.journal_seq).collect();
        for entry in &second.entries {
            assert!(!first_seqs.contains(&entry.journal_seq));
        }
    }

    #[tokio::test]
    async fn test_reconcile_matches_after_postings() {
        let store = MemoryLedgerStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.create_account(usd_account(a, dec!(100))).await.unwrap();
        store.create_account(usd_account(b, dec!(10))).await.unwrap();

        let mut expected = BTreeMap::new();
        expected.insert(a, 0);
        expected.insert(b, 0);
        store
            .append_entries(
                Uuid::new_v4(),
                vec![entry(a, dec!(-40.00), 0), entry(b, dec!(40.00), 1)],
                &expected,
            )
            .await
            .unwrap();

        let report = store.reconcile_account(a).await.unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.stored_balance, dec!(60.00));
        assert_eq!(report.entry_count, 1);
        assert_eq!(report.drift(), dec!(0));
    }
}
