//! Postgres Ledger Store
//!
//! Durable backend. The conditional multi-account write runs inside a single
//! database transaction; account rows are locked in ascending account-id
//! order so concurrent multi-account commits cannot form a lock cycle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::{
    validate_signed, Account, Currency, EntryCursor, EntryPage, EntryRange, LedgerEntry,
    NewAccount, NewEntry,
};

use super::{LedgerError, LedgerStore, PostReceipt, ReconciliationReport};

/// Postgres-backed `LedgerStore`.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

type AccountRow = (
    Uuid,
    String,
    Decimal,
    Decimal,
    Decimal,
    Decimal,
    String,
    i64,
    DateTime<Utc>,
);

fn map_account_row(row: AccountRow) -> Result<Account, LedgerError> {
    let (id, currency, balance, available, overdraft, opening, status, version, opened_at) = row;
    Ok(Account {
        id,
        currency: Currency::new(&currency)
            .map_err(|e| LedgerError::Malformed(format!("account {}: {}", id, e)))?,
        balance,
        available_balance: available,
        overdraft_limit: overdraft,
        opening_balance: opening,
        status: status
            .parse()
            .map_err(|e| LedgerError::Malformed(format!("account {}: {}", id, e)))?,
        version,
        opened_at,
    })
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn get_account(&self, id: Uuid) -> Result<Account, LedgerError> {
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            SELECT id, currency, balance, available_balance, overdraft_limit,
                   opening_balance, status, version, opened_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(map_account_row)
            .ok_or(LedgerError::AccountNotFound(id))?
    }

    async fn create_account(&self, new: NewAccount) -> Result<Account, LedgerError> {
        let opened_at = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (
                id, currency, balance, available_balance, overdraft_limit,
                opening_balance, status, version, opened_at
            )
            VALUES ($1, $2, $3, $3, $4, $3, 'active', 0, $5)
            "#,
        )
        .bind(new.id)
        .bind(new.currency.as_str())
        .bind(new.opening_balance)
        .bind(new.overdraft_limit)
        .bind(opened_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => self.get_account(new.id).await,
            Err(e) if e
                .as_database_error()
                .map(|d| d.is_unique_violation())
                .unwrap_or(false) =>
            {
                Err(LedgerError::AccountExists(new.id))
            }
            Err(e) => Err(e.into()),
        }
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

        let mut tx = self.pool.begin().await?;

        // Lock and verify every touched account. BTreeMap iteration gives
        // ascending account ids, the canonical lock order.
        let mut currencies: BTreeMap<Uuid, Currency> = BTreeMap::new();
        for (account_id, expected) in expected_versions {
            let row: Option<(String, i64)> = sqlx::query_as(
                r#"
                SELECT currency, version FROM accounts WHERE id = $1 FOR UPDATE
                "#,
            )
            .bind(account_id)
            .fetch_optional(&mut *tx)
            .await?;

            let (currency, version) =
                row.ok_or(LedgerError::AccountNotFound(*account_id))?;
            if version != *expected {
                return Err(LedgerError::VersionConflict {
                    account_id: *account_id,
                    expected: *expected,
                    found: version,
                });
            }
            currencies.insert(
                *account_id,
                Currency::new(&currency).map_err(|e| {
                    LedgerError::Malformed(format!("account {}: {}", account_id, e))
                })?,
            );
        }

        // Validate entries against the locked snapshots.
        let mut deltas: BTreeMap<Uuid, Decimal> =
            expected_versions.keys().map(|id| (*id, Decimal::ZERO)).collect();
        for entry in &entries {
            let currency = currencies
                .get(&entry.account_id)
                .ok_or(LedgerError::MissingExpectedVersion(entry.account_id))?;
            if entry.currency != *currency {
                return Err(LedgerError::CurrencyMismatch {
                    account_id: entry.account_id,
                    entry: entry.currency,
                    account: *currency,
                });
            }
            validate_signed(entry.amount, entry.currency)?;
            *deltas.get_mut(&entry.account_id).expect("seeded above") += entry.amount;
        }

        let posted_at = Utc::now();
        for entry in &entries {
            sqlx::query(
                r#"
                INSERT INTO ledger_entries (
                    id, account_id, transaction_id, amount, currency, sequence, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(entry.account_id)
            .bind(transaction_id)
            .bind(entry.amount)
            .bind(entry.currency.as_str())
            .bind(entry.sequence)
            .bind(posted_at)
            .execute(&mut *tx)
            .await?;
        }

        let mut balances_after = BTreeMap::new();
        let mut versions_after = BTreeMap::new();
        for (account_id, delta) in &deltas {
            let (balance, version): (Decimal, i64) = sqlx::query_as(
                r#"
                UPDATE accounts
                SET balance = balance + $2,
                    available_balance = available_balance + $2,
                    version = version + 1
                WHERE id = $1
                RETURNING balance, version
                "#,
            )
            .bind(account_id)
            .bind(delta)
            .fetch_one(&mut *tx)
            .await?;

            balances_after.insert(*account_id, balance);
            versions_after.insert(*account_id, version);
        }

        tx.commit().await?;

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
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (SELECT 1 FROM accounts WHERE id = $1)
            "#,
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;
        if !exists {
            return Err(LedgerError::AccountNotFound(account_id));
        }

        let after = cursor.map(|c| c.0).unwrap_or(0);
        // fetch one extra row to know whether a next page exists
        let fetch = (limit + 1) as i64;

        let rows: Vec<(Uuid, Uuid, Uuid, Decimal, String, i32, i64, DateTime<Utc>)> =
            sqlx::query_as(
                r#"
                SELECT id, account_id, transaction_id, amount, currency,
                       sequence, journal_seq, created_at
                FROM ledger_entries
                WHERE account_id = $1
                  AND journal_seq > $2
                  AND ($3::timestamptz IS NULL OR created_at >= $3)
                  AND ($4::timestamptz IS NULL OR created_at < $4)
                ORDER BY journal_seq ASC
                LIMIT $5
                "#,
            )
            .bind(account_id)
            .bind(after)
            .bind(range.from)
            .bind(range.to)
            .bind(fetch)
            .fetch_all(&self.pool)
            .await?;

        let more = rows.len() > limit;
        let mut entries = Vec::with_capacity(rows.len().min(limit));
        for (id, account_id, transaction_id, amount, currency, sequence, journal_seq, created_at) in
            rows.into_iter().take(limit)
        {
            entries.push(LedgerEntry {
                id,
                account_id,
                transaction_id,
                amount,
                currency: Currency::new(&currency)
                    .map_err(|e| LedgerError::Malformed(format!("entry {}: {}", id, e)))?,
                sequence,
                journal_seq,
                created_at,
            });
        }

        let next_cursor = if more {
            entries.last().map(|e| EntryCursor(e.journal_seq))
        } else {
            None
        };

        Ok(EntryPage {
            entries,
            next_cursor,
        })
    }

    async fn reconcile_account(
        &self,
        account_id: Uuid,
    ) -> Result<ReconciliationReport, LedgerError> {
        let account = self.get_account(account_id).await?;

        let (entry_sum, entry_count): (Decimal, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(amount), 0), COUNT(*)
            FROM ledger_entries
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(ReconciliationReport {
            account_id,
            stored_balance: account.balance,
            computed_balance: account.opening_balance + entry_sum,
            entry_count: entry_count as u64,
            checked_at: Utc::now(),
        })
    }

    async fn account_ids(&self) -> Result<Vec<Uuid>, LedgerError> {
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM accounts ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AccountStatus;
    use rust_decimal_macros::dec;

    #[test]
    fn test_map_account_row() {
        let id = Uuid::new_v4();
        let opened_at = Utc::now();
        let account = map_account_row((
            id,
            "USD".to_string(),
            dec!(60.00),
            dec!(60.00),
            dec!(0),
            dec!(100.00),
            "frozen".to_string(),
            4,
            opened_at,
        ))
        .unwrap();

        assert_eq!(account.id, id);
        assert_eq!(account.currency, Currency::USD);
        assert_eq!(account.status, AccountStatus::Frozen);
        assert_eq!(account.version, 4);
    }

    #[test]
    fn test_map_account_row_rejects_bad_status() {
        let result = map_account_row((
            Uuid::new_v4(),
            "USD".to_string(),
            dec!(0),
            dec!(0),
            dec!(0),
            dec!(0),
            "limbo".to_string(),
            0,
            Utc::now(),
        ));
        assert!(matches!(result, Err(LedgerError::Malformed(_))));
    }
}
