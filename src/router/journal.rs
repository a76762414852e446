//! Transaction journal
//!
//! Durable projection of the router's transaction and alert state. The
//! ledger (accounts + entries) is the source of truth for money; the
//! journal exists so operators and the compliance collaborator can query
//! transaction outcomes after a restart. Writes are best-effort: a journal
//! failure is logged and never fails the money movement.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::{FraudAlert, TransactionRecord};

/// Journal errors
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable sink for transaction records and fraud alerts.
#[async_trait]
pub trait TransactionJournal: Send + Sync {
    async fn upsert_transaction(&self, record: &TransactionRecord) -> Result<(), JournalError>;
    async fn insert_alert(&self, alert: &FraudAlert) -> Result<(), JournalError>;
}

/// Postgres-backed journal.
#[derive(Debug, Clone)]
pub struct PgTransactionJournal {
    pool: PgPool,
}

impl PgTransactionJournal {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionJournal for PgTransactionJournal {
    async fn upsert_transaction(&self, record: &TransactionRecord) -> Result<(), JournalError> {
        let (fraud_score, risk_level, action) = match &record.assessment {
            Some(a) => (
                Some(a.score),
                Some(a.risk_level.as_str()),
                Some(a.action.to_string()),
            ),
            None => (None, None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, type, status, idempotency_key, fraud_score, risk_level,
                action, failure_reason, reversal_of, created_at, posted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                fraud_score = EXCLUDED.fraud_score,
                risk_level = EXCLUDED.risk_level,
                action = EXCLUDED.action,
                failure_reason = EXCLUDED.failure_reason,
                posted_at = EXCLUDED.posted_at
            "#,
        )
        .bind(record.id)
        .bind(record.kind.as_str())
        .bind(record.status.as_str())
        .bind(record.idempotency_key)
        .bind(fraud_score)
        .bind(risk_level)
        .bind(action)
        .bind(record.failure.map(|r| r.as_str()))
        .bind(record.reversal_of)
        .bind(record.created_at)
        .bind(record.posted_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_alert(&self, alert: &FraudAlert) -> Result<(), JournalError> {
        let indicators = serde_json::to_value(&alert.indicators)?;

        sqlx::query(
            r#"
            INSERT INTO fraud_alerts (
                id, transaction_id, account_id, score, risk_level,
                indicators, status, description, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(alert.id)
        .bind(alert.transaction_id)
        .bind(alert.account_id)
        .bind(alert.score)
        .bind(alert.risk_level.as_str())
        .bind(indicators)
        .bind("open")
        .bind(&alert.description)
        .bind(alert.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
