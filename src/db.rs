//! Database module
//!
//! Database connection and schema verification for the durable ledger
//! backend.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::router::SystemAccounts;

/// Create the connection pool from configuration.
pub async fn create_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
}

/// Simple connectivity check.
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let required_tables = vec!["accounts", "ledger_entries", "transactions", "fraud_alerts"];

    for table in required_tables {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}

/// Check that the configured institutional accounts are seeded.
pub async fn check_system_accounts(
    pool: &PgPool,
    system: &SystemAccounts,
) -> Result<bool, sqlx::Error> {
    let required = vec![
        (system.cash, "cash"),
        (system.loan_funding, "loan_funding"),
    ];

    for (account_id, name) in required {
        if !account_exists(pool, account_id).await? {
            tracing::error!(
                "Required system account '{}' ({}) does not exist. Please run the database seed.",
                name,
                account_id
            );
            return Ok(false);
        }
    }

    tracing::info!("System accounts verified: cash, loan_funding");
    Ok(true)
}

async fn account_exists(pool: &PgPool, account_id: Uuid) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM accounts WHERE id = $1)")
        .bind(account_id)
        .fetch_one(pool)
        .await
}
