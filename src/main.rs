//! corebank - core money-movement service
//!
//! Wires the durable ledger store, posting engine, fraud gate, transaction
//! router, recovery supervisor, and reconciliation scheduler; then runs the
//! background services until shutdown. Intent submission arrives through
//! the transport collaborator, which embeds this crate as a library.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use corebank::audit::TracingAuditSink;
use corebank::fraud::{FraudGate, RuleBasedExplainer};
use corebank::jobs::ReconciliationScheduler;
use corebank::ledger::PgLedgerStore;
use corebank::recovery::{NullConfirmationProvider, RecoverySupervisor};
use corebank::router::{PgTransactionJournal, TransactionRouter};
use corebank::{db, Config};

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "corebank=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;

    tracing::info!("Starting corebank engine");
    tracing::info!("Connecting to database...");

    let pool = db::create_pool(&config).await?;
    db::verify_connection(&pool).await?;

    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }
    if !db::check_system_accounts(&pool, &config.router.system_accounts).await? {
        return Err(anyhow::anyhow!("System accounts missing"));
    }

    tracing::info!("Database connected successfully");

    let store = Arc::new(PgLedgerStore::new(pool.clone()));
    let audit = Arc::new(TracingAuditSink);
    let gate =
        FraudGate::new(config.fraud.clone()).with_explainer(Arc::new(RuleBasedExplainer));

    let router = Arc::new(
        TransactionRouter::new(
            store.clone(),
            gate,
            audit.clone(),
            config.router.clone(),
        )
        .with_journal(Arc::new(PgTransactionJournal::new(pool.clone()))),
    );

    let supervisor = Arc::new(RecoverySupervisor::new(
        router.clone(),
        store.clone(),
        Arc::new(NullConfirmationProvider),
        audit.clone(),
        config.recovery.clone(),
    ));
    let supervisor_handle = supervisor.start();

    let scheduler = Arc::new(ReconciliationScheduler::new(
        store,
        audit,
        config.reconciliation_interval,
    ));
    let scheduler_handle = scheduler.start();

    tracing::info!("Recovery supervisor and reconciliation scheduler running");

    shutdown_signal().await;

    // Cleanup
    tracing::info!("Shutting down...");
    supervisor_handle.abort();
    scheduler_handle.abort();
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
