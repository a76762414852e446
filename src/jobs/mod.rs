//! Scheduled Jobs
//!
//! Periodic reconciliation sweep: for every account, recompute the balance
//! from posted entries and compare it to the stored balance. A mismatch is
//! a corruption signal, surfaced for operator intervention and never
//! auto-corrected.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::audit::{AuditEvent, AuditSink};
use crate::ledger::{LedgerStore, ReconciliationReport};

/// Result of one reconciliation sweep.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationSweep {
    pub accounts_checked: u64,
    pub mismatches: Vec<ReconciliationReport>,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

impl ReconciliationSweep {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty() && self.errors.is_empty()
    }
}

/// Runs the reconciliation check on a schedule.
pub struct ReconciliationScheduler {
    store: Arc<dyn LedgerStore>,
    audit: Arc<dyn AuditSink>,
    sweep_interval: Duration,
}

impl ReconciliationScheduler {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        audit: Arc<dyn AuditSink>,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            store,
            audit,
            sweep_interval,
        }
    }

    /// Start the scheduler in the background. Abort the handle to stop it.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                interval_secs = self.sweep_interval.as_secs(),
                "Reconciliation scheduler started"
            );
            let mut ticker = interval(self.sweep_interval);
            loop {
                ticker.tick().await;
                let sweep = self.run_all_once().await;
                if !sweep.is_clean() {
                    tracing::error!(
                        mismatches = sweep.mismatches.len(),
                        errors = sweep.errors.len(),
                        "Reconciliation sweep found problems"
                    );
                }
            }
        })
    }

    /// Sweep every account once (manual trigger or test).
    pub async fn run_all_once(&self) -> ReconciliationSweep {
        let mut sweep = ReconciliationSweep::default();

        let ids = match self.store.account_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                sweep.errors.push(format!("account enumeration failed: {}", e));
                sweep.completed_at = Utc::now();
                return sweep;
            }
        };

        for account_id in ids {
            match self.store.reconcile_account(account_id).await {
                Ok(report) => {
                    sweep.accounts_checked += 1;
                    if !report.is_consistent() {
                        tracing::error!(
                            account_id = %report.account_id,
                            stored = %report.stored_balance,
                            computed = %report.computed_balance,
                            drift = %report.drift(),
                            "Ledger corruption: stored balance does not match entries"
                        );
                        if let Err(e) = self
                            .audit
                            .record(
                                AuditEvent::builder("ledger.reconciliation_mismatch")
                                    .entity("account", report.account_id)
                                    .status("corrupt")
                                    .details(json!({
                                        "stored_balance": report.stored_balance.to_string(),
                                        "computed_balance": report.computed_balance.to_string(),
                                        "entry_count": report.entry_count,
                                    }))
                                    .build(),
                            )
                            .await
                        {
                            tracing::warn!(error = %e, "Audit sink rejected event");
                        }
                        sweep.mismatches.push(report);
                    }
                }
                Err(e) => sweep.errors.push(format!("{}: {}", account_id, e)),
            }
        }

        sweep.completed_at = Utc::now();
        tracing::debug!(
            accounts = sweep.accounts_checked,
            mismatches = sweep.mismatches.len(),
            "Reconciliation sweep complete"
        );
        sweep
    }
}
