//! Retry/Recovery Supervisor
//!
//! Owns transactions sitting in `Held` awaiting an external confirmation
//! (payment-network ack, secondary fraud review). Polls the confirmation
//! collaborator with bounded exponential backoff; on exhaustion the
//! transaction fails, and any entries that were somehow posted for it are
//! compensated with an exact-negation reversal rather than mutated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditSink};
use crate::domain::{EntryRange, FailureReason, Leg, LedgerEntry, OperationContext, TransactionStatus};
use crate::ledger::LedgerStore;
use crate::posting::PostingEngine;
use crate::router::{ReviewDecision, RouterError, TransactionRouter};

/// Answer from the external confirmation collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationStatus {
    Confirmed,
    Declined,
    Pending,
}

/// External confirmation source (payment network, review queue).
#[async_trait]
pub trait ConfirmationProvider: Send + Sync {
    async fn check(&self, transaction_id: Uuid) -> ConfirmationStatus;
}

/// Placeholder provider for deployments without a network integration:
/// every poll answers `Pending`, so held transactions fail at the
/// confirmation deadline and never hang.
#[derive(Debug, Default)]
pub struct NullConfirmationProvider;

#[async_trait]
impl ConfirmationProvider for NullConfirmationProvider {
    async fn check(&self, _transaction_id: Uuid) -> ConfirmationStatus {
        ConfirmationStatus::Pending
    }
}

/// Scripted provider for tests and demos: replays a queued sequence of
/// answers per transaction, then defaults to `Pending`.
#[derive(Debug, Default)]
pub struct ScriptedConfirmations {
    script: Mutex<HashMap<Uuid, VecDeque<ConfirmationStatus>>>,
}

impl ScriptedConfirmations {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enqueue(&self, transaction_id: Uuid, answers: Vec<ConfirmationStatus>) {
        self.script
            .lock()
            .await
            .entry(transaction_id)
            .or_default()
            .extend(answers);
    }
}

#[async_trait]
impl ConfirmationProvider for ScriptedConfirmations {
    async fn check(&self, transaction_id: Uuid) -> ConfirmationStatus {
        self.script
            .lock()
            .await
            .get_mut(&transaction_id)
            .and_then(|q| q.pop_front())
            .unwrap_or(ConfirmationStatus::Pending)
    }
}

/// Supervisor tunables. All deployment configuration.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Confirmation polls per transaction before giving up.
    pub max_attempts: u32,
    /// First retry delay; doubles each attempt.
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Hard deadline after which a held transaction fails regardless of
    /// remaining attempts.
    pub confirmation_deadline: Duration,
    /// Scheduler tick.
    pub poll_interval: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            confirmation_deadline: Duration::from_secs(15 * 60),
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
struct HeldItem {
    attempts: u32,
    next_due: DateTime<Utc>,
    deadline: DateTime<Utc>,
}

/// Outcome of one supervisor pass.
#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    pub adopted: u32,
    pub confirmed: u32,
    pub declined: u32,
    pub exhausted: u32,
    pub rescheduled: u32,
    pub reversals_issued: u32,
    pub errors: Vec<String>,
}

/// The supervisor.
pub struct RecoverySupervisor {
    router: Arc<TransactionRouter>,
    posting: PostingEngine,
    store: Arc<dyn LedgerStore>,
    confirmations: Arc<dyn ConfirmationProvider>,
    audit: Arc<dyn AuditSink>,
    config: RecoveryConfig,
    queue: Mutex<HashMap<Uuid, HeldItem>>,
}

impl RecoverySupervisor {
    pub fn new(
        router: Arc<TransactionRouter>,
        store: Arc<dyn LedgerStore>,
        confirmations: Arc<dyn ConfirmationProvider>,
        audit: Arc<dyn AuditSink>,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            router,
            posting: PostingEngine::new(store.clone()),
            store,
            confirmations,
            audit,
            config,
            queue: Mutex::new(HashMap::new()),
        }
    }

    /// Track a held transaction. Idempotent.
    pub async fn watch(&self, transaction_id: Uuid) {
        let now = Utc::now();
        let mut queue = self.queue.lock().await;
        queue.entry(transaction_id).or_insert_with(|| HeldItem {
            attempts: 0,
            next_due: now,
            deadline: now + to_chrono(self.config.confirmation_deadline),
        });
    }

    /// Run the supervisor loop until the task is aborted.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Recovery supervisor started");
            let mut ticker = tokio::time::interval(self.config.poll_interval);
            loop {
                ticker.tick().await;
                let report = self.run_once().await;
                if !report.errors.is_empty() {
                    tracing::error!(errors = ?report.errors, "Recovery pass finished with errors");
                }
            }
        })
    }

    /// One supervision pass: adopt newly held transactions, then process
    /// everything that is due. Exposed for manual triggering and tests.
    pub async fn run_once(&self) -> RecoveryReport {
        let mut report = RecoveryReport::default();

        // Adopt held transactions the router accumulated since last tick.
        for id in self.router.held_ids().await {
            let now = Utc::now();
            let mut queue = self.queue.lock().await;
            if !queue.contains_key(&id) {
                queue.insert(
                    id,
                    HeldItem {
                        attempts: 0,
                        next_due: now,
                        deadline: now + to_chrono(self.config.confirmation_deadline),
                    },
                );
                report.adopted += 1;
            }
        }

        let due: Vec<(Uuid, HeldItem)> = {
            let now = Utc::now();
            let queue = self.queue.lock().await;
            queue
                .iter()
                .filter(|(_, item)| item.next_due <= now)
                .map(|(id, item)| (*id, item.clone()))
                .collect()
        };

        for (id, item) in due {
            self.process(id, item, &mut report).await;
        }

        report
    }

    async fn process(&self, id: Uuid, item: HeldItem, report: &mut RecoveryReport) {
        let context = OperationContext::new();
        let now = Utc::now();

        // A transaction that left Held some other way no longer needs us.
        match self.router.get(id).await {
            Some(record) if record.status == TransactionStatus::Held => {}
            _ => {
                self.queue.lock().await.remove(&id);
                return;
            }
        }

        if now >= item.deadline || item.attempts >= self.config.max_attempts {
            self.exhaust(id, report, &context).await;
            return;
        }

        match self.confirmations.check(id).await {
            ConfirmationStatus::Confirmed => {
                match self
                    .router
                    .resolve_review(id, ReviewDecision::Allow, &context)
                    .await
                {
                    Ok(_) => {
                        report.confirmed += 1;
                        self.queue.lock().await.remove(&id);
                    }
                    Err(RouterError::Contention { .. }) => {
                        // still held; try again next backoff window
                        self.reschedule(id, item, report).await;
                    }
                    Err(e) => {
                        report.errors.push(format!("{}: {}", id, e));
                        self.queue.lock().await.remove(&id);
                    }
                }
            }
            ConfirmationStatus::Declined => {
                match self
                    .router
                    .resolve_review(id, ReviewDecision::Block, &context)
                    .await
                {
                    Ok(_) => report.declined += 1,
                    Err(e) => report.errors.push(format!("{}: {}", id, e)),
                }
                self.queue.lock().await.remove(&id);
            }
            ConfirmationStatus::Pending => {
                if item.attempts + 1 >= self.config.max_attempts {
                    self.exhaust(id, report, &context).await;
                } else {
                    self.reschedule(id, item, report).await;
                }
            }
        }
    }

    async fn reschedule(&self, id: Uuid, item: HeldItem, report: &mut RecoveryReport) {
        let attempts = item.attempts + 1;
        let delay = self.backoff(attempts);
        let mut queue = self.queue.lock().await;
        if let Some(entry) = queue.get_mut(&id) {
            entry.attempts = attempts;
            entry.next_due = Utc::now() + to_chrono(delay);
        }
        report.rescheduled += 1;
        tracing::debug!(
            transaction_id = %id,
            attempts,
            delay_ms = delay.as_millis() as u64,
            "Confirmation still pending, rescheduled"
        );
    }

    async fn exhaust(&self, id: Uuid, report: &mut RecoveryReport, context: &OperationContext) {
        self.queue.lock().await.remove(&id);

        match self
            .router
            .fail_held(id, FailureReason::ConfirmationExhausted, context)
            .await
        {
            Ok(record) => {
                report.exhausted += 1;
                tracing::warn!(
                    transaction_id = %id,
                    "Confirmation exhausted, transaction failed"
                );

                // Posting only ever follows an allow, so a held transaction
                // has no entries. Verify, and compensate if that invariant
                // was broken.
                match self.posted_entries(&record.legs, id).await {
                    Ok(entries) if !entries.is_empty() => {
                        self.compensate(id, &entries, report, context).await;
                    }
                    Ok(_) => {}
                    Err(e) => report.errors.push(format!("{}: entry scan failed: {}", id, e)),
                }
            }
            Err(RouterError::InvalidState { status, .. })
                if status == TransactionStatus::Posted =>
            {
                // a confirmation raced us; the transaction resolved cleanly
                report.confirmed += 1;
            }
            Err(e) => report.errors.push(format!("{}: {}", id, e)),
        }
    }

    /// Entries already posted for `transaction_id` across the legs'
    /// accounts.
    async fn posted_entries(
        &self,
        legs: &[Leg],
        transaction_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, crate::ledger::LedgerError> {
        let mut found = Vec::new();
        let mut seen_accounts = std::collections::HashSet::new();

        for leg in legs {
            if !seen_accounts.insert(leg.account_id) {
                continue;
            }
            let mut cursor = None;
            loop {
                let page = self
                    .store
                    .list_entries(leg.account_id, EntryRange::all(), cursor, 500)
                    .await?;
                found.extend(
                    page.entries
                        .into_iter()
                        .filter(|e| e.transaction_id == transaction_id),
                );
                match page.next_cursor {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }
        }

        Ok(found)
    }

    /// Issue a compensating reversal: a new transaction whose legs are the
    /// exact negation of what was posted. The original entries stay
    /// untouched, preserving the full audit trail.
    async fn compensate(
        &self,
        original_id: Uuid,
        entries: &[LedgerEntry],
        report: &mut RecoveryReport,
        context: &OperationContext,
    ) {
        tracing::error!(
            transaction_id = %original_id,
            entries = entries.len(),
            "Provisional entries found for an unconfirmed transaction; issuing compensating reversal"
        );

        let legs: Vec<Leg> = entries
            .iter()
            .map(|e| Leg {
                account_id: e.account_id,
                amount: -e.amount,
                currency: e.currency,
            })
            .collect();

        let reversal_id = Uuid::new_v4();
        match self.posting.commit(reversal_id, &legs).await {
            Ok(_) => {
                report.reversals_issued += 1;
                if let Err(e) = self
                    .audit
                    .record(
                        AuditEvent::builder("transaction.reversed")
                            .entity("transaction", original_id)
                            .status("recovered")
                            .context(context)
                            .details(serde_json::json!({ "reversal_id": reversal_id }))
                            .build(),
                    )
                    .await
                {
                    tracing::warn!(error = %e, "Audit sink rejected event");
                }
            }
            Err(e) => report
                .errors
                .push(format!("{}: compensation failed: {}", original_id, e)),
        }
    }

    fn backoff(&self, attempts: u32) -> Duration {
        let doubled = self
            .config
            .base_backoff
            .saturating_mul(1u32.checked_shl(attempts.min(16)).unwrap_or(u32::MAX));
        let capped = doubled.min(self.config.max_backoff);

        // jitter up to half the base delay so synchronized holds spread out
        let half_base_ms = (self.config.base_backoff.as_millis() as u64) / 2;
        let jitter = if half_base_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..=half_base_ms))
        } else {
            Duration::ZERO
        };

        capped + jitter
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::seconds(86_400))
}
