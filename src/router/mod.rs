//! Transaction Router
//!
//! Decomposes intents into balanced legs, runs the fraud gate, drives the
//! posting engine, and owns the transaction state machine:
//!
//! ```text
//! pending --(fraud allow, commit ok)--> posted
//! pending --(fraud block)--> failed
//! pending --(fraud hold)--> held
//! held --(secondary review allow, commit ok)--> posted
//! held --(secondary review block | confirmation exhausted)--> failed
//! ```
//!
//! The router is explicitly constructed and dependency-injected; tests
//! instantiate isolated routers in parallel.

mod intent;
mod journal;

pub use intent::{IntentError, IntentKind, SystemAccounts, TradeSide, TransactionIntent};
pub use journal::{JournalError, PgTransactionJournal, TransactionJournal};

use chrono::Utc;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditSink};
use crate::domain::{
    FailureReason, FraudAction, FraudAlert, FraudAssessment, Leg, OperationContext,
    TransactionKind, TransactionRecord, TransactionStatus,
};
use crate::fraud::{AccountActivity, CandidateTransaction, CustomerDirectory, FraudGate};
use crate::ledger::{LedgerError, LedgerStore};
use crate::posting::{validate_legs, PostingEngine, PostingError};

/// Router tunables. All values are deployment configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Bounded retry count for version conflicts at commit.
    pub max_commit_attempts: u32,
    /// Base delay between conflict retries (linear backoff).
    pub retry_backoff: Duration,
    /// Re-run the fraud gate before retrying once this much time has
    /// passed since the last score.
    pub rescore_after: Duration,
    pub system_accounts: SystemAccounts,
}

impl RouterConfig {
    pub fn new(system_accounts: SystemAccounts) -> Self {
        Self {
            max_commit_attempts: 3,
            retry_backoff: Duration::from_millis(50),
            rescore_after: Duration::from_secs(2),
            system_accounts,
        }
    }
}

/// Secondary review outcome for a held transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Allow,
    Block,
}

/// Router errors returned to the caller. Business failures (insufficient
/// funds, fraud block, ...) are not errors: they come back as a `Failed`
/// record with a reason code.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error(transparent)]
    Intent(#[from] IntentError),

    #[error("Invalid intent: {0}")]
    InvalidIntent(String),

    #[error("Idempotency conflict: same key with different request")]
    IdempotencyConflict,

    #[error("Transaction not found: {0}")]
    NotFound(Uuid),

    #[error("Transaction {id} is {status}; operation not allowed")]
    InvalidState {
        id: Uuid,
        status: TransactionStatus,
    },

    #[error("Transaction {0} already has a reversal")]
    AlreadyReversed(Uuid),

    #[error("Commit contention persisted after {attempts} attempts")]
    Contention { attempts: u32 },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone)]
struct IdempotencyEntry {
    fingerprint: String,
    transaction_id: Uuid,
}

#[derive(Default)]
struct RouterState {
    transactions: HashMap<Uuid, TransactionRecord>,
    idempotency: HashMap<Uuid, IdempotencyEntry>,
    /// Accounts each account has previously moved money with; feeds the
    /// counterparty-novelty signal.
    counterparties: HashMap<Uuid, HashSet<Uuid>>,
    /// original transaction -> its reversal
    reversals: HashMap<Uuid, Uuid>,
    alerts: Vec<FraudAlert>,
}

/// What to do with the record when commit contention is exhausted.
#[derive(Clone, Copy, PartialEq)]
enum OnContention {
    /// Drop the record and idempotency entry so a clean resubmit can retry.
    Forget,
    /// Keep the record `Held` for another review/confirmation cycle.
    LeaveHeld,
}

/// The transaction router.
pub struct TransactionRouter {
    store: Arc<dyn LedgerStore>,
    posting: PostingEngine,
    gate: FraudGate,
    audit: Arc<dyn AuditSink>,
    customers: Option<Arc<dyn CustomerDirectory>>,
    journal: Option<Arc<dyn TransactionJournal>>,
    config: RouterConfig,
    state: RwLock<RouterState>,
}

impl TransactionRouter {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gate: FraudGate,
        audit: Arc<dyn AuditSink>,
        config: RouterConfig,
    ) -> Self {
        Self {
            posting: PostingEngine::new(store.clone()),
            store,
            gate,
            audit,
            customers: None,
            journal: None,
            config,
            state: RwLock::new(RouterState::default()),
        }
    }

    pub fn with_customer_directory(mut self, customers: Arc<dyn CustomerDirectory>) -> Self {
        self.customers = Some(customers);
        self
    }

    pub fn with_journal(mut self, journal: Arc<dyn TransactionJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    // =========================================================================
    // Intent submission
    // =========================================================================

    /// Submit an intent. Returns the transaction record in its resulting
    /// state; resubmissions with a previously seen idempotency key return
    /// the original record without re-scoring or new legs.
    pub async fn submit(
        &self,
        intent: TransactionIntent,
        context: &OperationContext,
    ) -> Result<TransactionRecord, RouterError> {
        let fingerprint = intent.fingerprint();

        // Fast path replay check before doing any work.
        if let Some(existing) = self.replay(&intent, &fingerprint).await? {
            return Ok(existing);
        }

        let legs = intent.kind.decompose(&self.config.system_accounts)?;
        validate_legs(&legs).map_err(|e| RouterError::InvalidIntent(e.to_string()))?;

        // Register under the write lock, re-checking the key so two
        // concurrent submissions of the same intent create one record.
        let record = {
            let mut state = self.state.write().await;
            if let Some(entry) = state.idempotency.get(&intent.idempotency_key) {
                if entry.fingerprint != fingerprint {
                    return Err(RouterError::IdempotencyConflict);
                }
                let id = entry.transaction_id;
                return state
                    .transactions
                    .get(&id)
                    .cloned()
                    .ok_or(RouterError::NotFound(id));
            }

            let record = TransactionRecord::new(
                intent.kind.transaction_kind(),
                legs.clone(),
                intent.idempotency_key,
            );
            state.idempotency.insert(
                intent.idempotency_key,
                IdempotencyEntry {
                    fingerprint,
                    transaction_id: record.id,
                },
            );
            state.transactions.insert(record.id, record.clone());
            record
        };

        self.emit(
            AuditEvent::builder("transaction.created")
                .entity("transaction", record.id)
                .context(context)
                .details(json!({
                    "kind": record.kind,
                    "legs": record.legs.len(),
                    "idempotency_key": record.idempotency_key,
                }))
                .build(),
        )
        .await;
        self.persist(record.id).await;

        // Score the candidate.
        let assessment = match self.assess(record.id, &intent, context).await {
            Ok(assessment) => assessment,
            Err(RouterError::Ledger(LedgerError::AccountNotFound(_))) => {
                return self
                    .finalize_failure(record.id, FailureReason::AccountNotFound, context, None)
                    .await;
            }
            Err(e) => return Err(e),
        };

        let action = assessment.action;
        let primary = intent.kind.primary_account();
        self.attach_assessment(record.id, assessment.clone()).await;

        self.emit(
            AuditEvent::builder("fraud.scored")
                .entity("transaction", record.id)
                .context(context)
                .details(json!({
                    "score": assessment.score,
                    "risk_level": assessment.risk_level,
                    "action": assessment.action,
                    "indicators": assessment
                        .indicators
                        .iter()
                        .map(|i| i.code)
                        .collect::<Vec<_>>(),
                }))
                .build(),
        )
        .await;

        match action {
            FraudAction::Allow => {
                self.commit_with_retry(
                    record.id,
                    legs,
                    Some(&intent),
                    context,
                    OnContention::Forget,
                )
                .await
            }
            FraudAction::Hold => {
                self.raise_alert(&assessment, primary).await;
                let held = self
                    .update_record(record.id, |r| r.status = TransactionStatus::Held)
                    .await
                    .ok_or(RouterError::NotFound(record.id))?;
                self.emit(
                    AuditEvent::builder("transaction.held")
                        .entity("transaction", record.id)
                        .status("held")
                        .context(context)
                        .details(json!({ "score": assessment.score }))
                        .build(),
                )
                .await;
                self.persist(record.id).await;
                Ok(held)
            }
            FraudAction::Block => {
                self.raise_alert(&assessment, primary).await;
                let failed = self
                    .update_record(record.id, |r| {
                        r.status = TransactionStatus::Failed;
                        r.failure = Some(FailureReason::FraudBlocked);
                    })
                    .await
                    .ok_or(RouterError::NotFound(record.id))?;
                self.emit(
                    AuditEvent::builder("transaction.blocked")
                        .entity("transaction", record.id)
                        .status("failed")
                        .context(context)
                        .details(json!({
                            "score": assessment.score,
                            "risk_level": assessment.risk_level,
                        }))
                        .build(),
                )
                .await;
                self.persist(record.id).await;
                Ok(failed)
            }
        }
    }

    // =========================================================================
    // Held-transaction resolution
    // =========================================================================

    /// Apply a secondary review decision to a held transaction.
    pub async fn resolve_review(
        &self,
        id: Uuid,
        decision: ReviewDecision,
        context: &OperationContext,
    ) -> Result<TransactionRecord, RouterError> {
        let record = self.expect_status(id, TransactionStatus::Held).await?;

        match decision {
            ReviewDecision::Allow => {
                self.commit_with_retry(
                    id,
                    record.legs.clone(),
                    None,
                    context,
                    OnContention::LeaveHeld,
                )
                .await
            }
            ReviewDecision::Block => {
                self.finalize_failure(id, FailureReason::ReviewBlocked, context, None)
                    .await
            }
        }
    }

    /// Fail a held transaction (Recovery Supervisor path).
    pub async fn fail_held(
        &self,
        id: Uuid,
        reason: FailureReason,
        context: &OperationContext,
    ) -> Result<TransactionRecord, RouterError> {
        self.expect_status(id, TransactionStatus::Held).await?;
        self.finalize_failure(id, reason, context, None).await
    }

    /// Cancel a transaction. Allowed only while `Pending` or `Held`; a
    /// posted transaction is corrected exclusively through a reversal.
    pub async fn cancel(
        &self,
        id: Uuid,
        context: &OperationContext,
    ) -> Result<TransactionRecord, RouterError> {
        let record = self.get(id).await.ok_or(RouterError::NotFound(id))?;
        if record.is_terminal() {
            return Err(RouterError::InvalidState {
                id,
                status: record.status,
            });
        }
        self.finalize_failure(id, FailureReason::Cancelled, context, Some("transaction.cancelled"))
            .await
    }

    // =========================================================================
    // Reversal
    // =========================================================================

    /// Issue a compensating reversal for a posted transaction: a new
    /// transaction whose legs are the exact negation of the original's.
    /// The original record is never mutated.
    pub async fn reverse(
        &self,
        original_id: Uuid,
        context: &OperationContext,
    ) -> Result<TransactionRecord, RouterError> {
        let reversal = {
            let mut state = self.state.write().await;
            let original = state
                .transactions
                .get(&original_id)
                .ok_or(RouterError::NotFound(original_id))?;
            if original.status != TransactionStatus::Posted {
                return Err(RouterError::InvalidState {
                    id: original_id,
                    status: original.status,
                });
            }
            if state.reversals.contains_key(&original_id) {
                return Err(RouterError::AlreadyReversed(original_id));
            }

            let legs: Vec<Leg> = original.legs.iter().map(|l| l.negated()).collect();
            let mut reversal =
                TransactionRecord::new(TransactionKind::Reversal, legs, Uuid::new_v4());
            reversal.reversal_of = Some(original_id);

            state.reversals.insert(original_id, reversal.id);
            state.transactions.insert(reversal.id, reversal.clone());
            reversal
        };
        self.persist(reversal.id).await;

        // Reversals are system-originated corrections; they skip the fraud
        // gate and go straight to the posting engine.
        let result = self
            .commit_with_retry(
                reversal.id,
                reversal.legs.clone(),
                None,
                context,
                OnContention::Forget,
            )
            .await;

        if let Ok(record) = &result {
            if record.status == TransactionStatus::Posted {
                self.emit(
                    AuditEvent::builder("transaction.reversed")
                        .entity("transaction", original_id)
                        .context(context)
                        .details(json!({ "reversal_id": record.id }))
                        .build(),
                )
                .await;
            }
        }

        result
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get(&self, id: Uuid) -> Option<TransactionRecord> {
        self.state.read().await.transactions.get(&id).cloned()
    }

    /// Transactions currently awaiting confirmation or review.
    pub async fn held_ids(&self) -> Vec<Uuid> {
        self.state
            .read()
            .await
            .transactions
            .values()
            .filter(|r| r.status == TransactionStatus::Held)
            .map(|r| r.id)
            .collect()
    }

    /// Alerts raised so far. Ownership passes to the compliance
    /// collaborator; the router only accumulates them for handoff.
    pub async fn alerts(&self) -> Vec<FraudAlert> {
        self.state.read().await.alerts.clone()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn replay(
        &self,
        intent: &TransactionIntent,
        fingerprint: &str,
    ) -> Result<Option<TransactionRecord>, RouterError> {
        let state = self.state.read().await;
        match state.idempotency.get(&intent.idempotency_key) {
            Some(entry) if entry.fingerprint == fingerprint => {
                Ok(state.transactions.get(&entry.transaction_id).cloned())
            }
            Some(_) => Err(RouterError::IdempotencyConflict),
            None => Ok(None),
        }
    }

    /// Gather inputs and run the gate once.
    async fn assess(
        &self,
        transaction_id: Uuid,
        intent: &TransactionIntent,
        context: &OperationContext,
    ) -> Result<FraudAssessment, RouterError> {
        let primary = intent.kind.primary_account();
        let account = self.store.get_account(primary).await?;
        let now = Utc::now();

        let known = {
            let state = self.state.read().await;
            state
                .counterparties
                .get(&primary)
                .cloned()
                .unwrap_or_default()
        };
        let activity = AccountActivity::collect(self.store.as_ref(), primary, now)
            .await?
            .with_counterparties(known);

        let profile = match &self.customers {
            Some(directory) => directory.profile(primary).await,
            None => None,
        };

        let candidate = CandidateTransaction {
            transaction_id,
            kind: intent.kind.transaction_kind(),
            primary_account: primary,
            counterparty: intent.kind.counterparty(),
            amount: intent.kind.gross(),
            currency: intent.kind.currency(),
            outflow: intent.kind.is_outflow(),
            origin_region: context.origin_region.clone(),
        };

        Ok(self
            .gate
            .score(&account, &candidate, &activity, profile.as_ref(), now))
    }

    /// Commit with bounded version-conflict retries, re-scoring when the
    /// last assessment has gone stale.
    async fn commit_with_retry(
        &self,
        id: Uuid,
        legs: Vec<Leg>,
        intent: Option<&TransactionIntent>,
        context: &OperationContext,
        on_contention: OnContention,
    ) -> Result<TransactionRecord, RouterError> {
        let max = self.config.max_commit_attempts.max(1);
        let mut last_score = Instant::now();

        for attempt in 1..=max {
            match self.posting.commit(id, &legs).await {
                Ok(receipt) => {
                    let posted = self
                        .update_record(id, |r| {
                            r.status = TransactionStatus::Posted;
                            r.posted_at = Some(receipt.posted_at);
                        })
                        .await
                        .ok_or(RouterError::NotFound(id))?;

                    self.remember_counterparties(&legs).await;

                    self.emit(
                        AuditEvent::builder("transaction.posted")
                            .entity("transaction", id)
                            .status("posted")
                            .context(context)
                            .details(json!({
                                "balances_after": receipt
                                    .balances_after
                                    .iter()
                                    .map(|(k, v)| (k.to_string(), v.to_string()))
                                    .collect::<HashMap<_, _>>(),
                            }))
                            .build(),
                    )
                    .await;
                    self.persist(id).await;

                    return Ok(posted);
                }

                Err(e) if e.is_retryable() && attempt < max => {
                    tracing::warn!(
                        transaction_id = %id,
                        attempt,
                        max,
                        "Version conflict at commit, retrying"
                    );
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;

                    // The snapshot the gate scored may be stale by now.
                    if let Some(intent) = intent {
                        if last_score.elapsed() >= self.config.rescore_after {
                            let assessment = self.assess(id, intent, context).await?;
                            last_score = Instant::now();
                            let action = assessment.action;
                            let primary = intent.kind.primary_account();
                            self.attach_assessment(id, assessment.clone()).await;

                            match action {
                                FraudAction::Allow => {}
                                FraudAction::Hold => {
                                    self.raise_alert(&assessment, primary).await;
                                    let held = self
                                        .update_record(id, |r| {
                                            r.status = TransactionStatus::Held
                                        })
                                        .await
                                        .ok_or(RouterError::NotFound(id))?;
                                    self.emit(
                                        AuditEvent::builder("transaction.held")
                                            .entity("transaction", id)
                                            .status("held")
                                            .context(context)
                                            .details(json!({ "rescored": true }))
                                            .build(),
                                    )
                                    .await;
                                    self.persist(id).await;
                                    return Ok(held);
                                }
                                FraudAction::Block => {
                                    self.raise_alert(&assessment, primary).await;
                                    return self
                                        .finalize_failure(
                                            id,
                                            FailureReason::FraudBlocked,
                                            context,
                                            Some("transaction.blocked"),
                                        )
                                        .await;
                                }
                            }
                        }
                    }
                }

                Err(e) if e.is_retryable() => {
                    // retries exhausted
                    match on_contention {
                        OnContention::Forget => {
                            self.forget(id).await;
                        }
                        OnContention::LeaveHeld => {}
                    }
                    self.emit(
                        AuditEvent::builder("transaction.failed")
                            .entity("transaction", id)
                            .status("contention")
                            .context(context)
                            .details(json!({ "attempts": max }))
                            .build(),
                    )
                    .await;
                    return Err(RouterError::Contention { attempts: max });
                }

                Err(e) => {
                    let reason = map_posting_failure(&e);
                    return self
                        .finalize_failure_with_detail(id, reason, context, None, e.to_string())
                        .await;
                }
            }
        }

        Err(RouterError::Contention { attempts: max })
    }

    async fn finalize_failure(
        &self,
        id: Uuid,
        reason: FailureReason,
        context: &OperationContext,
        action_override: Option<&str>,
    ) -> Result<TransactionRecord, RouterError> {
        self.finalize_failure_with_detail(id, reason, context, action_override, String::new())
            .await
    }

    async fn finalize_failure_with_detail(
        &self,
        id: Uuid,
        reason: FailureReason,
        context: &OperationContext,
        action_override: Option<&str>,
        detail: String,
    ) -> Result<TransactionRecord, RouterError> {
        let failed = self
            .update_record(id, |r| {
                r.status = TransactionStatus::Failed;
                r.failure = Some(reason);
            })
            .await
            .ok_or(RouterError::NotFound(id))?;

        let mut details = json!({ "reason": reason });
        if !detail.is_empty() {
            details["detail"] = json!(detail);
        }

        self.emit(
            AuditEvent::builder(action_override.unwrap_or("transaction.failed"))
                .entity("transaction", id)
                .status("failed")
                .context(context)
                .details(details)
                .build(),
        )
        .await;
        self.persist(id).await;

        Ok(failed)
    }

    async fn attach_assessment(&self, id: Uuid, assessment: FraudAssessment) {
        self.update_record(id, |r| r.assessment = Some(assessment))
            .await;
    }

    async fn raise_alert(&self, assessment: &FraudAssessment, account_id: Uuid) {
        let alert = FraudAlert::from_assessment(assessment, account_id);
        tracing::info!(
            alert_id = %alert.id,
            transaction_id = %alert.transaction_id,
            risk_level = %alert.risk_level,
            "Fraud alert raised"
        );
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.insert_alert(&alert).await {
                tracing::warn!(error = %e, alert_id = %alert.id, "Alert journal write failed");
            }
        }
        self.state.write().await.alerts.push(alert);
    }

    async fn remember_counterparties(&self, legs: &[Leg]) {
        let accounts: Vec<Uuid> = legs.iter().map(|l| l.account_id).collect();
        let mut state = self.state.write().await;
        for a in &accounts {
            for b in &accounts {
                if a != b {
                    state.counterparties.entry(*a).or_default().insert(*b);
                }
            }
        }
    }

    async fn update_record<F>(&self, id: Uuid, mutate: F) -> Option<TransactionRecord>
    where
        F: FnOnce(&mut TransactionRecord),
    {
        let mut state = self.state.write().await;
        let record = state.transactions.get_mut(&id)?;
        mutate(record);
        Some(record.clone())
    }

    async fn expect_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> Result<TransactionRecord, RouterError> {
        let record = self.get(id).await.ok_or(RouterError::NotFound(id))?;
        if record.status != status {
            return Err(RouterError::InvalidState {
                id,
                status: record.status,
            });
        }
        Ok(record)
    }

    /// Drop a record that never reached a terminal state so a clean
    /// resubmission can start over.
    async fn forget(&self, id: Uuid) {
        let mut state = self.state.write().await;
        if let Some(record) = state.transactions.remove(&id) {
            state.idempotency.remove(&record.idempotency_key);
            if let Some(original) = record.reversal_of {
                state.reversals.remove(&original);
            }
        }
    }

    async fn emit(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(event).await {
            tracing::warn!(error = %e, "Audit sink rejected event");
        }
    }

    /// Best-effort journal write of the record's current state. The ledger
    /// is the source of truth; journal failures are logged, not raised.
    async fn persist(&self, id: Uuid) {
        if let Some(journal) = &self.journal {
            if let Some(record) = self.get(id).await {
                if let Err(e) = journal.upsert_transaction(&record).await {
                    tracing::warn!(
                        error = %e,
                        transaction_id = %id,
                        "Transaction journal write failed"
                    );
                }
            }
        }
    }
}

fn map_posting_failure(e: &PostingError) -> FailureReason {
    match e {
        PostingError::InsufficientFunds { .. } => FailureReason::InsufficientFunds,
        PostingError::AccountFrozen(_) => FailureReason::AccountFrozen,
        PostingError::AccountClosed(_) => FailureReason::AccountClosed,
        PostingError::AccountNotFound(_) => FailureReason::AccountNotFound,
        PostingError::CurrencyMismatch { .. } => FailureReason::CurrencyMismatch,
        PostingError::UnbalancedLegs { .. }
        | PostingError::EmptyLegs
        | PostingError::InvalidLeg(_) => FailureReason::UnbalancedLegs,
        PostingError::VersionConflict { .. } | PostingError::Store(_) => FailureReason::Internal,
    }
}
