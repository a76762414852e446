//! Held-transaction lifecycle: supervisor polling, confirmation outcomes,
//! exhaustion, and the no-provisional-entries invariant.

mod common;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;

use common::{bank_with_risky_customers, open_usd, seeded_store, transfer_intent};
use corebank::domain::{EntryRange, FailureReason, TransactionStatus};
use corebank::ledger::LedgerStore;
use corebank::recovery::{
    ConfirmationStatus, RecoveryConfig, RecoverySupervisor, ScriptedConfirmations,
};
use corebank::OperationContext;

/// Submitting from outside the customer's home region scores medium and
/// holds the transaction for review.
fn abroad() -> OperationContext {
    OperationContext::new().with_origin_region("RU")
}

fn fast_recovery(max_attempts: u32) -> RecoveryConfig {
    RecoveryConfig {
        max_attempts,
        base_backoff: Duration::from_millis(0),
        max_backoff: Duration::from_millis(0),
        confirmation_deadline: Duration::from_secs(3600),
        poll_interval: Duration::from_millis(10),
    }
}

struct HeldSetup {
    bank: common::TestBank,
    supervisor: Arc<RecoverySupervisor>,
    confirmations: Arc<ScriptedConfirmations>,
    from: uuid::Uuid,
    to: uuid::Uuid,
    transaction_id: uuid::Uuid,
}

async fn held_transfer(config: RecoveryConfig) -> HeldSetup {
    let (store, system) = seeded_store().await;
    let from = open_usd(&store, dec!(10_000.00)).await;
    let to = open_usd(&store, dec!(0.00)).await;
    let bank = bank_with_risky_customers(&[from], store, system).await;

    let record = bank
        .router
        .submit(transfer_intent(from, to, dec!(100.00)), &abroad())
        .await
        .unwrap();
    assert_eq!(record.status, TransactionStatus::Held);

    let confirmations = Arc::new(ScriptedConfirmations::new());
    let supervisor = Arc::new(RecoverySupervisor::new(
        bank.router.clone(),
        bank.store.clone(),
        confirmations.clone(),
        bank.audit.clone(),
        config,
    ));

    HeldSetup {
        bank,
        supervisor,
        confirmations,
        from,
        to,
        transaction_id: record.id,
    }
}

#[tokio::test]
async fn confirmed_hold_posts_after_pending_polls() {
    let setup = held_transfer(fast_recovery(10)).await;
    setup
        .confirmations
        .enqueue(
            setup.transaction_id,
            vec![
                ConfirmationStatus::Pending,
                ConfirmationStatus::Pending,
                ConfirmationStatus::Confirmed,
            ],
        )
        .await;

    // first pass adopts and polls (pending), next passes retry
    for _ in 0..4 {
        setup.supervisor.run_once().await;
    }

    let record = setup.bank.router.get(setup.transaction_id).await.unwrap();
    assert_eq!(record.status, TransactionStatus::Posted);
    assert_eq!(
        setup.bank.store.get_account(setup.to).await.unwrap().balance,
        dec!(100.00)
    );
}

#[tokio::test]
async fn declined_hold_fails_without_entries() {
    let setup = held_transfer(fast_recovery(10)).await;
    setup
        .confirmations
        .enqueue(setup.transaction_id, vec![ConfirmationStatus::Declined])
        .await;

    setup.supervisor.run_once().await;

    let record = setup.bank.router.get(setup.transaction_id).await.unwrap();
    assert_eq!(record.status, TransactionStatus::Failed);
    assert_eq!(record.failure, Some(FailureReason::ReviewBlocked));

    let page = setup
        .bank
        .store
        .list_entries(setup.from, EntryRange::all(), None, 10)
        .await
        .unwrap();
    assert!(page.entries.is_empty());
}

#[tokio::test]
async fn exhausted_confirmation_fails_with_no_ledger_effect() {
    let setup = held_transfer(fast_recovery(3)).await;
    // no scripted answers: every poll is Pending

    let mut report = None;
    for _ in 0..6 {
        report = Some(setup.supervisor.run_once().await);
    }
    let report = report.unwrap();
    assert!(report.errors.is_empty(), "errors: {:?}", report.errors);

    let record = setup.bank.router.get(setup.transaction_id).await.unwrap();
    assert_eq!(record.status, TransactionStatus::Failed);
    assert_eq!(record.failure, Some(FailureReason::ConfirmationExhausted));

    // no provisional entries existed, so no reversal was needed
    for account in [setup.from, setup.to] {
        let page = setup
            .bank
            .store
            .list_entries(account, EntryRange::all(), None, 10)
            .await
            .unwrap();
        assert!(page.entries.is_empty());
    }
    assert_eq!(
        setup.bank.store.get_account(setup.from).await.unwrap().balance,
        dec!(10_000.00)
    );
}

#[tokio::test]
async fn deadline_expiry_exhausts_immediately() {
    let config = RecoveryConfig {
        confirmation_deadline: Duration::from_secs(0),
        ..fast_recovery(100)
    };
    let setup = held_transfer(config).await;
    setup
        .confirmations
        .enqueue(setup.transaction_id, vec![ConfirmationStatus::Confirmed])
        .await;

    // even a confirmed answer cannot beat an already-expired deadline
    setup.supervisor.run_once().await;
    setup.supervisor.run_once().await;

    let record = setup.bank.router.get(setup.transaction_id).await.unwrap();
    assert_eq!(record.status, TransactionStatus::Failed);
    assert_eq!(record.failure, Some(FailureReason::ConfirmationExhausted));
}

#[tokio::test]
async fn resolved_elsewhere_drops_out_of_the_queue() {
    let setup = held_transfer(fast_recovery(10)).await;
    setup.supervisor.watch(setup.transaction_id).await;

    // an operator cancels the held transaction before any confirmation
    setup
        .bank
        .router
        .cancel(setup.transaction_id, &OperationContext::new())
        .await
        .unwrap();

    let report = setup.supervisor.run_once().await;
    assert_eq!(report.confirmed + report.declined + report.exhausted, 0);

    let record = setup.bank.router.get(setup.transaction_id).await.unwrap();
    assert_eq!(record.status, TransactionStatus::Failed);
    assert_eq!(record.failure, Some(FailureReason::Cancelled));
}
