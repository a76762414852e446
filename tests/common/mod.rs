//! Common test fixtures
#![allow(dead_code)] // not every test binary uses every fixture

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use corebank::audit::MemoryAuditSink;
use corebank::domain::{Currency, CustomerProfile, NewAccount};
use corebank::fraud::{FraudConfig, FraudGate, StaticCustomerDirectory};
use corebank::ledger::{LedgerStore, MemoryLedgerStore};
use corebank::router::{
    IntentKind, RouterConfig, SystemAccounts, TransactionIntent, TransactionRouter,
};

/// A fully wired in-memory engine for black-box tests.
pub struct TestBank {
    pub store: Arc<MemoryLedgerStore>,
    pub audit: Arc<MemoryAuditSink>,
    pub router: Arc<TransactionRouter>,
    pub system: SystemAccounts,
}

/// Institutional accounts get a wide overdraft so customer flows never
/// bounce off them.
pub async fn seeded_store() -> (Arc<MemoryLedgerStore>, SystemAccounts) {
    let store = Arc::new(MemoryLedgerStore::new());
    let system = SystemAccounts {
        cash: Uuid::new_v4(),
        loan_funding: Uuid::new_v4(),
    };
    for id in [system.cash, system.loan_funding] {
        store
            .create_account(
                NewAccount::new(id, Currency::USD)
                    .with_overdraft_limit(Decimal::new(1_000_000_000, 0)),
            )
            .await
            .expect("seed system account");
    }
    (store, system)
}

pub async fn bank() -> TestBank {
    let (store, system) = seeded_store().await;
    let audit = Arc::new(MemoryAuditSink::new());
    let router = Arc::new(TransactionRouter::new(
        store.clone(),
        FraudGate::new(FraudConfig::default()),
        audit.clone(),
        RouterConfig::new(system),
    ));
    TestBank {
        store,
        audit,
        router,
        system,
    }
}

/// A bank whose directory marks the given accounts as high-risk customers
/// homed in "DE"; submitting their transfers from another region scores
/// medium and holds.
pub async fn bank_with_risky_customers(risky_accounts: &[Uuid], store: Arc<MemoryLedgerStore>, system: SystemAccounts) -> TestBank {
    let audit = Arc::new(MemoryAuditSink::new());
    let mut directory = StaticCustomerDirectory::new();
    for account_id in risky_accounts {
        directory = directory.with_profile(
            *account_id,
            CustomerProfile {
                kyc_verified: true,
                declared_risk: 0.8,
                home_region: Some("DE".to_string()),
            },
        );
    }

    let router = Arc::new(
        TransactionRouter::new(
            store.clone(),
            FraudGate::new(FraudConfig::default()),
            audit.clone(),
            RouterConfig::new(system),
        )
        .with_customer_directory(Arc::new(directory)),
    );

    TestBank {
        store,
        audit,
        router,
        system,
    }
}

pub async fn open_usd(store: &MemoryLedgerStore, balance: Decimal) -> Uuid {
    let id = Uuid::new_v4();
    store
        .create_account(NewAccount::new(id, Currency::USD).with_opening_balance(balance))
        .await
        .expect("open account");
    id
}

pub fn transfer_intent(from: Uuid, to: Uuid, amount: Decimal) -> TransactionIntent {
    TransactionIntent::new(
        IntentKind::Transfer {
            from_account_id: from,
            to_account_id: to,
            amount,
            currency: Currency::USD,
        },
        Uuid::new_v4(),
    )
}
