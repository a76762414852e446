//! corebank Library
//!
//! Core money-movement engine: a versioned ledger store, a double-entry
//! posting engine, a deterministic fraud scoring gate, the transaction
//! router that composes them, and the retry/recovery supervisor for
//! held transactions.

pub mod audit;
pub mod domain;
pub mod fraud;
pub mod jobs;
pub mod ledger;
pub mod posting;
pub mod recovery;
pub mod router;

// Used by the service binary; exported for embedding and tests.
pub mod config;
pub mod db;

pub use config::{Config, ConfigError};
pub use domain::{
    Account, AccountStatus, Amount, AmountError, Currency, FailureReason, FraudAction,
    FraudAlert, FraudAssessment, LedgerEntry, Leg, OperationContext, RiskLevel,
    TransactionKind, TransactionRecord, TransactionStatus,
};
pub use fraud::{AccountActivity, FraudConfig, FraudGate};
pub use ledger::{LedgerError, LedgerStore, MemoryLedgerStore, PgLedgerStore, PostReceipt};
pub use posting::{PostingEngine, PostingError};
pub use recovery::{ConfirmationProvider, ConfirmationStatus, RecoveryConfig, RecoverySupervisor};
pub use router::{
    IntentKind, RouterConfig, RouterError, SystemAccounts, TransactionIntent, TransactionRouter,
};
