//! Domain types
//!
//! Pure domain model: money, accounts, entries, transactions, fraud types.
//! Nothing in this module touches storage or the network.

pub mod account;
pub mod amount;
pub mod context;
pub mod currency;
pub mod entry;
pub mod fraud;
pub mod transaction;

pub use account::{Account, AccountStatus, NewAccount};
pub use amount::{validate_signed, Amount, AmountError};
pub use context::OperationContext;
pub use currency::{Currency, CurrencyError};
pub use entry::{EntryCursor, EntryPage, EntryRange, LedgerEntry, NewEntry};
pub use fraud::{
    AlertStatus, CustomerProfile, FraudAction, FraudAlert, FraudAssessment, FraudIndicator,
    IndicatorCode, RiskLevel,
};
pub use transaction::{
    FailureReason, Leg, TransactionKind, TransactionRecord, TransactionStatus,
};
