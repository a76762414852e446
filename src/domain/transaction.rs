//! Transactions
//!
//! A transaction is an ordered set of balanced legs plus the state machine
//! around them. Legs grouped by currency must sum to exactly zero before a
//! transaction can post.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Currency, FraudAssessment};

/// Kinds of money movement the router knows how to decompose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Transfer,
    BillPayment,
    LoanDisbursement,
    TradeSettlement,
    Reversal,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Transfer => "transfer",
            TransactionKind::BillPayment => "bill_payment",
            TransactionKind::LoanDisbursement => "loan_disbursement",
            TransactionKind::TradeSettlement => "trade_settlement",
            TransactionKind::Reversal => "reversal",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transaction lifecycle states.
///
/// `Pending` and `Held` are the only non-terminal states; `Posted` and
/// `Failed` never transition further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Held,
    Posted,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Posted | TransactionStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Held => "held",
            TransactionStatus::Posted => "posted",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reasons a transaction ends up `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InsufficientFunds,
    AccountFrozen,
    AccountClosed,
    AccountNotFound,
    CurrencyMismatch,
    UnbalancedLegs,
    FraudBlocked,
    ReviewBlocked,
    ConfirmationExhausted,
    Cancelled,
    Internal,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::InsufficientFunds => "insufficient_funds",
            FailureReason::AccountFrozen => "account_frozen",
            FailureReason::AccountClosed => "account_closed",
            FailureReason::AccountNotFound => "account_not_found",
            FailureReason::CurrencyMismatch => "currency_mismatch",
            FailureReason::UnbalancedLegs => "unbalanced_legs",
            FailureReason::FraudBlocked => "fraud_blocked",
            FailureReason::ReviewBlocked => "review_blocked",
            FailureReason::ConfirmationExhausted => "confirmation_exhausted",
            FailureReason::Cancelled => "cancelled",
            FailureReason::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureReason::InsufficientFunds => "insufficient funds",
            FailureReason::AccountFrozen => "account is frozen",
            FailureReason::AccountClosed => "account is closed",
            FailureReason::AccountNotFound => "account not found",
            FailureReason::CurrencyMismatch => "currency mismatch",
            FailureReason::UnbalancedLegs => "legs do not balance",
            FailureReason::FraudBlocked => "blocked by fraud gate",
            FailureReason::ReviewBlocked => "blocked by secondary review",
            FailureReason::ConfirmationExhausted => "external confirmation exhausted",
            FailureReason::Cancelled => "cancelled by caller",
            FailureReason::Internal => "internal error",
        };
        write!(f, "{}", s)
    }
}

/// One signed posting against a single account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leg {
    pub account_id: Uuid,
    /// Signed: positive credits the account, negative debits it.
    pub amount: Decimal,
    pub currency: Currency,
}

impl Leg {
    pub fn credit(account_id: Uuid, magnitude: Decimal, currency: Currency) -> Self {
        Self {
            account_id,
            amount: magnitude,
            currency,
        }
    }

    pub fn debit(account_id: Uuid, magnitude: Decimal, currency: Currency) -> Self {
        Self {
            account_id,
            amount: -magnitude,
            currency,
        }
    }

    pub fn is_debit(&self) -> bool {
        self.amount.is_sign_negative()
    }

    /// The exact opposite posting, used to build reversals.
    pub fn negated(&self) -> Self {
        Self {
            account_id: self.account_id,
            amount: -self.amount,
            currency: self.currency,
        }
    }
}

/// The router-owned aggregate for one submitted intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub legs: Vec<Leg>,
    pub idempotency_key: Uuid,
    pub assessment: Option<FraudAssessment>,
    pub failure: Option<FailureReason>,
    /// For reversals: the posted transaction being compensated.
    pub reversal_of: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub posted_at: Option<DateTime<Utc>>,
}

impl TransactionRecord {
    pub fn new(kind: TransactionKind, legs: Vec<Leg>, idempotency_key: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            status: TransactionStatus::Pending,
            legs,
            idempotency_key,
            assessment: None,
            failure: None,
            reversal_of: None,
            created_at: Utc::now(),
            posted_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_terminality() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(!TransactionStatus::Held.is_terminal());
        assert!(TransactionStatus::Posted.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_leg_constructors() {
        let account = Uuid::new_v4();
        let debit = Leg::debit(account, dec!(40.00), Currency::USD);
        let credit = Leg::credit(account, dec!(40.00), Currency::USD);

        assert!(debit.is_debit());
        assert!(!credit.is_debit());
        assert_eq!(debit.amount + credit.amount, Decimal::ZERO);
    }

    #[test]
    fn test_leg_negation() {
        let leg = Leg::debit(Uuid::new_v4(), dec!(25.50), Currency::EUR);
        let negated = leg.negated();

        assert_eq!(negated.account_id, leg.account_id);
        assert_eq!(negated.amount, dec!(25.50));
        assert_eq!(negated.negated(), leg);
    }

    #[test]
    fn test_kind_serde_names() {
        let json = serde_json::to_string(&TransactionKind::LoanDisbursement).unwrap();
        assert_eq!(json, r#""loan_disbursement""#);
    }
}
