//! Transaction intents
//!
//! A high-level banking intent plus its decomposition into a balanced leg
//! set. Institutional counterpart accounts (the bank's cash and loan-funding
//! ledger accounts) are wiring configuration, not part of the intent.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Amount, AmountError, Currency, Leg, TransactionKind};

/// Institutional ledger accounts the router posts against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SystemAccounts {
    /// Bank cash account: the counterpart of deposits and withdrawals.
    pub cash: Uuid,
    /// Loan-funding ledger account debited by disbursements.
    pub loan_funding: Uuid,
}

/// Which side of a trade is being settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Errors raised while turning an intent into legs.
#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    #[error("Cannot transact between an account and itself")]
    SameAccount,

    #[error(transparent)]
    InvalidAmount(#[from] AmountError),
}

/// The money movement being requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntentKind {
    Deposit {
        account_id: Uuid,
        amount: Decimal,
        currency: Currency,
    },
    Withdrawal {
        account_id: Uuid,
        amount: Decimal,
        currency: Currency,
    },
    Transfer {
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: Decimal,
        currency: Currency,
    },
    BillPayment {
        account_id: Uuid,
        biller_account_id: Uuid,
        amount: Decimal,
        currency: Currency,
    },
    LoanDisbursement {
        account_id: Uuid,
        amount: Decimal,
        currency: Currency,
    },
    TradeSettlement {
        cash_account_id: Uuid,
        holding_account_id: Uuid,
        amount: Decimal,
        currency: Currency,
        side: TradeSide,
    },
}

impl IntentKind {
    pub fn transaction_kind(&self) -> TransactionKind {
        match self {
            IntentKind::Deposit { .. } => TransactionKind::Deposit,
            IntentKind::Withdrawal { .. } => TransactionKind::Withdrawal,
            IntentKind::Transfer { .. } => TransactionKind::Transfer,
            IntentKind::BillPayment { .. } => TransactionKind::BillPayment,
            IntentKind::LoanDisbursement { .. } => TransactionKind::LoanDisbursement,
            IntentKind::TradeSettlement { .. } => TransactionKind::TradeSettlement,
        }
    }

    /// Template leg set for this intent. Every template is balanced by
    /// construction: one debit and one credit of the same magnitude.
    pub fn decompose(&self, system: &SystemAccounts) -> Result<Vec<Leg>, IntentError> {
        let amount = Amount::new(self.gross(), self.currency())?.value();
        let currency = self.currency();

        let legs = match self {
            IntentKind::Deposit { account_id, .. } => vec![
                Leg::credit(*account_id, amount, currency),
                Leg::debit(system.cash, amount, currency),
            ],
            IntentKind::Withdrawal { account_id, .. } => vec![
                Leg::debit(*account_id, amount, currency),
                Leg::credit(system.cash, amount, currency),
            ],
            IntentKind::Transfer {
                from_account_id,
                to_account_id,
                ..
            } => {
                if from_account_id == to_account_id {
                    return Err(IntentError::SameAccount);
                }
                vec![
                    Leg::debit(*from_account_id, amount, currency),
                    Leg::credit(*to_account_id, amount, currency),
                ]
            }
            IntentKind::BillPayment {
                account_id,
                biller_account_id,
                ..
            } => {
                if account_id == biller_account_id {
                    return Err(IntentError::SameAccount);
                }
                vec![
                    Leg::debit(*account_id, amount, currency),
                    Leg::credit(*biller_account_id, amount, currency),
                ]
            }
            IntentKind::LoanDisbursement { account_id, .. } => vec![
                Leg::credit(*account_id, amount, currency),
                Leg::debit(system.loan_funding, amount, currency),
            ],
            IntentKind::TradeSettlement {
                cash_account_id,
                holding_account_id,
                side,
                ..
            } => {
                if cash_account_id == holding_account_id {
                    return Err(IntentError::SameAccount);
                }
                match side {
                    TradeSide::Buy => vec![
                        Leg::debit(*cash_account_id, amount, currency),
                        Leg::credit(*holding_account_id, amount, currency),
                    ],
                    TradeSide::Sell => vec![
                        Leg::debit(*holding_account_id, amount, currency),
                        Leg::credit(*cash_account_id, amount, currency),
                    ],
                }
            }
        };

        Ok(legs)
    }

    /// The customer-facing account fraud scoring runs against.
    pub fn primary_account(&self) -> Uuid {
        match self {
            IntentKind::Deposit { account_id, .. }
            | IntentKind::Withdrawal { account_id, .. }
            | IntentKind::BillPayment { account_id, .. }
            | IntentKind::LoanDisbursement { account_id, .. } => *account_id,
            IntentKind::Transfer {
                from_account_id, ..
            } => *from_account_id,
            IntentKind::TradeSettlement {
                cash_account_id, ..
            } => *cash_account_id,
        }
    }

    /// The other customer account, when there is one in the risk sense.
    /// Institutional counterparts are not counterparties.
    pub fn counterparty(&self) -> Option<Uuid> {
        match self {
            IntentKind::Transfer { to_account_id, .. } => Some(*to_account_id),
            IntentKind::BillPayment {
                biller_account_id, ..
            } => Some(*biller_account_id),
            _ => None,
        }
    }

    /// Whether the primary account loses money.
    pub fn is_outflow(&self) -> bool {
        match self {
            IntentKind::Withdrawal { .. }
            | IntentKind::Transfer { .. }
            | IntentKind::BillPayment { .. } => true,
            IntentKind::Deposit { .. } | IntentKind::LoanDisbursement { .. } => false,
            IntentKind::TradeSettlement { side, .. } => *side == TradeSide::Buy,
        }
    }

    pub fn gross(&self) -> Decimal {
        match self {
            IntentKind::Deposit { amount, .. }
            | IntentKind::Withdrawal { amount, .. }
            | IntentKind::Transfer { amount, .. }
            | IntentKind::BillPayment { amount, .. }
            | IntentKind::LoanDisbursement { amount, .. }
            | IntentKind::TradeSettlement { amount, .. } => *amount,
        }
    }

    pub fn currency(&self) -> Currency {
        match self {
            IntentKind::Deposit { currency, .. }
            | IntentKind::Withdrawal { currency, .. }
            | IntentKind::Transfer { currency, .. }
            | IntentKind::BillPayment { currency, .. }
            | IntentKind::LoanDisbursement { currency, .. }
            | IntentKind::TradeSettlement { currency, .. } => *currency,
        }
    }
}

/// An intent submission from the transport collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionIntent {
    pub kind: IntentKind,
    /// Caller-supplied token: duplicate submissions produce one effect.
    pub idempotency_key: Uuid,
    pub description: Option<String>,
}

impl TransactionIntent {
    pub fn new(kind: IntentKind, idempotency_key: Uuid) -> Self {
        Self {
            kind,
            idempotency_key,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// SHA-256 fingerprint of the intent payload, used to catch a reused
    /// idempotency key carrying a different request.
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let payload = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&payload);
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posting::validate_legs;
    use rust_decimal_macros::dec;

    fn system() -> SystemAccounts {
        SystemAccounts {
            cash: Uuid::new_v4(),
            loan_funding: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_transfer_decomposition() {
        let from = Uuid::new_v4();
        let to = Uuid::new_v4();
        let kind = IntentKind::Transfer {
            from_account_id: from,
            to_account_id: to,
            amount: dec!(40.00),
            currency: Currency::USD,
        };

        let legs = kind.decompose(&system()).unwrap();
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0], Leg::debit(from, dec!(40.00), Currency::USD));
        assert_eq!(legs[1], Leg::credit(to, dec!(40.00), Currency::USD));
        assert!(validate_legs(&legs).is_ok());
    }

    #[test]
    fn test_every_template_balances() {
        let system = system();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let kinds = vec![
            IntentKind::Deposit {
                account_id: a,
                amount: dec!(10.00),
                currency: Currency::USD,
            },
            IntentKind::Withdrawal {
                account_id: a,
                amount: dec!(10.00),
                currency: Currency::USD,
            },
            IntentKind::Transfer {
                from_account_id: a,
                to_account_id: b,
                amount: dec!(10.00),
                currency: Currency::USD,
            },
            IntentKind::BillPayment {
                account_id: a,
                biller_account_id: b,
                amount: dec!(10.00),
                currency: Currency::USD,
            },
            IntentKind::LoanDisbursement {
                account_id: a,
                amount: dec!(10.00),
                currency: Currency::USD,
            },
            IntentKind::TradeSettlement {
                cash_account_id: a,
                holding_account_id: b,
                amount: dec!(10.00),
                currency: Currency::USD,
                side: TradeSide::Buy,
            },
            IntentKind::TradeSettlement {
                cash_account_id: a,
                holding_account_id: b,
                amount: dec!(10.00),
                currency: Currency::USD,
                side: TradeSide::Sell,
            },
        ];

        for kind in kinds {
            let legs = kind.decompose(&system).unwrap();
            assert!(validate_legs(&legs).is_ok(), "unbalanced legs for {:?}", kind);
        }
    }

    #[test]
    fn test_loan_disbursement_debits_funding_account() {
        let system = system();
        let customer = Uuid::new_v4();
        let kind = IntentKind::LoanDisbursement {
            account_id: customer,
            amount: dec!(25000.00),
            currency: Currency::USD,
        };

        let legs = kind.decompose(&system).unwrap();
        assert_eq!(legs[0], Leg::credit(customer, dec!(25000.00), Currency::USD));
        assert_eq!(
            legs[1],
            Leg::debit(system.loan_funding, dec!(25000.00), Currency::USD)
        );
        assert!(!kind.is_outflow());
    }

    #[test]
    fn test_trade_settlement_sides() {
        let system = system();
        let cash = Uuid::new_v4();
        let holding = Uuid::new_v4();

        let buy = IntentKind::TradeSettlement {
            cash_account_id: cash,
            holding_account_id: holding,
            amount: dec!(500.00),
            currency: Currency::USD,
            side: TradeSide::Buy,
        };
        let buy_legs = buy.decompose(&system).unwrap();
        assert!(buy_legs[0].is_debit());
        assert_eq!(buy_legs[0].account_id, cash);
        assert!(buy.is_outflow());

        let sell = IntentKind::TradeSettlement {
            cash_account_id: cash,
            holding_account_id: holding,
            amount: dec!(500.00),
            currency: Currency::USD,
            side: TradeSide::Sell,
        };
        let sell_legs = sell.decompose(&system).unwrap();
        assert_eq!(sell_legs[0].account_id, holding);
        assert!(!sell.is_outflow());
    }

    #[test]
    fn test_same_account_rejected() {
        let a = Uuid::new_v4();
        let kind = IntentKind::Transfer {
            from_account_id: a,
            to_account_id: a,
            amount: dec!(10.00),
            currency: Currency::USD,
        };
        assert!(matches!(
            kind.decompose(&system()),
            Err(IntentError::SameAccount)
        ));
    }

    #[test]
    fn test_invalid_amount_rejected() {
        let kind = IntentKind::Deposit {
            account_id: Uuid::new_v4(),
            amount: dec!(-5.00),
            currency: Currency::USD,
        };
        assert!(matches!(
            kind.decompose(&system()),
            Err(IntentError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_fingerprint_tracks_payload() {
        let key = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let make = |amount| {
            TransactionIntent::new(
                IntentKind::Transfer {
                    from_account_id: a,
                    to_account_id: b,
                    amount,
                    currency: Currency::USD,
                },
                key,
            )
        };

        assert_eq!(make(dec!(40.00)).fingerprint(), make(dec!(40.00)).fingerprint());
        assert_ne!(make(dec!(40.00)).fingerprint(), make(dec!(41.00)).fingerprint());
    }
}
