//! Fraud domain types
//!
//! Assessments are the immutable output of the scoring gate; alerts are the
//! case-management records handed to the compliance collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Risk bands a fraud score is partitioned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the gate decided to do with the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudAction {
    Allow,
    Hold,
    Block,
}

impl std::fmt::Display for FraudAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FraudAction::Allow => "allow",
            FraudAction::Hold => "hold",
            FraudAction::Block => "block",
        };
        write!(f, "{}", s)
    }
}

/// Stable codes for the signals that can fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorCode {
    HighAmount,
    Velocity,
    VelocityFlood,
    UnusualHour,
    AmountDeviation,
    NewCounterparty,
    BalanceRatio,
    CustomerRisk,
    GeoMismatch,
    CeilingExceeded,
}

impl IndicatorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorCode::HighAmount => "high_amount",
            IndicatorCode::Velocity => "velocity",
            IndicatorCode::VelocityFlood => "velocity_flood",
            IndicatorCode::UnusualHour => "unusual_hour",
            IndicatorCode::AmountDeviation => "amount_deviation",
            IndicatorCode::NewCounterparty => "new_counterparty",
            IndicatorCode::BalanceRatio => "balance_ratio",
            IndicatorCode::CustomerRisk => "customer_risk",
            IndicatorCode::GeoMismatch => "geo_mismatch",
            IndicatorCode::CeilingExceeded => "ceiling_exceeded",
        }
    }
}

impl std::fmt::Display for IndicatorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One triggered signal, kept for audit and human review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudIndicator {
    pub code: IndicatorCode,
    pub detail: String,
    pub severity: RiskLevel,
}

impl FraudIndicator {
    pub fn new(code: IndicatorCode, severity: RiskLevel, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
            severity,
        }
    }
}

/// The gate's verdict on one candidate transaction.
///
/// Immutable once the transaction reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudAssessment {
    pub transaction_id: Uuid,
    /// Continuous risk estimate in [0, 1].
    pub score: f64,
    pub risk_level: RiskLevel,
    pub indicators: Vec<FraudIndicator>,
    pub action: FraudAction,
    /// Optional reviewer-facing narrative from the explanation provider.
    /// Never an input to the decision.
    pub rationale: Option<String>,
    pub computed_at: DateTime<Utc>,
    pub elapsed: Duration,
}

/// Case-management status of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Open,
    Investigating,
    Resolved,
    FalsePositive,
}

/// Raised whenever the gate holds or blocks. Lifecycle is independent of
/// the originating transaction; compliance owns it from creation onward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudAlert {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub score: f64,
    pub risk_level: RiskLevel,
    pub indicators: Vec<IndicatorCode>,
    pub status: AlertStatus,
    pub description: String,
    pub resolution_notes: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl FraudAlert {
    pub fn from_assessment(assessment: &FraudAssessment, account_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id: assessment.transaction_id,
            account_id,
            score: assessment.score,
            risk_level: assessment.risk_level,
            indicators: assessment.indicators.iter().map(|i| i.code).collect(),
            status: AlertStatus::Open,
            description: format!(
                "Potential fraud on transaction {} (score {:.2}, {})",
                assessment.transaction_id, assessment.score, assessment.risk_level
            ),
            resolution_notes: None,
            resolved_at: None,
            created_at: Utc::now(),
        }
    }
}

/// Static customer attributes consumed from the customer data store.
/// Read-only input to fraud scoring and eligibility checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub kyc_verified: bool,
    /// Declared risk score from onboarding, in [0, 1].
    pub declared_risk: f64,
    pub home_region: Option<String>,
}
