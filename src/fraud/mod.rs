//! Fraud Scoring Gate
//!
//! Stateless, side-effect-free risk evaluation over an account's recent
//! activity and the candidate transaction. The gate is a pure function of
//! its inputs: same account, candidate, activity, profile, and clock always
//! produce the same assessment.
//!
//! A small set of hard rules forces a score floor regardless of the
//! weighted signals; the final score is `max(rule_floor, weighted)`,
//! partitioned into risk bands by configurable thresholds.

mod activity;
mod explain;

pub use activity::{AccountActivity, WindowStats, BASELINE_DAYS};
pub use explain::{ExplanationProvider, RuleBasedExplainer};

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::domain::{
    Account, Currency, CustomerProfile, FraudAction, FraudAssessment, FraudIndicator,
    IndicatorCode, RiskLevel, TransactionKind,
};

/// Risk band thresholds: `low < medium ≤ score < high ≤ ... < critical`.
#[derive(Debug, Clone, Copy)]
pub struct RiskBands {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for RiskBands {
    fn default() -> Self {
        Self {
            medium: 0.3,
            high: 0.6,
            critical: 0.85,
        }
    }
}

impl RiskBands {
    pub fn classify(&self, score: f64) -> RiskLevel {
        if score >= self.critical {
            RiskLevel::Critical
        } else if score >= self.high {
            RiskLevel::High
        } else if score >= self.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Deployment-configurable mapping from risk band to gate action.
#[derive(Debug, Clone, Copy)]
pub struct ActionPolicy {
    pub low: FraudAction,
    pub medium: FraudAction,
    pub high: FraudAction,
    pub critical: FraudAction,
}

impl Default for ActionPolicy {
    fn default() -> Self {
        Self {
            low: FraudAction::Allow,
            medium: FraudAction::Hold,
            high: FraudAction::Block,
            critical: FraudAction::Block,
        }
    }
}

impl ActionPolicy {
    pub fn action_for(&self, level: RiskLevel) -> FraudAction {
        match level {
            RiskLevel::Low => self.low,
            RiskLevel::Medium => self.medium,
            RiskLevel::High => self.high,
            RiskLevel::Critical => self.critical,
        }
    }
}

/// Relative weight of each signal in the composite score.
#[derive(Debug, Clone, Copy)]
pub struct SignalWeights {
    pub high_amount: f64,
    pub velocity: f64,
    pub unusual_hour: f64,
    pub deviation: f64,
    pub novelty: f64,
    pub balance_ratio: f64,
    pub customer_risk: f64,
    pub geo_mismatch: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            high_amount: 0.3,
            velocity: 0.4,
            unusual_hour: 0.1,
            deviation: 0.2,
            novelty: 0.2,
            balance_ratio: 0.2,
            customer_risk: 0.2,
            geo_mismatch: 0.2,
        }
    }
}

/// Gate configuration. Every threshold here is deployment configuration,
/// surfaced through `Config::from_env`, never hardcoded at call sites.
#[derive(Debug, Clone)]
pub struct FraudConfig {
    /// Amounts above this contribute the high-amount signal.
    pub high_amount_threshold: Decimal,
    /// Hard rule: amounts above this force a critical floor.
    pub absolute_ceiling: Decimal,
    pub velocity_max_count_1h: u32,
    pub velocity_max_sum_1h: Decimal,
    pub velocity_max_count_24h: u32,
    pub velocity_max_sum_24h: Decimal,
    /// Hard rule: hourly count at this multiple of the cap forces a floor.
    pub flood_multiplier: u32,
    /// Local hours treated as unusual, `[start, end)`.
    pub night_start: u32,
    pub night_end: u32,
    /// Z-score above which an amount counts as deviant.
    pub deviation_sigma: f64,
    /// Minimum baseline samples before deviation scoring engages.
    pub min_deviation_samples: u32,
    pub weights: SignalWeights,
    pub bands: RiskBands,
    pub policy: ActionPolicy,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            high_amount_threshold: Decimal::new(1_000, 0),
            absolute_ceiling: Decimal::new(1_000_000, 0),
            velocity_max_count_1h: 10,
            velocity_max_sum_1h: Decimal::new(5_000, 0),
            velocity_max_count_24h: 20,
            velocity_max_sum_24h: Decimal::new(50_000, 0),
            flood_multiplier: 3,
            night_start: 0,
            night_end: 5,
            deviation_sigma: 3.0,
            min_deviation_samples: 5,
            weights: SignalWeights::default(),
            bands: RiskBands::default(),
            policy: ActionPolicy::default(),
        }
    }
}

/// The candidate the router asks the gate about.
#[derive(Debug, Clone)]
pub struct CandidateTransaction {
    pub transaction_id: Uuid,
    pub kind: TransactionKind,
    /// The customer-facing account being scored.
    pub primary_account: Uuid,
    /// The other customer account, when one exists (transfers, bill pay).
    pub counterparty: Option<Uuid>,
    /// Gross magnitude moved on the primary account.
    pub amount: Decimal,
    pub currency: Currency,
    /// Whether the primary account is debited. Outflow signals only apply
    /// when money leaves the account.
    pub outflow: bool,
    /// Region the submission originated from, if known.
    pub origin_region: Option<String>,
}

/// Static customer attributes, read from the customer data store.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn profile(&self, account_id: Uuid) -> Option<CustomerProfile>;
}

/// Fixed-map directory for tests and demos.
#[derive(Debug, Default)]
pub struct StaticCustomerDirectory {
    profiles: HashMap<Uuid, CustomerProfile>,
}

impl StaticCustomerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, account_id: Uuid, profile: CustomerProfile) -> Self {
        self.profiles.insert(account_id, profile);
        self
    }
}

#[async_trait]
impl CustomerDirectory for StaticCustomerDirectory {
    async fn profile(&self, account_id: Uuid) -> Option<CustomerProfile> {
        self.profiles.get(&account_id).cloned()
    }
}

/// The scoring gate.
pub struct FraudGate {
    config: FraudConfig,
    explainer: Option<Arc<dyn ExplanationProvider>>,
}

impl FraudGate {
    pub fn new(config: FraudConfig) -> Self {
        Self {
            config,
            explainer: None,
        }
    }

    pub fn with_explainer(mut self, explainer: Arc<dyn ExplanationProvider>) -> Self {
        self.explainer = Some(explainer);
        self
    }

    pub fn config(&self) -> &FraudConfig {
        &self.config
    }

    /// Score one candidate. Pure: no storage access, no mutation.
    pub fn score(
        &self,
        account: &Account,
        candidate: &CandidateTransaction,
        activity: &AccountActivity,
        profile: Option<&CustomerProfile>,
        now: DateTime<Utc>,
    ) -> FraudAssessment {
        let started = Instant::now();
        let cfg = &self.config;
        let mut indicators: Vec<FraudIndicator> = Vec::new();
        let mut weighted = 0.0f64;
        let mut floor = 0.0f64;

        // ---- hard rules: score floors ----------------------------------

        if candidate.amount > cfg.absolute_ceiling {
            floor = 1.0;
            indicators.push(FraudIndicator::new(
                IndicatorCode::CeilingExceeded,
                RiskLevel::Critical,
                format!(
                    "amount {} exceeds absolute ceiling {}",
                    candidate.amount, cfg.absolute_ceiling
                ),
            ));
        }

        let flood_at = cfg.velocity_max_count_1h * cfg.flood_multiplier;
        if flood_at > 0 && activity.hour.count >= flood_at {
            floor = floor.max(0.9);
            indicators.push(FraudIndicator::new(
                IndicatorCode::VelocityFlood,
                RiskLevel::Critical,
                format!(
                    "{} debits in the last hour (flood threshold {})",
                    activity.hour.count, flood_at
                ),
            ));
        }

        // ---- weighted signals ------------------------------------------

        if candidate.outflow {
            if !cfg.high_amount_threshold.is_zero() && candidate.amount > cfg.high_amount_threshold
            {
                let ratio = (candidate.amount / cfg.high_amount_threshold)
                    .to_f64()
                    .unwrap_or(f64::MAX);
                let raw = (ratio / 10.0).min(1.0);
                let severity = if raw >= 0.7 {
                    RiskLevel::High
                } else {
                    RiskLevel::Medium
                };
                weighted += raw * cfg.weights.high_amount;
                indicators.push(FraudIndicator::new(
                    IndicatorCode::HighAmount,
                    severity,
                    format!(
                        "amount {} exceeds threshold {}",
                        candidate.amount, cfg.high_amount_threshold
                    ),
                ));
            }

            let hour_count = activity.hour.count + 1;
            let hour_sum = activity.hour.total + candidate.amount;
            let day_count = activity.day.count + 1;
            let day_sum = activity.day.total + candidate.amount;
            if hour_count > cfg.velocity_max_count_1h || hour_sum > cfg.velocity_max_sum_1h {
                weighted += 0.8 * cfg.weights.velocity;
                indicators.push(FraudIndicator::new(
                    IndicatorCode::Velocity,
                    RiskLevel::High,
                    format!(
                        "{} debits totalling {} in the last hour",
                        hour_count, hour_sum
                    ),
                ));
            } else if day_count > cfg.velocity_max_count_24h
                || day_sum > cfg.velocity_max_sum_24h
            {
                weighted += 0.6 * cfg.weights.velocity;
                indicators.push(FraudIndicator::new(
                    IndicatorCode::Velocity,
                    RiskLevel::Medium,
                    format!(
                        "{} debits totalling {} in the last 24 hours",
                        day_count, day_sum
                    ),
                ));
            }

            if let Some(raw) = deviation_signal(candidate.amount, activity, cfg) {
                weighted += raw * cfg.weights.deviation;
                indicators.push(FraudIndicator::new(
                    IndicatorCode::AmountDeviation,
                    RiskLevel::Medium,
                    format!(
                        "amount {} deviates from the account's {}-day baseline",
                        candidate.amount, BASELINE_DAYS
                    ),
                ));
            }

            if let Some(counterparty) = candidate.counterparty {
                if !activity.known_counterparties.contains(&counterparty) {
                    weighted += 0.5 * cfg.weights.novelty;
                    indicators.push(FraudIndicator::new(
                        IndicatorCode::NewCounterparty,
                        RiskLevel::Medium,
                        format!("first transaction with counterparty {}", counterparty),
                    ));
                }
            }

            if account.balance > Decimal::ZERO {
                let ratio = (candidate.amount / account.balance)
                    .to_f64()
                    .unwrap_or(f64::MAX);
                if ratio > 0.5 {
                    weighted += 0.6 * cfg.weights.balance_ratio;
                    indicators.push(FraudIndicator::new(
                        IndicatorCode::BalanceRatio,
                        RiskLevel::Medium,
                        format!("amount is {:.0}% of the current balance", ratio * 100.0),
                    ));
                }
            }
        }

        let hour = now.hour();
        if hour >= cfg.night_start && hour < cfg.night_end {
            weighted += 0.5 * cfg.weights.unusual_hour;
            indicators.push(FraudIndicator::new(
                IndicatorCode::UnusualHour,
                RiskLevel::Low,
                format!("submitted at {:02}:00 UTC", hour),
            ));
        }

        if let Some(profile) = profile {
            if profile.declared_risk > 0.6 {
                weighted += profile.declared_risk * cfg.weights.customer_risk;
                indicators.push(FraudIndicator::new(
                    IndicatorCode::CustomerRisk,
                    RiskLevel::Medium,
                    format!("declared customer risk {:.2}", profile.declared_risk),
                ));
            }

            if let (Some(home), Some(origin)) =
                (profile.home_region.as_deref(), candidate.origin_region.as_deref())
            {
                if home != origin {
                    weighted += 0.7 * cfg.weights.geo_mismatch;
                    indicators.push(FraudIndicator::new(
                        IndicatorCode::GeoMismatch,
                        RiskLevel::High,
                        format!("submitted from {} but home region is {}", origin, home),
                    ));
                }
            }
        }

        let score = floor.max(weighted.min(1.0)).clamp(0.0, 1.0);
        let risk_level = cfg.bands.classify(score);
        let action = cfg.policy.action_for(risk_level);

        let mut assessment = FraudAssessment {
            transaction_id: candidate.transaction_id,
            score,
            risk_level,
            indicators,
            action,
            rationale: None,
            computed_at: now,
            elapsed: started.elapsed(),
        };

        // Rationale is strictly downstream of the decision.
        if let Some(explainer) = &self.explainer {
            assessment.rationale = explainer.rationale(&assessment);
        }

        assessment
    }
}

fn deviation_signal(amount: Decimal, activity: &AccountActivity, cfg: &FraudConfig) -> Option<f64> {
    if activity.debit_samples < cfg.min_deviation_samples {
        return None;
    }
    let amount = amount.to_f64()?;
    let mean = activity.debit_mean?;

    match activity.debit_std {
        Some(std) if std > f64::EPSILON => {
            let z = (amount - mean) / std;
            (z > cfg.deviation_sigma).then_some(0.6)
        }
        // flat history: fall back to a multiple-of-mean rule
        _ => (mean > 0.0 && amount > mean * 3.0).then_some(0.6),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AccountStatus;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn account(balance: Decimal) -> Account {
        Account {
            id: Uuid::new_v4(),
            currency: Currency::USD,
            balance,
            available_balance: balance,
            overdraft_limit: Decimal::ZERO,
            opening_balance: balance,
            status: AccountStatus::Active,
            version: 0,
            opened_at: noon() - chrono::Duration::days(400),
        }
    }

    fn transfer_candidate(account: &Account, amount: Decimal) -> CandidateTransaction {
        CandidateTransaction {
            transaction_id: Uuid::new_v4(),
            kind: TransactionKind::Transfer,
            primary_account: account.id,
            counterparty: Some(Uuid::new_v4()),
            amount,
            currency: Currency::USD,
            outflow: true,
            origin_region: None,
        }
    }

    #[test]
    fn test_small_transfer_is_low_risk() {
        let gate = FraudGate::new(FraudConfig::default());
        let account = account(dec!(100.00));
        let candidate = transfer_candidate(&account, dec!(40.00));

        let assessment = gate.score(
            &account,
            &candidate,
            &AccountActivity::default(),
            None,
            noon(),
        );

        assert!(assessment.score < 0.3);
        assert_eq!(assessment.risk_level, RiskLevel::Low);
        assert_eq!(assessment.action, FraudAction::Allow);
    }

    #[test]
    fn test_ceiling_forces_critical_regardless_of_signals() {
        let gate = FraudGate::new(FraudConfig::default());
        let account = account(dec!(10_000_000.00));
        let candidate = transfer_candidate(&account, dec!(9_000_000.00));

        let assessment = gate.score(
            &account,
            &candidate,
            &AccountActivity::default(),
            None,
            noon(),
        );

        assert_eq!(assessment.risk_level, RiskLevel::Critical);
        assert_eq!(assessment.action, FraudAction::Block);
        assert!(assessment
            .indicators
            .iter()
            .any(|i| i.code == IndicatorCode::CeilingExceeded));
    }

    #[test]
    fn test_ceiling_applies_to_inflows_too() {
        let gate = FraudGate::new(FraudConfig::default());
        let account = account(dec!(0.00));
        let candidate = CandidateTransaction {
            outflow: false,
            counterparty: None,
            kind: TransactionKind::Deposit,
            ..transfer_candidate(&account, dec!(2_000_000.00))
        };

        let assessment = gate.score(
            &account,
            &candidate,
            &AccountActivity::default(),
            None,
            noon(),
        );
        assert_eq!(assessment.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn test_velocity_signal_holds() {
        let gate = FraudGate::new(FraudConfig::default());
        let account = account(dec!(100_000.00));
        let candidate = transfer_candidate(&account, dec!(50.00));

        let activity = AccountActivity {
            hour: WindowStats {
                count: 12,
                total: dec!(600.00),
            },
            day: WindowStats {
                count: 12,
                total: dec!(600.00),
            },
            ..AccountActivity::default()
        };

        let assessment = gate.score(&account, &candidate, &activity, None, noon());

        assert!(assessment
            .indicators
            .iter()
            .any(|i| i.code == IndicatorCode::Velocity));
        assert_eq!(assessment.risk_level, RiskLevel::Medium);
        assert_eq!(assessment.action, FraudAction::Hold);
    }

    #[test]
    fn test_velocity_flood_forces_floor() {
        let gate = FraudGate::new(FraudConfig::default());
        let account = account(dec!(100_000.00));
        let candidate = transfer_candidate(&account, dec!(10.00));

        let activity = AccountActivity {
            hour: WindowStats {
                count: 30,
                total: dec!(300.00),
            },
            ..AccountActivity::default()
        };

        let assessment = gate.score(&account, &candidate, &activity, None, noon());
        assert!(assessment.score >= 0.9);
        assert_eq!(assessment.action, FraudAction::Block);
    }

    #[test]
    fn test_inflow_skips_outflow_signals() {
        let gate = FraudGate::new(FraudConfig::default());
        let account = account(dec!(0.00));
        // a large disbursement credited to the account scores low
        let candidate = CandidateTransaction {
            outflow: false,
            counterparty: None,
            kind: TransactionKind::LoanDisbursement,
            ..transfer_candidate(&account, dec!(25_000.00))
        };

        let assessment = gate.score(
            &account,
            &candidate,
            &AccountActivity::default(),
            None,
            noon(),
        );

        assert_eq!(assessment.risk_level, RiskLevel::Low);
        assert_eq!(assessment.action, FraudAction::Allow);
    }

    #[test]
    fn test_unusual_hour_indicator() {
        let gate = FraudGate::new(FraudConfig::default());
        let account = account(dec!(1_000.00));
        let candidate = transfer_candidate(&account, dec!(10.00));

        let three_am = Utc.with_ymd_and_hms(2026, 3, 10, 3, 0, 0).unwrap();
        let assessment = gate.score(
            &account,
            &candidate,
            &AccountActivity::default(),
            None,
            three_am,
        );

        assert!(assessment
            .indicators
            .iter()
            .any(|i| i.code == IndicatorCode::UnusualHour));
    }

    #[test]
    fn test_deviation_signal_needs_history() {
        let cfg = FraudConfig::default();
        let sparse = AccountActivity {
            debit_samples: 2,
            debit_mean: Some(10.0),
            debit_std: Some(1.0),
            ..AccountActivity::default()
        };
        assert!(deviation_signal(dec!(1000.00), &sparse, &cfg).is_none());

        let rich = AccountActivity {
            debit_samples: 20,
            debit_mean: Some(50.0),
            debit_std: Some(5.0),
            ..AccountActivity::default()
        };
        assert!(deviation_signal(dec!(1000.00), &rich, &cfg).is_some());
        assert!(deviation_signal(dec!(55.00), &rich, &cfg).is_none());
    }

    #[test]
    fn test_geo_mismatch_and_customer_risk() {
        let gate = FraudGate::new(FraudConfig::default());
        let account = account(dec!(10_000.00));
        let mut candidate = transfer_candidate(&account, dec!(100.00));
        candidate.origin_region = Some("RU".to_string());

        let profile = CustomerProfile {
            kyc_verified: true,
            declared_risk: 0.8,
            home_region: Some("DE".to_string()),
        };

        let assessment = gate.score(
            &account,
            &candidate,
            &AccountActivity::default(),
            Some(&profile),
            noon(),
        );

        assert!(assessment
            .indicators
            .iter()
            .any(|i| i.code == IndicatorCode::GeoMismatch));
        assert!(assessment
            .indicators
            .iter()
            .any(|i| i.code == IndicatorCode::CustomerRisk));
        assert!(assessment.score >= 0.3);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let gate = FraudGate::new(FraudConfig::default());
        let account = account(dec!(5_000.00));
        let candidate = transfer_candidate(&account, dec!(4_000.00));
        let activity = AccountActivity::default();

        let first = gate.score(&account, &candidate, &activity, None, noon());
        let second = gate.score(&account, &candidate, &activity, None, noon());

        assert_eq!(first.score, second.score);
        assert_eq!(first.risk_level, second.risk_level);
        assert_eq!(first.indicators.len(), second.indicators.len());
    }

    #[test]
    fn test_explainer_attaches_rationale_downstream() {
        let bare = FraudGate::new(FraudConfig::default());
        let explained =
            FraudGate::new(FraudConfig::default()).with_explainer(Arc::new(RuleBasedExplainer));

        let account = account(dec!(100.00));
        let candidate = transfer_candidate(&account, dec!(40.00));
        let activity = AccountActivity::default();

        let without = bare.score(&account, &candidate, &activity, None, noon());
        let with = explained.score(&account, &candidate, &activity, None, noon());

        assert!(without.rationale.is_none());
        assert!(with.rationale.is_some());
        // identical decision either way
        assert_eq!(without.score, with.score);
        assert_eq!(without.action, with.action);
    }

    #[test]
    fn test_band_boundaries() {
        let bands = RiskBands::default();
        assert_eq!(bands.classify(0.0), RiskLevel::Low);
        assert_eq!(bands.classify(0.29), RiskLevel::Low);
        assert_eq!(bands.classify(0.3), RiskLevel::Medium);
        assert_eq!(bands.classify(0.6), RiskLevel::High);
        assert_eq!(bands.classify(0.85), RiskLevel::Critical);
        assert_eq!(bands.classify(1.0), RiskLevel::Critical);
    }
}
