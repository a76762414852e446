//! Explanation providers
//!
//! Optional reviewer-facing narrative for an assessment. Providers run
//! strictly after the deterministic decision; the gate never reads their
//! output. A generative backend can slot in here without touching scoring.

use crate::domain::FraudAssessment;

/// Produces an optional human-readable rationale for an assessment.
pub trait ExplanationProvider: Send + Sync {
    fn rationale(&self, assessment: &FraudAssessment) -> Option<String>;
}

/// Default provider: renders the triggered indicators as plain text.
#[derive(Debug, Default, Clone)]
pub struct RuleBasedExplainer;

impl ExplanationProvider for RuleBasedExplainer {
    fn rationale(&self, assessment: &FraudAssessment) -> Option<String> {
        if assessment.indicators.is_empty() {
            return Some(format!(
                "Score {:.2} ({}): no indicators fired.",
                assessment.score, assessment.risk_level
            ));
        }

        let mut lines = vec![format!(
            "Score {:.2} ({}), action {}:",
            assessment.score, assessment.risk_level, assessment.action
        )];
        for indicator in &assessment.indicators {
            lines.push(format!(
                "- [{}] {} ({})",
                indicator.severity, indicator.detail, indicator.code
            ));
        }
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FraudAction, FraudIndicator, IndicatorCode, RiskLevel};
    use chrono::Utc;
    use std::time::Duration;
    use uuid::Uuid;

    fn assessment(indicators: Vec<FraudIndicator>) -> FraudAssessment {
        FraudAssessment {
            transaction_id: Uuid::new_v4(),
            score: 0.45,
            risk_level: RiskLevel::Medium,
            indicators,
            action: FraudAction::Hold,
            rationale: None,
            computed_at: Utc::now(),
            elapsed: Duration::from_micros(50),
        }
    }

    #[test]
    fn test_rationale_lists_indicators() {
        let provider = RuleBasedExplainer;
        let text = provider
            .rationale(&assessment(vec![FraudIndicator::new(
                IndicatorCode::Velocity,
                RiskLevel::High,
                "11 debits in the last hour",
            )]))
            .unwrap();

        assert!(text.contains("0.45"));
        assert!(text.contains("velocity"));
        assert!(text.contains("11 debits"));
    }

    #[test]
    fn test_rationale_without_indicators() {
        let provider = RuleBasedExplainer;
        let text = provider.rationale(&assessment(vec![])).unwrap();
        assert!(text.contains("no indicators"));
    }
}
