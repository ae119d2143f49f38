use super::{FactorType, RiskCategory, RiskFactor, RiskProfile};

const ESCALATE: &str = "Escalate to manual compliance review before processing further transactions";

fn recommendation(factor_type: FactorType) -> &'static str {
    match factor_type {
        FactorType::HighRiskInteraction => {
            "Block or hold transfers involving listed counterparties and file a compliance report"
        }
        FactorType::HighVelocity => "Apply rate limits and require step-up verification for bursts",
        FactorType::UnusualTiming => "Add delayed settlement for transactions outside normal hours",
        FactorType::NewAccountHighActivity => {
            "Lower transaction limits until the account has a longer history"
        }
        FactorType::LowBalanceHighThroughput => {
            "Verify the source of funds for pass-through activity"
        }
        FactorType::ComplexPatterns => "Review multi-party transactions for layering",
        FactorType::MarketManipulation => {
            "Monitor trading activity and restrict access to affected markets"
        }
        FactorType::WashTrading => "Exclude self-matched volume and review counterparties for common control",
        FactorType::FailedTransactions => "Investigate repeated failures for probing or bot activity",
        FactorType::UnusualTokenTransfers => "Quarantine listed tokens and review their transfer paths",
    }
}

/// The `n` highest-scoring factors, highest first. Equal scores keep
/// their profile order.
pub fn top_risk_factors(profile: &RiskProfile, n: usize) -> Vec<RiskFactor> {
    let mut factors: Vec<&RiskFactor> = profile.factors.iter().collect();
    factors.sort_by(|a, b| b.score.total_cmp(&a.score));
    factors.into_iter().take(n).cloned().collect()
}

/// One recommendation per contributing factor, plus an escalation for
/// high-risk profiles.
pub fn mitigation_recommendations(profile: &RiskProfile) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for factor in profile.factors.iter().filter(|f| f.score > 0.0) {
        let text = recommendation(factor.factor_type);
        if !out.iter().any(|r| r == text) {
            out.push(text.to_string());
        }
    }
    if profile.category == RiskCategory::High {
        out.push(ESCALATE.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(scores: &[(FactorType, f64)], category: RiskCategory) -> RiskProfile {
        let mut p = RiskProfile::empty("A");
        p.factors = scores.iter().map(|(t, s)| RiskFactor::new(*t, *s, "")).collect();
        p.category = category;
        p
    }

    #[test]
    fn top_factors_ordered_and_truncated() {
        let p = profile(
            &[
                (FactorType::HighVelocity, 0.3),
                (FactorType::WashTrading, 0.7),
                (FactorType::FailedTransactions, 0.3),
                (FactorType::ComplexPatterns, 0.1),
            ],
            RiskCategory::Medium,
        );
        let top = top_risk_factors(&p, 3);
        let types: Vec<_> = top.iter().map(|f| f.factor_type).collect();
        assert_eq!(
            types,
            vec![FactorType::WashTrading, FactorType::HighVelocity, FactorType::FailedTransactions]
        );
        assert!(top_risk_factors(&p, 0).is_empty());
        assert_eq!(top_risk_factors(&p, 10).len(), 4);
    }

    #[test]
    fn recommendations_skip_zero_factors() {
        let p = profile(
            &[(FactorType::HighVelocity, 0.0), (FactorType::WashTrading, 0.5)],
            RiskCategory::Medium,
        );
        let recs = mitigation_recommendations(&p);
        assert_eq!(recs.len(), 1);
        assert!(recs[0].contains("self-matched"));
    }

    #[test]
    fn high_category_adds_escalation() {
        let p = profile(&[(FactorType::HighRiskInteraction, 0.95)], RiskCategory::High);
        let recs = mitigation_recommendations(&p);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs.last().unwrap(), ESCALATE);
    }

    #[test]
    fn empty_profile_has_no_advice() {
        assert!(mitigation_recommendations(&RiskProfile::empty("A")).is_empty());
        assert!(top_risk_factors(&RiskProfile::empty("A"), 3).is_empty());
    }
}
