use std::collections::HashSet;

use crate::core::{PatternCategory, PatternResult, Severity, TransactionPattern};

/// Group raw detector output into one aggregate per category.
/// Categories with no results are still present, zeroed.
pub fn aggregate(results: Vec<PatternResult>) -> [TransactionPattern; 4] {
    let mut buckets: [Vec<PatternResult>; 4] = Default::default();
    for result in results {
        let slot = PatternCategory::ALL
            .iter()
            .position(|c| *c == result.pattern_type.category())
            .unwrap_or_default();
        buckets[slot].push(result);
    }
    let mut buckets = buckets.into_iter();
    PatternCategory::ALL.map(|category| summarize(category, buckets.next().unwrap_or_default()))
}

fn summarize(category: PatternCategory, patterns: Vec<PatternResult>) -> TransactionPattern {
    let total_risk_score = if patterns.is_empty() {
        0.0
    } else {
        patterns.iter().map(|p| p.score).sum::<f64>() / patterns.len() as f64
    };
    let affected: HashSet<&str> = patterns
        .iter()
        .flat_map(|p| p.transactions.iter().map(String::as_str))
        .collect();
    let high_severity_count = patterns.iter().filter(|p| p.severity >= Severity::High).count();
    TransactionPattern {
        category,
        pattern_count: patterns.len(),
        total_risk_score,
        affected_transactions: affected.len(),
        high_severity_count,
        patterns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PatternType;
    use serde_json::json;

    fn result(t: PatternType, severity: Severity, score: f64, sigs: &[&str]) -> PatternResult {
        PatternResult::new(t, severity, score, sigs.iter().map(|s| s.to_string()), json!({})).unwrap()
    }

    #[test]
    fn empty_input_gives_four_zeroed_categories() {
        let out = aggregate(Vec::new());
        assert_eq!(out.len(), 4);
        for (agg, cat) in out.iter().zip(PatternCategory::ALL) {
            assert_eq!(agg.category, cat);
            assert_eq!(agg.pattern_count, 0);
            assert_eq!(agg.total_risk_score, 0.0);
            assert_eq!(agg.affected_transactions, 0);
            assert_eq!(agg.high_severity_count, 0);
        }
    }

    #[test]
    fn mean_score_and_union_of_signatures() {
        let out = aggregate(vec![
            result(PatternType::RoundAmounts, Severity::High, 60.0, &["a", "b"]),
            result(PatternType::RepeatingAmounts, Severity::Medium, 40.0, &["b", "c"]),
            result(PatternType::Funnel, Severity::Medium, 55.0, &["z"]),
        ]);
        let amount = &out[1];
        assert_eq!(amount.category, PatternCategory::AmountBased);
        assert_eq!(amount.pattern_count, 2);
        assert_eq!(amount.total_risk_score, 50.0);
        assert_eq!(amount.affected_transactions, 3);
        assert_eq!(amount.high_severity_count, 1);

        let flow = &out[2];
        assert_eq!(flow.pattern_count, 1);
        assert_eq!(out[0].pattern_count, 0);
        assert_eq!(out[3].pattern_count, 0);
    }
}
