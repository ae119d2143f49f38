use std::collections::BTreeMap;

use chrono::Duration;
use serde_json::json;
use tracing::debug;

use crate::core::{PatternResult, PatternType, Severity, Transaction, sorted_by_time};

const ROUND_TOLERANCE: f64 = 0.001;
const ROUND_LADDER: &[f64] = &[1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 10000.0];
const ROUND_SCALES: &[f64] = &[1.0, 0.1, 0.01];
const ROUND_MIN_COUNT: usize = 3;

/// Reporting thresholds that structuring tries to stay under.
const STRUCTURING_THRESHOLDS: &[f64] = &[1000.0, 3000.0, 5000.0, 10000.0];
const STRUCTURING_MARGIN: f64 = 0.05;
const STRUCTURING_MIN_COUNT: usize = 2;

const REPEAT_MIN_COUNT: usize = 3;

const SPLIT_MIN_PARENT: f64 = 100.0;
const SPLIT_CHILD_RATIO: f64 = 0.5;
const SPLIT_MIN_CHILDREN: usize = 3;
const SPLIT_SUM_TOLERANCE: f64 = 0.2;
const SPLIT_WINDOW_HOURS: i64 = 24;

pub fn detect(transactions: &[Transaction]) -> Vec<PatternResult> {
    let sorted = sorted_by_time(transactions);
    let mut results = Vec::new();
    results.extend(round_amounts(&sorted));
    results.extend(structured_amounts(&sorted));
    results.extend(repeating_amounts(&sorted));
    results.extend(splitting(&sorted));
    results
}

pub fn is_round(amount: f64) -> bool {
    if !amount.is_finite() {
        return false;
    }
    if (amount - amount.round()).abs() < ROUND_TOLERANCE {
        return true;
    }
    ROUND_SCALES.iter().any(|scale| {
        ROUND_LADDER
            .iter()
            .any(|step| (amount - step * scale).abs() < ROUND_TOLERANCE)
    })
}

/// Amount sitting within 5% below a reporting threshold, if any.
pub fn structuring_threshold(amount: f64) -> Option<f64> {
    STRUCTURING_THRESHOLDS
        .iter()
        .copied()
        .find(|t| amount < *t && amount >= t * (1.0 - STRUCTURING_MARGIN))
}

pub fn round_amounts(sorted: &[&Transaction]) -> Option<PatternResult> {
    let round: Vec<&&Transaction> = sorted.iter().filter(|tx| is_round(tx.amount)).collect();
    if round.len() < ROUND_MIN_COUNT {
        return None;
    }
    let ratio = round.len() as f64 / sorted.len() as f64;
    let severity = if ratio > 0.7 { Severity::High } else { Severity::Medium };
    PatternResult::new(
        PatternType::RoundAmounts,
        severity,
        (40.0 + round.len() as f64 * 5.0).min(100.0),
        round.iter().map(|tx| tx.signature.clone()),
        json!({ "count": round.len(), "ratio": ratio }),
    )
}

pub fn structured_amounts(sorted: &[&Transaction]) -> Option<PatternResult> {
    let mut hits: Vec<(&Transaction, f64)> = Vec::new();
    for tx in sorted {
        if let Some(threshold) = structuring_threshold(tx.amount) {
            hits.push((*tx, threshold));
        }
    }
    if hits.len() < STRUCTURING_MIN_COUNT {
        return None;
    }
    let mut thresholds: Vec<f64> = hits.iter().map(|(_, t)| *t).collect();
    thresholds.sort_by(f64::total_cmp);
    thresholds.dedup();
    PatternResult::new(
        PatternType::StructuredAmounts,
        Severity::High,
        (60.0 + hits.len() as f64 * 10.0).min(100.0),
        hits.iter().map(|(tx, _)| tx.signature.clone()),
        json!({ "count": hits.len(), "thresholds": thresholds }),
    )
}

/// Largest group of identical amounts (to 4 decimals).
pub fn repeating_amounts(sorted: &[&Transaction]) -> Option<PatternResult> {
    let mut buckets: BTreeMap<i64, Vec<&Transaction>> = BTreeMap::new();
    for tx in sorted {
        if !tx.amount.is_finite() {
            continue;
        }
        let key = (tx.amount * 10_000.0).round() as i64;
        buckets.entry(key).or_default().push(*tx);
    }
    let (key, group) = buckets
        .iter()
        .filter(|(_, txs)| txs.len() >= REPEAT_MIN_COUNT)
        .max_by_key(|(_, txs)| txs.len())?;
    let share = group.len() as f64 / sorted.len() as f64;
    let severity = if share > 0.5 { Severity::High } else { Severity::Medium };
    PatternResult::new(
        PatternType::RepeatingAmounts,
        severity,
        (40.0 + group.len() as f64 * 5.0).min(100.0),
        group.iter().map(|tx| tx.signature.clone()),
        json!({
            "amount": *key as f64 / 10_000.0,
            "count": group.len(),
            "share": share,
        }),
    )
}

/// A large transfer followed within 24h by ≥3 much smaller ones that add
/// back up to roughly the same value.
pub fn splitting(sorted: &[&Transaction]) -> Vec<PatternResult> {
    let window = Duration::hours(SPLIT_WINDOW_HOURS);
    let mut results = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let parent = sorted[i];
        if parent.amount < SPLIT_MIN_PARENT {
            i += 1;
            continue;
        }
        let limit = parent.amount * SPLIT_CHILD_RATIO;
        let mut children: Vec<usize> = Vec::new();
        for (j, tx) in sorted.iter().enumerate().skip(i + 1) {
            if tx.timestamp - parent.timestamp > window {
                break;
            }
            if tx.amount < limit {
                children.push(j);
            }
        }
        let sum: f64 = children.iter().map(|&j| sorted[j].amount).sum();
        let balanced = (sum - parent.amount).abs() <= parent.amount * SPLIT_SUM_TOLERANCE;
        let Some(&last) = children.last() else {
            i += 1;
            continue;
        };
        if children.len() < SPLIT_MIN_CHILDREN || !balanced {
            i += 1;
            continue;
        }
        debug!("splitting: {} into {} parts", parent.signature, children.len());
        let signatures = std::iter::once(parent.signature.clone())
            .chain(children.iter().map(|&j| sorted[j].signature.clone()));
        results.extend(PatternResult::new(
            PatternType::SplittingPattern,
            Severity::High,
            (70.0 + children.len() as f64 * 2.0).min(100.0),
            signatures,
            json!({
                "parent": parent.signature,
                "parent_amount": parent.amount,
                "child_count": children.len(),
                "child_total": sum,
            }),
        ));
        i = last + 1;
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixtures::make_tx;

    fn with_amounts(amounts: &[f64]) -> Vec<Transaction> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, a)| make_tx(&format!("a{i}"), "W", "X", *a, i as i64 * 3600))
            .collect()
    }

    #[test]
    fn round_detection() {
        assert!(is_round(10.0));
        assert!(is_round(50.0005));
        assert!(is_round(0.5));
        assert!(is_round(0.05));
        assert!(!is_round(33.333));
        assert!(!is_round(12.9));
        assert!(is_round(0.0));
        assert!(is_round(0.0004));
        assert!(!is_round(f64::NAN));
    }

    #[test]
    fn zero_value_transfers_are_round() {
        let txs = with_amounts(&[0.0, 0.0, 0.0, 0.0]);
        let found = round_amounts(&sorted_by_time(&txs)).unwrap();
        assert_eq!(found.metadata["count"], 4);
        assert_eq!(found.severity, Severity::High);
    }

    #[test]
    fn three_round_amounts_fire() {
        let txs = with_amounts(&[10.0, 50.0, 100.0, 33.333]);
        let r = round_amounts(&sorted_by_time(&txs)).unwrap();
        assert_eq!(r.transactions, vec!["a0", "a1", "a2"]);
        assert_eq!(r.score, 55.0);
        assert_eq!(r.severity, Severity::High);
    }

    #[test]
    fn irregular_amounts_do_not_fire() {
        let txs = with_amounts(&[33.333, 47.21, 12.9]);
        assert!(round_amounts(&sorted_by_time(&txs)).is_none());
    }

    #[test]
    fn structuring_band() {
        assert_eq!(structuring_threshold(9_600.0), Some(10_000.0));
        assert_eq!(structuring_threshold(960.0), Some(1_000.0));
        assert_eq!(structuring_threshold(1_000.0), None);
        assert_eq!(structuring_threshold(900.0), None);
    }

    #[test]
    fn two_structured_amounts_fire() {
        let txs = with_amounts(&[9_990.0, 2_900.0, 12.0]);
        let r = structured_amounts(&sorted_by_time(&txs)).unwrap();
        assert_eq!(r.score, 80.0);
        assert_eq!(r.transactions.len(), 2);
    }

    #[test]
    fn single_structured_amount_is_silent() {
        let txs = with_amounts(&[9_990.0, 12.0]);
        assert!(structured_amounts(&sorted_by_time(&txs)).is_none());
    }

    #[test]
    fn repeating_picks_largest_bucket() {
        let txs = with_amounts(&[1.2345, 1.2345, 1.2345, 7.0, 7.0, 7.0, 7.0, 3.1]);
        let r = repeating_amounts(&sorted_by_time(&txs)).unwrap();
        assert_eq!(r.transactions.len(), 4);
        assert_eq!(r.metadata["amount"], 7.0);
        assert_eq!(r.severity, Severity::Medium);
    }

    #[test]
    fn repeating_majority_is_high() {
        let txs = with_amounts(&[2.5, 2.5, 2.5, 9.0]);
        let r = repeating_amounts(&sorted_by_time(&txs)).unwrap();
        assert_eq!(r.severity, Severity::High);
        assert_eq!(r.score, 55.0);
    }

    #[test]
    fn splitting_detected_once() {
        let txs = with_amounts(&[200.0, 60.0, 70.0, 65.0, 1.0]);
        let found = splitting(&sorted_by_time(&txs));
        assert_eq!(found.len(), 1);
        // children: 60, 70, 65, 1 -> 196, within 20% of 200
        assert_eq!(found[0].transactions.len(), 5);
        assert_eq!(found[0].score, 78.0);
    }

    #[test]
    fn splitting_requires_balanced_sum() {
        let txs = with_amounts(&[500.0, 10.0, 10.0, 10.0]);
        assert!(splitting(&sorted_by_time(&txs)).is_empty());
    }

    #[test]
    fn splitting_respects_window() {
        let txs = vec![
            make_tx("p", "W", "X", 300.0, 0),
            make_tx("c1", "W", "X", 100.0, 3600),
            make_tx("c2", "W", "X", 100.0, 7200),
            make_tx("c3", "W", "X", 100.0, 90_000),
        ];
        assert!(splitting(&sorted_by_time(&txs)).is_empty());
    }

    #[test]
    fn empty_history_is_silent() {
        assert!(detect(&[]).is_empty());
    }
}
