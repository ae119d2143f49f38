use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde_json::json;
use tracing::debug;

use crate::core::stats::{deltas_secs, is_outlier, is_unusual_hour, std_dev, utc_day, variation_ratio};
use crate::core::{PatternResult, PatternType, Severity, Transaction, sorted_by_time};

const RAPID_WINDOW_SECS: i64 = 30;
const RAPID_MIN_COUNT: usize = 3;
const PERIODIC_MAX_RATIO: f64 = 0.2;
const PERIODIC_MIN_COUNT: usize = 5;
const UNUSUAL_MIN_RATIO: f64 = 0.4;
const UNUSUAL_MIN_COUNT: usize = 3;
const BURST_MIN_COUNT: usize = 10;

pub fn detect(transactions: &[Transaction]) -> Vec<PatternResult> {
    let sorted = sorted_by_time(transactions);
    let mut results = rapid_succession(&sorted);
    results.extend(periodicity(&sorted));
    results.extend(unusual_hours(&sorted));
    results.extend(burst_days(&sorted));
    results
}

/// Runs of ≥3 transactions all within 30s of the run's first one.
pub fn rapid_succession(sorted: &[&Transaction]) -> Vec<PatternResult> {
    let window = Duration::seconds(RAPID_WINDOW_SECS);
    let mut results = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let start = sorted[i].timestamp;
        let mut j = i + 1;
        while j < sorted.len() && sorted[j].timestamp - start <= window {
            j += 1;
        }
        let count = j - i;
        if count < RAPID_MIN_COUNT {
            i += 1;
            continue;
        }
        let cluster = &sorted[i..j];
        let severity = if count > 5 { Severity::High } else { Severity::Medium };
        let span = (cluster[count - 1].timestamp - start).num_seconds();
        debug!("rapid succession: {count} txs in {span}s");
        results.extend(PatternResult::new(
            PatternType::RapidSuccession,
            severity,
            (count as f64 * 10.0).min(100.0),
            cluster.iter().map(|tx| tx.signature.clone()),
            json!({
                "count": count,
                "window_seconds": RAPID_WINDOW_SECS,
                "span_seconds": span,
                "start": start,
            }),
        ));
        i = j;
    }
    results
}

/// Near-constant spacing between consecutive transactions.
pub fn periodicity(sorted: &[&Transaction]) -> Option<PatternResult> {
    if sorted.len() < PERIODIC_MIN_COUNT {
        return None;
    }
    let timestamps: Vec<_> = sorted.iter().map(|tx| tx.timestamp).collect();
    let deltas = deltas_secs(&timestamps);
    let ratio = variation_ratio(&deltas)?;
    if ratio > PERIODIC_MAX_RATIO {
        return None;
    }
    let average = crate::core::stats::mean(&deltas);
    PatternResult::new(
        PatternType::PeriodicTransactions,
        Severity::Medium,
        (50.0 + (1.0 - ratio) * 50.0).min(100.0),
        sorted.iter().map(|tx| tx.signature.clone()),
        json!({
            "count": sorted.len(),
            "average_interval_seconds": average,
            "std_dev_seconds": std_dev(&deltas),
            "variance_ratio": ratio,
        }),
    )
}

/// Concentration of activity in 01:00-05:59 UTC.
pub fn unusual_hours(sorted: &[&Transaction]) -> Option<PatternResult> {
    if sorted.is_empty() {
        return None;
    }
    let unusual: Vec<&&Transaction> = sorted.iter().filter(|tx| is_unusual_hour(&tx.timestamp)).collect();
    let ratio = unusual.len() as f64 / sorted.len() as f64;
    if unusual.len() < UNUSUAL_MIN_COUNT || ratio < UNUSUAL_MIN_RATIO {
        return None;
    }
    let severity = if ratio > 0.7 { Severity::High } else { Severity::Medium };
    PatternResult::new(
        PatternType::UnusualHours,
        severity,
        (ratio * 100.0).min(100.0),
        unusual.iter().map(|tx| tx.signature.clone()),
        json!({
            "count": unusual.len(),
            "total": sorted.len(),
            "ratio": ratio,
        }),
    )
}

/// Calendar days whose volume exceeds mean + 2σ of daily volume.
pub fn burst_days(sorted: &[&Transaction]) -> Option<PatternResult> {
    if sorted.len() < BURST_MIN_COUNT {
        return None;
    }
    let mut by_day: BTreeMap<NaiveDate, Vec<&Transaction>> = BTreeMap::new();
    for tx in sorted {
        by_day.entry(utc_day(&tx.timestamp)).or_default().push(*tx);
    }
    let counts: Vec<f64> = by_day.values().map(|txs| txs.len() as f64).collect();
    let bursts: Vec<(&NaiveDate, &Vec<&Transaction>)> = by_day
        .iter()
        .filter(|(_, txs)| is_outlier(txs.len() as f64, &counts, 2.0))
        .collect();
    if bursts.is_empty() {
        return None;
    }
    let days: Vec<String> = bursts.iter().map(|(day, _)| day.to_string()).collect();
    PatternResult::new(
        PatternType::BurstActivity,
        Severity::Medium,
        (50.0 + bursts.len() as f64 * 10.0).min(100.0),
        bursts
            .iter()
            .flat_map(|(_, txs)| txs.iter().map(|tx| tx.signature.clone())),
        json!({
            "burst_days": days,
            "day_count": by_day.len(),
            "mean_per_day": crate::core::stats::mean(&counts),
        }),
    )
}
