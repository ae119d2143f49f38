use std::collections::BTreeMap;

use chrono::{NaiveDate, Timelike};
use serde_json::json;
use tracing::debug;

use crate::core::stats::{deltas_secs, is_outlier, mean, utc_day, variation_ratio};
use crate::core::{PatternResult, PatternType, Severity, Transaction, sorted_by_time};

const WASH_MIN_LEGS: usize = 2;
const WASH_AMOUNT_TOLERANCE: f64 = 0.2;
const SMURF_MIN_DAILY: usize = 5;
const SMURF_MAX_RATIO: f64 = 0.3;
const SMURF_MAX_MEAN: f64 = 100.0;
const CADENCE_TOLERANCE: f64 = 0.01;
const CADENCE_MIN_PEERS: usize = 3;
const CADENCE_MIN_EXACT: usize = 3;
const SPIKE_MIN_COUNT: usize = 10;

pub fn detect(transactions: &[Transaction], subject: &str) -> Vec<PatternResult> {
    let sorted = sorted_by_time(transactions);
    let mut results = wash_trading(&sorted, subject);
    results.extend(smurfing(&sorted, subject));
    results.extend(automated_cadence(&sorted));
    results.extend(hourly_spikes(&sorted));
    results
}

#[derive(Default)]
struct Legs<'a> {
    outgoing: Vec<&'a Transaction>,
    incoming: Vec<&'a Transaction>,
}

/// Counterparties the subject both pays and is paid by, in similar totals.
pub fn wash_trading(sorted: &[&Transaction], subject: &str) -> Vec<PatternResult> {
    let mut by_counterparty: BTreeMap<&str, Legs> = BTreeMap::new();
    for tx in sorted {
        if tx.from == subject && tx.to != subject {
            by_counterparty.entry(tx.to.as_str()).or_default().outgoing.push(*tx);
        } else if tx.to == subject && tx.from != subject {
            by_counterparty.entry(tx.from.as_str()).or_default().incoming.push(*tx);
        }
    }

    let mut results = Vec::new();
    for (counterparty, legs) in by_counterparty {
        let cycles = legs.outgoing.len().min(legs.incoming.len());
        if cycles < WASH_MIN_LEGS {
            continue;
        }
        let sent: f64 = legs.outgoing.iter().map(|tx| tx.amount).sum();
        let received: f64 = legs.incoming.iter().map(|tx| tx.amount).sum();
        let larger = sent.max(received);
        if larger <= 0.0 || (sent - received).abs() / larger > WASH_AMOUNT_TOLERANCE {
            continue;
        }
        debug!("wash trading with {counterparty}: {cycles} cycles");
        let severity = if cycles > 5 { Severity::High } else { Severity::Medium };
        let signatures = legs
            .outgoing
            .iter()
            .chain(legs.incoming.iter())
            .map(|tx| tx.signature.clone());
        results.extend(PatternResult::new(
            PatternType::WashTrading,
            severity,
            (70.0 + cycles as f64 * 5.0).min(100.0),
            signatures,
            json!({
                "counterparty": counterparty,
                "cycle_count": cycles,
                "sent_total": sent,
                "received_total": received,
            }),
        ));
    }
    results
}

/// Days with many similar, small outgoing transfers.
pub fn smurfing(sorted: &[&Transaction], subject: &str) -> Vec<PatternResult> {
    let mut by_day: BTreeMap<NaiveDate, Vec<&Transaction>> = BTreeMap::new();
    for tx in sorted.iter().filter(|tx| tx.from == subject) {
        by_day.entry(utc_day(&tx.timestamp)).or_default().push(*tx);
    }

    let mut results = Vec::new();
    for (day, txs) in by_day {
        if txs.len() < SMURF_MIN_DAILY {
            continue;
        }
        let amounts: Vec<f64> = txs.iter().map(|tx| tx.amount).collect();
        let average = mean(&amounts);
        let Some(ratio) = variation_ratio(&amounts) else {
            continue;
        };
        if average >= SMURF_MAX_MEAN || ratio >= SMURF_MAX_RATIO {
            continue;
        }
        let severity = if txs.len() >= 10 { Severity::High } else { Severity::Medium };
        results.extend(PatternResult::new(
            PatternType::Smurfing,
            severity,
            (60.0 + txs.len() as f64 * 3.0).min(100.0),
            txs.iter().map(|tx| tx.signature.clone()),
            json!({
                "day": day.to_string(),
                "count": txs.len(),
                "average_amount": average,
                "variance_ratio": ratio,
            }),
        ));
    }
    results
}

/// Repeated, near-identical gaps between transactions (bot cadence).
pub fn automated_cadence(sorted: &[&Transaction]) -> Option<PatternResult> {
    let timestamps: Vec<_> = sorted.iter().map(|tx| tx.timestamp).collect();
    let deltas = deltas_secs(&timestamps);
    let exact: Vec<usize> = (0..deltas.len())
        .filter(|&i| {
            let d = deltas[i];
            if d <= 0.0 {
                return false;
            }
            let peers = deltas
                .iter()
                .enumerate()
                .filter(|&(j, other)| j != i && (other - d).abs() <= d * CADENCE_TOLERANCE)
                .count();
            peers >= CADENCE_MIN_PEERS
        })
        .collect();
    if exact.len() < CADENCE_MIN_EXACT {
        return None;
    }

    let mut frequency: BTreeMap<i64, usize> = BTreeMap::new();
    for &i in &exact {
        *frequency.entry(deltas[i].round() as i64).or_insert(0) += 1;
    }
    // most frequent interval; smallest interval wins ties
    let (interval, _) = frequency
        .iter()
        .fold(None, |best: Option<(i64, usize)>, (&secs, &n)| match best {
            Some((_, top)) if top >= n => best,
            _ => Some((secs, n)),
        })?;

    let signatures = exact
        .iter()
        .flat_map(|&i| [sorted[i].signature.clone(), sorted[i + 1].signature.clone()]);
    let severity = if exact.len() >= 10 { Severity::High } else { Severity::Medium };
    PatternResult::new(
        PatternType::AutomatedTrading,
        severity,
        (50.0 + exact.len() as f64 * 5.0).min(100.0),
        signatures,
        json!({
            "exact_interval_count": exact.len(),
            "interval_seconds": interval,
        }),
    )
}

/// (day, hour) buckets far above the typical hourly volume.
pub fn hourly_spikes(sorted: &[&Transaction]) -> Option<PatternResult> {
    if sorted.len() < SPIKE_MIN_COUNT {
        return None;
    }
    let mut buckets: BTreeMap<(NaiveDate, u32), Vec<&Transaction>> = BTreeMap::new();
    for tx in sorted {
        buckets
            .entry((utc_day(&tx.timestamp), tx.timestamp.hour()))
            .or_default()
            .push(*tx);
    }
    let counts: Vec<f64> = buckets.values().map(|txs| txs.len() as f64).collect();
    let spikes: Vec<(&(NaiveDate, u32), &Vec<&Transaction>)> = buckets
        .iter()
        .filter(|(_, txs)| is_outlier(txs.len() as f64, &counts, 3.0))
        .collect();
    if spikes.is_empty() {
        return None;
    }
    let hours: Vec<String> = spikes
        .iter()
        .map(|((day, hour), _)| format!("{day}T{hour:02}:00"))
        .collect();
    PatternResult::new(
        PatternType::HourlySpike,
        Severity::High,
        (60.0 + spikes.len() as f64 * 10.0).min(100.0),
        spikes
            .iter()
            .flat_map(|(_, txs)| txs.iter().map(|tx| tx.signature.clone())),
        json!({
            "spike_hours": hours,
            "bucket_count": buckets.len(),
            "mean_per_hour": mean(&counts),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixtures::make_tx;

    fn wash_fixture(back_amount: f64) -> Vec<Transaction> {
        let mut txs = Vec::new();
        for i in 0..3 {
            txs.push(make_tx(&format!("out{i}"), "A", "B", 10.0, i * 7200));
            txs.push(make_tx(&format!("in{i}"), "B", "A", back_amount, i * 7200 + 3600));
        }
        txs
    }

    #[test]
    fn wash_trading_three_cycles() {
        let txs = wash_fixture(9.5);
        let found = wash_trading(&sorted_by_time(&txs), "A");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].metadata["cycle_count"], 3);
        assert_eq!(found[0].score, 85.0);
        assert_eq!(found[0].transactions.len(), 6);
        assert_eq!(found[0].severity, Severity::Medium);
    }

    #[test]
    fn wash_trading_needs_balanced_totals() {
        // 3 * 7.9 = 23.7 < 80% of 30
        let txs = wash_fixture(7.9);
        assert!(wash_trading(&sorted_by_time(&txs), "A").is_empty());
    }

    #[test]
    fn wash_trading_needs_two_each_way() {
        let txs = vec![
            make_tx("o1", "A", "B", 10.0, 0),
            make_tx("o2", "A", "B", 10.0, 10),
            make_tx("i1", "B", "A", 20.0, 20),
        ];
        assert!(wash_trading(&sorted_by_time(&txs), "A").is_empty());
    }

    #[test]
    fn smurfing_day_of_small_even_transfers() {
        let txs: Vec<Transaction> = (0..6)
            .map(|i| make_tx(&format!("m{i}"), "A", &format!("R{i}"), 9.0 + (i % 2) as f64 * 0.5, i * 600))
            .collect();
        let found = smurfing(&sorted_by_time(&txs), "A");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].score, 78.0);
    }

    #[test]
    fn smurfing_ignores_large_or_uneven_amounts() {
        let large: Vec<Transaction> = (0..6)
            .map(|i| make_tx(&format!("m{i}"), "A", "R", 500.0, i * 600))
            .collect();
        assert!(smurfing(&sorted_by_time(&large), "A").is_empty());

        let uneven: Vec<Transaction> = [1.0, 50.0, 2.0, 80.0, 3.0]
            .iter()
            .enumerate()
            .map(|(i, a)| make_tx(&format!("u{i}"), "A", "R", *a, i as i64 * 600))
            .collect();
        assert!(smurfing(&sorted_by_time(&uneven), "A").is_empty());
    }

    #[test]
    fn smurfing_only_counts_outgoing() {
        let txs: Vec<Transaction> = (0..6)
            .map(|i| make_tx(&format!("m{i}"), "R", "A", 9.0, i * 600))
            .collect();
        assert!(smurfing(&sorted_by_time(&txs), "A").is_empty());
    }

    #[test]
    fn fixed_interval_bot() {
        let txs: Vec<Transaction> = (0..6)
            .map(|i| make_tx(&format!("b{i}"), "A", "B", 1.0, i * 120))
            .collect();
        let r = automated_cadence(&sorted_by_time(&txs)).unwrap();
        assert_eq!(r.metadata["exact_interval_count"], 5);
        assert_eq!(r.metadata["interval_seconds"], 120);
        assert_eq!(r.score, 75.0);
        assert_eq!(r.transactions.len(), 6);
    }

    #[test]
    fn jittery_intervals_are_human() {
        let secs = [0, 100, 350, 420, 900, 1000, 1700];
        let txs: Vec<Transaction> = secs
            .iter()
            .enumerate()
            .map(|(i, s)| make_tx(&format!("h{i}"), "A", "B", 1.0, *s))
            .collect();
        assert!(automated_cadence(&sorted_by_time(&txs)).is_none());
    }

    #[test]
    fn hourly_spike_detected() {
        let mut txs = Vec::new();
        // one tx per hour for 20 hours, then 15 in a single hour
        for h in 0..20 {
            txs.push(make_tx(&format!("q{h}"), "A", "B", 1.0, h * 3600));
        }
        for k in 0..15 {
            txs.push(make_tx(&format!("p{k}"), "A", "B", 1.0, 20 * 3600 + k * 60));
        }
        let r = hourly_spikes(&sorted_by_time(&txs)).unwrap();
        assert_eq!(r.transactions.len(), 15);
        assert_eq!(r.score, 70.0);
    }

    #[test]
    fn flat_hours_have_no_spike() {
        let txs: Vec<Transaction> = (0..12)
            .map(|h| make_tx(&format!("q{h}"), "A", "B", 1.0, h * 3600))
            .collect();
        assert!(hourly_spikes(&sorted_by_time(&txs)).is_none());
    }

    #[test]
    fn tiny_histories_are_silent() {
        assert!(detect(&[], "A").is_empty());
        let one = vec![make_tx("x", "A", "B", 1.0, 0)];
        assert!(detect(&one, "A").is_empty());
    }
}
