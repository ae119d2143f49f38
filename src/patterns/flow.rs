use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::Duration;
use serde_json::json;
use tracing::debug;

use crate::core::graph::{MAX_DFS_DEPTH, TransactionGraph};
use crate::core::{PatternResult, PatternType, Severity, Transaction, sorted_by_time};

const CYCLE_MIN_HOPS: usize = 3;
const LAYERING_MIN_HOPS: usize = 4;
const FUNNEL_WINDOW_DAYS: i64 = 7;
const FAN_OUT_WINDOW_HOURS: i64 = 24;
const MIN_COUNTERPARTIES: usize = 3;

pub fn detect(transactions: &[Transaction], subject: &str) -> Vec<PatternResult> {
    let graph = TransactionGraph::build(transactions);
    let mut results = circular(&graph, subject);
    results.extend(layering(&graph, subject));
    results.extend(funnels(transactions));
    results.extend(fan_outs(transactions));
    results
}

/// Closed paths that leave the subject and come back after ≥3 hops.
pub fn circular(graph: &TransactionGraph, subject: &str) -> Vec<PatternResult> {
    let mut seen: BTreeSet<Vec<String>> = BTreeSet::new();
    let mut results = Vec::new();
    for path in graph.cycles_through(subject, MAX_DFS_DEPTH) {
        let hops = path.len();
        if hops < CYCLE_MIN_HOPS {
            continue;
        }
        let signatures = graph.path_signatures(&path, true);
        if !seen.insert(sorted_key(&signatures)) {
            continue;
        }
        let mut route = path.clone();
        route.push(subject.to_string());
        debug!("circular flow: {}", route.join(" -> "));
        results.extend(PatternResult::new(
            PatternType::CircularTransactions,
            Severity::High,
            (70.0 + hops as f64 * 5.0).min(100.0),
            signatures,
            json!({ "path": route, "hops": hops }),
        ));
    }
    results
}

/// Long one-way chains leading away from the subject.
pub fn layering(graph: &TransactionGraph, subject: &str) -> Vec<PatternResult> {
    let mut seen: BTreeSet<Vec<String>> = BTreeSet::new();
    let mut results = Vec::new();
    for path in graph.chains_from(subject, MAX_DFS_DEPTH) {
        let hops = path.len() - 1;
        if hops < LAYERING_MIN_HOPS {
            continue;
        }
        let signatures = graph.path_signatures(&path, false);
        if !seen.insert(sorted_key(&signatures)) {
            continue;
        }
        let severity = if hops >= 6 { Severity::High } else { Severity::Medium };
        results.extend(PatternResult::new(
            PatternType::Layering,
            severity,
            (60.0 + hops as f64 * 5.0).min(100.0),
            signatures,
            json!({ "path": path, "hops": hops }),
        ));
    }
    results
}

/// Destinations collecting from ≥3 distinct sources inside 7 days.
pub fn funnels(transactions: &[Transaction]) -> Vec<PatternResult> {
    let window = Duration::days(FUNNEL_WINDOW_DAYS);
    let mut by_destination: BTreeMap<&str, Vec<&Transaction>> = BTreeMap::new();
    for tx in sorted_by_time(transactions) {
        by_destination.entry(tx.to.as_str()).or_default().push(tx);
    }
    let mut results = Vec::new();
    for (destination, txs) in by_destination {
        let Some((sources, window_txs)) = widest_window(&txs, window, source_of) else {
            continue;
        };
        if sources < MIN_COUNTERPARTIES {
            continue;
        }
        let severity = if sources >= 10 { Severity::High } else { Severity::Medium };
        results.extend(PatternResult::new(
            PatternType::Funnel,
            severity,
            (50.0 + sources as f64 * 5.0).min(100.0),
            window_txs.iter().map(|tx| tx.signature.clone()),
            json!({ "destination": destination, "source_count": sources, "window_days": FUNNEL_WINDOW_DAYS }),
        ));
    }
    results
}

/// Sources paying ≥3 distinct destinations inside 24 hours.
pub fn fan_outs(transactions: &[Transaction]) -> Vec<PatternResult> {
    let window = Duration::hours(FAN_OUT_WINDOW_HOURS);
    let mut by_source: BTreeMap<&str, Vec<&Transaction>> = BTreeMap::new();
    for tx in sorted_by_time(transactions) {
        by_source.entry(tx.from.as_str()).or_default().push(tx);
    }
    let mut results = Vec::new();
    for (source, txs) in by_source {
        let Some((destinations, window_txs)) = widest_window(&txs, window, destination_of) else {
            continue;
        };
        if destinations < MIN_COUNTERPARTIES {
            continue;
        }
        let severity = if destinations >= 10 { Severity::High } else { Severity::Medium };
        results.extend(PatternResult::new(
            PatternType::FanOut,
            severity,
            (50.0 + destinations as f64 * 5.0).min(100.0),
            window_txs.iter().map(|tx| tx.signature.clone()),
            json!({ "source": source, "destination_count": destinations, "window_hours": FAN_OUT_WINDOW_HOURS }),
        ));
    }
    results
}

fn source_of(tx: &Transaction) -> &str {
    &tx.from
}

fn destination_of(tx: &Transaction) -> &str {
    &tx.to
}

/// The window (starting at some transaction) with the most distinct
/// counterparties. Earliest window wins ties. Input must be sorted.
fn widest_window<'a, 'b>(
    txs: &'b [&'a Transaction],
    window: Duration,
    counterparty: fn(&Transaction) -> &str,
) -> Option<(usize, &'b [&'a Transaction])> {
    let mut best: Option<(usize, usize, usize)> = None;
    for i in 0..txs.len() {
        let mut distinct: HashSet<&str> = HashSet::new();
        let mut j = i;
        while j < txs.len() && txs[j].timestamp - txs[i].timestamp <= window {
            distinct.insert(counterparty(txs[j]));
            j += 1;
        }
        if best.is_none_or(|(count, _, _)| distinct.len() > count) {
            best = Some((distinct.len(), i, j));
        }
    }
    best.map(|(count, i, j)| (count, &txs[i..j]))
}

fn sorted_key(signatures: &[String]) -> Vec<String> {
    let mut key = signatures.to_vec();
    key.sort();
    key
}
