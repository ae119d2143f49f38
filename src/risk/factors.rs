use std::collections::{BTreeMap, BTreeSet};

use crate::core::ActivityRecord;
use crate::core::stats::is_unusual_hour;

use super::reference::{ListKind, ReferenceLists};
use super::{FactorType, RiskFactor, RiskTables};

/// Everything a factor rule may look at for one address.
pub struct FactorContext<'a> {
    /// History ordered by timestamp.
    pub history: &'a [&'a ActivityRecord],
    pub balance: f64,
    pub tables: &'a RiskTables,
}

/// A rule that scores one aspect of an address's activity.
/// The returned factor's score is already weighted and within 0.0-1.0.
pub trait FactorRule {
    fn factor_type(&self) -> FactorType;
    fn evaluate(&self, ctx: &FactorContext) -> RiskFactor;
}

/// All rules in reporting order.
pub fn default_rules() -> Vec<Box<dyn FactorRule + Send + Sync>> {
    vec![
        Box::new(HighRiskInteractionRule),
        Box::new(HighVelocityRule),
        Box::new(UnusualTimingRule),
        Box::new(NewAccountRule),
        Box::new(LowBalanceThroughputRule),
        Box::new(ComplexPatternsRule),
        Box::new(MarketManipulationRule),
        Box::new(WashTradingRule),
        Box::new(FailedTransactionsRule),
        Box::new(UnusualTokenRule),
    ]
}

const VELOCITY_WINDOW: usize = 20;
const VELOCITY_MAX_SPAN_SECS: i64 = 300;
const TIMING_MIN_COUNT: usize = 5;
const TIMING_MIN_RATIO: f64 = 0.5;
const NEW_ACCOUNT_MIN_TXS: usize = 20;
const NEW_ACCOUNT_MAX_DAYS: i64 = 7;
const LOW_BALANCE: f64 = 0.1;
const LOW_BALANCE_MIN_VOLUME: f64 = 10.0;
const COMPLEX_MIN_ACCOUNTS: usize = 4;
const WASH_MIN_PAIRS: usize = 3;
const FAILED_MIN_COUNT: usize = 5;

fn touches(record: &ActivityRecord, lists: &ReferenceLists, kind: ListKind) -> bool {
    record.accounts.iter().any(|a| lists.contains(kind, a))
}

// --- Individual Rules ---

/// Transactions touching a mixer, sanctioned, scam or manipulation address.
/// The heaviest list hit sets the score.
struct HighRiskInteractionRule;
impl FactorRule for HighRiskInteractionRule {
    fn factor_type(&self) -> FactorType { FactorType::HighRiskInteraction }
    fn evaluate(&self, ctx: &FactorContext) -> RiskFactor {
        let lists = &ctx.tables.reference;
        let mut worst: Option<(ListKind, usize, f64)> = None;
        for kind in ListKind::COUNTERPARTY {
            let hits = ctx.history.iter().filter(|r| touches(r, lists, kind)).count();
            if hits == 0 {
                continue;
            }
            let weight = ctx.tables.weights.for_list(kind);
            if worst.is_none_or(|(_, _, w)| weight > w) {
                worst = Some((kind, hits, weight));
            }
        }
        match worst {
            Some((kind, hits, weight)) => RiskFactor::new(
                self.factor_type(),
                weight,
                format!("Interacted with {} addresses in {hits} transaction(s)", kind.label()),
            ),
            None => RiskFactor::none(self.factor_type(), "No interaction with listed addresses"),
        }
    }
}

/// Peak rate over any 20 consecutive transactions spanning ≤5 minutes.
struct HighVelocityRule;
impl FactorRule for HighVelocityRule {
    fn factor_type(&self) -> FactorType { FactorType::HighVelocity }
    fn evaluate(&self, ctx: &FactorContext) -> RiskFactor {
        let peak = ctx
            .history
            .windows(VELOCITY_WINDOW)
            .map(|w| (w[VELOCITY_WINDOW - 1].timestamp - w[0].timestamp).num_seconds())
            .filter(|span| *span <= VELOCITY_MAX_SPAN_SECS)
            .map(|span| VELOCITY_WINDOW as f64 / (span.max(1) as f64 / 60.0))
            .fold(None, |best: Option<f64>, tpm| Some(best.map_or(tpm, |b| b.max(tpm))));
        match peak {
            Some(per_minute) => {
                let normalized = (per_minute / 100.0).min(1.0);
                RiskFactor::new(
                    self.factor_type(),
                    ctx.tables.weights.high_velocity * normalized,
                    format!("{VELOCITY_WINDOW} transactions at {per_minute:.1} per minute"),
                )
            }
            None => RiskFactor::none(self.factor_type(), "No sustained high-rate activity"),
        }
    }
}

/// Majority of activity in 01:00-05:59 UTC.
struct UnusualTimingRule;
impl FactorRule for UnusualTimingRule {
    fn factor_type(&self) -> FactorType { FactorType::UnusualTiming }
    fn evaluate(&self, ctx: &FactorContext) -> RiskFactor {
        if ctx.history.is_empty() {
            return RiskFactor::none(self.factor_type(), "No activity");
        }
        let unusual = ctx.history.iter().filter(|r| is_unusual_hour(&r.timestamp)).count();
        let ratio = unusual as f64 / ctx.history.len() as f64;
        if unusual < TIMING_MIN_COUNT || ratio <= TIMING_MIN_RATIO {
            return RiskFactor::none(self.factor_type(), "Activity spread over normal hours");
        }
        RiskFactor::new(
            self.factor_type(),
            ctx.tables.weights.unusual_hours * ratio,
            format!("{unusual} of {} transactions between 01:00 and 05:59 UTC", ctx.history.len()),
        )
    }
}

/// More than 20 transactions packed into an account history younger than a week.
struct NewAccountRule;
impl FactorRule for NewAccountRule {
    fn factor_type(&self) -> FactorType { FactorType::NewAccountHighActivity }
    fn evaluate(&self, ctx: &FactorContext) -> RiskFactor {
        let n = ctx.history.len();
        let (Some(first), Some(last)) = (ctx.history.first(), ctx.history.last()) else {
            return RiskFactor::none(self.factor_type(), "No activity");
        };
        let span = last.timestamp - first.timestamp;
        if n <= NEW_ACCOUNT_MIN_TXS || span >= chrono::Duration::days(NEW_ACCOUNT_MAX_DAYS) {
            return RiskFactor::none(self.factor_type(), "No burst of early activity");
        }
        // spans under a day count as one day
        let days = (span.num_seconds() as f64 / 86_400.0).max(1.0);
        let per_day = n as f64 / days;
        RiskFactor::new(
            self.factor_type(),
            ctx.tables.weights.new_account_high_activity * (per_day / 50.0).min(1.0),
            format!("{n} transactions within {days:.1} day(s) of first activity"),
        )
    }
}

/// Near-empty account moving large volume.
struct LowBalanceThroughputRule;
impl FactorRule for LowBalanceThroughputRule {
    fn factor_type(&self) -> FactorType { FactorType::LowBalanceHighThroughput }
    fn evaluate(&self, ctx: &FactorContext) -> RiskFactor {
        let volume: f64 = ctx.history.iter().map(|r| r.balance_delta.abs()).sum();
        if !(ctx.balance < LOW_BALANCE && volume > LOW_BALANCE_MIN_VOLUME) {
            return RiskFactor::none(self.factor_type(), "Throughput consistent with balance");
        }
        let normalized = if ctx.balance <= 0.0 {
            1.0
        } else {
            (volume / ctx.balance / 1000.0).min(1.0)
        };
        RiskFactor::new(
            self.factor_type(),
            ctx.tables.weights.low_balance_high_throughput * normalized,
            format!("Moved {volume:.2} with a balance of {:.4}", ctx.balance),
        )
    }
}

/// Transactions touching four or more distinct accounts.
struct ComplexPatternsRule;
impl FactorRule for ComplexPatternsRule {
    fn factor_type(&self) -> FactorType { FactorType::ComplexPatterns }
    fn evaluate(&self, ctx: &FactorContext) -> RiskFactor {
        let widths: Vec<usize> = ctx
            .history
            .iter()
            .map(|r| r.distinct_accounts())
            .filter(|w| *w >= COMPLEX_MIN_ACCOUNTS)
            .collect();
        let Some(max_width) = widths.iter().copied().max() else {
            return RiskFactor::none(self.factor_type(), "No multi-party transactions");
        };
        let ratio = widths.len() as f64 / ctx.history.len() as f64;
        RiskFactor::new(
            self.factor_type(),
            ctx.tables.weights.complex_patterns * (ratio * max_width as f64 / 10.0).min(1.0),
            format!(
                "{} of {} transactions involve {COMPLEX_MIN_ACCOUNTS}+ accounts (max {max_width})",
                widths.len(),
                ctx.history.len()
            ),
        )
    }
}

struct MarketManipulationRule;
impl FactorRule for MarketManipulationRule {
    fn factor_type(&self) -> FactorType { FactorType::MarketManipulation }
    fn evaluate(&self, ctx: &FactorContext) -> RiskFactor {
        let lists = &ctx.tables.reference;
        let hits = ctx
            .history
            .iter()
            .filter(|r| touches(r, lists, ListKind::MarketManipulation))
            .count();
        if hits == 0 {
            return RiskFactor::none(self.factor_type(), "No contact with manipulation-listed addresses");
        }
        RiskFactor::new(
            self.factor_type(),
            ctx.tables.weights.market_manipulation * (hits as f64 / 5.0).min(1.0),
            format!("{hits} transaction(s) with manipulation-listed addresses"),
        )
    }
}

/// Matched back-and-forth transfers between the same two parties.
///
/// Each record contributes one directed edge from its first to its second
/// account; an unordered pair contributes `min(a→b, b→a)`.
struct WashTradingRule;
impl FactorRule for WashTradingRule {
    fn factor_type(&self) -> FactorType { FactorType::WashTrading }
    fn evaluate(&self, ctx: &FactorContext) -> RiskFactor {
        let mut directed: BTreeMap<(&str, &str), usize> = BTreeMap::new();
        for record in ctx.history {
            if let [from, to, ..] = record.accounts.as_slice() {
                if from != to {
                    *directed.entry((from.as_str(), to.as_str())).or_default() += 1;
                }
            }
        }
        let matched: usize = directed
            .iter()
            .filter(|((a, b), _)| a < b)
            .map(|((a, b), forward)| (*forward).min(directed.get(&(*b, *a)).copied().unwrap_or(0)))
            .sum();
        if matched < WASH_MIN_PAIRS {
            return RiskFactor::none(self.factor_type(), "No repeated round trips");
        }
        RiskFactor::new(
            self.factor_type(),
            ctx.tables.weights.wash_trading * (matched as f64 / 10.0).min(1.0),
            format!("{matched} matched round-trip transfer pair(s)"),
        )
    }
}

struct FailedTransactionsRule;
impl FactorRule for FailedTransactionsRule {
    fn factor_type(&self) -> FactorType { FactorType::FailedTransactions }
    fn evaluate(&self, ctx: &FactorContext) -> RiskFactor {
        let failed = ctx.history.iter().filter(|r| !r.success).count();
        if failed < FAILED_MIN_COUNT {
            return RiskFactor::none(self.factor_type(), "Few failed transactions");
        }
        let ratio = failed as f64 / ctx.history.len() as f64;
        RiskFactor::new(
            self.factor_type(),
            ctx.tables.weights.failed_transactions * (ratio * 2.0).min(1.0),
            format!("{failed} of {} transactions failed", ctx.history.len()),
        )
    }
}

/// Transfer log lines naming a listed suspicious token mint.
struct UnusualTokenRule;
impl FactorRule for UnusualTokenRule {
    fn factor_type(&self) -> FactorType { FactorType::UnusualTokenTransfers }
    fn evaluate(&self, ctx: &FactorContext) -> RiskFactor {
        let lists = &ctx.tables.reference;
        let mut mints: BTreeSet<&str> = BTreeSet::new();
        for record in ctx.history {
            for line in &record.logs {
                if !line.to_ascii_lowercase().contains("transfer") {
                    continue;
                }
                mints.extend(
                    line.split(|c: char| !c.is_ascii_alphanumeric())
                        .filter(|word| lists.contains(ListKind::SuspiciousToken, word)),
                );
            }
        }
        if mints.is_empty() {
            return RiskFactor::none(self.factor_type(), "No transfers of listed tokens");
        }
        RiskFactor::new(
            self.factor_type(),
            ctx.tables.weights.unusual_token_transfers * (mints.len() as f64 / 3.0).min(1.0),
            format!("Transferred {} listed token(s)", mints.len()),
        )
    }
}
