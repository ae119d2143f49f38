pub mod graph;
pub mod stats;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single transfer event between two accounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub signature: String,
    pub from: String,
    pub to: String,
    pub amount: f64, // native unit (SOL)
    pub timestamp: DateTime<Utc>,
}

/// Account-history view of a transaction, consumed by the risk engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub signature: String,
    pub timestamp: DateTime<Utc>,
    /// All accounts touched by the transaction, in instruction order.
    pub accounts: Vec<String>,
    /// Change of the subject's balance caused by this transaction.
    pub balance_delta: f64,
    pub success: bool,
    pub logs: Vec<String>,
}

impl ActivityRecord {
    /// Number of distinct accounts the transaction touches.
    pub fn distinct_accounts(&self) -> usize {
        let mut seen: Vec<&str> = Vec::with_capacity(self.accounts.len());
        for account in &self.accounts {
            if !seen.contains(&account.as_str()) {
                seen.push(account);
            }
        }
        seen.len()
    }

    /// A successful transfer as seen from `subject`: outgoing amounts
    /// count negative, everything else positive.
    pub fn from_transaction(tx: &Transaction, subject: &str) -> Self {
        let balance_delta = if tx.from == subject { -tx.amount } else { tx.amount };
        Self {
            signature: tx.signature.clone(),
            timestamp: tx.timestamp,
            accounts: vec![tx.from.clone(), tx.to.clone()],
            balance_delta,
            success: true,
            logs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// The four detector families. Output order of the aggregator follows `ALL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    TimeBased,
    AmountBased,
    FlowBased,
    Behavioral,
}

impl PatternCategory {
    pub const ALL: [PatternCategory; 4] = [
        PatternCategory::TimeBased,
        PatternCategory::AmountBased,
        PatternCategory::FlowBased,
        PatternCategory::Behavioral,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    // time
    RapidSuccession,
    PeriodicTransactions,
    UnusualHours,
    BurstActivity,
    // amount
    RoundAmounts,
    StructuredAmounts,
    RepeatingAmounts,
    SplittingPattern,
    // flow
    CircularTransactions,
    Layering,
    Funnel,
    FanOut,
    // behavioral
    WashTrading,
    Smurfing,
    AutomatedTrading,
    HourlySpike,
}

impl PatternType {
    pub const ALL: [PatternType; 16] = [
        PatternType::RapidSuccession,
        PatternType::PeriodicTransactions,
        PatternType::UnusualHours,
        PatternType::BurstActivity,
        PatternType::RoundAmounts,
        PatternType::StructuredAmounts,
        PatternType::RepeatingAmounts,
        PatternType::SplittingPattern,
        PatternType::CircularTransactions,
        PatternType::Layering,
        PatternType::Funnel,
        PatternType::FanOut,
        PatternType::WashTrading,
        PatternType::Smurfing,
        PatternType::AutomatedTrading,
        PatternType::HourlySpike,
    ];

    pub fn category(&self) -> PatternCategory {
        match self {
            PatternType::RapidSuccession
            | PatternType::PeriodicTransactions
            | PatternType::UnusualHours
            | PatternType::BurstActivity => PatternCategory::TimeBased,
            PatternType::RoundAmounts
            | PatternType::StructuredAmounts
            | PatternType::RepeatingAmounts
            | PatternType::SplittingPattern => PatternCategory::AmountBased,
            PatternType::CircularTransactions
            | PatternType::Layering
            | PatternType::Funnel
            | PatternType::FanOut => PatternCategory::FlowBased,
            PatternType::WashTrading
            | PatternType::Smurfing
            | PatternType::AutomatedTrading
            | PatternType::HourlySpike => PatternCategory::Behavioral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::RapidSuccession => "rapid_succession",
            PatternType::PeriodicTransactions => "periodic_transactions",
            PatternType::UnusualHours => "unusual_hours",
            PatternType::BurstActivity => "burst_activity",
            PatternType::RoundAmounts => "round_amounts",
            PatternType::StructuredAmounts => "structured_amounts",
            PatternType::RepeatingAmounts => "repeating_amounts",
            PatternType::SplittingPattern => "splitting_pattern",
            PatternType::CircularTransactions => "circular_transactions",
            PatternType::Layering => "layering",
            PatternType::Funnel => "funnel",
            PatternType::FanOut => "fan_out",
            PatternType::WashTrading => "wash_trading",
            PatternType::Smurfing => "smurfing",
            PatternType::AutomatedTrading => "automated_trading",
            PatternType::HourlySpike => "hourly_spike",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        PatternType::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

/// Output of a single detector firing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternResult {
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    pub severity: Severity,
    pub score: f64, // 0-100
    pub transactions: Vec<String>,
    pub metadata: Value,
}

impl PatternResult {
    /// Build a result, clamping the score and deduplicating signatures.
    /// Returns `None` when no transaction is implicated.
    pub fn new(
        pattern_type: PatternType,
        severity: Severity,
        score: f64,
        signatures: impl IntoIterator<Item = String>,
        metadata: Value,
    ) -> Option<Self> {
        let mut transactions: Vec<String> = Vec::new();
        for sig in signatures {
            if !transactions.contains(&sig) {
                transactions.push(sig);
            }
        }
        if transactions.is_empty() {
            return None;
        }
        let score = if score.is_finite() { score.clamp(0.0, 100.0) } else { 0.0 };
        Some(Self {
            pattern_type,
            severity,
            score,
            transactions,
            metadata,
        })
    }
}

/// Per-category aggregate of pattern results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionPattern {
    #[serde(rename = "type")]
    pub category: PatternCategory,
    pub pattern_count: usize,
    /// Mean of the constituent pattern scores, 0 when empty.
    pub total_risk_score: f64,
    pub affected_transactions: usize,
    pub high_severity_count: usize,
    pub patterns: Vec<PatternResult>,
}

/// Return a chronologically sorted copy. Stable, so ties keep input order.
pub fn sorted_by_time(transactions: &[Transaction]) -> Vec<&Transaction> {
    let mut sorted: Vec<&Transaction> = transactions.iter().collect();
    sorted.sort_by_key(|tx| tx.timestamp);
    sorted
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    /// 2024-01-01T12:00:00Z plus `secs`.
    pub fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_704_110_400 + secs, 0).unwrap()
    }

    pub fn make_tx(sig: &str, from: &str, to: &str, amount: f64, secs: i64) -> Transaction {
        Transaction {
            signature: sig.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            amount,
            timestamp: at(secs),
        }
    }
}
