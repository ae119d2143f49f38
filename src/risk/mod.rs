pub mod account;
pub mod advice;
pub mod factors;
pub mod reference;
pub mod weights;

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::{ActivityRecord, Severity};
use account::{AccountError, AccountInfoProvider};
use factors::{FactorContext, FactorRule};
use reference::ReferenceLists;
use weights::{CalibratedWeights, CategoryThresholds};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorType {
    HighRiskInteraction,
    HighVelocity,
    UnusualTiming,
    NewAccountHighActivity,
    LowBalanceHighThroughput,
    ComplexPatterns,
    MarketManipulation,
    WashTrading,
    FailedTransactions,
    UnusualTokenTransfers,
}

impl FactorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactorType::HighRiskInteraction => "high_risk_interaction",
            FactorType::HighVelocity => "high_velocity",
            FactorType::UnusualTiming => "unusual_timing",
            FactorType::NewAccountHighActivity => "new_account_high_activity",
            FactorType::LowBalanceHighThroughput => "low_balance_high_throughput",
            FactorType::ComplexPatterns => "complex_patterns",
            FactorType::MarketManipulation => "market_manipulation",
            FactorType::WashTrading => "wash_trading",
            FactorType::FailedTransactions => "failed_transactions",
            FactorType::UnusualTokenTransfers => "unusual_token_transfers",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            FactorType::HighRiskInteraction => "High-Risk Interaction",
            FactorType::HighVelocity => "High Transaction Velocity",
            FactorType::UnusualTiming => "Unusual Timing",
            FactorType::NewAccountHighActivity => "New Account High Activity",
            FactorType::LowBalanceHighThroughput => "Low Balance High Throughput",
            FactorType::ComplexPatterns => "Complex Transaction Patterns",
            FactorType::MarketManipulation => "Market Manipulation",
            FactorType::WashTrading => "Wash Trading",
            FactorType::FailedTransactions => "Failed Transactions",
            FactorType::UnusualTokenTransfers => "Unusual Token Transfers",
        }
    }
}

/// One explanatory contribution to a risk profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    #[serde(rename = "type")]
    pub factor_type: FactorType,
    pub name: String,
    /// Weighted contribution, 0.0-1.0.
    pub score: f64,
    /// `score` scaled to 0-100 for display.
    pub impact: f64,
    pub severity: Severity,
    pub description: String,
}

impl RiskFactor {
    pub fn new(factor_type: FactorType, score: f64, description: impl Into<String>) -> Self {
        // NaN is kept so the engine can reject it
        let score = if score.is_nan() { score } else { score.clamp(0.0, 1.0) };
        Self {
            factor_type,
            name: factor_type.display_name().to_string(),
            score,
            impact: score * 100.0,
            severity: severity_for(score),
            description: description.into(),
        }
    }

    /// A zero-score factor recording that nothing was found.
    pub fn none(factor_type: FactorType, description: impl Into<String>) -> Self {
        Self::new(factor_type, 0.0, description)
    }
}

fn severity_for(score: f64) -> Severity {
    if score >= 0.9 {
        Severity::Critical
    } else if score >= 0.7 {
        Severity::High
    } else if score >= 0.4 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskCategory {
    Low,    // <40
    Medium, // ≥40
    High,   // ≥75
}

impl RiskCategory {
    pub fn from_score(score: f64) -> Self {
        CategoryThresholds::default().categorize(score)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::Low => "low",
            RiskCategory::Medium => "medium",
            RiskCategory::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub address: String,
    pub score: f64, // 0-100
    pub category: RiskCategory,
    pub factors: Vec<RiskFactor>,
    pub last_updated: DateTime<Utc>,
}

impl RiskProfile {
    /// Zero profile used when calibration fails and nothing was supplied.
    pub fn empty(address: &str) -> Self {
        Self {
            address: address.to_string(),
            score: 0.0,
            category: RiskCategory::Low,
            factors: Vec::new(),
            last_updated: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RiskError {
    #[error("subject address is empty")]
    EmptyAddress,
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error("balance {0} is not a finite number")]
    InvalidBalance(f64),
    #[error("record {0} has a non-finite balance delta")]
    InvalidRecord(String),
    #[error("factor {0:?} produced a non-finite score")]
    NonFiniteScore(FactorType),
}

/// Reference data and calibration consulted by one scoring call.
#[derive(Debug, Clone, Default)]
pub struct RiskTables {
    pub reference: ReferenceLists,
    pub weights: CalibratedWeights,
    pub thresholds: CategoryThresholds,
}

/// Aggregates the factor rules into a bounded 0-100 risk profile.
///
/// Tables are held behind an `Arc` swapped by `refresh_tables`; each call
/// works on the snapshot taken at entry.
pub struct RiskEngine {
    tables: RwLock<Arc<RiskTables>>,
    rules: Vec<Box<dyn FactorRule + Send + Sync>>,
}

impl RiskEngine {
    pub fn new(tables: RiskTables) -> Self {
        Self {
            tables: RwLock::new(Arc::new(tables)),
            rules: factors::default_rules(),
        }
    }

    pub fn snapshot(&self) -> Arc<RiskTables> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the tables for subsequent calls. In-flight calls keep theirs.
    pub fn refresh_tables(&self, tables: RiskTables) {
        let mut guard = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(tables);
        info!("Risk tables refreshed");
    }

    /// Score `address`. Never fails: on error the existing profile (or an
    /// empty one) is returned and the error is logged.
    pub fn calibrate(
        &self,
        address: &str,
        provider: &dyn AccountInfoProvider,
        history: &[ActivityRecord],
        existing: Option<&RiskProfile>,
    ) -> RiskProfile {
        match self.try_calibrate(address, provider, history) {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Risk calibration for {address} failed: {e}; keeping previous profile");
                existing
                    .cloned()
                    .unwrap_or_else(|| RiskProfile::empty(address))
            }
        }
    }

    pub fn try_calibrate(
        &self,
        address: &str,
        provider: &dyn AccountInfoProvider,
        history: &[ActivityRecord],
    ) -> Result<RiskProfile, RiskError> {
        if address.is_empty() {
            return Err(RiskError::EmptyAddress);
        }
        let tables = self.snapshot();
        let balance = provider.balance(address)?;
        if !balance.is_finite() {
            return Err(RiskError::InvalidBalance(balance));
        }
        if let Some(bad) = history.iter().find(|r| !r.balance_delta.is_finite()) {
            return Err(RiskError::InvalidRecord(bad.signature.clone()));
        }

        let mut sorted: Vec<&ActivityRecord> = history.iter().collect();
        sorted.sort_by_key(|r| r.timestamp);
        let ctx = FactorContext {
            history: &sorted,
            balance,
            tables: &tables,
        };

        let mut factors = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            let factor = rule.evaluate(&ctx);
            if !factor.score.is_finite() {
                return Err(RiskError::NonFiniteScore(factor.factor_type));
            }
            if factor.score > 0.0 {
                debug!("{}: {:.3} ({})", factor.factor_type.as_str(), factor.score, factor.description);
            }
            factors.push(factor);
        }

        let score = compute_total(&factors);
        let category = tables.thresholds.categorize(score);
        info!(
            "Calibrated {address}: score {score:.1} ({}) over {} records",
            category.as_str(),
            history.len()
        );
        Ok(RiskProfile {
            address: address.to_string(),
            score,
            category,
            factors,
            last_updated: Utc::now(),
        })
    }
}

impl Default for RiskEngine {
    fn default() -> Self {
        Self::new(RiskTables::default())
    }
}

/// Sum of factor scores scaled to 0-100.
pub fn compute_total(factors: &[RiskFactor]) -> f64 {
    let sum: f64 = factors.iter().map(|f| f.score.clamp(0.0, 1.0)).sum();
    (sum * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixtures::at;
    use super::account::FixedBalance;
    use super::reference::ListKind;

    fn record(sig: &str, accounts: &[&str], secs: i64) -> ActivityRecord {
        ActivityRecord {
            signature: sig.to_string(),
            timestamp: at(secs),
            accounts: accounts.iter().map(|a| a.to_string()).collect(),
            balance_delta: 1.0,
            success: true,
            logs: Vec::new(),
        }
    }

    fn engine_with_sanctioned(address: &str) -> RiskEngine {
        let mut tables = RiskTables::default();
        tables.reference.insert(ListKind::Sanctioned, address);
        RiskEngine::new(tables)
    }

    #[test]
    fn category_thresholds() {
        assert_eq!(RiskCategory::from_score(0.0), RiskCategory::Low);
        assert_eq!(RiskCategory::from_score(39.9), RiskCategory::Low);
        assert_eq!(RiskCategory::from_score(40.0), RiskCategory::Medium);
        assert_eq!(RiskCategory::from_score(74.9), RiskCategory::Medium);
        assert_eq!(RiskCategory::from_score(75.0), RiskCategory::High);
        assert_eq!(RiskCategory::from_score(100.0), RiskCategory::High);
    }

    #[test]
    fn factor_severity_bands() {
        assert_eq!(RiskFactor::new(FactorType::HighVelocity, 0.95, "").severity, Severity::Critical);
        assert_eq!(RiskFactor::new(FactorType::HighVelocity, 0.7, "").severity, Severity::High);
        assert_eq!(RiskFactor::new(FactorType::HighVelocity, 0.4, "").severity, Severity::Medium);
        assert_eq!(RiskFactor::new(FactorType::HighVelocity, 0.1, "").severity, Severity::Low);
    }

    #[test]
    fn factor_score_clamped() {
        let f = RiskFactor::new(FactorType::WashTrading, 3.0, "");
        assert_eq!(f.score, 1.0);
        assert_eq!(f.impact, 100.0);
    }

    #[test]
    fn total_is_clamped() {
        let factors: Vec<RiskFactor> = (0..3)
            .map(|_| RiskFactor::new(FactorType::HighVelocity, 0.9, ""))
            .collect();
        assert_eq!(compute_total(&factors), 100.0);
        assert_eq!(compute_total(&[]), 0.0);
    }

    #[test]
    fn quiet_address_is_low() {
        let engine = RiskEngine::default();
        let profile = engine.calibrate("A", &FixedBalance::new(0.0), &[], None);
        assert_eq!(profile.score, 0.0);
        assert_eq!(profile.category, RiskCategory::Low);
        assert_eq!(profile.factors.len(), 10);
        assert!(profile.factors.iter().all(|f| f.score == 0.0));
    }

    #[test]
    fn sanctioned_interaction_dominates() {
        let engine = engine_with_sanctioned("BAD");
        let history = vec![record("s1", &["A", "BAD"], 0)];
        let profile = engine.calibrate("A", &FixedBalance::new(5.0), &history, None);
        let top = profile
            .factors
            .iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .unwrap();
        assert_eq!(top.factor_type, FactorType::HighRiskInteraction);
        assert!(top.severity >= Severity::High);
        assert!((profile.score - 95.0).abs() < 1e-9);
        assert_eq!(profile.category, RiskCategory::High);
    }

    #[test]
    fn balance_failure_falls_back_to_existing() {
        let engine = engine_with_sanctioned("BAD");
        let mut previous = RiskProfile::empty("A");
        previous.score = 42.0;
        previous.category = RiskCategory::Medium;
        let history = vec![record("s1", &["A", "BAD"], 0)];
        let profile = engine.calibrate("A", &FixedBalance::unavailable(), &history, Some(&previous));
        assert_eq!(profile, previous);
    }

    #[test]
    fn balance_failure_without_existing_is_empty() {
        let engine = RiskEngine::default();
        let profile = engine.calibrate("A", &FixedBalance::unavailable(), &[], None);
        assert_eq!(profile.score, 0.0);
        assert!(profile.factors.is_empty());
        assert_eq!(profile.address, "A");
    }

    #[test]
    fn empty_address_is_an_error() {
        let engine = RiskEngine::default();
        let err = engine.try_calibrate("", &FixedBalance::new(1.0), &[]).unwrap_err();
        assert!(matches!(err, RiskError::EmptyAddress));
    }

    #[test]
    fn non_finite_input_falls_back() {
        let engine = RiskEngine::default();
        let mut rec = record("s1", &["A", "B"], 0);
        rec.balance_delta = f64::INFINITY;
        let profile = engine.calibrate("A", &FixedBalance::new(0.01), &[rec], None);
        assert!(profile.factors.is_empty());

        let err = engine
            .try_calibrate("A", &FixedBalance::new(f64::NAN), &[])
            .unwrap_err();
        assert!(matches!(err, RiskError::InvalidBalance(_)));
    }

    #[test]
    fn refresh_is_seen_by_later_calls_only() {
        let engine = RiskEngine::default();
        let before = engine.snapshot();
        let mut tables = RiskTables::default();
        tables.reference.insert(ListKind::Mixer, "MIX");
        engine.refresh_tables(tables);
        assert!(!before.reference.contains(ListKind::Mixer, "MIX"));
        assert!(engine.snapshot().reference.contains(ListKind::Mixer, "MIX"));
    }
}
