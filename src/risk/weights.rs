use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::RiskCategory;
use super::reference::ListKind;

/// Per-factor multipliers, each in 0.0-1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibratedWeights {
    pub mixer: f64,
    pub sanctioned: f64,
    pub scam: f64,
    pub market_manipulation: f64,
    pub high_velocity: f64,
    pub unusual_hours: f64,
    pub new_account_high_activity: f64,
    pub low_balance_high_throughput: f64,
    pub complex_patterns: f64,
    pub wash_trading: f64,
    pub failed_transactions: f64,
    pub unusual_token_transfers: f64,
}

impl Default for CalibratedWeights {
    fn default() -> Self {
        Self {
            mixer: 0.90,
            sanctioned: 0.95,
            scam: 0.85,
            market_manipulation: 0.80,
            high_velocity: 0.60,
            unusual_hours: 0.40,
            new_account_high_activity: 0.50,
            low_balance_high_throughput: 0.55,
            complex_patterns: 0.45,
            wash_trading: 0.70,
            failed_transactions: 0.35,
            unusual_token_transfers: 0.50,
        }
    }
}

impl CalibratedWeights {
    pub const KEYS: [&'static str; 12] = [
        "mixer",
        "sanctioned",
        "scam",
        "market_manipulation",
        "high_velocity",
        "unusual_hours",
        "new_account_high_activity",
        "low_balance_high_throughput",
        "complex_patterns",
        "wash_trading",
        "failed_transactions",
        "unusual_token_transfers",
    ];

    pub fn get(&self, key: &str) -> Option<f64> {
        let value = match key {
            "mixer" => self.mixer,
            "sanctioned" => self.sanctioned,
            "scam" => self.scam,
            "market_manipulation" => self.market_manipulation,
            "high_velocity" => self.high_velocity,
            "unusual_hours" => self.unusual_hours,
            "new_account_high_activity" => self.new_account_high_activity,
            "low_balance_high_throughput" => self.low_balance_high_throughput,
            "complex_patterns" => self.complex_patterns,
            "wash_trading" => self.wash_trading,
            "failed_transactions" => self.failed_transactions,
            "unusual_token_transfers" => self.unusual_token_transfers,
            _ => return None,
        };
        Some(value)
    }

    fn slot_mut(&mut self, key: &str) -> Option<&mut f64> {
        let slot = match key {
            "mixer" => &mut self.mixer,
            "sanctioned" => &mut self.sanctioned,
            "scam" => &mut self.scam,
            "market_manipulation" => &mut self.market_manipulation,
            "high_velocity" => &mut self.high_velocity,
            "unusual_hours" => &mut self.unusual_hours,
            "new_account_high_activity" => &mut self.new_account_high_activity,
            "low_balance_high_throughput" => &mut self.low_balance_high_throughput,
            "complex_patterns" => &mut self.complex_patterns,
            "wash_trading" => &mut self.wash_trading,
            "failed_transactions" => &mut self.failed_transactions,
            "unusual_token_transfers" => &mut self.unusual_token_transfers,
            _ => return None,
        };
        Some(slot)
    }

    /// Weight for an interaction with a member of `kind`.
    pub fn for_list(&self, kind: ListKind) -> f64 {
        match kind {
            ListKind::Mixer => self.mixer,
            ListKind::Sanctioned => self.sanctioned,
            ListKind::Scam => self.scam,
            ListKind::MarketManipulation => self.market_manipulation,
            ListKind::SuspiciousToken => self.unusual_token_transfers,
        }
    }

    /// Overlay a calibration record. Values replace the current weight and
    /// are clamped to 0.0-1.0; unknown keys and non-finite values are skipped.
    pub fn apply(&self, record: &CalibrationRecord) -> Self {
        let mut next = self.clone();
        for (key, value) in &record.factor_adjustments {
            if !value.is_finite() {
                warn!("Ignoring non-finite weight for {key}");
                continue;
            }
            match next.slot_mut(key) {
                Some(slot) => *slot = value.clamp(0.0, 1.0),
                None => warn!("Ignoring unknown weight key {key}"),
            }
        }
        next
    }
}

/// Score cut-offs for the medium and high categories.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryThresholds {
    pub medium: f64,
    pub high: f64,
}

impl Default for CategoryThresholds {
    fn default() -> Self {
        Self {
            medium: 40.0,
            high: 75.0,
        }
    }
}

impl CategoryThresholds {
    pub fn categorize(&self, score: f64) -> RiskCategory {
        if score >= self.high {
            RiskCategory::High
        } else if score >= self.medium {
            RiskCategory::Medium
        } else {
            RiskCategory::Low
        }
    }

    /// Overlay `medium`/`high` from a record. A result where medium would
    /// exceed high is rejected and the current thresholds kept.
    pub fn apply(&self, record: &CalibrationRecord) -> Self {
        let mut next = *self;
        for (key, value) in &record.threshold_adjustments {
            if !value.is_finite() {
                warn!("Ignoring non-finite threshold for {key}");
                continue;
            }
            let value = value.clamp(0.0, 100.0);
            match key.as_str() {
                "medium" => next.medium = value,
                "high" => next.high = value,
                _ => warn!("Ignoring unknown threshold key {key}"),
            }
        }
        if next.medium > next.high {
            warn!(
                "Rejecting thresholds medium={} high={}: medium above high",
                next.medium, next.high
            );
            return *self;
        }
        next
    }
}

/// A stored calibration adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    #[serde(default)]
    pub factor_adjustments: BTreeMap<String, f64>,
    #[serde(default)]
    pub threshold_adjustments: BTreeMap<String, f64>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(factors: &[(&str, f64)], thresholds: &[(&str, f64)]) -> CalibrationRecord {
        CalibrationRecord {
            factor_adjustments: factors.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            threshold_adjustments: thresholds.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            description: "test".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn every_key_is_addressable() {
        let weights = CalibratedWeights::default();
        for key in CalibratedWeights::KEYS {
            assert!(weights.get(key).is_some(), "{key}");
        }
        assert_eq!(weights.get("nope"), None);
    }

    #[test]
    fn apply_overrides_and_clamps() {
        let weights = CalibratedWeights::default().apply(&record(
            &[("mixer", 0.5), ("scam", 1.7), ("bogus", 0.1), ("wash_trading", f64::NAN)],
            &[],
        ));
        assert_eq!(weights.mixer, 0.5);
        assert_eq!(weights.scam, 1.0);
        assert_eq!(weights.wash_trading, 0.70);
        assert_eq!(weights.sanctioned, 0.95);
    }

    #[test]
    fn thresholds_categorize() {
        let t = CategoryThresholds { medium: 20.0, high: 50.0 };
        assert_eq!(t.categorize(19.0), RiskCategory::Low);
        assert_eq!(t.categorize(20.0), RiskCategory::Medium);
        assert_eq!(t.categorize(50.0), RiskCategory::High);
    }

    #[test]
    fn inverted_thresholds_rejected() {
        let t = CategoryThresholds::default().apply(&record(&[], &[("medium", 90.0)]));
        assert_eq!(t, CategoryThresholds::default());
        let t = CategoryThresholds::default().apply(&record(&[], &[("medium", 30.0), ("high", 60.0)]));
        assert_eq!(t.medium, 30.0);
        assert_eq!(t.high, 60.0);
    }

    #[test]
    fn record_parses_with_defaults() {
        let r: CalibrationRecord =
            serde_json::from_str(r#"{"factor_adjustments":{"mixer":0.8}}"#).unwrap();
        assert_eq!(r.factor_adjustments["mixer"], 0.8);
        assert!(r.threshold_adjustments.is_empty());
        assert!(r.description.is_empty());
    }
}
