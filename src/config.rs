use serde::Deserialize;
use std::path::Path;

use crate::risk::weights::{CalibratedWeights, CategoryThresholds};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub calibration: CalibrationConfig,
    pub reference: ReferenceConfig,
    pub database: DatabaseConfig,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    /// Most recent records kept when a history is longer than this.
    pub max_history: usize,
}

/// Baseline weights and thresholds; a stored calibration record is
/// applied on top.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CalibrationConfig {
    pub weights: CalibratedWeights,
    pub thresholds: CategoryThresholds,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ReferenceConfig {
    pub lists_csv: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub min_score: f64,
    pub cooldown_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_history: 5000 }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/txsentinel.db".into(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_score: 75.0,
            cooldown_seconds: 30,
        }
    }
}

impl Config {
    /// Load config from a TOML file. Falls back to defaults if file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("Config file {} not found, using defaults", path.display());
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse {}: {e}, using defaults", path.display());
                Self::default()
            }),
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        let config = toml::from_str(contents)?;
        tracing::info!("Config parsed");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.engine.max_history, 5000);
        assert_eq!(config.calibration.weights, CalibratedWeights::default());
        assert_eq!(config.calibration.thresholds.high, 75.0);
        assert!(config.reference.lists_csv.is_none());
        assert!(config.notifications.enabled);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
            [engine]
            max_history = 100

            [calibration.weights]
            mixer = 0.5

            [calibration.thresholds]
            medium = 30.0

            [reference]
            lists_csv = "lists.csv"
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.max_history, 100);
        assert_eq!(config.calibration.weights.mixer, 0.5);
        assert_eq!(config.calibration.weights.sanctioned, 0.95);
        assert_eq!(config.calibration.thresholds.medium, 30.0);
        assert_eq!(config.calibration.thresholds.high, 75.0);
        assert_eq!(config.reference.lists_csv.as_deref(), Some("lists.csv"));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::load("/nonexistent/txsentinel.toml");
        assert_eq!(config.database.path, "data/txsentinel.db");
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(Config::parse("[engine\nmax_history = ").is_err());
    }
}
