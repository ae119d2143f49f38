use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::PatternType;
use crate::db::{SharedDatabase, StoreError};

/// A known pattern and whether the engine should report it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDefinition {
    pub pattern_type: PatternType,
    pub description: String,
    pub enabled: bool,
}

fn builtin_description(pattern_type: PatternType) -> &'static str {
    match pattern_type {
        PatternType::RapidSuccession => "Three or more transactions within 30 seconds",
        PatternType::PeriodicTransactions => "Near-constant spacing between consecutive transactions",
        PatternType::UnusualHours => "Activity concentrated between 01:00 and 05:59 UTC",
        PatternType::BurstActivity => "Days with volume far above the daily average",
        PatternType::RoundAmounts => "Unusually many round-number amounts",
        PatternType::StructuredAmounts => "Amounts just below common reporting thresholds",
        PatternType::RepeatingAmounts => "The same amount sent again and again",
        PatternType::SplittingPattern => "A large amount followed by smaller pieces summing to it",
        PatternType::CircularTransactions => "Funds returning to their origin through intermediaries",
        PatternType::Layering => "Long one-way chains of transfers",
        PatternType::Funnel => "Many sources paying one destination",
        PatternType::FanOut => "One source paying many destinations",
        PatternType::WashTrading => "Balanced back-and-forth transfers with one counterparty",
        PatternType::Smurfing => "Many small, similar deposits on the same day",
        PatternType::AutomatedTrading => "Exactly repeating intervals typical of bots",
        PatternType::HourlySpike => "Hours with volume far above the hourly average",
    }
}

/// The set of pattern definitions the engine consults.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternCatalog {
    definitions: BTreeMap<PatternType, PatternDefinition>,
}

impl PatternCatalog {
    /// Built-in definitions for every pattern type, all enabled.
    pub fn seed() -> Self {
        let definitions = PatternType::ALL
            .into_iter()
            .map(|t| {
                (
                    t,
                    PatternDefinition {
                        pattern_type: t,
                        description: builtin_description(t).to_string(),
                        enabled: true,
                    },
                )
            })
            .collect();
        Self { definitions }
    }

    /// Stored definitions over the built-in seed. Types missing from the
    /// store keep their seeded definition.
    pub fn load(db: &SharedDatabase) -> Result<Self, StoreError> {
        let mut catalog = Self::seed();
        let stored = db.pattern_definitions()?;
        let count = stored.len();
        for definition in stored {
            catalog.definitions.insert(definition.pattern_type, definition);
        }
        tracing::info!(
            "PatternCatalog loaded {count} stored definitions ({} disabled)",
            catalog.disabled().count()
        );
        Ok(catalog)
    }

    pub fn save(&self, db: &SharedDatabase) -> Result<(), StoreError> {
        let definitions: Vec<PatternDefinition> = self.definitions.values().cloned().collect();
        db.save_pattern_definitions(&definitions)
    }

    pub fn get(&self, pattern_type: PatternType) -> Option<&PatternDefinition> {
        self.definitions.get(&pattern_type)
    }

    pub fn is_enabled(&self, pattern_type: PatternType) -> bool {
        self.definitions.get(&pattern_type).is_some_and(|d| d.enabled)
    }

    pub fn set_enabled(&mut self, pattern_type: PatternType, enabled: bool) {
        self.definitions
            .entry(pattern_type)
            .or_insert_with(|| PatternDefinition {
                pattern_type,
                description: builtin_description(pattern_type).to_string(),
                enabled,
            })
            .enabled = enabled;
    }

    pub fn definitions(&self) -> impl Iterator<Item = &PatternDefinition> {
        self.definitions.values()
    }

    fn disabled(&self) -> impl Iterator<Item = &PatternDefinition> {
        self.definitions.values().filter(|d| !d.enabled)
    }
}

impl Default for PatternCatalog {
    fn default() -> Self {
        Self::seed()
    }
}
