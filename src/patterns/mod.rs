pub mod aggregate;
pub mod amount;
pub mod behavioral;
pub mod catalog;
pub mod flow;
pub mod time;

use tracing::info;

use crate::core::{PatternResult, Transaction, TransactionPattern};
use catalog::PatternCatalog;

/// Runs every detector family over one address's history.
#[derive(Debug, Clone, Default)]
pub struct PatternEngine {
    catalog: PatternCatalog,
}

impl PatternEngine {
    pub fn new(catalog: PatternCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &PatternCatalog {
        &self.catalog
    }

    /// Raw detector output for enabled pattern types, in detector order.
    ///
    /// # Panics
    ///
    /// Panics if `subject` is empty.
    pub fn detect_raw(&self, transactions: &[Transaction], subject: &str) -> Vec<PatternResult> {
        assert!(!subject.is_empty(), "subject address must not be empty");
        let mut results = time::detect(transactions);
        results.extend(amount::detect(transactions));
        results.extend(flow::detect(transactions, subject));
        results.extend(behavioral::detect(transactions, subject));
        results.retain(|r| self.catalog.is_enabled(r.pattern_type));
        results
    }

    /// One aggregate per category, in `PatternCategory::ALL` order.
    ///
    /// # Panics
    ///
    /// Panics if `subject` is empty.
    pub fn detect(&self, transactions: &[Transaction], subject: &str) -> [TransactionPattern; 4] {
        let results = self.detect_raw(transactions, subject);
        let found = results.len();
        let aggregates = aggregate::aggregate(results);
        info!(
            "Pattern scan of {subject}: {} transactions, {found} patterns, {} high severity",
            transactions.len(),
            aggregates.iter().map(|a| a.high_severity_count).sum::<usize>()
        );
        aggregates
    }
}

/// Detect patterns with the built-in catalog.
///
/// # Panics
///
/// Panics if `subject` is empty.
pub fn detect_transaction_patterns(transactions: &[Transaction], subject: &str) -> [TransactionPattern; 4] {
    PatternEngine::default().detect(transactions, subject)
}
