pub mod config;
pub mod core;
pub mod db;
pub mod input;
pub mod notifications;
pub mod patterns;
pub mod risk;

pub use crate::core::{
    ActivityRecord, PatternCategory, PatternResult, PatternType, Severity, Transaction, TransactionPattern,
};
pub use crate::patterns::catalog::PatternCatalog;
pub use crate::patterns::{PatternEngine, detect_transaction_patterns};
pub use crate::risk::account::{AccountError, AccountInfoProvider};
pub use crate::risk::{RiskCategory, RiskEngine, RiskFactor, RiskProfile, RiskTables};

/// Score `address` with built-in weights and empty reference lists.
///
/// Never fails; see [`RiskEngine::calibrate`].
pub fn calibrate_risk_score(
    address: &str,
    provider: &dyn AccountInfoProvider,
    history: &[ActivityRecord],
    existing: Option<&RiskProfile>,
) -> RiskProfile {
    RiskEngine::default().calibrate(address, provider, history, existing)
}
