use std::collections::HashMap;

/// Source of current account state consulted during calibration.
pub trait AccountInfoProvider {
    /// Native balance of `address`.
    fn balance(&self, address: &str) -> Result<f64, AccountError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("account {0} not found")]
    NotFound(String),
    #[error("account lookup unavailable: {0}")]
    Unavailable(String),
}

/// Any closure of the right shape can stand in for a provider.
impl<F> AccountInfoProvider for F
where
    F: Fn(&str) -> Result<f64, AccountError>,
{
    fn balance(&self, address: &str) -> Result<f64, AccountError> {
        self(address)
    }
}

/// Returns one configured balance for every address, or fails every lookup.
#[derive(Debug, Clone, Copy)]
pub struct FixedBalance(Option<f64>);

impl FixedBalance {
    pub fn new(balance: f64) -> Self {
        Self(Some(balance))
    }

    pub fn unavailable() -> Self {
        Self(None)
    }
}

impl AccountInfoProvider for FixedBalance {
    fn balance(&self, _address: &str) -> Result<f64, AccountError> {
        self.0
            .ok_or_else(|| AccountError::Unavailable("no balance configured".to_string()))
    }
}

/// Per-address balances, e.g. from an exported snapshot.
#[derive(Debug, Clone, Default)]
pub struct BalanceSheet {
    balances: HashMap<String, f64>,
}

impl BalanceSheet {
    pub fn insert(&mut self, address: impl Into<String>, balance: f64) {
        self.balances.insert(address.into(), balance);
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

impl AccountInfoProvider for BalanceSheet {
    fn balance(&self, address: &str) -> Result<f64, AccountError> {
        self.balances
            .get(address)
            .copied()
            .ok_or_else(|| AccountError::NotFound(address.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_balance() {
        assert_eq!(FixedBalance::new(2.5).balance("any").unwrap(), 2.5);
        assert!(matches!(
            FixedBalance::unavailable().balance("any"),
            Err(AccountError::Unavailable(_))
        ));
    }

    #[test]
    fn balance_sheet_lookup() {
        let mut sheet = BalanceSheet::default();
        sheet.insert("A", 10.0);
        assert_eq!(sheet.balance("A").unwrap(), 10.0);
        assert!(matches!(sheet.balance("B"), Err(AccountError::NotFound(a)) if a == "B"));
    }

    #[test]
    fn closure_provider() {
        let provider = |addr: &str| -> Result<f64, AccountError> { Ok(addr.len() as f64) };
        assert_eq!(provider.balance("abc").unwrap(), 3.0);
    }
}
