use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::core::{ActivityRecord, Transaction};
use crate::risk::account::{AccountError, AccountInfoProvider, FixedBalance};

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing history: {0}")]
    Json(#[from] serde_json::Error),
}

/// A materialized account history as exported for one address.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryFile {
    /// Current balance; absent means the lookup fails.
    #[serde(default)]
    pub balance: Option<f64>,
    #[serde(default)]
    pub transactions: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    pub signature: String,
    pub from: String,
    pub to: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub accounts: Option<Vec<String>>,
    #[serde(default)]
    pub balance_delta: Option<f64>,
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub logs: Vec<String>,
}

fn default_success() -> bool {
    true
}

impl HistoryEntry {
    pub fn to_transaction(&self) -> Transaction {
        Transaction {
            signature: self.signature.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            amount: self.amount,
            timestamp: self.timestamp,
        }
    }

    /// Activity as seen from `subject`: outgoing amounts count negative.
    pub fn to_activity(&self, subject: &str) -> ActivityRecord {
        let accounts = self
            .accounts
            .clone()
            .unwrap_or_else(|| vec![self.from.clone(), self.to.clone()]);
        let balance_delta = self.balance_delta.unwrap_or(if self.from == subject {
            -self.amount
        } else {
            self.amount
        });
        ActivityRecord {
            signature: self.signature.clone(),
            timestamp: self.timestamp,
            accounts,
            balance_delta,
            success: self.success,
            logs: self.logs.clone(),
        }
    }
}

impl HistoryFile {
    pub fn load(path: &Path) -> Result<Self, InputError> {
        let contents = std::fs::read_to_string(path).map_err(|source| InputError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, InputError> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Keep only the `max` most recent entries.
    pub fn truncate_to_recent(&mut self, max: usize) {
        if self.transactions.len() <= max {
            return;
        }
        let dropped = self.transactions.len() - max;
        self.transactions.sort_by_key(|e| e.timestamp);
        self.transactions.drain(..dropped);
        tracing::info!("History capped at {max} entries ({dropped} oldest dropped)");
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.transactions.iter().map(HistoryEntry::to_transaction).collect()
    }

    pub fn activity(&self, subject: &str) -> Vec<ActivityRecord> {
        self.transactions.iter().map(|e| e.to_activity(subject)).collect()
    }

    pub fn balance_provider(&self) -> FixedBalance {
        match self.balance {
            Some(balance) => FixedBalance::new(balance),
            None => FixedBalance::unavailable(),
        }
    }
}

impl AccountInfoProvider for HistoryFile {
    fn balance(&self, address: &str) -> Result<f64, AccountError> {
        self.balance_provider().balance(address)
    }
}
