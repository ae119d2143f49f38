use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::db::SharedDatabase;

/// Which curated list an address belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Mixer,
    Sanctioned,
    Scam,
    MarketManipulation,
    /// Token mints, matched against transaction logs.
    SuspiciousToken,
}

impl ListKind {
    pub const ALL: [ListKind; 5] = [
        ListKind::Mixer,
        ListKind::Sanctioned,
        ListKind::Scam,
        ListKind::MarketManipulation,
        ListKind::SuspiciousToken,
    ];

    /// Lists whose members count as high-risk counterparties.
    pub const COUNTERPARTY: [ListKind; 4] = [
        ListKind::Mixer,
        ListKind::Sanctioned,
        ListKind::Scam,
        ListKind::MarketManipulation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ListKind::Mixer => "mixer",
            ListKind::Sanctioned => "sanctioned",
            ListKind::Scam => "scam",
            ListKind::MarketManipulation => "market_manipulation",
            ListKind::SuspiciousToken => "suspicious_token",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ListKind::Mixer => "mixer service",
            ListKind::Sanctioned => "sanctioned entity",
            ListKind::Scam => "known scam",
            ListKind::MarketManipulation => "market manipulation",
            ListKind::SuspiciousToken => "suspicious token",
        }
    }
}

/// A persisted list membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub address: String,
    pub list: ListKind,
    pub source: Option<String>,
}

/// In-memory sets of known addresses, one per list.
#[derive(Debug, Clone, Default)]
pub struct ReferenceLists {
    lists: HashMap<ListKind, HashSet<String>>,
}

impl ReferenceLists {
    /// Load every stored entry into memory. A failed read yields empty lists.
    pub fn load_from_db(db: &SharedDatabase) -> Self {
        let entries = match db.all_references() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to read reference lists: {e}");
                Vec::new()
            }
        };
        let lists = Self::from_entries(entries);
        tracing::info!("ReferenceLists loaded {} addresses into memory", lists.total());
        lists
    }

    pub fn from_entries(entries: impl IntoIterator<Item = ReferenceEntry>) -> Self {
        let mut lists = Self::default();
        for entry in entries {
            lists.insert(entry.list, entry.address);
        }
        lists
    }

    pub fn insert(&mut self, kind: ListKind, address: impl Into<String>) {
        self.lists.entry(kind).or_default().insert(address.into());
    }

    pub fn contains(&self, kind: ListKind, address: &str) -> bool {
        self.lists.get(&kind).is_some_and(|set| set.contains(address))
    }

    /// Number of addresses on one list.
    pub fn len(&self, kind: ListKind) -> usize {
        self.lists.get(&kind).map_or(0, HashSet::len)
    }

    pub fn total(&self) -> usize {
        self.lists.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_names() {
        for kind in ListKind::ALL {
            assert_eq!(ListKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ListKind::parse("exchange"), None);
    }

    #[test]
    fn membership_is_per_list() {
        let mut lists = ReferenceLists::default();
        lists.insert(ListKind::Mixer, "M1");
        lists.insert(ListKind::Mixer, "M1");
        lists.insert(ListKind::Scam, "S1");
        assert!(lists.contains(ListKind::Mixer, "M1"));
        assert!(!lists.contains(ListKind::Scam, "M1"));
        assert_eq!(lists.len(ListKind::Mixer), 1);
        assert_eq!(lists.len(ListKind::Sanctioned), 0);
        assert_eq!(lists.total(), 2);
    }

    #[test]
    fn from_entries_groups_by_list() {
        let lists = ReferenceLists::from_entries(vec![
            ReferenceEntry { address: "A".into(), list: ListKind::Sanctioned, source: None },
            ReferenceEntry { address: "T".into(), list: ListKind::SuspiciousToken, source: Some("feed".into()) },
        ]);
        assert!(lists.contains(ListKind::Sanctioned, "A"));
        assert!(lists.contains(ListKind::SuspiciousToken, "T"));
        assert!(!lists.is_empty());
    }
}
