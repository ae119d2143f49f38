pub mod schema;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::core::PatternType;
use crate::patterns::catalog::PatternDefinition;
use crate::risk::RiskProfile;
use crate::risk::reference::{ListKind, ReferenceEntry};
use crate::risk::weights::CalibrationRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub struct Database {
    conn: Connection,
}

/// Thread-safe wrapper around Database.
#[derive(Clone)]
pub struct SharedDatabase {
    inner: Arc<Mutex<Database>>,
}

impl SharedDatabase {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Database::open(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(db)),
        })
    }

    // A panic while holding the lock leaves SQLite itself consistent.
    fn lock(&self) -> MutexGuard<'_, Database> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace a reference-list membership.
    pub fn insert_reference(&self, entry: &ReferenceEntry) -> Result<(), StoreError> {
        self.lock().insert_reference(entry)
    }

    /// Returns whether a row was removed.
    pub fn remove_reference(&self, address: &str, list: ListKind) -> Result<bool, StoreError> {
        self.lock().remove_reference(address, list)
    }

    pub fn all_references(&self) -> Result<Vec<ReferenceEntry>, StoreError> {
        self.lock().all_references()
    }

    /// Bulk-load reference entries from a CSV file (`address,list,source`).
    pub fn load_references_from_csv(&self, path: &Path) -> Result<usize, StoreError> {
        self.lock().load_references_from_csv(path)
    }

    /// Persist a calibration record. Returns its row id.
    pub fn save_calibration(&self, record: &CalibrationRecord) -> Result<i64, StoreError> {
        self.lock().save_calibration(record)
    }

    /// Most recently created calibration record, if any.
    pub fn latest_calibration(&self) -> Result<Option<CalibrationRecord>, StoreError> {
        self.lock().latest_calibration()
    }

    pub fn save_profile(&self, profile: &RiskProfile) -> Result<(), StoreError> {
        self.lock().save_profile(profile)
    }

    pub fn load_profile(&self, address: &str) -> Result<Option<RiskProfile>, StoreError> {
        self.lock().load_profile(address)
    }

    /// Stored profiles with score ≥ `min_score`, highest first.
    pub fn profiles_above_score(&self, min_score: f64, limit: usize) -> Result<Vec<RiskProfile>, StoreError> {
        self.lock().profiles_above_score(min_score, limit)
    }

    /// Replace the stored catalog entries in a single transaction.
    pub fn save_pattern_definitions(&self, definitions: &[PatternDefinition]) -> Result<(), StoreError> {
        self.lock().save_pattern_definitions(definitions)
    }

    pub fn pattern_definitions(&self) -> Result<Vec<PatternDefinition>, StoreError> {
        self.lock().pattern_definitions()
    }

    pub fn record_notification(&self, profile: &RiskProfile, sent_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.lock().record_notification(profile, sent_at)
    }

    /// When the most recent desktop notification went out, across all addresses.
    pub fn last_notification_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.lock().last_notification_at()
    }
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    pub fn insert_reference(&self, entry: &ReferenceEntry) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO reference_addresses (address, list, source, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))",
            rusqlite::params![entry.address, entry.list.as_str(), entry.source],
        )?;
        Ok(())
    }

    pub fn remove_reference(&self, address: &str, list: ListKind) -> Result<bool, StoreError> {
        let n = self.conn.execute(
            "DELETE FROM reference_addresses WHERE address = ?1 AND list = ?2",
            rusqlite::params![address, list.as_str()],
        )?;
        Ok(n > 0)
    }

    pub fn all_references(&self) -> Result<Vec<ReferenceEntry>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT address, list, source FROM reference_addresses ORDER BY list, address")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;
        let mut entries = Vec::new();
        for row in rows {
            let (address, list, source) = row?;
            match ListKind::parse(&list) {
                Some(list) => entries.push(ReferenceEntry { address, list, source }),
                None => tracing::warn!("Skipping {address}: unknown list {list:?}"),
            }
        }
        Ok(entries)
    }

    pub fn load_references_from_csv(&self, path: &Path) -> Result<usize, StoreError> {
        let content = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let tx = self.conn.unchecked_transaction()?;
        let mut count = 0;
        for (lineno, line) in content.lines().enumerate().skip(1) {
            // skip header
            let parts: Vec<&str> = line.splitn(3, ',').map(str::trim).collect();
            if parts.len() < 2 || parts[0].is_empty() {
                continue;
            }
            let Some(list) = ListKind::parse(parts[1]) else {
                tracing::warn!("{}:{}: unknown list {:?}", path.display(), lineno + 1, parts[1]);
                continue;
            };
            let entry = ReferenceEntry {
                address: parts[0].to_string(),
                list,
                source: parts.get(2).filter(|s| !s.is_empty()).map(|s| s.to_string()),
            };
            self.insert_reference(&entry)?;
            count += 1;
        }
        tx.commit()?;
        Ok(count)
    }

    pub fn save_calibration(&self, record: &CalibrationRecord) -> Result<i64, StoreError> {
        let json = serde_json::to_string(record)?;
        self.conn.execute(
            "INSERT INTO calibration_records (description, record, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![record.description, json, record.created_at.to_rfc3339()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn latest_calibration(&self) -> Result<Option<CalibrationRecord>, StoreError> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT record FROM calibration_records ORDER BY created_at DESC, id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    pub fn save_profile(&self, profile: &RiskProfile) -> Result<(), StoreError> {
        let json = serde_json::to_string(profile)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO risk_profiles (address, score, category, profile, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                profile.address,
                profile.score,
                profile.category.as_str(),
                json,
                profile.last_updated.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn load_profile(&self, address: &str) -> Result<Option<RiskProfile>, StoreError> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT profile FROM risk_profiles WHERE address = ?1",
                rusqlite::params![address],
                |row| row.get(0),
            )
            .optional()?;
        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    pub fn profiles_above_score(&self, min_score: f64, limit: usize) -> Result<Vec<RiskProfile>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT profile FROM risk_profiles WHERE score >= ?1 ORDER BY score DESC, address LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![min_score, limit as i64], |row| row.get::<_, String>(0))?;
        let mut profiles = Vec::new();
        for json in rows {
            profiles.push(serde_json::from_str(&json?)?);
        }
        Ok(profiles)
    }

    pub fn save_pattern_definitions(&self, definitions: &[PatternDefinition]) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO pattern_catalog (pattern_type, description, enabled) VALUES (?1, ?2, ?3)",
            )?;
            for d in definitions {
                stmt.execute(rusqlite::params![d.pattern_type.as_str(), d.description, d.enabled as i32])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn pattern_definitions(&self) -> Result<Vec<PatternDefinition>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT pattern_type, description, enabled FROM pattern_catalog")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i32>(2)?,
            ))
        })?;
        let mut definitions = Vec::new();
        for row in rows {
            let (name, description, enabled) = row?;
            match PatternType::parse(&name) {
                Some(pattern_type) => definitions.push(PatternDefinition {
                    pattern_type,
                    description,
                    enabled: enabled != 0,
                }),
                None => tracing::warn!("Skipping unknown pattern type {name:?} in catalog"),
            }
        }
        Ok(definitions)
    }

    pub fn record_notification(&self, profile: &RiskProfile, sent_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO notification_log (address, score, sent_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![profile.address, profile.score, sent_at.timestamp_millis()],
        )?;
        Ok(())
    }

    pub fn last_notification_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let millis: Option<i64> = self
            .conn
            .query_row("SELECT MAX(sent_at) FROM notification_log", [], |row| row.get(0))?;
        Ok(millis.and_then(DateTime::from_timestamp_millis))
    }
}
