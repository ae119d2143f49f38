use rusqlite::Connection;

pub fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS reference_addresses (
            address     TEXT NOT NULL,
            list        TEXT NOT NULL, -- mixer | sanctioned | scam | market_manipulation | suspicious_token
            source      TEXT,
            updated_at  TEXT NOT NULL,
            PRIMARY KEY (address, list)
        );

        CREATE TABLE IF NOT EXISTS calibration_records (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            description TEXT NOT NULL,
            record      TEXT NOT NULL, -- JSON
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS risk_profiles (
            address     TEXT PRIMARY KEY,
            score       REAL NOT NULL,
            category    TEXT NOT NULL,
            profile     TEXT NOT NULL, -- JSON
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pattern_catalog (
            pattern_type TEXT PRIMARY KEY,
            description  TEXT NOT NULL,
            enabled      INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS notification_log (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            address     TEXT NOT NULL,
            score       REAL NOT NULL,
            sent_at     INTEGER NOT NULL -- unix millis
        );

        CREATE INDEX IF NOT EXISTS idx_reference_list ON reference_addresses(list);
        CREATE INDEX IF NOT EXISTS idx_calibration_created ON calibration_records(created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_profiles_score ON risk_profiles(score DESC);
        ",
    )?;
    Ok(())
}
