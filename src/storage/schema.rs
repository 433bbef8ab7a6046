//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the register database.

/// SQL schema for the database
///
/// The `classifications` columns after `id` follow `Field::KNOWN`; the insert
/// statement is derived from that list.
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- One row per classification decision
CREATE TABLE IF NOT EXISTS classifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT,
    detail_id TEXT NOT NULL UNIQUE,
    classification TEXT,
    consumer_advice TEXT,
    category TEXT,
    medium TEXT,
    version TEXT,
    duration TEXT,
    date_of_classification TEXT,
    author TEXT,
    publisher TEXT,
    production_company TEXT,
    country_of_origin TEXT,
    applicant TEXT,
    file_number TEXT,
    classification_number TEXT,
    run_id INTEGER NOT NULL REFERENCES runs(id)
);

CREATE INDEX IF NOT EXISTS idx_classifications_date ON classifications(date_of_classification);
CREATE INDEX IF NOT EXISTS idx_classifications_rating ON classifications(classification);

-- Detail-form fields outside the known column set
CREATE TABLE IF NOT EXISTS classification_extras (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    classification_id INTEGER NOT NULL REFERENCES classifications(id),
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    UNIQUE(classification_id, key)
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
