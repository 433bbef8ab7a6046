//! SQLite record store
//!
//! This module provides a SQLite-based implementation of the RecordStore trait.

use crate::record::{ClassificationRecord, Field};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{RecordStore, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use crate::CrawlError;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(CrawlError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, CrawlError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, CrawlError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn known_columns() -> String {
    Field::KNOWN
        .iter()
        .map(Field::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunStatus::Running),
    })
}

impl RecordStore for SqliteStore {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Records =====

    fn insert_record(
        &mut self,
        record: &ClassificationRecord,
        run_id: i64,
    ) -> StorageResult<bool> {
        if record.detail_id().is_empty() {
            return Err(StorageError::MissingDetailId(record.title().to_string()));
        }

        let placeholders = (1..=Field::KNOWN.len() + 1)
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT OR IGNORE INTO classifications ({}, run_id) VALUES ({})",
            known_columns(),
            placeholders
        );

        let values: Vec<Option<&str>> = Field::KNOWN.iter().map(|f| record.get(f)).collect();
        let mut bound: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();
        bound.push(&run_id);

        let tx = self.conn.transaction()?;
        if tx.execute(&sql, bound.as_slice())? == 0 {
            tracing::debug!("Record {} already stored", record.detail_id());
            return Ok(false);
        }

        let classification_id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO classification_extras (classification_id, key, value) VALUES (?1, ?2, ?3)",
            )?;
            for (key, value) in record.extensions() {
                stmt.execute(params![classification_id, key, value])?;
            }
        }
        tx.commit()?;

        Ok(true)
    }

    fn get_record(&self, detail_id: &str) -> StorageResult<Option<ClassificationRecord>> {
        let sql = format!(
            "SELECT id, {} FROM classifications WHERE detail_id = ?1",
            known_columns()
        );

        let row = self
            .conn
            .query_row(&sql, params![detail_id], |row| {
                let id: i64 = row.get(0)?;
                let mut record = ClassificationRecord::new();
                for (i, field) in Field::KNOWN.iter().enumerate() {
                    if let Some(value) = row.get::<_, Option<String>>(i + 1)? {
                        record.insert(field.clone(), value);
                    }
                }
                Ok((id, record))
            })
            .optional()?;

        let Some((id, mut record)) = row else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT key, value FROM classification_extras WHERE classification_id = ?1",
        )?;
        let extras = stmt
            .query_map(params![id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        record.merge(
            extras
                .into_iter()
                .map(|(key, value)| (Field::from_key(&key), value)),
        );

        Ok(Some(record))
    }

    fn count_records(&self) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM classifications", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn last_classification_date(&self) -> StorageResult<Option<NaiveDate>> {
        let date: Option<String> = self
            .conn
            .query_row(
                "SELECT date_of_classification FROM classifications
                 WHERE date_of_classification GLOB '[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9]'
                 ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        Ok(date.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()))
    }

    fn count_by_classification(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT COALESCE(classification, ''), COUNT(*) AS n FROM classifications
             GROUP BY 1 ORDER BY n DESC, 1 ASC",
        )?;

        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ListingEntry;

    fn record(detail_id: &str, date: &str, rating: &str) -> ClassificationRecord {
        let mut record = ClassificationRecord::from_entry(&ListingEntry {
            title: format!("Title {}", detail_id),
            detail_id: detail_id.to_string(),
        });
        record.insert(Field::DateOfClassification, date);
        record.insert(Field::Classification, rating);
        record
    }

    #[test]
    fn test_create_run() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let run_id = store.create_run("test_hash").unwrap();
        assert!(run_id > 0);

        let run = store.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.config_hash, "test_hash");
        assert!(run.finished_at.is_none());
    }

    #[test]
    fn test_finish_run() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let run_id = store.create_run("test_hash").unwrap();
        store.finish_run(run_id, RunStatus::Failed).unwrap();

        let latest = store.get_latest_run().unwrap().unwrap();
        assert_eq!(latest.id, run_id);
        assert_eq!(latest.status, RunStatus::Failed);
        assert!(latest.finished_at.is_some());

        assert!(matches!(
            store.finish_run(999, RunStatus::Completed),
            Err(StorageError::RunNotFound(999))
        ));
    }

    #[test]
    fn test_insert_record_deduplicates_by_detail_id() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let run_id = store.create_run("test_hash").unwrap();

        assert!(store.insert_record(&record("a1", "2000-01-03", "M"), run_id).unwrap());
        assert!(!store.insert_record(&record("a1", "2000-01-03", "PG"), run_id).unwrap());
        assert_eq!(store.count_records().unwrap(), 1);

        let stored = store.get_record("a1").unwrap().unwrap();
        assert_eq!(stored.get(&Field::Classification), Some("M"));
    }

    #[test]
    fn test_extension_fields_round_trip() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let run_id = store.create_run("test_hash").unwrap();

        let mut original = record("b2", "2001-06-15", "G");
        original.insert(Field::Other("assessor".to_string()), "J. Smith");
        store.insert_record(&original, run_id).unwrap();

        let stored = store.get_record("b2").unwrap().unwrap();
        assert_eq!(stored, original);
        assert!(store.get_record("missing").unwrap().is_none());
    }

    #[test]
    fn test_record_without_detail_id_is_rejected() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let run_id = store.create_run("test_hash").unwrap();
        let mut bare = ClassificationRecord::new();
        bare.insert(Field::Title, "Orphan");

        assert!(matches!(
            store.insert_record(&bare, run_id),
            Err(StorageError::MissingDetailId(_))
        ));
    }

    #[test]
    fn test_last_classification_date_skips_unparsed_dates() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        assert!(store.last_classification_date().unwrap().is_none());

        let run_id = store.create_run("test_hash").unwrap();
        store.insert_record(&record("a", "2003-02-20", "M"), run_id).unwrap();
        store.insert_record(&record("b", "2003-03-04", "M"), run_id).unwrap();
        store.insert_record(&record("c", "sometime 2003", "M"), run_id).unwrap();

        assert_eq!(
            store.last_classification_date().unwrap(),
            NaiveDate::from_ymd_opt(2003, 3, 4)
        );
    }

    #[test]
    fn test_count_by_classification() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let run_id = store.create_run("test_hash").unwrap();
        for (id, rating) in [("a", "M"), ("b", "PG"), ("c", "M"), ("d", "G")] {
            store.insert_record(&record(id, "2000-01-01", rating), run_id).unwrap();
        }

        let counts = store.count_by_classification().unwrap();
        assert_eq!(
            counts,
            vec![
                ("M".to_string(), 2),
                ("G".to_string(), 1),
                ("PG".to_string(), 1)
            ]
        );
    }
}
