//! Storage traits and error types
//!
//! This module defines the trait interface for record stores and
//! associated error types.

use crate::record::ClassificationRecord;
use crate::storage::{RunRecord, RunStatus};
use chrono::NaiveDate;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Record without detail id cannot be stored: {0}")]
    MissingDetailId(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for record store implementations
///
/// A store keeps crawl runs and the classification records they produced.
/// Records are keyed by detail id, so re-crawling an overlapping window after
/// a resume never duplicates a record.
pub trait RecordStore {
    // ===== Run Management =====

    /// Creates a new crawl run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Sets a run's final status and finish timestamp
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Records =====

    /// Stores a record unless one with the same detail id exists
    ///
    /// # Returns
    ///
    /// `true` if the record was inserted, `false` if it was already stored
    fn insert_record(&mut self, record: &ClassificationRecord, run_id: i64)
        -> StorageResult<bool>;

    /// Loads a stored record, extension fields included
    fn get_record(&self, detail_id: &str) -> StorageResult<Option<ClassificationRecord>>;

    fn count_records(&self) -> StorageResult<u64>;

    /// Classification date of the most recently stored record
    ///
    /// Records whose date is not ISO formatted are passed over. This is the
    /// checkpoint a resumed crawl continues from.
    fn last_classification_date(&self) -> StorageResult<Option<NaiveDate>>;

    /// Number of records per classification, most common first
    fn count_by_classification(&self) -> StorageResult<Vec<(String, u64)>>;
}
