//! Register-Crawl: a classification register harvester
//!
//! This crate walks a government film/media classification register in
//! half-month date windows, falls back to per-rating queries when a window
//! hits the server's result cap, and streams fully enriched classification
//! records to a consumer one at a time.

pub mod config;
pub mod crawler;
pub mod encoding;
pub mod output;
pub mod record;
pub mod storage;

use thiserror::Error;

/// Main error type for Register-Crawl operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gave up on {url} after {attempts} attempts: {reason}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("Rating bucket {bucket} saturated the result cap ({count} results) for window {window}; records may be missing")]
    DataIntegrity {
        window: String,
        bucket: String,
        count: usize,
    },

    #[error("Could not enforce UTF-8 for field '{field}' of record {detail_id}: {source}")]
    Encoding {
        detail_id: String,
        field: String,
        source: encoding::EncodingError,
    },

    #[error("Invalid checkpoint {day}/{month}/{year}")]
    InvalidCheckpoint { year: i32, month: u32, day: u32 },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Register-Crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{DateWindow, RecordStream};
pub use record::{ClassificationRecord, Field, ListingEntry};
