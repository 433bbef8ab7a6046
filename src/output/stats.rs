//! Statistics generation from the record store
//!
//! This module provides functionality for extracting and displaying
//! statistics about stored classification records.

use crate::storage::{RecordStore, RunRecord};
use crate::CrawlError;
use chrono::NaiveDate;
use std::fmt::Write;

/// Record store statistics summary
#[derive(Debug, Clone)]
pub struct RegisterStatistics {
    /// Total number of stored records
    pub total_records: u64,

    /// Record count per classification, most common first
    pub by_classification: Vec<(String, u64)>,

    /// Date a resumed crawl would continue from
    pub last_classification_date: Option<NaiveDate>,

    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `store` - The record store to query
///
/// # Returns
///
/// * `Ok(RegisterStatistics)` - Successfully loaded statistics
/// * `Err(CrawlError)` - Failed to query statistics
pub fn load_statistics(store: &dyn RecordStore) -> Result<RegisterStatistics, CrawlError> {
    Ok(RegisterStatistics {
        total_records: store.count_records()?,
        by_classification: store.count_by_classification()?,
        last_classification_date: store.last_classification_date()?,
        latest_run: store.get_latest_run()?,
    })
}

/// Renders statistics as the report printed by `--stats`
pub fn format_statistics(stats: &RegisterStatistics) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "=== Register Statistics ===\n");

    let _ = writeln!(out, "Overview:");
    let _ = writeln!(out, "  Total records: {}", stats.total_records);
    match stats.last_classification_date {
        Some(date) => {
            let _ = writeln!(out, "  Last classification date: {}", date);
        }
        None => {
            let _ = writeln!(out, "  Last classification date: none");
        }
    }
    if let Some(run) = &stats.latest_run {
        let _ = writeln!(
            out,
            "  Latest run: #{} ({}, started {})",
            run.id,
            run.status.to_db_string(),
            run.started_at
        );
    }
    let _ = writeln!(out);

    if !stats.by_classification.is_empty() {
        let _ = writeln!(out, "Records by Classification:");
        for (classification, count) in &stats.by_classification {
            let percentage = if stats.total_records > 0 {
                (*count as f64 / stats.total_records as f64) * 100.0
            } else {
                0.0
            };
            let label = if classification.is_empty() {
                "(none)"
            } else {
                classification
            };
            let _ = writeln!(out, "  {}: {} ({:.1}%)", label, count, percentage);
        }
        let _ = writeln!(out);
    }

    out
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &RegisterStatistics) {
    print!("{}", format_statistics(stats));
}
