//! Output module for reporting on stored crawl results
//!
//! This module handles:
//! - Loading record statistics from the store
//! - Rendering them for the `--stats` mode of the binary

pub mod stats;

pub use stats::{format_statistics, load_statistics, print_statistics, RegisterStatistics};
