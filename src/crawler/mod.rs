//! Crawler module for walking the classification register
//!
//! This module contains the core crawling logic, including:
//! - Half-month date windows and resumable cursors
//! - The persistent, self-healing connection to the register host
//! - Listing and detail page parsing
//! - The result-cap fallback over rating buckets
//! - The lazy record stream tying it together

mod connection;
mod cursor;
mod listing;
mod parser;
mod stream;

pub use connection::{build_http_client, Connection, RetryPolicy};
pub use cursor::{CursorPosition, DateCursor, DateWindow, DateWindows};
pub use listing::{
    check_result_count, detail_path, listing_path, ListingFetcher, ListingTable, RatingBucket,
    ResultCount, RATING_BUCKETS, RESULT_CAP,
};
pub use parser::{
    clean_value, detail_id_from_href, extract_medium, iso_date, parse_detail, parse_listing,
    parse_result_count, parse_table, DetailFields, ListingPage, ParseError,
};
pub use stream::{RecordStream, StreamStats};
