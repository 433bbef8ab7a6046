//! Listing queries and result-cap fallback
//!
//! A listing query returns at most [`RESULT_CAP`] rows. When a window reports
//! exactly that many, rows beyond the cap are silently hidden, so the window
//! is re-queried once per [`RatingBucket`] and the bucket tables are
//! concatenated.

use crate::crawler::connection::Connection;
use crate::crawler::cursor::DateWindow;
use crate::crawler::parser::{parse_listing, ListingPage, ParseError};
use crate::encoding::{DecodedText, SourceEncoding};
use crate::record::ListingEntry;
use crate::CrawlError;

/// Server-imposed maximum number of results per query
pub const RESULT_CAP: usize = 1000;

const LISTING_PATH: &str = "/www/cob/find.nsf/classifications?search&searchwv=1&searchmax=1000&count=1000";

/// Path prefix of detail pages; the detail id is appended
pub const DETAIL_PATH: &str = "/www/cob/find.nsf/d853f429dd038ae1ca25759b0003557c/";

/// A named group of raw rating labels, OR'd together in a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingBucket {
    pub name: &'static str,
    pub labels: &'static [&'static str],
}

/// The rating space, partitioned into the buckets used for fallback queries
pub const RATING_BUCKETS: [RatingBucket; 11] = [
    RatingBucket {
        name: "Unrestricted",
        labels: &["Unrestricted"],
    },
    RatingBucket {
        name: "G",
        labels: &["Likely G", "G"],
    },
    RatingBucket {
        name: "PG",
        labels: &["Likely PG", "PG", "G 8+"],
    },
    RatingBucket {
        name: "M",
        labels: &["Likely M", "M"],
    },
    RatingBucket {
        name: "MA",
        labels: &["Likely MA 15+", "MA15+ Conditions", "MA 15+"],
    },
    RatingBucket {
        name: "R",
        labels: &["Likely R 18+", "R", "R 18+"],
    },
    RatingBucket {
        name: "X",
        labels: &["Likely X 18+", "X", "X 18+"],
    },
    RatingBucket {
        name: "CAT1",
        labels: &["CAT 1"],
    },
    RatingBucket {
        name: "CAT2",
        labels: &["CAT 2"],
    },
    RatingBucket {
        name: "RC",
        labels: &["RC"],
    },
    RatingBucket {
        name: "Misc",
        labels: &["Revoked", "Ad Approved", "Approved", "Ad Refused", "Refused"],
    },
];

impl RatingBucket {
    /// Query clause restricting results to this bucket's labels
    ///
    /// `["Likely G", "G"]` → `AND((%5Brating=Likely+G%5D)OR(%5Brating=G%5D))`
    pub fn clause(&self) -> String {
        let terms: Vec<String> = self
            .labels
            .iter()
            .map(|label| format!("(%5Brating={}%5D)", label.replace(' ', "+")))
            .collect();
        format!("AND({})", terms.join("OR"))
    }
}

/// Listing query path for a window, optionally restricted to a bucket
pub fn listing_path(window: &DateWindow, bucket: Option<&RatingBucket>) -> String {
    let mut path = format!(
        "{}&query=(%5BclassificationDate%5D%3E={})AND(%5BclassificationDate%5D%3C{})",
        LISTING_PATH, window.begin, window.end
    );
    if let Some(bucket) = bucket {
        path.push_str(&bucket.clause());
    }
    path
}

pub fn detail_path(detail_id: &str) -> String {
    format!("{}{}", DETAIL_PATH, detail_id)
}

/// Outcome of comparing a reported result count with the cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCount {
    /// Every matching record is in the table
    Complete(usize),

    /// The cap was reached; the table may be truncated
    Saturated,
}

/// Checks a reported count against [`RESULT_CAP`]
pub fn check_result_count(count: usize) -> ResultCount {
    if count >= RESULT_CAP {
        ResultCount::Saturated
    } else {
        ResultCount::Complete(count)
    }
}

/// Rows returned for one query of a window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingTable {
    /// The bucket the query was restricted to; `None` for the all-ratings query
    pub bucket: Option<&'static str>,
    pub entries: Vec<ListingEntry>,

    /// How the listing body was decoded; entry fields are normalized with it
    pub encoding: SourceEncoding,
}

/// Issues listing queries and applies the rating-bucket fallback
#[derive(Debug, Clone)]
pub struct ListingFetcher {
    buckets: &'static [RatingBucket],
}

impl Default for ListingFetcher {
    fn default() -> Self {
        Self {
            buckets: &RATING_BUCKETS,
        }
    }
}

impl ListingFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches every listing row of a window
    ///
    /// # Flow
    ///
    /// 1. Query the window across all ratings
    /// 2. No results table → the window has no records
    /// 3. Count below the cap → return the single table
    /// 4. Count at the cap → query each bucket, skip empty buckets, and
    ///    return the bucket tables in bucket order
    ///
    /// # Errors
    ///
    /// * `CrawlError::DataIntegrity` - a bucket itself reached the cap
    /// * `CrawlError::RetriesExhausted` - the connection gave up
    pub async fn fetch_window(
        &self,
        conn: &mut Connection,
        window: &DateWindow,
    ) -> Result<Vec<ListingTable>, CrawlError> {
        let (page, encoding) = match fetch_listing(conn, &listing_path(window, None)).await? {
            (Ok(page), encoding) => (page, encoding),
            (Err(e), _) => {
                tracing::warn!("Window {} yielded no listing ({}); skipping", window, e);
                return Ok(Vec::new());
            }
        };

        let count = page.reported_count.unwrap_or(page.entries.len());
        if let ResultCount::Complete(count) = check_result_count(count) {
            tracing::debug!(
                "Window {}: {} results, {} rows",
                window,
                count,
                page.entries.len()
            );
            return Ok(vec![ListingTable {
                bucket: None,
                entries: page.entries,
                encoding,
            }]);
        }

        tracing::info!(
            "Window {} hit the {} result cap; querying {} rating buckets",
            window,
            RESULT_CAP,
            self.buckets.len()
        );
        self.fetch_by_rating(conn, window).await
    }

    async fn fetch_by_rating(
        &self,
        conn: &mut Connection,
        window: &DateWindow,
    ) -> Result<Vec<ListingTable>, CrawlError> {
        let mut tables = Vec::new();

        for bucket in self.buckets {
            let (page, encoding) = match fetch_listing(conn, &listing_path(window, Some(bucket))).await? {
                (Ok(page), encoding) => (page, encoding),
                (Err(_), _) => {
                    tracing::debug!("Window {} bucket {}: no table", window, bucket.name);
                    continue;
                }
            };

            if page.entries.is_empty() {
                continue;
            }

            let count = page.reported_count.unwrap_or(page.entries.len());
            if check_result_count(count) == ResultCount::Saturated {
                return Err(CrawlError::DataIntegrity {
                    window: window.to_string(),
                    bucket: bucket.name.to_string(),
                    count,
                });
            }

            tracing::debug!(
                "Window {} bucket {}: {} rows",
                window,
                bucket.name,
                page.entries.len()
            );
            tables.push(ListingTable {
                bucket: Some(bucket.name),
                entries: page.entries,
                encoding,
            });
        }

        Ok(tables)
    }
}

/// GETs and parses a listing page
///
/// The outer `Result` carries transport failures, the inner one a page
/// without a results table.
async fn fetch_listing(
    conn: &mut Connection,
    path: &str,
) -> Result<(Result<ListingPage, ParseError>, SourceEncoding), CrawlError> {
    let body = conn.request(path).await?;
    let text = DecodedText::from_bytes(&body);
    Ok((parse_listing(text.as_str()), text.encoding()))
}
