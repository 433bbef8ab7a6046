//! Lazy record stream over the register
//!
//! [`RecordStream`] is a pull-driven state machine. Each call to
//! [`RecordStream::next`] does only the network work needed to produce one
//! record: a listing query (plus bucket queries at the cap) when the current
//! window is used up, then one detail request per record.
//!
//! ```text
//! AdvanceWindow ──(listing rows)──► Enrich ──(row queue empty)──► AdvanceWindow
//!       │                                                              │
//!       └──────────────(date range exhausted)──► Done ◄────────────────┘
//! ```

use crate::config::{Config, EncodingPolicy};
use crate::crawler::connection::Connection;
use crate::crawler::cursor::{CursorPosition, DateWindow, DateWindows};
use crate::crawler::listing::{detail_path, ListingFetcher};
use crate::crawler::parser::{parse_detail, ParseError};
use crate::encoding::{DecodedText, EncodingError, SourceEncoding};
use crate::record::{ClassificationRecord, Field, ListingEntry};
use crate::{CrawlError, Result};
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    AdvanceWindow,
    Enrich,
    Done,
}

/// A listing row waiting for its detail page
#[derive(Debug, Clone)]
struct PendingEntry {
    entry: ListingEntry,
    encoding: SourceEncoding,
}

/// Counters for one stream's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Windows whose listings were fetched
    pub windows: u64,

    /// Windows that needed the per-rating fallback
    pub fallback_windows: u64,

    /// Records handed to the consumer
    pub records: u64,

    /// Rows dropped: no detail form, or undecodable under the skip policy
    pub skipped: u64,

    /// Rows that appeared in more than one bucket table of a window
    pub duplicates: u64,
}

/// Streams enriched classification records in date order
pub struct RecordStream {
    conn: Connection,
    windows: DateWindows,
    fetcher: ListingFetcher,
    policy: EncodingPolicy,
    state: StreamState,
    window: Option<DateWindow>,
    pending: VecDeque<PendingEntry>,
    seen: HashSet<String>,
    peeked: Option<ClassificationRecord>,
    stats: StreamStats,
}

impl RecordStream {
    /// Opens a stream over the configured year range
    ///
    /// No request is made until the first `next` or `peek`.
    pub fn new(config: &Config) -> Result<Self> {
        let conn = Connection::open(&config.connection, &config.user_agent)?;
        Ok(Self::with_connection(
            conn,
            config.crawler.start_year,
            config.crawler.finish_year,
            config.crawler.on_encoding_error,
        ))
    }

    /// Opens a stream over `[start, finish)` on an existing connection
    pub fn with_connection(
        conn: Connection,
        start: i32,
        finish: i32,
        policy: EncodingPolicy,
    ) -> Self {
        Self {
            conn,
            windows: DateWindows::new(start, finish),
            fetcher: ListingFetcher::new(),
            policy,
            state: StreamState::AdvanceWindow,
            window: None,
            pending: VecDeque::new(),
            seen: HashSet::new(),
            peeked: None,
            stats: StreamStats::default(),
        }
    }

    /// Returns the next record, or `None` once the date range is exhausted
    ///
    /// # Errors
    ///
    /// Errors do not poison the stream: after a failed window or record the
    /// stream is positioned past it, and the caller may keep pulling or
    /// [`resume`](Self::resume) from a checkpoint.
    pub async fn next(&mut self) -> Result<Option<ClassificationRecord>> {
        if let Some(record) = self.peeked.take() {
            return Ok(Some(record));
        }
        self.produce().await
    }

    /// Returns the record the next `next` call will yield, without consuming it
    pub async fn peek(&mut self) -> Result<Option<&ClassificationRecord>> {
        if self.peeked.is_none() {
            self.peeked = self.produce().await?;
        }
        Ok(self.peeked.as_ref())
    }

    /// Repositions the stream after the split point `(year, month, day)`
    ///
    /// The first window produced afterwards begins at the split point that
    /// follows the given one. Any buffered rows or peeked record are dropped.
    pub fn resume(&mut self, year: i32, month: u32, day: u32) -> Result<()> {
        let position = CursorPosition::new(year, month, day)?;
        self.resume_at(position);
        Ok(())
    }

    pub fn resume_at(&mut self, position: CursorPosition) {
        tracing::info!("Resuming after {}", position);
        self.windows.reset(position);
        self.pending.clear();
        self.seen.clear();
        self.peeked = None;
        self.window = None;
        self.state = StreamState::AdvanceWindow;
    }

    /// Position to resume from to re-crawl the window in progress
    ///
    /// `None` before the first window has been fetched.
    pub fn checkpoint(&self) -> Option<CursorPosition> {
        let begin = self.window?.begin.to_date()?;
        Some(CursorPosition::preceding(begin))
    }

    /// The window whose rows are currently being enriched
    pub fn current_window(&self) -> Option<DateWindow> {
        self.window
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Times the underlying connection has been re-established
    pub fn reconnects(&self) -> u64 {
        self.conn.reconnects()
    }

    pub fn is_done(&self) -> bool {
        self.state == StreamState::Done && self.peeked.is_none()
    }

    async fn produce(&mut self) -> Result<Option<ClassificationRecord>> {
        loop {
            match self.state {
                StreamState::Done => return Ok(None),
                StreamState::AdvanceWindow => {
                    let Some(window) = self.windows.next_window() else {
                        tracing::info!("Date range exhausted");
                        self.state = StreamState::Done;
                        return Ok(None);
                    };
                    self.load_window(window).await?;
                    self.state = StreamState::Enrich;
                }
                StreamState::Enrich => {
                    let Some(pending) = self.pending.pop_front() else {
                        self.state = StreamState::AdvanceWindow;
                        continue;
                    };

                    match self.enrich(&pending).await {
                        Ok(Some(record)) => {
                            self.stats.records += 1;
                            return Ok(Some(record));
                        }
                        Ok(None) => self.stats.skipped += 1,
                        Err(e @ CrawlError::Encoding { .. })
                            if self.policy == EncodingPolicy::Skip =>
                        {
                            tracing::warn!("Skipping record: {}", e);
                            self.stats.skipped += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }

    /// Fetches a window's listing rows into the pending queue
    async fn load_window(&mut self, window: DateWindow) -> Result<()> {
        self.window = Some(window);
        self.seen.clear();
        self.stats.windows += 1;

        let tables = self.fetcher.fetch_window(&mut self.conn, &window).await?;
        if tables.iter().any(|t| t.bucket.is_some()) {
            self.stats.fallback_windows += 1;
        }

        for table in tables {
            for entry in table.entries {
                if !self.seen.insert(entry.detail_id.clone()) {
                    tracing::debug!("Duplicate row {} in window {}", entry.detail_id, window);
                    self.stats.duplicates += 1;
                    continue;
                }
                self.pending.push_back(PendingEntry {
                    entry,
                    encoding: table.encoding,
                });
            }
        }

        tracing::debug!("Window {}: {} rows queued", window, self.pending.len());
        Ok(())
    }

    /// Fetches a row's detail page and builds the UTF-8 record
    ///
    /// Listing fields are normalized with the listing page's decoding; detail
    /// fields come out of the parser already normalized.
    ///
    /// Returns `Ok(None)` when the detail page has no form.
    async fn enrich(&mut self, pending: &PendingEntry) -> Result<Option<ClassificationRecord>> {
        let detail_id = &pending.entry.detail_id;
        let body = self.conn.request(&detail_path(detail_id)).await?;
        let text = DecodedText::from_bytes(&body);

        let encoding_error = |field: Field, source: EncodingError| CrawlError::Encoding {
            detail_id: detail_id.clone(),
            field: field.to_string(),
            source,
        };

        let fields = match parse_detail(&text) {
            Ok(Some(fields)) => fields,
            Ok(None) => {
                tracing::warn!("Detail page {} has no form; skipping", detail_id);
                return Ok(None);
            }
            Err(ParseError::Encoding { field, source }) => return Err(encoding_error(field, source)),
            Err(e) => {
                tracing::warn!("Detail page {} could not be parsed: {}", detail_id, e);
                return Ok(None);
            }
        };

        let mut record = ClassificationRecord::from_entry(&pending.entry)
            .try_map_values(|_, value| pending.encoding.normalize_field(value))
            .map_err(|(field, source)| encoding_error(field, source))?;

        record.merge(fields);
        Ok(Some(record))
    }
}
