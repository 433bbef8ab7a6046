//! Half-month date windows
//!
//! The register caps every query at 1000 results, so the crawl is split into
//! windows `[1st, 15th)` and `[15th, 1st of next month)`. A [`DateCursor`]
//! walks those split points; [`DateWindows`] keeps two cursors one step apart
//! and hands out the windows between them.

use crate::CrawlError;
use chrono::{Datelike, NaiveDate};
use std::fmt;

/// A split point: `day` is 1 or 15, or 0 for the "before first split" sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CursorPosition {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl CursorPosition {
    /// Validates a position supplied from outside (checkpoint, CLI)
    ///
    /// Accepted: the sentinel `(year, 0, 0)` or `month ∈ 1..=12, day ∈ {1, 15}`.
    pub fn new(year: i32, month: u32, day: u32) -> Result<Self, CrawlError> {
        let sentinel = month == 0 && day == 0;
        let split = (1..=12).contains(&month) && (day == 1 || day == 15);
        if !(sentinel || split) {
            return Err(CrawlError::InvalidCheckpoint { year, month, day });
        }
        Ok(Self { year, month, day })
    }

    /// The position before the first window of `year`
    pub fn start_of(year: i32) -> Self {
        Self {
            year,
            month: 0,
            day: 0,
        }
    }

    /// The position whose following window contains `date`
    ///
    /// Resetting a cursor pair to this position re-crawls the window holding
    /// `date` and everything after it.
    pub fn preceding(date: NaiveDate) -> Self {
        let (year, month) = (date.year(), date.month());
        if date.day() >= 15 {
            Self { year, month, day: 1 }
        } else if month == 1 {
            Self {
                year: year - 1,
                month: 12,
                day: 15,
            }
        } else {
            Self {
                year,
                month: month - 1,
                day: 15,
            }
        }
    }

    /// Calendar date of this split point; `None` for the sentinel
    pub fn to_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }

    fn step(&mut self) {
        if (1..15).contains(&self.day) {
            self.day = 15;
        } else {
            self.month += 1;
            self.day = 1;
        }

        if self.month > 12 {
            self.month = 1;
            self.year += 1;
        }
    }
}

/// Renders as the register's query date format, `D/M/YYYY`
impl fmt::Display for CursorPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.day, self.month, self.year)
    }
}

/// Generates successive half-month split points until `finish`
#[derive(Debug, Clone)]
pub struct DateCursor {
    position: CursorPosition,
    finish: i32,
}

impl DateCursor {
    pub fn new(start: i32, finish: i32) -> Self {
        Self {
            position: CursorPosition::start_of(start),
            finish,
        }
    }

    pub fn position(&self) -> CursorPosition {
        self.position
    }

    /// Moves to the next split point
    ///
    /// Returns `None` once the cursor's year has reached `finish`; this is the
    /// normal end of the sequence.
    pub fn advance(&mut self) -> Option<CursorPosition> {
        if self.position.year >= self.finish {
            return None;
        }
        self.position.step();
        Some(self.position)
    }

    pub fn reset(&mut self, position: CursorPosition) {
        self.position = position;
    }
}

/// A half-open query window `[begin, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub begin: CursorPosition,
    pub end: CursorPosition,
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}

/// Two cursors kept one `advance()` apart
#[derive(Debug, Clone)]
pub struct DateWindows {
    begin: DateCursor,
    end: DateCursor,
}

impl DateWindows {
    pub fn new(start: i32, finish: i32) -> Self {
        let mut windows = Self {
            begin: DateCursor::new(start, finish),
            end: DateCursor::new(start, finish),
        };
        windows.end.advance();
        windows
    }

    /// Yields the next window, or `None` when the range is exhausted
    pub fn next_window(&mut self) -> Option<DateWindow> {
        let begin = self.begin.advance()?;
        let end = self.end.advance()?;
        Some(DateWindow { begin, end })
    }

    /// Repoints both cursors to `position` and restores the one-step offset
    ///
    /// The next window returned starts at the split point after `position`.
    pub fn reset(&mut self, position: CursorPosition) {
        self.begin.reset(position);
        self.end.reset(position);
        self.end.advance();
    }

    /// Position of the begin cursor (the begin of the last window handed out)
    pub fn position(&self) -> CursorPosition {
        self.begin.position()
    }
}

impl Iterator for DateWindows {
    type Item = DateWindow;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_window()
    }
}
