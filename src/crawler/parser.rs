//! HTML parsers for register pages
//!
//! This module handles the two page shapes of the register:
//! - Listing pages: a "N of M results" summary and a results table
//! - Detail pages: a `.fform` block of label/value rows plus a summary paragraph

use crate::encoding::{DecodedText, EncodingError};
use crate::record::{canonical_key, Field, ListingEntry};
use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::LazyLock;
use thiserror::Error;

/// Failures while reading a register page
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing element matching `{0}`")]
    MissingElement(&'static str),

    #[error("invalid selector `{0}`")]
    InvalidSelector(&'static str),

    #[error("field '{field}' is not decodable: {source}")]
    Encoding { field: Field, source: EncodingError },
}

const SUMMARY_SELECTOR: &str = ".content p";
const RESULTS_TABLE_SELECTOR: &str = "#results > table";
const DETAIL_FORM_SELECTOR: &str = ".fform";

static RESULT_COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"of\s+(\d+)").expect("invalid regex: result count"));

static MEDIUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r".*\((.*?)\)").expect("invalid regex: medium"));

fn selector(css: &'static str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|_| ParseError::InvalidSelector(css))
}

/// A parsed listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPage {
    /// Total from the "N of M results" summary, if present
    pub reported_count: Option<usize>,

    /// Rows of the results table in page order
    pub entries: Vec<ListingEntry>,
}

/// Parses a listing page
///
/// # Returns
///
/// * `Ok(ListingPage)` - The results table and the reported count
/// * `Err(ParseError::MissingElement)` - The page has no results table
pub fn parse_listing(html: &str) -> Result<ListingPage, ParseError> {
    let document = Html::parse_document(html);
    let reported_count = result_count(&document)?;

    let table_selector = selector(RESULTS_TABLE_SELECTOR)?;
    let table = document
        .select(&table_selector)
        .next()
        .ok_or(ParseError::MissingElement(RESULTS_TABLE_SELECTOR))?;

    Ok(ListingPage {
        reported_count,
        entries: parse_table(table)?,
    })
}

/// Extracts the total from the summary text, e.g. `"1 - 20 of 437 results"`
///
/// The last `of <digits>` occurrence wins.
fn result_count(document: &Html) -> Result<Option<usize>, ParseError> {
    let summary_selector = selector(SUMMARY_SELECTOR)?;
    let Some(summary) = document.select(&summary_selector).next() else {
        return Ok(None);
    };

    let text = summary.text().collect::<String>();
    Ok(parse_result_count(&text))
}

pub fn parse_result_count(text: &str) -> Option<usize> {
    RESULT_COUNT_RE
        .captures_iter(text)
        .last()
        .and_then(|caps| caps[1].parse().ok())
}

/// Extracts listing entries from a results table
///
/// Header rows (first cell not a `td`) are skipped. The title is the text of
/// the link in the second cell; the detail id is the last path segment of
/// its href without the query string.
pub fn parse_table(table: ElementRef<'_>) -> Result<Vec<ListingEntry>, ParseError> {
    let row_selector = selector("tr")?;
    let link_selector = selector("a[href]")?;

    let mut entries = Vec::new();
    for row in table.select(&row_selector) {
        let mut cells = row.children().filter_map(ElementRef::wrap);
        match cells.next() {
            Some(first) if first.value().name() == "td" => {}
            _ => continue,
        }

        let Some(link) = cells
            .next()
            .and_then(|cell| cell.select(&link_selector).next())
        else {
            continue;
        };

        let href = link.value().attr("href").unwrap_or_default();
        let detail_id = detail_id_from_href(href);
        if detail_id.is_empty() {
            tracing::debug!("Skipping listing row with unusable link '{}'", href);
            continue;
        }

        entries.push(ListingEntry {
            title: link.text().collect::<String>(),
            detail_id: detail_id.to_string(),
        });
    }

    Ok(entries)
}

/// `/www/cob/find.nsf/<view>/<id>?OpenDocument` → `<id>`
///
/// Only ASCII whitespace is trimmed; the href may still be byte-mapped.
pub fn detail_id_from_href(href: &str) -> &str {
    let last = href.rsplit('/').next().unwrap_or_default();
    last.split('?')
        .next()
        .unwrap_or_default()
        .trim_matches(|c: char| c.is_ascii_whitespace())
}

/// Fields extracted from a detail page, in form order
pub type DetailFields = Vec<(Field, String)>;

/// Parses a detail page
///
/// Returns `Ok(None)` when the page has no detail form (withdrawn entries,
/// error pages). Every label and value is normalized to UTF-8 before it is
/// cleaned, so a byte-mapped page never has bytes trimmed out of a UTF-8
/// sequence.
///
/// # Field Rules
///
/// | Label | Value |
/// |-------|-------|
/// | any | `.ffield` text, U+00A0 removed, trimmed |
/// | Date of Classification | `MM/DD/YYYY` re-emitted as `YYYY-MM-DD` |
/// | Version | also derives `medium` from the summary paragraph |
pub fn parse_detail(text: &DecodedText) -> Result<Option<DetailFields>, ParseError> {
    let document = Html::parse_document(text.as_str());

    let form_selector = selector(DETAIL_FORM_SELECTOR)?;
    let Some(form) = document.select(&form_selector).next() else {
        return Ok(None);
    };

    let row_selector = selector(".frow")?;
    let label_selector = selector(".flabel")?;
    let value_selector = selector(".ffield")?;

    let mut fields = DetailFields::new();
    for row in form.select(&row_selector) {
        let Some(label) = row.select(&label_selector).next() else {
            continue;
        };
        let raw_label = label.text().collect::<String>();
        let label = text.normalize_field(&raw_label).map_err(|source| ParseError::Encoding {
            field: Field::Other(canonical_key(&raw_label)),
            source,
        })?;
        let field = Field::from_label(&label);
        if !field.is_known() {
            tracing::debug!("Unrecognised detail label '{}'", label.trim());
        }

        let raw = row
            .select(&value_selector)
            .next()
            .map(|value| value.text().collect::<String>())
            .unwrap_or_default();
        let raw = decode_field(text, &field, &raw)?;
        let mut value = clean_value(&raw);

        match field {
            Field::DateOfClassification => value = iso_date(&value),
            Field::Version => fields.push((Field::Medium, medium(&document, text)?)),
            _ => {}
        }

        fields.push((field, value));
    }

    Ok(Some(fields))
}

fn decode_field(text: &DecodedText, field: &Field, raw: &str) -> Result<String, ParseError> {
    text.normalize_field(raw).map_err(|source| ParseError::Encoding {
        field: field.clone(),
        source,
    })
}

/// Removes non-breaking spaces and trims whitespace
pub fn clean_value(raw: &str) -> String {
    raw.replace('\u{a0}', "").trim().to_string()
}

/// `03/04/2020` (month/day/year) → `2020-03-04`; other text is kept as is
pub fn iso_date(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }

    match NaiveDate::parse_from_str(value, "%m/%d/%Y") {
        Ok(date) => date.format("%Y-%m-%d").to_string(),
        Err(e) => {
            tracing::warn!("Unrecognised classification date '{}': {}", value, e);
            value.to_string()
        }
    }
}

/// Derives the medium from the summary paragraph near the page header
///
/// The paragraph's second child node holds text such as `Feature Film (DVD)`;
/// the last parenthesized part on its line replaces the line up to it. Without parentheses the whole
/// text is used. A missing paragraph or child yields an empty string.
fn medium(document: &Html, source: &DecodedText) -> Result<String, ParseError> {
    let summary_selector = selector(SUMMARY_SELECTOR)?;
    let Some(summary) = document.select(&summary_selector).next() else {
        return Ok(String::new());
    };

    let Some(node) = summary.children().nth(1) else {
        return Ok(String::new());
    };

    let text = match node.value() {
        Node::Text(text) => String::from(&**text),
        Node::Element(_) => ElementRef::wrap(node)
            .map(|element| element.text().collect::<String>())
            .unwrap_or_default(),
        _ => String::new(),
    };

    Ok(extract_medium(&decode_field(source, &Field::Medium, &text)?))
}

pub fn extract_medium(text: &str) -> String {
    match MEDIUM_RE.captures(text) {
        Some(caps) => {
            let (start, end) = caps.get(0).map_or((0, 0), |m| (m.start(), m.end()));
            format!("{}{}{}", &text[..start], &caps[1], &text[end..])
                .trim()
                .to_string()
        }
        None => text.trim().to_string(),
    }
}
