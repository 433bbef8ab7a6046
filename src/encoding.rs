//! UTF-8 enforcement for scraped text
//!
//! Register pages are usually UTF-8, but older entries were published as
//! ISO-8859-1. Bodies are decoded byte-transparently so that every parsed
//! field can be recovered as its original bytes and normalized on its own:
//! a page with one Latin-1 field does not poison its valid neighbours.

use thiserror::Error;

/// A value that is neither UTF-8 nor printable ISO-8859-1
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("undecodable byte sequence '{preview}'")]
pub struct EncodingError {
    /// Lossy rendering of the offending bytes, for diagnostics only
    pub preview: String,
}

impl EncodingError {
    fn new(bytes: &[u8]) -> Self {
        Self {
            preview: String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

/// Normalizes a raw byte value to UTF-8
///
/// 1. Valid UTF-8 passes through unchanged.
/// 2. Otherwise the bytes are transcoded from ISO-8859-1.
/// 3. A transcode that yields C1 control characters (bytes 0x80-0x9F) is
///    rejected: those bytes are not text in Latin-1 either.
///
/// # Example
///
/// ```
/// use register_crawl::encoding::normalize;
///
/// assert_eq!(normalize(b"caf\xe9").unwrap(), "café");
/// assert_eq!(normalize("café".as_bytes()).unwrap(), "café");
/// assert!(normalize(b"\x81\x8d\x90").is_err());
/// ```
pub fn normalize(value: &[u8]) -> Result<String, EncodingError> {
    if let Ok(text) = std::str::from_utf8(value) {
        return Ok(text.to_string());
    }

    tracing::debug!(
        "Value is not UTF-8, transcoding from ISO-8859-1: {}",
        String::from_utf8_lossy(value)
    );

    let transcoded = decode_latin1(value);
    if transcoded.chars().any(is_c1_control) {
        return Err(EncodingError::new(value));
    }

    Ok(transcoded)
}

/// Maps every byte to the char with the same code point
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn is_c1_control(c: char) -> bool {
    ('\u{80}'..='\u{9f}').contains(&c)
}

/// How a [`DecodedText`] was produced from the response bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    /// The body was valid UTF-8
    Utf8,

    /// The body was not UTF-8; each char holds one original byte
    ByteMapped,
}

/// A response body decoded for HTML parsing
#[derive(Debug, Clone)]
pub struct DecodedText {
    text: String,
    encoding: SourceEncoding,
}

impl DecodedText {
    /// Decodes a response body without losing any byte
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => Self {
                text: text.to_string(),
                encoding: SourceEncoding::Utf8,
            },
            Err(_) => Self {
                text: decode_latin1(bytes),
                encoding: SourceEncoding::ByteMapped,
            },
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn encoding(&self) -> SourceEncoding {
        self.encoding
    }

    /// Normalizes a field that was parsed out of this text
    pub fn normalize_field(&self, value: &str) -> Result<String, EncodingError> {
        self.encoding.normalize_field(value)
    }
}

impl SourceEncoding {
    /// Normalizes a field parsed out of a body with this encoding
    ///
    /// Fields of a UTF-8 body are already valid and pass through. In a
    /// byte-mapped body every char up to U+00FF stands for one original
    /// byte; each run of those is turned back into bytes and run through
    /// [`normalize`]. Chars above U+00FF can only come from the HTML parser
    /// (character references) and are kept as they are.
    pub fn normalize_field(self, value: &str) -> Result<String, EncodingError> {
        match self {
            Self::Utf8 => Ok(value.to_string()),
            Self::ByteMapped => {
                let mut out = String::with_capacity(value.len());
                let mut run = Vec::new();
                for c in value.chars() {
                    match u8::try_from(u32::from(c)) {
                        Ok(b) => run.push(b),
                        Err(_) => {
                            out.push_str(&normalize(&run)?);
                            run.clear();
                            out.push(c);
                        }
                    }
                }
                out.push_str(&normalize(&run)?);
                Ok(out)
            }
        }
    }
}
