//! PDF document information extractor
//!
//! Reads the trailer `/Info` dictionary: Title, Author, Subject (description),
//! Keywords (tags), CreationDate, Producer and Creator. A malformed date is
//! dropped, never fatal.

use crate::types::{
    raw_keys, ExtractContext, ExtractedMetadata, ExtractionError, FileInfo, MetadataExtractor,
};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use lopdf::{Document, Object};
use std::path::Path;
use tracing::debug;

const FORMAT: &str = "pdf";

/// Extracts the PDF information dictionary
#[derive(Debug, Clone, Default)]
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetadataExtractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn can_extract(&self, file: &FileInfo) -> bool {
        file.has_extension(&["pdf"]) || file.has_mime_type("application/pdf")
    }

    async fn extract(
        &self,
        file: &FileInfo,
        _known: &ExtractedMetadata,
        ctx: &ExtractContext,
    ) -> Result<ExtractedMetadata, ExtractionError> {
        let path = file.path.clone();
        let work = async {
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|source| ExtractionError::NotAccessible {
                    path: path.clone(),
                    source,
                })?;

            let blocking_path = path.clone();
            tokio::task::spawn_blocking(move || read_info(&blocking_path, &bytes))
                .await
                .map_err(|e| ExtractionError::parse(&path, FORMAT, e))?
        };

        tokio::select! {
            _ = ctx.cancel.cancelled() => Err(ExtractionError::Cancelled { path: file.path.clone() }),
            result = work => result,
        }
    }
}

/// Parse an in-memory PDF and map its information dictionary
pub fn read_info(path: &Path, bytes: &[u8]) -> Result<ExtractedMetadata, ExtractionError> {
    let doc = Document::load_mem(bytes).map_err(|e| ExtractionError::parse(path, FORMAT, e))?;

    let mut metadata = ExtractedMetadata::new();

    let page_count = doc.get_pages().len();
    if page_count > 0 {
        metadata.set_raw(raw_keys::PAGE_COUNT, page_count.to_string());
    }

    let info = match info_dictionary(&doc) {
        Some(info) => info,
        None => {
            debug!(file = %path.display(), "PDF has no information dictionary");
            return Ok(metadata);
        }
    };

    let field = |key: &[u8]| -> Option<String> {
        info.get(key)
            .ok()
            .and_then(|obj| resolve(&doc, obj))
            .and_then(|obj| match obj {
                Object::String(bytes, _) => Some(decode_text(bytes)),
                Object::Name(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
                _ => None,
            })
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    if let Some(title) = field(b"Title") {
        metadata.title = title;
    }
    if let Some(author) = field(b"Author") {
        metadata.set_raw(raw_keys::AUTHOR, author);
    }
    if let Some(subject) = field(b"Subject") {
        metadata.description = subject;
    }
    if let Some(keywords) = field(b"Keywords") {
        for keyword in keywords.split([',', ';']) {
            metadata.add_tag(keyword);
        }
    }
    if let Some(created) = field(b"CreationDate") {
        metadata.created_at = parse_pdf_date(&created);
        if metadata.created_at.is_none() {
            debug!(file = %path.display(), date = %created, "Ignoring unparseable PDF date");
        }
    }
    if let Some(producer) = field(b"Producer") {
        metadata.set_raw(raw_keys::PRODUCER, producer);
    }
    if let Some(creator) = field(b"Creator") {
        metadata.set_raw(raw_keys::CREATOR_TOOL, creator);
    }

    Ok(metadata)
}

fn info_dictionary(doc: &Document) -> Option<&lopdf::Dictionary> {
    let info = doc.trailer.get(b"Info").ok()?;
    match resolve(doc, info)? {
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Decode a PDF text string: UTF-16BE with BOM, UTF-8 with BOM, else Latin-1
fn decode_text(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// Parse a PDF date string (`D:YYYYMMDDHHmmSSOHH'mm'` and truncations)
///
/// Every field after the year may be omitted (`D:YYYY`, `D:YYYYMM`, ...,
/// `D:YYYYMMDDHHmm`); missing fields default to the start of the period.
/// Accepts the `D:` prefix or not, apostrophes in the offset or not, and a
/// `Z` suffix. Returns `None` for anything else.
pub fn parse_pdf_date(raw: &str) -> Option<DateTime<Utc>> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches("D:")
        .chars()
        .filter(|c| *c != '\'')
        .collect();

    let digits_end = cleaned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(cleaned.len());
    let (digits, offset) = cleaned.split_at(digits_end);

    let naive = parse_naive(digits)?;
    parse_offset(offset)?
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_naive(digits: &str) -> Option<NaiveDateTime> {
    // MMDDHHmmSS filler for truncated dates
    const FILLER: &str = "0101000000";

    let len = digits.len();
    if !(4..=14).contains(&len) || len % 2 != 0 {
        return None;
    }
    let padded = format!("{}{}", digits, &FILLER[len - 4..]);
    NaiveDateTime::parse_from_str(&padded, "%Y%m%d%H%M%S").ok()
}

fn parse_offset(offset: &str) -> Option<FixedOffset> {
    let sign = match offset.chars().next() {
        None | Some('Z') => return FixedOffset::east_opt(0),
        Some('+') => 1,
        Some('-') => -1,
        Some(_) => return None,
    };

    let rest = &offset[1..];
    if !rest.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match rest.len() {
        2 => (rest.parse::<i32>().ok()?, 0),
        4 => (rest[..2].parse::<i32>().ok()?, rest[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
