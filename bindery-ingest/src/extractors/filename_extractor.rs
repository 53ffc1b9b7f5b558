//! Filename pattern extractor
//!
//! Recognizes common naming conventions in the file stem:
//! - `Series #NN - Title`
//! - `Series Vol N - Title`
//! - `Author - Title`
//! - `Title (Author)`
//! - `[ISBN: …]` / `(ISBN-13: …)` markers anywhere in the name
//!
//! ISBN markers are removed before the other patterns are tried; the first of
//! the remaining patterns to match wins. With no match the whole stem becomes
//! the title. Applies to every file and never fails.

use crate::types::{
    raw_keys, ExtractContext, ExtractedMetadata, ExtractionError, FileInfo, MetadataExtractor,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

static ISBN_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[\[(]\s*ISBN(?:-1[03])?\s*:?\s*([0-9][0-9\- ]{8,15}[0-9X])\s*[\])]")
        .expect("valid ISBN regex")
});

static SERIES_HASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)\s+#\s*(\d+)\s*-\s*(.+)$").expect("valid series regex"));

static SERIES_VOL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.+?)\s+vol(?:ume)?\.?\s*(\d+)\s*-\s*(.+)$").expect("valid volume regex")
});

static AUTHOR_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)\s+-\s+(.+)$").expect("valid author regex"));

static TITLE_AUTHOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)\s*\(([^)]+)\)$").expect("valid title regex"));

/// Extracts metadata from the file name alone
#[derive(Debug, Clone, Default)]
pub struct FilenameExtractor;

impl FilenameExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Parse a file stem (extension already removed)
    pub fn parse_stem(stem: &str) -> ExtractedMetadata {
        let mut metadata = ExtractedMetadata::new();
        let mut remaining = stem.trim().to_string();

        if let Some(caps) = ISBN_MARKER.captures(&remaining) {
            let isbn: String = caps[1]
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '-')
                .collect::<String>()
                .to_uppercase();
            if isbn.len() == 10 || isbn.len() == 13 {
                metadata.set_raw(raw_keys::ISBN, isbn);
            }
            remaining = collapse_spaces(&ISBN_MARKER.replace_all(&remaining, " "));
        }

        if let Some(caps) = SERIES_HASH
            .captures(&remaining)
            .or_else(|| SERIES_VOL.captures(&remaining))
        {
            metadata.set_raw(raw_keys::SERIES, caps[1].trim());
            metadata.set_raw(raw_keys::VOLUME, caps[2].trim());
            metadata.title = caps[3].trim().to_string();
        } else if let Some(caps) = AUTHOR_TITLE.captures(&remaining) {
            metadata.set_raw(raw_keys::AUTHOR, caps[1].trim());
            metadata.title = caps[2].trim().to_string();
        } else if let Some(caps) = TITLE_AUTHOR.captures(&remaining) {
            metadata.title = caps[1].trim().to_string();
            metadata.set_raw(raw_keys::AUTHOR, caps[2].trim());
        }

        if metadata.title.is_empty() {
            metadata.title = remaining;
        }

        metadata
    }
}

fn collapse_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl MetadataExtractor for FilenameExtractor {
    fn name(&self) -> &'static str {
        "filename"
    }

    fn can_extract(&self, _file: &FileInfo) -> bool {
        true
    }

    async fn extract(
        &self,
        file: &FileInfo,
        _known: &ExtractedMetadata,
        _ctx: &ExtractContext,
    ) -> Result<ExtractedMetadata, ExtractionError> {
        Ok(Self::parse_stem(&file.stem()))
    }
}
