//! CBZ `ComicInfo.xml` extractor
//!
//! Comic archives produced by common tagging tools carry a flat
//! `ComicInfo.xml` document. Only its leaf elements are read, so a small
//! element matcher is enough.

use crate::types::{
    raw_keys, ExtractContext, ExtractedMetadata, ExtractionError, FileInfo, MetadataExtractor,
};
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{Cursor, Read};
use std::path::Path;

const FORMAT: &str = "cbz";
const COMIC_INFO: &str = "comicinfo.xml";

static ELEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<([A-Za-z]+)(?:\s[^>]*)?>([^<]*)</([A-Za-z]+)>").expect("valid element regex")
});

static ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[A-Za-z]+);").expect("valid entity regex")
});

/// Extracts `ComicInfo.xml` from CBZ archives
#[derive(Debug, Clone, Default)]
pub struct ComicInfoExtractor;

impl ComicInfoExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetadataExtractor for ComicInfoExtractor {
    fn name(&self) -> &'static str {
        "comic_info"
    }

    fn can_extract(&self, file: &FileInfo) -> bool {
        file.has_extension(&["cbz"]) || file.has_mime_type("application/vnd.comicbook+zip")
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
            tokio::task::spawn_blocking(move || read_comic_info(&blocking_path, bytes))
                .await
                .map_err(|e| ExtractionError::parse(&path, FORMAT, e))?
        };

        tokio::select! {
            _ = ctx.cancel.cancelled() => Err(ExtractionError::Cancelled { path: file.path.clone() }),
            result = work => result,
        }
    }
}

/// Locate and map `ComicInfo.xml` inside an in-memory CBZ
pub fn read_comic_info(path: &Path, bytes: Vec<u8>) -> Result<ExtractedMetadata, ExtractionError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractionError::parse(path, FORMAT, e))?;

    let name = archive
        .file_names()
        .find(|name| {
            name.rsplit('/')
                .next()
                .map(|base| base.eq_ignore_ascii_case(COMIC_INFO))
                .unwrap_or(false)
        })
        .map(str::to_string)
        .ok_or_else(|| ExtractionError::NotAvailable {
            path: path.to_path_buf(),
            extractor: "comic_info",
            reason: "archive has no ComicInfo.xml".to_string(),
        })?;

    let mut xml = String::new();
    archive
        .by_name(&name)
        .map_err(|e| ExtractionError::parse(path, FORMAT, e))?
        .read_to_string(&mut xml)
        .map_err(|e| ExtractionError::parse(path, FORMAT, e))?;

    Ok(map_comic_info(&xml))
}

/// Map ComicInfo elements onto metadata
pub fn map_comic_info(xml: &str) -> ExtractedMetadata {
    let mut metadata = ExtractedMetadata::new();
    let mut year = None;
    let mut month = 1;
    let mut day = 1;
    let mut number = None;
    let mut volume = None;

    for caps in ELEMENT.captures_iter(xml) {
        if caps[1] != caps[3] {
            continue;
        }
        let value = unescape(caps[2].trim());
        if value.is_empty() {
            continue;
        }
        match &caps[1] {
            "Title" => metadata.title = value,
            "Summary" => metadata.description = value,
            "Series" => metadata.set_raw(raw_keys::SERIES, value),
            "Number" => number = Some(value),
            "Volume" => volume = Some(value),
            "Publisher" => metadata.set_raw(raw_keys::PUBLISHER, value),
            "Writer" => metadata.set_raw(raw_keys::AUTHOR, value),
            "LanguageISO" => metadata.set_raw(raw_keys::LANGUAGE, value),
            "PageCount" => metadata.set_raw(raw_keys::PAGE_COUNT, value),
            "GTIN" => metadata.set_raw(raw_keys::ISBN, value.replace('-', "")),
            "Genre" | "Tags" => {
                for tag in value.split(',') {
                    metadata.add_tag(tag);
                }
            }
            "Year" => year = value.parse::<i32>().ok(),
            "Month" => month = value.parse::<u32>().unwrap_or(1),
            "Day" => day = value.parse::<u32>().unwrap_or(1),
            _ => {}
        }
    }

    // Issue number identifies the book within a series better than volume year
    if let Some(issue) = number.or(volume) {
        metadata.set_raw(raw_keys::VOLUME, issue);
    }

    metadata.created_at = year
        .and_then(|y| NaiveDate::from_ymd_opt(y, month, day))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive));

    metadata
}

/// Decode the predefined XML entities and numeric character references
///
/// Unknown entities and invalid code points are left as written.
fn unescape(s: &str) -> String {
    ENTITY
        .replace_all(s, |caps: &regex::Captures| {
            let name = &caps[1];
            let decoded = match name {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "amp" => Some('&'),
                _ => {
                    let code = match name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => name.strip_prefix('#').and_then(|dec| dec.parse::<u32>().ok()),
                    };
                    code.and_then(char::from_u32)
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const COMIC_XML: &str = r#"<?xml version="1.0"?>
<ComicInfo xmlns:xsd="http://www.w3.org/2001/XMLSchema">
  <Title>A New Hope</Title>
  <Series>Star Wars</Series>
  <Number>1</Number>
  <Volume>1977</Volume>
  <Summary>Rebels &amp; an empire.</Summary>
  <Year>1977</Year>
  <Month>4</Month>
  <Writer>Roy Thomas</Writer>
  <Publisher>Marvel</Publisher>
  <Genre>Science Fiction, Adventure</Genre>
  <PageCount>36</PageCount>
</ComicInfo>"#;

    fn build_cbz(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_maps_comic_info() {
        let m = map_comic_info(COMIC_XML);

        assert_eq!(m.title, "A New Hope");
        assert_eq!(m.description, "Rebels & an empire.");
        assert_eq!(m.raw_value(raw_keys::SERIES), Some("Star Wars"));
        assert_eq!(m.raw_value(raw_keys::VOLUME), Some("1"));
        assert_eq!(m.raw_value(raw_keys::AUTHOR), Some("Roy Thomas"));
        assert_eq!(m.raw_value(raw_keys::PUBLISHER), Some("Marvel"));
        assert_eq!(m.tags, vec!["Science Fiction", "Adventure"]);
        let created = m.created_at.unwrap();
        assert_eq!((created.year(), created.month()), (1977, 4));
    }

    #[test]
    fn test_reads_nested_comic_info() {
        let cbz = build_cbz(&[
            ("pages/001.jpg", &b"\xFF\xD8\xFF"[..]),
            ("Meta/comicinfo.xml", COMIC_XML.as_bytes()),
        ]);
        let m = read_comic_info(Path::new("/c/issue.cbz"), cbz).unwrap();
        assert_eq!(m.raw_value(raw_keys::SERIES), Some("Star Wars"));
    }

    #[test]
    fn test_archive_without_comic_info_is_not_available() {
        let cbz = build_cbz(&[("001.jpg", &b"\xFF\xD8\xFF"[..])]);
        let err = read_comic_info(Path::new("/c/bare.cbz"), cbz).unwrap_err();
        assert!(matches!(err, ExtractionError::NotAvailable { .. }));
    }

    #[test]
    fn test_not_a_zip_is_parse_error() {
        let err = read_comic_info(Path::new("/c/fake.cbz"), b"text".to_vec()).unwrap_err();
        assert!(matches!(err, ExtractionError::Parse { format: "cbz", .. }));
    }

    #[test]
    fn test_unescape_entities() {
        assert_eq!(unescape("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(unescape("&amp;lt;"), "&lt;");
        assert_eq!(unescape("Caf&#233; &#x4E;&#X6F;"), "Café No");
        assert_eq!(unescape("&bogus; &#xD800; &#;"), "&bogus; &#xD800; &#;");
    }

    #[test]
    fn test_can_extract() {
        let e = ComicInfoExtractor::new();
        assert!(e.can_extract(&FileInfo::new("/c/a.CBZ")));
        assert!(!e.can_extract(&FileInfo::new("/c/a.cbr")));
        assert!(!e.can_extract(&FileInfo::new("/c/a.pdf")));
    }
}
