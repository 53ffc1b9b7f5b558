//! EPUB package metadata extractor
//!
//! Maps Dublin Core fields of the OPF package document: title, creator
//! (author), publisher, description, subject (tag), language, date and an
//! ISBN-shaped identifier. Calibre series metadata is honored when present.

use super::strip_markup;
use crate::types::{
    raw_keys, ExtractContext, ExtractedMetadata, ExtractionError, FileInfo, MetadataExtractor,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use epub::doc::EpubDoc;
use std::io::Cursor;
use std::path::Path;

const FORMAT: &str = "epub";

/// Extracts OPF metadata from EPUB files
#[derive(Debug, Clone, Default)]
pub struct EpubExtractor;

impl EpubExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetadataExtractor for EpubExtractor {
    fn name(&self) -> &'static str {
        "epub"
    }

    fn can_extract(&self, file: &FileInfo) -> bool {
        file.has_extension(&["epub"]) || file.has_mime_type("application/epub+zip")
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
            tokio::task::spawn_blocking(move || read_package(&blocking_path, bytes))
                .await
                .map_err(|e| ExtractionError::parse(&path, FORMAT, e))?
        };

        tokio::select! {
            _ = ctx.cancel.cancelled() => Err(ExtractionError::Cancelled { path: file.path.clone() }),
            result = work => result,
        }
    }
}

/// Parse an in-memory EPUB and map its package metadata
pub fn read_package(path: &Path, bytes: Vec<u8>) -> Result<ExtractedMetadata, ExtractionError> {
    let doc = EpubDoc::from_reader(Cursor::new(bytes))
        .map_err(|e| ExtractionError::parse(path, FORMAT, e))?;

    let field = |name: &str| -> Option<String> {
        doc.mdata(name)
            .map(|m| m.value.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let mut metadata = ExtractedMetadata::new();

    if let Some(title) = field("title") {
        metadata.title = title;
    }
    if let Some(description) = field("description") {
        metadata.description = strip_markup(&description);
    }
    if let Some(subject) = field("subject") {
        metadata.add_tag(subject);
    }
    if let Some(date) = field("date") {
        metadata.created_at = parse_opf_date(&date);
    }
    if let Some(author) = field("creator") {
        metadata.set_raw(raw_keys::AUTHOR, author);
    }
    if let Some(publisher) = field("publisher") {
        metadata.set_raw(raw_keys::PUBLISHER, publisher);
    }
    if let Some(language) = field("language") {
        metadata.set_raw(raw_keys::LANGUAGE, language);
    }
    if let Some(isbn) = field("identifier").and_then(|id| isbn_from_identifier(&id)) {
        metadata.set_raw(raw_keys::ISBN, isbn);
    }
    if let Some(series) = field("calibre:series") {
        metadata.set_raw(raw_keys::SERIES, series);
        if let Some(index) = field("calibre:series_index") {
            metadata.set_raw(raw_keys::VOLUME, index.trim_end_matches(".0"));
        }
    }

    Ok(metadata)
}

/// `urn:isbn:978-...` and bare ISBNs; anything else (UUIDs, URLs) is ignored
fn isbn_from_identifier(identifier: &str) -> Option<String> {
    let lower = identifier.to_lowercase();
    let candidate = lower
        .strip_prefix("urn:isbn:")
        .or_else(|| lower.strip_prefix("isbn:"))
        .unwrap_or(&lower);
    let digits: String = candidate
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    let valid = (digits.len() == 10 || digits.len() == 13)
        && digits
            .chars()
            .enumerate()
            .all(|(i, c)| c.is_ascii_digit() || (c == 'X' && i == digits.len() - 1));
    valid.then_some(digits)
}

fn parse_opf_date(date: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
        return Some(dt.with_timezone(&Utc));
    }
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01", date), "%Y-%m-%d"))
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01-01", date), "%Y-%m-%d"))
        .ok()?;
    day.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

    const PACKAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>The Great Book</dc:title>
    <dc:creator opf:role="aut">John Smith</dc:creator>
    <dc:publisher>Good Press</dc:publisher>
    <dc:description>A fine story.</dc:description>
    <dc:language>en</dc:language>
    <dc:identifier id="bookid">urn:isbn:978-0-451-52493-5</dc:identifier>
    <dc:date>2019-04-02</dc:date>
  </metadata>
  <manifest>
    <item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine>
    <itemref idref="ch1"/>
  </spine>
</package>"#;

    const CHAPTER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>One</title></head><body><p>Text</p></body></html>"#;

    fn build_epub() -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, body) in [
            ("mimetype", "application/epub+zip"),
            ("META-INF/container.xml", CONTAINER),
            ("OEBPS/content.opf", PACKAGE),
            ("OEBPS/ch1.xhtml", CHAPTER),
        ] {
            zip.start_file(name, options).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_reads_package_metadata() {
        let m = read_package(Path::new("/t/book.epub"), build_epub()).unwrap();

        assert_eq!(m.title, "The Great Book");
        assert_eq!(m.description, "A fine story.");
        assert_eq!(m.raw_value(raw_keys::AUTHOR), Some("John Smith"));
        assert_eq!(m.raw_value(raw_keys::PUBLISHER), Some("Good Press"));
        assert_eq!(m.raw_value(raw_keys::ISBN), Some("9780451524935"));
        assert_eq!(m.created_at.map(|d| d.year()), Some(2019));
    }

    #[test]
    fn test_not_a_zip_is_parse_error() {
        let err = read_package(Path::new("/t/fake.epub"), b"plain text".to_vec()).unwrap_err();
        assert!(matches!(err, ExtractionError::Parse { format: "epub", .. }));
    }

    #[test]
    fn test_isbn_identifier_shapes() {
        assert_eq!(isbn_from_identifier("urn:isbn:0-306-40615-2").as_deref(), Some("0306406152"));
        assert_eq!(isbn_from_identifier("9781234567890").as_deref(), Some("9781234567890"));
        assert_eq!(isbn_from_identifier("080442957X").as_deref(), Some("080442957X"));
        assert_eq!(isbn_from_identifier("urn:uuid:1234-5678"), None);
    }

    #[test]
    fn test_opf_dates() {
        assert_eq!(parse_opf_date("2019").map(|d| d.year()), Some(2019));
        assert_eq!(parse_opf_date("2019-04").map(|d| d.month()), Some(4));
        assert!(parse_opf_date("2019-04-02T10:00:00Z").is_some());
        assert!(parse_opf_date("someday").is_none());
    }

}
