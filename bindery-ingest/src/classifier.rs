//! Content classification
//!
//! Decides which organizational category a file belongs to, first match wins:
//! 1. Comic archive extension → `Comic`
//! 2. Non-empty `series` in metadata → `Comic`
//! 3. Non-empty title → `Book`
//! 4. Otherwise → `Unknown`

use crate::extractors::comic_catalog_client::COMIC_EXTENSIONS;
use crate::types::{raw_keys, ContentType, ExtractedMetadata, FileInfo};

/// Pure classifier over a file and its (possibly absent) metadata
#[derive(Debug, Clone)]
pub struct ContentClassifier {
    comic_extensions: Vec<String>,
}

impl Default for ContentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentClassifier {
    pub fn new() -> Self {
        Self {
            comic_extensions: COMIC_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Replace the set of extensions treated as comic archives
    pub fn with_comic_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.comic_extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    pub fn classify(&self, file: &FileInfo, metadata: Option<&ExtractedMetadata>) -> ContentType {
        let is_comic_archive = file
            .extension()
            .map(|ext| self.comic_extensions.iter().any(|c| *c == ext))
            .unwrap_or(false);
        if is_comic_archive {
            return ContentType::Comic;
        }

        let Some(metadata) = metadata else {
            return ContentType::Unknown;
        };

        if metadata.raw_value(raw_keys::SERIES).is_some() {
            ContentType::Comic
        } else if metadata.has_title() {
            ContentType::Book
        } else {
            ContentType::Unknown
        }
    }
}
