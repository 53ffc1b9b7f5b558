//! Category-aware path normalizer
//!
//! | Category | Template                                        |
//! |----------|-------------------------------------------------|
//! | Book     | `books/{Author}/{Title}.{ext}`                  |
//! | Comic    | `comics/{Publisher}/{Series}/{Volume}.{ext}`    |
//! | Unknown  | `unsorted/{filename}`                           |
//!
//! An optional root prefix is prepended to every path. Metadata values are
//! sanitized per field; the unsorted branch keeps the original file name
//! verbatim and relies on validation alone.

use super::collision::CollisionResolver;
use super::sanitize::{sanitize_filename, sanitize_path};
use super::template::PathTemplate;
use super::validate::{validate_store_path, MAX_SEGMENT_BYTES};
use super::PathError;
use crate::classifier::ContentClassifier;
use crate::types::{raw_keys, ContentType, ExtractedMetadata, FileInfo, NormalizedPath};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_AUTHOR: &str = "Unknown Author";
pub const DEFAULT_PUBLISHER: &str = "Unknown Publisher";
pub const DEFAULT_SERIES: &str = "Unknown Series";
pub const DEFAULT_VOLUME: &str = "Unknown Volume";
pub const DEFAULT_TITLE: &str = "Untitled";
/// Extension used for files without one
pub const UNKNOWN_EXTENSION: &str = "unknown";

/// Longest extension kept, in bytes
const MAX_EXT_BYTES: usize = 16;
/// Room left for `.{ext}` in the final segment
const MAX_NAME_BYTES: usize = MAX_SEGMENT_BYTES - MAX_EXT_BYTES - 1;

/// Built-in book template
pub fn book_template() -> PathTemplate {
    PathTemplate::new("books/{Author}/{Title}.{ext}")
        .with_default("Author", DEFAULT_AUTHOR)
        .with_default("Title", DEFAULT_TITLE)
        .with_sanitizer("Author", |v| sanitize_filename(v, MAX_SEGMENT_BYTES))
        .with_sanitizer("Title", |v| sanitize_filename(v, MAX_NAME_BYTES))
}

/// Built-in comic template
pub fn comic_template() -> PathTemplate {
    PathTemplate::new("comics/{Publisher}/{Series}/{Volume}.{ext}")
        .with_default("Publisher", DEFAULT_PUBLISHER)
        .with_default("Series", DEFAULT_SERIES)
        .with_default("Volume", DEFAULT_VOLUME)
        .with_sanitizer("Publisher", |v| sanitize_filename(v, MAX_SEGMENT_BYTES))
        .with_sanitizer("Series", |v| sanitize_filename(v, MAX_SEGMENT_BYTES))
        .with_sanitizer("Volume", |v| sanitize_filename(v, MAX_NAME_BYTES))
}

/// Built-in catch-all template
pub fn unsorted_template() -> PathTemplate {
    PathTemplate::new("unsorted/{filename}")
}

/// Turns a file and its metadata into a validated store path
#[derive(Clone)]
pub struct PathNormalizer {
    root: String,
    classifier: ContentClassifier,
    book: PathTemplate,
    comic: PathTemplate,
    unsorted: PathTemplate,
    collision_resolver: Option<Arc<dyn CollisionResolver>>,
}

impl fmt::Debug for PathNormalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathNormalizer")
            .field("root", &self.root)
            .field("book", &self.book.pattern())
            .field("comic", &self.comic.pattern())
            .field("unsorted", &self.unsorted.pattern())
            .field("collision_resolver", &self.collision_resolver.is_some())
            .finish()
    }
}

impl Default for PathNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PathNormalizer {
    /// Normalizer with built-in templates and no root prefix
    pub fn new() -> Self {
        Self {
            root: String::new(),
            classifier: ContentClassifier::new(),
            book: book_template(),
            comic: comic_template(),
            unsorted: unsorted_template(),
            collision_resolver: None,
        }
    }

    /// Prefix every path with `root` (slashes at either end are ignored)
    pub fn with_root(mut self, root: impl AsRef<str>) -> Self {
        self.root = root.as_ref().trim_matches('/').to_string();
        self
    }

    pub fn with_classifier(mut self, classifier: ContentClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Replace the template used for `content_type`
    pub fn with_template(mut self, content_type: ContentType, template: PathTemplate) -> Self {
        match content_type {
            ContentType::Book => self.book = template,
            ContentType::Comic => self.comic = template,
            ContentType::Unknown => self.unsorted = template,
        }
        self
    }

    pub fn with_collision_resolver(mut self, resolver: Arc<dyn CollisionResolver>) -> Self {
        self.collision_resolver = Some(resolver);
        self
    }

    pub fn has_collision_resolver(&self) -> bool {
        self.collision_resolver.is_some()
    }

    pub fn classifier(&self) -> &ContentClassifier {
        &self.classifier
    }

    /// Classify, then normalize under the matching template
    pub fn normalize(
        &self,
        file: &FileInfo,
        metadata: Option<&ExtractedMetadata>,
    ) -> Result<NormalizedPath, PathError> {
        let content_type = self.classifier.classify(file, metadata);
        self.normalize_as(file, metadata, content_type)
    }

    /// Normalize under a caller-chosen category
    ///
    /// # Errors
    /// - `PathError::Invalid` if the rendered path fails validation
    /// - `PathError::MissingPlaceholder` for a custom template lacking a value
    pub fn normalize_as(
        &self,
        file: &FileInfo,
        metadata: Option<&ExtractedMetadata>,
        content_type: ContentType,
    ) -> Result<NormalizedPath, PathError> {
        let template = match content_type {
            ContentType::Book => &self.book,
            ContentType::Comic => &self.comic,
            ContentType::Unknown => &self.unsorted,
        };

        let rendered = template.render(&template_values(file, metadata))?;
        let store_path = if self.root.is_empty() {
            rendered
        } else {
            format!("{}/{}", self.root, rendered)
        };

        validate_store_path(&store_path)?;
        Ok(NormalizedPath::from_store_path(store_path))
    }

    /// Apply the configured collision resolver, if any
    ///
    /// Without a resolver the path is returned as-is and the write stage
    /// deals with whatever is already stored there.
    pub async fn resolve_collision(
        &self,
        path: NormalizedPath,
        cancel: &CancellationToken,
    ) -> Result<NormalizedPath, PathError> {
        let Some(resolver) = &self.collision_resolver else {
            return Ok(path);
        };

        let resolved = resolver.resolve(&path.store_path, cancel).await?;
        if resolved == path.store_path {
            return Ok(path);
        }
        validate_store_path(&resolved)?;
        Ok(NormalizedPath::from_store_path(resolved))
    }
}

/// Placeholder values for every built-in template
fn template_values(file: &FileInfo, metadata: Option<&ExtractedMetadata>) -> HashMap<String, String> {
    let mut values = HashMap::new();

    let ext = file
        .extension()
        .map(|e| sanitize_filename(&e, MAX_EXT_BYTES))
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| UNKNOWN_EXTENSION.to_string());
    values.insert("ext".to_string(), ext);
    values.insert("filename".to_string(), file.file_name());

    let title = metadata
        .filter(|m| m.has_title())
        .map(|m| m.title.clone())
        .unwrap_or_else(|| file.stem());
    values.insert("Title".to_string(), title);

    if let Some(metadata) = metadata {
        for (placeholder, key) in [
            ("Author", raw_keys::AUTHOR),
            ("Publisher", raw_keys::PUBLISHER),
            ("Series", raw_keys::SERIES),
            ("Volume", raw_keys::VOLUME),
        ] {
            if let Some(value) = metadata.raw_value(key) {
                values.insert(placeholder.to_string(), value.to_string());
            }
        }
    }

    values
}
