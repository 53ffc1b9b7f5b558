//! Core Types and Trait Definitions for Bindery ingestion
//!
//! Every file travels through the same per-file sequence:
//! extraction → classification → normalization → collision resolution → write.
//!
//! - **FileInfo** identifies a discovered source file
//! - **ExtractedMetadata** accumulates what extractors learn about it
//! - **NormalizedPath** is where it belongs in the store
//! - **ProcessingError** records which stage failed and why
//! - **Session** / **PipelineResult** roll per-file outcomes up per run

use crate::events::ProgressSink;
use crate::normalize::PathError;
use crate::store::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Well-known keys of [`ExtractedMetadata::raw`]
pub mod raw_keys {
    pub const AUTHOR: &str = "author";
    pub const PUBLISHER: &str = "publisher";
    pub const SERIES: &str = "series";
    pub const VOLUME: &str = "volume";
    pub const ISBN: &str = "isbn";
    pub const LANGUAGE: &str = "language";
    pub const PRODUCER: &str = "producer";
    pub const CREATOR_TOOL: &str = "creator_tool";
    pub const PAGE_COUNT: &str = "page_count";
}

// ============================================================================
// Files and Metadata
// ============================================================================

/// Identity of a discovered source file
///
/// Immutable once discovered; every stage reads it, none mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Absolute path to the file
    pub path: PathBuf,
    /// Path relative to the discovery root
    pub relative_path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Last modification time, if the filesystem reports one
    pub modified: Option<DateTime<Utc>>,
    /// Declared or sniffed MIME type
    pub mime_type: Option<String>,
}

impl FileInfo {
    /// Bare file info for a path (no size, MIME, or root)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let relative_path = path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_default();
        Self {
            path,
            relative_path,
            size: 0,
            modified: None,
            mime_type: None,
        }
    }

    /// Attach a MIME type
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Lower-cased extension without the leading dot
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .filter(|e| !e.is_empty())
    }

    /// Final path component, verbatim
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File name with the last extension removed
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// True if the extension is one of `extensions` (lower-case, no dot)
    pub fn has_extension(&self, extensions: &[&str]) -> bool {
        self.extension()
            .map(|ext| extensions.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    /// True if the declared MIME type equals `mime`
    pub fn has_mime_type(&self, mime: &str) -> bool {
        self.mime_type.as_deref() == Some(mime)
    }

    pub fn display(&self) -> std::path::Display<'_> {
        self.path.display()
    }
}

/// Geographic position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
}

/// Everything learned about one file
///
/// Empty strings and `None` mean "unknown". Extractor-specific fields
/// (author, publisher, series, volume, isbn, ...) live in `raw`; see
/// [`raw_keys`]. Only [`ExtractedMetadata::merge_from`] combines fragments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    pub title: String,
    pub description: String,
    /// Deduplicated, insertion order preserved
    pub tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub capture_device: String,
    pub location: Option<GeoLocation>,
    pub raw: BTreeMap<String, String>,
}

impl ExtractedMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value for `key`, if present and non-blank
    pub fn raw_value(&self, key: &str) -> Option<&str> {
        self.raw
            .get(key)
            .map(|v| v.as_str())
            .filter(|v| !v.trim().is_empty())
    }

    /// Set a raw key, ignoring blank values
    pub fn set_raw(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            self.raw.insert(key.to_string(), trimmed.to_string());
        }
    }

    /// Add a tag unless blank or already present
    pub fn add_tag(&mut self, tag: impl AsRef<str>) {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
        }
    }

    /// True if a non-blank title is known
    pub fn has_title(&self) -> bool {
        !self.title.trim().is_empty()
    }

    /// Fill-gaps merge: copy from `source` only what is still unknown here
    ///
    /// Scalars are copied only when empty/unset, so the first fragment to
    /// supply a field wins. Tags are unioned. Raw keys are filled key by key
    /// with the same first-writer-wins rule.
    pub fn merge_from(&mut self, source: ExtractedMetadata) {
        if self.title.is_empty() {
            self.title = source.title;
        }
        if self.description.is_empty() {
            self.description = source.description;
        }
        if self.capture_device.is_empty() {
            self.capture_device = source.capture_device;
        }
        if self.created_at.is_none() {
            self.created_at = source.created_at;
        }
        if self.location.is_none() {
            self.location = source.location;
        }

        for tag in source.tags {
            self.add_tag(tag);
        }

        for (key, value) in source.raw {
            if value.is_empty() {
                continue;
            }
            self.raw.entry(key).or_insert(value);
        }
    }
}

// ============================================================================
// Classification and Paths
// ============================================================================

/// Organizational category of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Book,
    Comic,
    Unknown,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Book => "book",
            ContentType::Comic => "comic",
            ContentType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved destination of a file in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedPath {
    /// Full canonical store path (`directory/filename`)
    pub store_path: String,
    /// Everything before the final `/` (may be empty)
    pub directory: String,
    /// Final path segment
    pub filename: String,
    /// Content-addressed write; always false for category-organized stores
    pub deduplication: bool,
}

impl NormalizedPath {
    /// Split a validated store path into its parts
    pub fn from_store_path(store_path: impl Into<String>) -> Self {
        let store_path = store_path.into();
        let (directory, filename) = match store_path.rfind('/') {
            Some(idx) => (
                store_path[..idx].to_string(),
                store_path[idx + 1..].to_string(),
            ),
            None => (String::new(), store_path.clone()),
        };
        Self {
            store_path,
            directory,
            filename,
            deduplication: false,
        }
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.store_path)
    }
}

// ============================================================================
// Extractor Trait
// ============================================================================

/// Per-call context for extractors: run cancellation and progress output
#[derive(Debug, Clone, Default)]
pub struct ExtractContext {
    pub cancel: CancellationToken,
    pub progress: ProgressSink,
}

impl ExtractContext {
    pub fn new(cancel: CancellationToken, progress: ProgressSink) -> Self {
        Self { cancel, progress }
    }
}

/// A strategy that derives metadata from one file
///
/// Implementations must not panic: every failure is an [`ExtractionError`]
/// naming the file. Anything that can block must honor `ctx.cancel`.
///
/// # Example
/// ```rust,ignore
/// pub struct StemExtractor;
///
/// #[async_trait::async_trait]
/// impl MetadataExtractor for StemExtractor {
///     fn name(&self) -> &'static str { "stem" }
///     fn can_extract(&self, _file: &FileInfo) -> bool { true }
///
///     async fn extract(
///         &self,
///         file: &FileInfo,
///         _known: &ExtractedMetadata,
///         _ctx: &ExtractContext,
///     ) -> Result<ExtractedMetadata, ExtractionError> {
///         Ok(ExtractedMetadata { title: file.stem(), ..Default::default() })
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait MetadataExtractor: Send + Sync {
    /// Extractor name for logs and progress events
    fn name(&self) -> &'static str;

    /// Cheap, side-effect-free applicability check
    fn can_extract(&self, file: &FileInfo) -> bool;

    /// Extract metadata from `file`
    ///
    /// `known` is what earlier extractors in a chain already found (an ISBN
    /// or title to look up, for example). It is read-only; the returned
    /// fragment is merged by the caller.
    async fn extract(
        &self,
        file: &FileInfo,
        known: &ExtractedMetadata,
        ctx: &ExtractContext,
    ) -> Result<ExtractedMetadata, ExtractionError>;
}

/// Extractor failure
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// File could not be opened or read
    #[error("Cannot read {path}: {source}")]
    NotAccessible {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Format-native metadata could not be decoded
    #[error("Failed to parse {format} metadata in {path}: {message}")]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },

    /// Remote catalog unreachable, timed out, or returned an error status
    #[error("{service} lookup failed for {path}: {message}")]
    Lookup {
        path: PathBuf,
        service: &'static str,
        message: String,
    },

    /// Remote catalog answered but had nothing for the query
    #[error("{service} has no match for {query:?} ({path})")]
    NoMatch {
        path: PathBuf,
        service: &'static str,
        query: String,
    },

    /// Applicable in principle, but nothing to work from
    #[error("{extractor} not available for {path}: {reason}")]
    NotAvailable {
        path: PathBuf,
        extractor: &'static str,
        reason: String,
    },

    /// Run cancelled while extracting
    #[error("Extraction cancelled for {path}")]
    Cancelled { path: PathBuf },
}

impl ExtractionError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExtractionError::Cancelled { .. })
    }

    pub fn parse(path: &Path, format: &'static str, message: impl fmt::Display) -> Self {
        ExtractionError::Parse {
            path: path.to_path_buf(),
            format,
            message: message.to_string(),
        }
    }

    pub fn lookup(path: &Path, service: &'static str, message: impl fmt::Display) -> Self {
        ExtractionError::Lookup {
            path: path.to_path_buf(),
            service,
            message: message.to_string(),
        }
    }
}

// ============================================================================
// Per-file Errors
// ============================================================================

/// Pipeline stage a file was in when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discovery,
    Extraction,
    Classification,
    Normalization,
    CollisionResolution,
    Write,
    /// Not yet started when the run was cancelled
    Pipeline,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Discovery => "discovery",
            Stage::Extraction => "extraction",
            Stage::Classification => "classification",
            Stage::Normalization => "normalization",
            Stage::CollisionResolution => "collision_resolution",
            Stage::Write => "write",
            Stage::Pipeline => "pipeline",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cause of a per-file failure
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Discovery failed: {0}")]
    Discovery(String),

    #[error("Cancelled before processing")]
    Cancelled,
}

impl StageError {
    pub fn is_cancellation(&self) -> bool {
        match self {
            StageError::Cancelled => true,
            StageError::Extraction(e) => e.is_cancelled(),
            StageError::Path(PathError::Cancelled) => true,
            _ => false,
        }
    }
}

/// Which stage failed for which file, and why
#[derive(Debug, Error)]
#[error("{stage} failed for {}: {source}", file.display())]
pub struct ProcessingError {
    pub file: PathBuf,
    pub stage: Stage,
    #[source]
    pub source: StageError,
}

impl ProcessingError {
    pub fn new(file: impl Into<PathBuf>, stage: Stage, source: impl Into<StageError>) -> Self {
        Self {
            file: file.into(),
            stage,
            source: source.into(),
        }
    }
}

// ============================================================================
// Session and Result
// ============================================================================

/// Session lifecycle: Running → Completed | Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SessionStatus::Running),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            other => Err(format!("unknown session status: {}", other)),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate counts of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub discovered: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SessionStats {
    pub fn completed(&self) -> usize {
        self.processed + self.skipped + self.failed
    }
}

/// Persisted audit record of one pipeline run
///
/// Owned by the pipeline; nothing else mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    /// Who started the run
    pub actor: String,
    pub root_dir: PathBuf,
    pub status: SessionStatus,
    pub stats: SessionStats,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Session {
    /// New running session
    pub fn start(actor: impl Into<String>, root_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor: actor.into(),
            root_dir: root_dir.into(),
            status: SessionStatus::Running,
            stats: SessionStats::default(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Finalize: Completed iff at least one file was processed or skipped
    pub fn finish(&mut self, stats: SessionStats) {
        self.stats = stats;
        self.status = if stats.processed + stats.skipped > 0 {
            SessionStatus::Completed
        } else {
            SessionStatus::Failed
        };
        self.completed_at = Some(Utc::now());
    }
}

/// In-memory outcome of one run
#[derive(Debug)]
pub struct PipelineResult {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub total_files: usize,
    pub processed_files: usize,
    pub skipped_files: usize,
    pub failed_files: usize,
    /// Every per-file failure, in the order it was recorded
    pub errors: Vec<ProcessingError>,
    /// Best-effort failures outside the per-file path (session persistence)
    pub secondary_errors: Vec<String>,
    pub duration: Duration,
}

impl PipelineResult {
    /// Errors attributed to `stage`
    pub fn errors_at(&self, stage: Stage) -> impl Iterator<Item = &ProcessingError> {
        self.errors.iter().filter(move |e| e.stage == stage)
    }

    pub fn was_cancelled(&self) -> bool {
        self.errors.iter().any(|e| e.source.is_cancellation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_first_writer_wins() {
        let mut merged = ExtractedMetadata {
            title: "First".to_string(),
            ..Default::default()
        };
        merged.merge_from(ExtractedMetadata {
            title: "Second".to_string(),
            description: "D".to_string(),
            ..Default::default()
        });

        assert_eq!(merged.title, "First");
        assert_eq!(merged.description, "D");
    }

    #[test]
    fn test_merge_tag_union() {
        let mut merged = ExtractedMetadata::new();
        merged.merge_from(ExtractedMetadata {
            tags: vec!["tag1".into(), "tag2".into()],
            ..Default::default()
        });
        merged.merge_from(ExtractedMetadata {
            tags: vec!["tag2".into(), "tag3".into(), "tag1".into()],
            ..Default::default()
        });

        assert_eq!(merged.tags, vec!["tag1", "tag2", "tag3"]);
    }

    #[test]
    fn test_merge_raw_key_by_key() {
        let mut merged = ExtractedMetadata::new();
        merged.set_raw(raw_keys::AUTHOR, "A");
        let mut incoming = ExtractedMetadata::new();
        incoming.set_raw(raw_keys::AUTHOR, "B");
        incoming.set_raw(raw_keys::PUBLISHER, "P");

        merged.merge_from(incoming);

        assert_eq!(merged.raw_value(raw_keys::AUTHOR), Some("A"));
        assert_eq!(merged.raw_value(raw_keys::PUBLISHER), Some("P"));
    }

    #[test]
    fn test_merge_optional_scalars() {
        let when = Utc::now();
        let mut merged = ExtractedMetadata::new();
        merged.merge_from(ExtractedMetadata {
            created_at: Some(when),
            location: Some(GeoLocation { latitude: 1.0, longitude: 2.0, altitude: None }),
            capture_device: "Scanner".into(),
            ..Default::default()
        });
        merged.merge_from(ExtractedMetadata {
            created_at: None,
            capture_device: "Phone".into(),
            ..Default::default()
        });

        assert_eq!(merged.created_at, Some(when));
        assert_eq!(merged.capture_device, "Scanner");
        assert!(merged.location.is_some());
    }

    #[test]
    fn test_set_raw_ignores_blank() {
        let mut meta = ExtractedMetadata::new();
        meta.set_raw(raw_keys::SERIES, "   ");
        assert!(meta.raw.is_empty());
        assert_eq!(meta.raw_value(raw_keys::SERIES), None);
    }

    #[test]
    fn test_file_info_extension_is_lowercased() {
        let file = FileInfo::new("/books/Story.EPUB");
        assert_eq!(file.extension().as_deref(), Some("epub"));
        assert_eq!(file.stem(), "Story");
        assert!(file.has_extension(&["epub"]));
        assert_eq!(FileInfo::new("/books/README").extension(), None);
    }

    #[test]
    fn test_normalized_path_split() {
        let p = NormalizedPath::from_store_path("books/Author/Title.pdf");
        assert_eq!(p.directory, "books/Author");
        assert_eq!(p.filename, "Title.pdf");
        assert!(!p.deduplication);

        let bare = NormalizedPath::from_store_path("file.pdf");
        assert_eq!(bare.directory, "");
        assert_eq!(bare.filename, "file.pdf");
    }

    #[test]
    fn test_session_finish_status() {
        let mut session = Session::start("tester", "/src");
        session.finish(SessionStats { discovered: 2, skipped: 1, failed: 1, ..Default::default() });
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.completed_at.is_some());

        let mut empty = Session::start("tester", "/src");
        empty.finish(SessionStats::default());
        assert_eq!(empty.status, SessionStatus::Failed);
    }
}
