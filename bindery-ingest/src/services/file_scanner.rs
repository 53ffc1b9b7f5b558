//! Source file discovery
//!
//! Walks a directory tree and yields a [`FileInfo`] per candidate document.
//! Root-level problems (missing root, not a directory) are fatal; problems with
//! individual entries are collected as [`DiscoveryError`]s and the walk goes on.

use crate::types::FileInfo;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use walkdir::{DirEntry, WalkDir};

/// Extensions discovered by default
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "pdf", "epub", "cbz", "cbr", "cb7", "cbt", "mobi", "azw3", "djvu",
];

/// Entries skipped by default, matched against the file name
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".DS_Store",
    "Thumbs.db",
    "desktop.ini",
    ".git",
    ".svn",
    "__MACOSX",
];

/// Fatal discovery errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Discovery cancelled")]
    Cancelled,

    /// Blocking walk task died
    #[error("Discovery task failed: {0}")]
    Task(String),
}

/// A single entry that could not be inspected
#[derive(Debug, Clone, Error)]
#[error("{}: {message}", path.display())]
pub struct DiscoveryError {
    pub path: PathBuf,
    pub message: String,
}

/// Files found under a root, plus per-entry errors
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub files: Vec<FileInfo>,
    pub errors: Vec<DiscoveryError>,
}

/// File discovery collaborator
#[async_trait]
pub trait FileDiscoverer: Send + Sync {
    async fn discover(&self, root: &Path, cancel: &CancellationToken)
        -> Result<Discovery, ScanError>;
}

/// walkdir-backed discoverer filtering by extension
#[derive(Debug, Clone)]
pub struct FileScanner {
    extensions: Vec<String>,
    ignore_patterns: Vec<String>,
    skip_hidden: bool,
    max_depth: Option<usize>,
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl FileScanner {
    pub fn new() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            ignore_patterns: DEFAULT_IGNORE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            skip_hidden: true,
            max_depth: None,
        }
    }

    /// Replace the extension allow-list; an empty list accepts every file
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    pub fn with_ignore_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_skip_hidden(mut self, skip_hidden: bool) -> Self {
        self.skip_hidden = skip_hidden;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Walk `root` synchronously
    ///
    /// Files are returned sorted by path. Symlinks are followed; a link that
    /// leads back into an ancestor is skipped, and a file reached twice
    /// through different links is reported once.
    pub fn scan(&self, root: &Path, cancel: &CancellationToken) -> Result<Discovery, ScanError> {
        if !root.exists() {
            return Err(ScanError::PathNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }

        let mut discovery = Discovery::default();
        let mut seen = HashSet::new();

        let walker = WalkDir::new(root)
            .follow_links(true)
            .max_depth(self.max_depth.unwrap_or(usize::MAX))
            .into_iter()
            .filter_entry(|e| self.should_process_entry(e));

        for entry in walker {
            if cancel.is_cancelled() {
                return Err(ScanError::Cancelled);
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                    if e.loop_ancestor().is_some() {
                        tracing::warn!(path = %path.display(), "Symlink loop detected, skipping");
                    } else {
                        tracing::warn!(path = %path.display(), error = %e, "Error accessing entry");
                        discovery.errors.push(DiscoveryError {
                            path,
                            message: e.to_string(),
                        });
                    }
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.matches_extension(entry.path()) {
                continue;
            }

            let canonical = entry
                .path()
                .canonicalize()
                .unwrap_or_else(|_| entry.path().to_path_buf());
            if !seen.insert(canonical) {
                tracing::debug!(path = %entry.path().display(), "Already discovered via another link");
                continue;
            }

            match self.file_info(root, &entry) {
                Ok(info) => discovery.files.push(info),
                Err(e) => discovery.errors.push(e),
            }
        }

        discovery.files.sort_by(|a, b| a.path.cmp(&b.path));

        tracing::debug!(
            root = %root.display(),
            files = discovery.files.len(),
            errors = discovery.errors.len(),
            "Discovery complete"
        );

        Ok(discovery)
    }

    fn should_process_entry(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return true;
        }

        let file_name = entry.file_name().to_string_lossy();
        if self.skip_hidden && file_name.starts_with('.') {
            return false;
        }

        !self.ignore_patterns.iter().any(|p| file_name == p.as_str())
    }

    fn matches_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .map(|e| self.extensions.iter().any(|x| *x == e))
            .unwrap_or(false)
    }

    fn file_info(&self, root: &Path, entry: &DirEntry) -> Result<FileInfo, DiscoveryError> {
        let path = entry.path();
        let metadata = entry.metadata().map_err(|e| DiscoveryError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut info = FileInfo::new(path);
        info.relative_path = path.strip_prefix(root).unwrap_or(path).to_path_buf();
        info.size = metadata.len();
        info.modified = metadata.modified().ok().map(DateTime::<Utc>::from);
        info.mime_type = detect_mime_type(path);

        Ok(info)
    }
}

#[async_trait]
impl FileDiscoverer for FileScanner {
    async fn discover(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<Discovery, ScanError> {
        let scanner = self.clone();
        let root = root.to_path_buf();
        let cancel = cancel.clone();

        tokio::task::spawn_blocking(move || scanner.scan(&root, &cancel))
            .await
            .map_err(|e| ScanError::Task(e.to_string()))?
    }
}

/// MIME type from magic bytes, falling back to the extension
///
/// Comic archives and EPUBs sniff as generic containers, so a known
/// extension wins over a generic archive type.
pub fn detect_mime_type(path: &Path) -> Option<String> {
    let by_extension = path
        .extension()
        .and_then(|e| mime_for_extension(&e.to_string_lossy().to_lowercase()));

    let sniffed = match infer::get_from_path(path) {
        Ok(kind) => kind.map(|k| k.mime_type()),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "MIME sniffing failed");
            None
        }
    };

    match (sniffed, by_extension) {
        (Some(sniffed), Some(ext)) if is_generic_container(sniffed) => Some(ext.to_string()),
        (Some(sniffed), _) => Some(sniffed.to_string()),
        (None, ext) => ext.map(str::to_string),
    }
}

fn is_generic_container(mime: &str) -> bool {
    matches!(
        mime,
        "application/zip"
            | "application/vnd.rar"
            | "application/x-rar-compressed"
            | "application/x-7z-compressed"
            | "application/x-tar"
    )
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext {
        "pdf" => "application/pdf",
        "epub" => "application/epub+zip",
        "cbz" => "application/vnd.comicbook+zip",
        "cbr" => "application/vnd.comicbook-rar",
        "cb7" => "application/x-cb7",
        "cbt" => "application/x-cbt",
        "mobi" => "application/x-mobipocket-ebook",
        "azw3" => "application/vnd.amazon.ebook",
        "djvu" => "image/vnd.djvu",
        _ => return None,
    };
    Some(mime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn library() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("a.pdf"), b"%PDF-1.4\n%%EOF\n").unwrap();
        fs::write(root.join("b.EPUB"), b"not really an epub").unwrap();
        fs::write(root.join("notes.txt"), b"ignored").unwrap();
        fs::write(root.join(".hidden.pdf"), b"%PDF-1.4\n").unwrap();
        fs::create_dir_all(root.join("nested/deeper")).unwrap();
        fs::write(root.join("nested/c.cbz"), b"PK\x03\x04").unwrap();
        fs::write(root.join("nested/deeper/d.pdf"), b"%PDF-1.4\n").unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join(".git/e.pdf"), b"%PDF-1.4\n").unwrap();
        dir
    }

    fn names(discovery: &Discovery) -> Vec<String> {
        discovery
            .files
            .iter()
            .map(|f| f.relative_path.to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_scan_filters_extensions_and_hidden() {
        let dir = library();
        let discovery = FileScanner::new()
            .scan(dir.path(), &CancellationToken::new())
            .unwrap();

        assert_eq!(
            names(&discovery),
            vec!["a.pdf", "b.EPUB", "nested/c.cbz", "nested/deeper/d.pdf"]
        );
        assert!(discovery.errors.is_empty());
    }

    #[test]
    fn test_scan_fills_file_info() {
        let dir = library();
        let discovery = FileScanner::new()
            .scan(dir.path(), &CancellationToken::new())
            .unwrap();

        let pdf = &discovery.files[0];
        assert_eq!(pdf.path, dir.path().join("a.pdf"));
        assert_eq!(pdf.size, 15);
        assert!(pdf.modified.is_some());
        assert_eq!(pdf.mime_type.as_deref(), Some("application/pdf"));

        let cbz = &discovery.files[2];
        assert_eq!(cbz.mime_type.as_deref(), Some("application/vnd.comicbook+zip"));
    }

    #[test]
    fn test_scan_max_depth() {
        let dir = library();
        let discovery = FileScanner::new()
            .with_max_depth(1)
            .scan(dir.path(), &CancellationToken::new())
            .unwrap();
        assert_eq!(names(&discovery), vec!["a.pdf", "b.EPUB"]);
    }

    #[test]
    fn test_scan_all_extensions_including_hidden() {
        let dir = library();
        let discovery = FileScanner::new()
            .with_extensions(Vec::<String>::new())
            .with_skip_hidden(false)
            .with_ignore_patterns(vec![".git"])
            .scan(dir.path(), &CancellationToken::new())
            .unwrap();
        let found = names(&discovery);
        assert!(found.contains(&"notes.txt".to_string()));
        assert!(found.contains(&".hidden.pdf".to_string()));
        assert!(!found.iter().any(|f| f.starts_with(".git/")));
    }

    #[test]
    fn test_scan_nonexistent_path() {
        let result = FileScanner::new().scan(Path::new("/nonexistent/path"), &CancellationToken::new());
        assert!(matches!(result, Err(ScanError::PathNotFound(_))));
    }

    #[test]
    fn test_scan_file_as_directory() {
        let dir = library();
        let result = FileScanner::new().scan(&dir.path().join("a.pdf"), &CancellationToken::new());
        assert!(matches!(result, Err(ScanError::NotADirectory(_))));
    }

    #[test]
    fn test_scan_empty_directory() {
        let dir = TempDir::new().unwrap();
        let discovery = FileScanner::new()
            .scan(dir.path(), &CancellationToken::new())
            .unwrap();
        assert!(discovery.files.is_empty());
    }

    #[test]
    fn test_scan_cancelled() {
        let dir = library();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = FileScanner::new().scan(dir.path(), &cancel);
        assert!(matches!(result, Err(ScanError::Cancelled)));
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_symlink_loop_and_duplicate_links() {
        let dir = library();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("nested/loop")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("a.pdf"), dir.path().join("alias.pdf"))
            .unwrap();

        let discovery = FileScanner::new()
            .scan(dir.path(), &CancellationToken::new())
            .unwrap();

        assert_eq!(discovery.files.len(), 4);
        assert!(discovery.errors.is_empty());
    }

    #[tokio::test]
    async fn test_discover_runs_off_thread() {
        let dir = library();
        let discovery = FileScanner::new()
            .discover(dir.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(discovery.files.len(), 4);
    }

    #[test]
    fn test_mime_fallback_by_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.djvu");
        fs::write(&path, b"??").unwrap();
        assert_eq!(detect_mime_type(&path).as_deref(), Some("image/vnd.djvu"));

        let path = dir.path().join("x.bin");
        fs::write(&path, b"??").unwrap();
        assert_eq!(detect_mime_type(&path), None);
    }
}
