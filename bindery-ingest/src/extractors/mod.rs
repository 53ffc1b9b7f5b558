//! Metadata extractors and the chain that runs them
//!
//! Each extractor implements [`MetadataExtractor`] from the `types` module.
//! [`ChainedExtractor`] runs them in registration order and merges their
//! fragments with the fill-gaps rule of [`ExtractedMetadata::merge_from`], so
//! registration order is a priority ranking: most trusted source first.
//!
//! # Extractors
//! 1. **filename_extractor** - Author/title/series/ISBN patterns in the file name
//! 2. **pdf_extractor** - PDF document information dictionary
//! 3. **epub_extractor** - EPUB package (OPF) metadata
//! 4. **comic_info_extractor** - `ComicInfo.xml` inside CBZ archives
//! 5. **open_library_client** - Bibliographic catalog lookup by ISBN or title
//! 6. **comic_catalog_client** - Comics catalog lookup by title
//!
//! # Fault tolerance
//! A failing extractor is logged and the chain moves on. The chain only fails
//! when every applicable extractor failed, or when the run is cancelled.

pub mod comic_catalog_client;
pub mod comic_info_extractor;
pub mod epub_extractor;
pub mod filename_extractor;
pub mod http;
pub mod open_library_client;
pub mod pdf_extractor;

pub use comic_catalog_client::ComicCatalogClient;
pub use comic_info_extractor::ComicInfoExtractor;
pub use epub_extractor::EpubExtractor;
pub use filename_extractor::FilenameExtractor;
pub use http::CatalogOptions;
pub use open_library_client::OpenLibraryClient;
pub use pdf_extractor::PdfExtractor;

use crate::types::{ExtractContext, ExtractedMetadata, ExtractionError, FileInfo, MetadataExtractor};
use std::sync::Arc;
use tracing::{debug, warn};

/// Sequential extractor chain with fill-gaps merging
///
/// # Example
/// ```rust,ignore
/// let chain = ChainedExtractor::new(vec![
///     Arc::new(FilenameExtractor::new()),
///     Arc::new(PdfExtractor::new()),
/// ]);
///
/// let metadata = chain.extract(&file, &ctx).await?;
/// ```
#[derive(Clone, Default)]
pub struct ChainedExtractor {
    extractors: Vec<Arc<dyn MetadataExtractor>>,
}

impl ChainedExtractor {
    /// Chain running `extractors` in the given order
    pub fn new(extractors: Vec<Arc<dyn MetadataExtractor>>) -> Self {
        Self { extractors }
    }

    /// Append an extractor (lowest priority so far)
    pub fn push(&mut self, extractor: Arc<dyn MetadataExtractor>) {
        self.extractors.push(extractor);
    }

    /// Extractor names in registration order
    pub fn names(&self) -> Vec<&'static str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    /// True if any member extractor applies to `file`
    pub fn can_extract(&self, file: &FileInfo) -> bool {
        self.extractors.iter().any(|e| e.can_extract(file))
    }

    /// Run every applicable extractor over `file` and merge the results
    ///
    /// # Errors
    /// - `ExtractionError::Cancelled` as soon as cancellation is observed
    /// - The last extractor error, if extractors ran and none succeeded
    ///
    /// A file no extractor claims yields empty metadata, not an error.
    pub async fn extract(
        &self,
        file: &FileInfo,
        ctx: &ExtractContext,
    ) -> Result<ExtractedMetadata, ExtractionError> {
        self.run(file, ExtractedMetadata::new(), ctx).await
    }

    async fn run(
        &self,
        file: &FileInfo,
        seed: ExtractedMetadata,
        ctx: &ExtractContext,
    ) -> Result<ExtractedMetadata, ExtractionError> {
        let mut acc = ChainAccumulator::new(seed);

        for extractor in &self.extractors {
            let name = extractor.name();
            if !extractor.can_extract(file) {
                continue;
            }

            if ctx.cancel.is_cancelled() {
                ctx.progress.extractor_status(&file.path, name, "cancelled").await;
                return Err(ExtractionError::Cancelled {
                    path: file.path.clone(),
                });
            }

            ctx.progress.extractor_status(&file.path, name, "running").await;

            match extractor.extract(file, &acc.merged, ctx).await {
                Ok(fragment) => {
                    debug!(
                        extractor = name,
                        file = %file.display(),
                        "Extraction successful"
                    );
                    acc.record_success(fragment);
                    ctx.progress.extractor_status(&file.path, name, "completed").await;
                }
                Err(e) if e.is_cancelled() => {
                    ctx.progress.extractor_status(&file.path, name, "cancelled").await;
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        extractor = name,
                        file = %file.display(),
                        error = %e,
                        "Extraction failed, continuing chain"
                    );
                    acc.record_failure(e);
                    ctx.progress.extractor_status(&file.path, name, "failed").await;
                }
            }
        }

        acc.finish()
    }
}

#[async_trait::async_trait]
impl MetadataExtractor for ChainedExtractor {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn can_extract(&self, file: &FileInfo) -> bool {
        ChainedExtractor::can_extract(self, file)
    }

    async fn extract(
        &self,
        file: &FileInfo,
        known: &ExtractedMetadata,
        ctx: &ExtractContext,
    ) -> Result<ExtractedMetadata, ExtractionError> {
        self.run(file, known.clone(), ctx).await
    }
}

/// Loop state of one chain run
///
/// Kept separate from the I/O loop so the success/failure policy can be
/// tested on its own.
#[derive(Debug)]
struct ChainAccumulator {
    merged: ExtractedMetadata,
    last_error: Option<ExtractionError>,
    any_succeeded: bool,
}

impl ChainAccumulator {
    fn new(seed: ExtractedMetadata) -> Self {
        Self {
            merged: seed,
            last_error: None,
            any_succeeded: false,
        }
    }

    fn record_success(&mut self, fragment: ExtractedMetadata) {
        self.merged.merge_from(fragment);
        self.any_succeeded = true;
    }

    fn record_failure(&mut self, error: ExtractionError) {
        self.last_error = Some(error);
    }

    fn finish(self) -> Result<ExtractedMetadata, ExtractionError> {
        match (self.any_succeeded, self.last_error) {
            (false, Some(error)) => Err(error),
            _ => Ok(self.merged),
        }
    }
}

/// Flatten an HTML fragment to single-spaced text
///
/// Catalog and package descriptions are frequently marked up.
pub(crate) fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// Mock Extractor for Testing
// ============================================================================


// ============================================================================
// Tests
// ============================================================================
