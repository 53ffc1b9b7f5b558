//! Concurrent ingestion pipeline
//!
//! `run` discovers every file under a source root, persists a running
//! session, and pushes each file through
//! extraction → classification → normalization → collision resolution → write
//! on a bounded pool of workers (`futures::stream::buffer_unordered`).
//! A failing file is recorded as a [`ProcessingError`] and never stops the
//! run. `run_async` does the same work in a background task and streams
//! [`ProgressEvent`]s over a bounded channel.

pub mod stats;

pub use stats::{FileOutcome, StatsAccumulator};

use crate::error::{Error, Result};
use crate::events::{ProgressEvent, ProgressSink};
use crate::extractors::ChainedExtractor;
use crate::normalize::PathNormalizer;
use crate::services::file_scanner::{FileDiscoverer, FileScanner, ScanError};
use crate::store::{ObjectStore, PutOutcome, SessionStore, StoreError};
use crate::types::{
    ExtractContext, FileInfo, PipelineResult, ProcessingError, Session, Stage, StageError,
};
use bindery_common::PipelineSettings;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Writes retried after losing a destination to a concurrent worker
const MAX_CONFLICT_RETRIES: usize = crate::normalize::collision::DEFAULT_MAX_ATTEMPTS;

/// Pipeline tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Number of files processed at once
    pub concurrency: usize,
    /// Capacity of the `run_async` progress channel
    pub progress_buffer: usize,
    /// Persist the running session after this many completions
    pub stats_batch_size: usize,
    /// ...or after this long, whichever comes first
    pub stats_batch_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            progress_buffer: 100,
            stats_batch_size: 50,
            stats_batch_interval: Duration::from_millis(500),
        }
    }
}

impl From<&PipelineSettings> for PipelineConfig {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            concurrency: settings.concurrency,
            progress_buffer: settings.progress_buffer,
            stats_batch_size: settings.stats_batch_size,
            stats_batch_interval: Duration::from_millis(settings.stats_batch_interval_ms),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency < 1 {
            return Err(Error::InvalidConfig("concurrency must be at least 1".into()));
        }
        if self.progress_buffer < 1 {
            return Err(Error::InvalidConfig("progress buffer must be at least 1".into()));
        }
        if self.stats_batch_size < 1 {
            return Err(Error::InvalidConfig("stats batch size must be at least 1".into()));
        }
        if self.stats_batch_interval.is_zero() {
            return Err(Error::InvalidConfig("stats batch interval must be positive".into()));
        }
        Ok(())
    }
}

/// Handle to a background run
///
/// `progress` must be drained (or dropped) while the run is in flight;
/// a full buffer makes workers wait.
#[derive(Debug)]
pub struct RunHandle {
    pub session_id: Uuid,
    pub progress: mpsc::Receiver<ProgressEvent>,
    pub result: oneshot::Receiver<Result<PipelineResult>>,
}

impl RunHandle {
    /// Stop listening for progress and wait for the final result
    pub async fn wait(self) -> Result<PipelineResult> {
        let RunHandle { progress, result, .. } = self;
        drop(progress);
        result.await.unwrap_or_else(|_| {
            Err(Error::Common(bindery_common::Error::Internal(
                "pipeline task ended without a result".into(),
            )))
        })
    }
}

/// The ingestion orchestrator
#[derive(Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    discoverer: Arc<dyn FileDiscoverer>,
    extractor: ChainedExtractor,
    normalizer: Arc<PathNormalizer>,
    object_store: Arc<dyn ObjectStore>,
    session_store: Arc<dyn SessionStore>,
}

impl Pipeline {
    /// # Errors
    /// `Error::InvalidConfig` if `config` fails validation
    pub fn new(
        config: PipelineConfig,
        extractor: ChainedExtractor,
        normalizer: PathNormalizer,
        object_store: Arc<dyn ObjectStore>,
        session_store: Arc<dyn SessionStore>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            discoverer: Arc::new(FileScanner::new()),
            extractor,
            normalizer: Arc::new(normalizer),
            object_store,
            session_store,
        })
    }

    /// Replace the default walkdir discoverer
    pub fn with_discoverer(mut self, discoverer: Arc<dyn FileDiscoverer>) -> Self {
        self.discoverer = discoverer;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run to completion
    ///
    /// # Errors
    /// Only for problems that prevent the run from starting: a source root
    /// that is not a directory, or a discovery failure at the root. Every
    /// per-file failure lands in [`PipelineResult::errors`].
    pub async fn run(
        &self,
        source_root: &Path,
        actor: &str,
        cancel: &CancellationToken,
    ) -> Result<PipelineResult> {
        validate_source_root(source_root)?;
        let session = Session::start(actor, source_root);
        self.execute(session, cancel.clone(), ProgressSink::disabled())
            .await
    }

    /// Start a run in the background and return immediately
    pub fn run_async(
        &self,
        source_root: &Path,
        actor: &str,
        cancel: &CancellationToken,
    ) -> Result<RunHandle> {
        validate_source_root(source_root)?;

        let session = Session::start(actor, source_root);
        let session_id = session.id;
        let (sink, progress) = ProgressSink::channel(self.config.progress_buffer);
        let (result_tx, result) = oneshot::channel();

        let pipeline = self.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let outcome = pipeline.execute(session, cancel, sink).await;
            let _ = result_tx.send(outcome);
        });

        Ok(RunHandle {
            session_id,
            progress,
            result,
        })
    }

    async fn execute(
        &self,
        session: Session,
        cancel: CancellationToken,
        progress: ProgressSink,
    ) -> Result<PipelineResult> {
        let started = Instant::now();
        let session_id = session.id;
        let root = session.root_dir.clone();

        tracing::info!(
            session_id = %session_id,
            root = %root.display(),
            actor = %session.actor,
            "Ingestion run starting"
        );

        let mut errors = Vec::new();
        let discovery = match self.discoverer.discover(&root, &cancel).await {
            Ok(discovery) => discovery,
            Err(ScanError::Cancelled) => {
                errors.push(ProcessingError::new(&root, Stage::Discovery, StageError::Cancelled));
                Default::default()
            }
            Err(e) => return Err(Error::Discovery(e)),
        };

        for e in discovery.errors {
            errors.push(ProcessingError::new(
                e.path,
                Stage::Discovery,
                StageError::Discovery(e.message),
            ));
        }

        let files = discovery.files;
        let total_files = files.len();

        let mut session = session;
        session.stats.discovered = total_files;
        let stats = Arc::new(StatsAccumulator::new(
            session,
            self.session_store.clone(),
            self.config.stats_batch_size,
            self.config.stats_batch_interval,
        ));
        stats.persist().await;

        tracing::info!(session_id = %session_id, total_files, "Discovery complete");
        progress
            .emit(ProgressEvent::RunStarted {
                session_id,
                total_files,
            })
            .await;

        let file_errors: Vec<ProcessingError> = stream::iter(files)
            .map(|file| {
                let stats = stats.clone();
                let cancel = cancel.clone();
                let progress = progress.clone();
                async move {
                    let outcome = self.process_file(&file, &cancel, &progress).await;
                    match outcome {
                        Ok(outcome) => {
                            stats.record(outcome).await;
                            None
                        }
                        Err(error) => {
                            stats.record(FileOutcome::Failed).await;
                            Some(error)
                        }
                    }
                }
            })
            .buffer_unordered(self.config.concurrency)
            .filter_map(|error| async move { error })
            .collect()
            .await;
        errors.extend(file_errors);

        let (session, secondary_errors) = stats.finalize().await;

        if cancel.is_cancelled() {
            tracing::info!(
                session_id = %session_id,
                completed = session.stats.completed(),
                total_files,
                "Ingestion run cancelled"
            );
        }

        progress
            .emit(ProgressEvent::RunCompleted {
                session_id,
                status: session.status,
                processed: session.stats.processed,
                skipped: session.stats.skipped,
                failed: session.stats.failed,
            })
            .await;

        let duration = started.elapsed();
        tracing::info!(
            session_id = %session_id,
            status = %session.status,
            processed = session.stats.processed,
            skipped = session.stats.skipped,
            failed = session.stats.failed,
            duration_ms = duration.as_millis() as u64,
            "Ingestion run finished"
        );

        Ok(PipelineResult {
            session_id,
            status: session.status,
            total_files,
            processed_files: session.stats.processed,
            skipped_files: session.stats.skipped,
            failed_files: session.stats.failed,
            errors,
            secondary_errors,
            duration,
        })
    }

    /// One file through every stage, strictly in order
    async fn process_file(
        &self,
        file: &FileInfo,
        cancel: &CancellationToken,
        progress: &ProgressSink,
    ) -> std::result::Result<FileOutcome, ProcessingError> {
        let fail = |stage: Stage, source: StageError| ProcessingError::new(&file.path, stage, source);

        if cancel.is_cancelled() {
            let error = fail(Stage::Pipeline, StageError::Cancelled);
            report_failure(progress, &error).await;
            return Err(error);
        }

        progress
            .emit(ProgressEvent::FileStarted {
                file_path: file.display().to_string(),
            })
            .await;

        let result = self.run_stages(file, cancel, progress).await;
        match result {
            Ok((outcome, destination)) => {
                tracing::debug!(
                    file = %file.display(),
                    destination = %destination,
                    outcome = ?outcome,
                    "File ingested"
                );
                progress
                    .emit(ProgressEvent::FileCompleted {
                        file_path: file.display().to_string(),
                        destination,
                        outcome: match outcome {
                            FileOutcome::Skipped => "skipped",
                            _ => "written",
                        }
                        .to_string(),
                    })
                    .await;
                Ok(outcome)
            }
            Err((stage, source)) => {
                let error = fail(stage, source);
                report_failure(progress, &error).await;
                Err(error)
            }
        }
    }

    async fn run_stages(
        &self,
        file: &FileInfo,
        cancel: &CancellationToken,
        progress: &ProgressSink,
    ) -> std::result::Result<(FileOutcome, String), (Stage, StageError)> {
        let ctx = ExtractContext::new(cancel.clone(), progress.clone());

        let metadata = self
            .extractor
            .extract(file, &ctx)
            .await
            .map_err(|e| (Stage::Extraction, StageError::from(e)))?;
        progress.stage_completed(&file.path, Stage::Extraction).await;

        let content_type = self.normalizer.classifier().classify(file, Some(&metadata));
        tracing::debug!(file = %file.display(), content_type = %content_type, "Classified");
        progress.stage_completed(&file.path, Stage::Classification).await;

        let path = self
            .normalizer
            .normalize_as(file, Some(&metadata), content_type)
            .map_err(|e| (Stage::Normalization, StageError::from(e)))?;
        progress.stage_completed(&file.path, Stage::Normalization).await;

        let resolving = self.normalizer.has_collision_resolver();
        let mut content = None;
        let mut attempt = 0;

        // Another worker can claim a resolved name before our write lands;
        // the store rejects the loser with Conflict and it resolves again.
        let (outcome, destination) = loop {
            let target = if resolving {
                let resolved = self
                    .normalizer
                    .resolve_collision(path.clone(), cancel)
                    .await
                    .map_err(|e| (Stage::CollisionResolution, StageError::from(e)))?;
                if attempt == 0 {
                    progress
                        .stage_completed(&file.path, Stage::CollisionResolution)
                        .await;
                }
                resolved
            } else {
                path.clone()
            };

            if cancel.is_cancelled() {
                return Err((Stage::Write, StageError::Cancelled));
            }

            let bytes = match content.take() {
                Some(bytes) => bytes,
                None => tokio::fs::read(&file.path).await.map_err(|e| {
                    (Stage::Write, StageError::from(StoreError::io(&file.path, e)))
                })?,
            };
            let (payload, retained) = if resolving {
                (bytes.clone(), Some(bytes))
            } else {
                (bytes, None)
            };

            match self.object_store.put(&target.store_path, payload).await {
                Ok(outcome) => break (outcome, target.store_path),
                Err(StoreError::Conflict { path: taken })
                    if resolving && attempt < MAX_CONFLICT_RETRIES =>
                {
                    attempt += 1;
                    tracing::debug!(
                        file = %file.display(),
                        taken = %taken,
                        attempt,
                        "Destination claimed concurrently, resolving again"
                    );
                    content = retained;
                }
                Err(e) => return Err((Stage::Write, StageError::from(e))),
            }
        };
        progress.stage_completed(&file.path, Stage::Write).await;

        let outcome = match outcome {
            PutOutcome::Written => FileOutcome::Processed,
            PutOutcome::Unchanged => FileOutcome::Skipped,
        };
        Ok((outcome, destination))
    }
}

async fn report_failure(progress: &ProgressSink, error: &ProcessingError) {
    if error.source.is_cancellation() {
        tracing::debug!(file = %error.file.display(), stage = %error.stage, "File cancelled");
    } else {
        tracing::warn!(
            file = %error.file.display(),
            stage = %error.stage,
            error = %error.source,
            "File failed"
        );
    }

    progress
        .emit(ProgressEvent::FileFailed {
            file_path: error.file.display().to_string(),
            stage: error.stage,
            message: error.source.to_string(),
        })
        .await;
}

fn validate_source_root(source_root: &Path) -> Result<()> {
    if !source_root.is_dir() {
        return Err(Error::InvalidInput(format!(
            "source root is not a directory: {}",
            source_root.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::mock::MockExtractor;
    use crate::extractors::FilenameExtractor;
    use crate::store::{LocalObjectStore, MemorySessionStore};
    use crate::types::{ExtractedMetadata, SessionStatus};
    use std::fs;
    use tempfile::TempDir;

    fn pipeline(store_dir: &Path, extractor: ChainedExtractor) -> Pipeline {
        Pipeline::new(
            PipelineConfig::default(),
            extractor,
            PathNormalizer::new(),
            Arc::new(LocalObjectStore::new(store_dir)),
            Arc::new(MemorySessionStore::new()),
        )
        .unwrap()
    }

    fn filename_chain() -> ChainedExtractor {
        ChainedExtractor::new(vec![Arc::new(FilenameExtractor::new())])
    }

    #[test]
    fn test_config_validation() {
        assert!(PipelineConfig::default().validate().is_ok());

        let zero_workers = PipelineConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(zero_workers.validate(), Err(Error::InvalidConfig(_))));

        let zero_interval = PipelineConfig {
            stats_batch_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(zero_interval.validate().is_err());
    }

    #[tokio::test]
    async fn test_run_rejects_missing_root() {
        let store = TempDir::new().unwrap();
        let result = pipeline(store.path(), filename_chain())
            .run(Path::new("/nonexistent/inbox"), "tester", &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_run_writes_and_then_skips_identical() {
        let source = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();
        fs::write(source.path().join("Jane Doe - A Book.pdf"), b"%PDF-1.4\n").unwrap();

        let pipeline = pipeline(store.path(), filename_chain());
        let cancel = CancellationToken::new();

        let first = pipeline.run(source.path(), "tester", &cancel).await.unwrap();
        assert_eq!(first.status, SessionStatus::Completed);
        assert_eq!(first.processed_files, 1);
        assert!(store.path().join("books/Jane Doe/A Book.pdf").is_file());

        let second = pipeline.run(source.path(), "tester", &cancel).await.unwrap();
        assert_eq!(second.status, SessionStatus::Completed);
        assert_eq!(second.processed_files, 0);
        assert_eq!(second.skipped_files, 1);
    }

    #[tokio::test]
    async fn test_extraction_failure_is_recorded_per_file() {
        let source = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();
        fs::write(source.path().join("a.pdf"), b"%PDF-1.4\n").unwrap();

        let chain = ChainedExtractor::new(vec![Arc::new(MockExtractor::failing("broken"))]);
        let result = pipeline(store.path(), chain)
            .run(source.path(), "tester", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.total_files, 1);
        assert_eq!(result.failed_files, 1);
        assert_eq!(result.status, SessionStatus::Failed);
        assert_eq!(result.errors_at(Stage::Extraction).count(), 1);
    }

    #[tokio::test]
    async fn test_conflicting_content_fails_at_write() {
        let source = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();
        fs::write(source.path().join("x.pdf"), b"new content").unwrap();
        fs::create_dir_all(store.path().join("books/Unknown Author")).unwrap();
        fs::write(store.path().join("books/Unknown Author/Titled.pdf"), b"old").unwrap();

        let chain = ChainedExtractor::new(vec![Arc::new(MockExtractor::new(
            "fixed",
            ExtractedMetadata {
                title: "Titled".to_string(),
                ..Default::default()
            },
        ))]);
        let result = pipeline(store.path(), chain)
            .run(source.path(), "tester", &CancellationToken::new())
            .await
            .unwrap();

        let write_errors: Vec<_> = result.errors_at(Stage::Write).collect();
        assert_eq!(write_errors.len(), 1);
        assert!(matches!(
            write_errors[0].source,
            StageError::Store(StoreError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_run_async_streams_events() {
        let source = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();
        fs::write(source.path().join("one.pdf"), b"1").unwrap();
        fs::write(source.path().join("two.epub"), b"2").unwrap();

        let mut handle = pipeline(store.path(), filename_chain())
            .run_async(source.path(), "tester", &CancellationToken::new())
            .unwrap();

        let mut events = Vec::new();
        while let Some(event) = handle.progress.recv().await {
            events.push(event);
        }
        let result = handle.result.await.unwrap().unwrap();

        assert!(matches!(
            events.first(),
            Some(ProgressEvent::RunStarted { total_files: 2, .. })
        ));
        assert!(matches!(events.last(), Some(ProgressEvent::RunCompleted { .. })));
        let completed = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::FileCompleted { .. }))
            .count();
        assert_eq!(completed, 2);
        assert_eq!(result.processed_files, 2);
    }
}
