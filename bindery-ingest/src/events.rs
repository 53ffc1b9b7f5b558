//! Progress events streamed while a run is in flight
//!
//! Events travel over a bounded `tokio::sync::mpsc` channel. The contract is
//! plain backpressure: when the buffer is full the emitting worker waits until
//! the consumer drains it. A dropped receiver is not an error; events are then
//! discarded.

use crate::types::{SessionStatus, Stage};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Ingestion progress event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEvent {
    /// Discovery finished, work is about to be fanned out
    RunStarted {
        session_id: Uuid,
        total_files: usize,
    },

    /// A worker picked up a file
    FileStarted {
        file_path: String,
    },

    /// One extractor in the chain changed state
    ExtractorStatus {
        file_path: String,
        /// Extractor name (e.g., "filename", "open_library")
        extractor: String,
        /// "running", "completed", "failed" or "cancelled"
        status: String,
    },

    /// A per-file stage finished successfully
    StageCompleted {
        file_path: String,
        stage: Stage,
    },

    /// File is in the store (or already was)
    FileCompleted {
        file_path: String,
        destination: String,
        /// "written" or "skipped"
        outcome: String,
    },

    /// File failed at `stage`
    FileFailed {
        file_path: String,
        stage: Stage,
        message: String,
    },

    /// Session finalized
    RunCompleted {
        session_id: Uuid,
        status: SessionStatus,
        processed: usize,
        skipped: usize,
        failed: usize,
    },
}

/// Sending half of the progress stream; a no-op when no one listens
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressSink {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Sink that drops everything
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Bounded channel of `capacity` events and a sink feeding it
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.as_ref().map(|tx| !tx.is_closed()).unwrap_or(false)
    }

    /// Send an event, waiting for buffer space
    pub async fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event).await;
        }
    }

    /// Emit an extractor state change
    pub async fn extractor_status(&self, file: &Path, extractor: &str, status: &str) {
        self.emit(ProgressEvent::ExtractorStatus {
            file_path: file.display().to_string(),
            extractor: extractor.to_string(),
            status: status.to_string(),
        })
        .await;
    }

    pub async fn stage_completed(&self, file: &Path, stage: Stage) {
        self.emit(ProgressEvent::StageCompleted {
            file_path: file.display().to_string(),
            stage,
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_sink_is_noop() {
        let sink = ProgressSink::disabled();
        assert!(!sink.is_enabled());
        sink.emit(ProgressEvent::FileStarted { file_path: "a".into() }).await;
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_block() {
        let (sink, rx) = ProgressSink::channel(1);
        drop(rx);
        sink.emit(ProgressEvent::FileStarted { file_path: "a".into() }).await;
        sink.emit(ProgressEvent::FileStarted { file_path: "b".into() }).await;
        assert!(!sink.is_enabled());
    }

    #[tokio::test]
    async fn test_events_arrive_in_send_order() {
        let (sink, mut rx) = ProgressSink::channel(4);
        sink.extractor_status(Path::new("/x.pdf"), "pdf", "running").await;
        sink.stage_completed(Path::new("/x.pdf"), Stage::Extraction).await;

        assert!(matches!(rx.recv().await, Some(ProgressEvent::ExtractorStatus { .. })));
        assert_eq!(
            rx.recv().await,
            Some(ProgressEvent::StageCompleted {
                file_path: "/x.pdf".into(),
                stage: Stage::Extraction
            })
        );
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(ProgressEvent::FileFailed {
            file_path: "/x.pdf".into(),
            stage: Stage::CollisionResolution,
            message: "boom".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "FileFailed");
        assert_eq!(json["stage"], "collision_resolution");
    }
}
