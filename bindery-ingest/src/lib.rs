//! Bindery ingestion library
//!
//! Organizes books, comics and scans into a metadata-driven path layout:
//! a chain of metadata extractors, a content classifier, a template-driven
//! path normalizer and a concurrent pipeline that writes each file into an
//! object store while recording a session.
//!
//! The [`pipeline::Pipeline`] is the entry point; [`config::build_pipeline`]
//! wires the standard components from a `TomlConfig`.

pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod extractors;
pub mod normalize;
pub mod pipeline;
pub mod services;
pub mod store;
pub mod types;

pub use crate::classifier::ContentClassifier;
pub use crate::error::{Error, Result};
pub use crate::events::{ProgressEvent, ProgressSink};
pub use crate::extractors::ChainedExtractor;
pub use crate::normalize::PathNormalizer;
pub use crate::pipeline::{Pipeline, PipelineConfig, RunHandle};
pub use crate::types::{
    ContentType, ExtractedMetadata, FileInfo, MetadataExtractor, NormalizedPath, PipelineResult,
    ProcessingError, Session, SessionStatus, Stage,
};
