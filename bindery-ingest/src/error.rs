//! Crate-level errors
//!
//! Per-file failures never surface here; they are collected as
//! [`ProcessingError`](crate::types::ProcessingError)s in the run result.
//! These are the errors that stop a run from starting at all.

use crate::services::file_scanner::ScanError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Pipeline or extractor configuration rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Bad run arguments (e.g., source root is not a directory)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Discovery could not walk the source root
    #[error("Discovery failed: {0}")]
    Discovery(#[from] ScanError),

    #[error("Common error: {0}")]
    Common(#[from] bindery_common::Error),
}
