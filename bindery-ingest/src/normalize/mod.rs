//! Destination path normalization
//!
//! - **sanitize** - make metadata values safe as path segments
//! - **validate** - store-path constraints
//! - **template** - placeholder templates with defaults and sanitizers
//! - **collision** - pluggable collision resolution
//! - **normalizer** - `PathNormalizer`, tying the above together per category

pub mod collision;
pub mod normalizer;
pub mod sanitize;
pub mod template;
pub mod validate;

pub use collision::{CollisionResolver, SuffixCollisionResolver};
pub use normalizer::PathNormalizer;
pub use sanitize::{sanitize_filename, sanitize_path};
pub use template::PathTemplate;
pub use validate::validate_store_path;

use crate::store::StoreError;
use thiserror::Error;

/// Path normalization and collision resolution errors
#[derive(Debug, Error)]
pub enum PathError {
    /// Rendered path violates store constraints
    #[error("Invalid store path {path:?}: {reason}")]
    Invalid { path: String, reason: String },

    /// Template placeholder with neither value nor default
    #[error("Missing required placeholder value: {0}")]
    MissingPlaceholder(String),

    /// No free name within the attempt budget
    #[error("Exceeded {attempts} collision resolution attempts starting from {path}")]
    CollisionLimit { path: String, attempts: usize },

    /// Existence check against the store failed
    #[error("Collision check failed: {0}")]
    Store(#[from] StoreError),

    #[error("Collision resolution cancelled")]
    Cancelled,
}

impl PathError {
    pub(crate) fn invalid(path: &str, reason: impl Into<String>) -> Self {
        PathError::Invalid {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}
