//! Collision resolution
//!
//! A resolver turns a candidate store path into one that is free. The default
//! policy appends a numeric suffix before the extension:
//! `file.pdf` → `file_1.pdf` → `file_2.pdf` …

use super::PathError;
use crate::store::ObjectStore;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default suffix separator
pub const DEFAULT_SEPARATOR: &str = "_";

/// Default number of suffixed candidates tried
pub const DEFAULT_MAX_ATTEMPTS: usize = 100;

/// Pluggable collision resolution policy
#[async_trait]
pub trait CollisionResolver: Send + Sync {
    /// Return a path that does not collide, derived from `candidate`
    async fn resolve(&self, candidate: &str, cancel: &CancellationToken) -> Result<String, PathError>;
}

/// Numeric-suffix resolver backed by an [`ObjectStore`] existence check
pub struct SuffixCollisionResolver {
    store: Arc<dyn ObjectStore>,
    separator: String,
    max_attempts: usize,
}

impl SuffixCollisionResolver {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            separator: DEFAULT_SEPARATOR.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    fn candidate(&self, base: &str, n: usize) -> String {
        let (dir, name) = match base.rfind('/') {
            Some(idx) => base.split_at(idx + 1),
            None => ("", base),
        };
        let (stem, ext) = match name.rfind('.') {
            Some(idx) if idx > 0 => name.split_at(idx),
            _ => (name, ""),
        };
        format!("{}{}{}{}{}", dir, stem, self.separator, n, ext)
    }
}

#[async_trait]
impl CollisionResolver for SuffixCollisionResolver {
    async fn resolve(&self, candidate: &str, cancel: &CancellationToken) -> Result<String, PathError> {
        if !self.store.exists(candidate).await? {
            return Ok(candidate.to_string());
        }

        for n in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                return Err(PathError::Cancelled);
            }
            let next = self.candidate(candidate, n);
            if !self.store.exists(&next).await? {
                debug!(from = %candidate, to = %next, "Resolved path collision");
                return Ok(next);
            }
        }

        Err(PathError::CollisionLimit {
            path: candidate.to_string(),
            attempts: self.max_attempts,
        })
    }
}
