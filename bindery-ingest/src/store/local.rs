//! Filesystem object store
//!
//! Objects are written to a temporary sibling and then linked into place, so
//! a reader never sees a partial file and two writers racing for one path
//! cannot both win.

use super::{ObjectStore, PutOutcome, StoreError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Object store rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem location of a store path
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    async fn compare_existing(
        &self,
        path: &str,
        target: &Path,
        content: &[u8],
    ) -> Result<PutOutcome, StoreError> {
        let existing = tokio::fs::read(target)
            .await
            .map_err(|e| StoreError::io(target, e))?;
        if existing == content {
            debug!(path = %path, "Identical content already stored");
            Ok(PutOutcome::Unchanged)
        } else {
            Err(StoreError::Conflict {
                path: path.to_string(),
            })
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        let target = self.resolve(path);
        tokio::fs::try_exists(&target)
            .await
            .map_err(|e| StoreError::io(target, e))
    }

    async fn put(&self, path: &str, content: Vec<u8>) -> Result<PutOutcome, StoreError> {
        let target = self.resolve(path);

        if tokio::fs::try_exists(&target)
            .await
            .map_err(|e| StoreError::io(&target, e))?
        {
            return self.compare_existing(path, &target, &content).await;
        }

        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| StoreError::io(&parent, e))?;

        let temp = parent.join(format!(".bindery-{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&temp, &content)
            .await
            .map_err(|e| StoreError::io(&temp, e))?;

        let linked = tokio::fs::hard_link(&temp, &target).await;
        let _ = tokio::fs::remove_file(&temp).await;

        match linked {
            Ok(()) => Ok(PutOutcome::Written),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                self.compare_existing(path, &target, &content).await
            }
            Err(e) => Err(StoreError::io(target, e)),
        }
    }
}
