//! Write targets
//!
//! - [`ObjectStore`]: where organized files land ([`LocalObjectStore`])
//! - [`SessionStore`]: where session audit records live
//!   ([`MemorySessionStore`], or `db::SqliteSessionStore`)

pub mod local;
pub mod session;

pub use local::LocalObjectStore;
pub use session::MemorySessionStore;

use crate::types::Session;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Store errors (object writes and session persistence)
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Different content already stored at the path
    #[error("Different content already exists at {path}")]
    Conflict { path: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted record could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result of a successful put
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// New object written
    Written,
    /// Identical content was already there; nothing written
    Unchanged,
}

/// Durable object write target keyed by store path
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// True if an object exists at `path`
    async fn exists(&self, path: &str) -> Result<bool, StoreError>;

    /// Write `content` at `path` exactly once
    ///
    /// Identical existing content is `Unchanged`; different existing content
    /// is `StoreError::Conflict`.
    async fn put(&self, path: &str, content: Vec<u8>) -> Result<PutOutcome, StoreError>;
}

/// Session audit record store, keyed by session ID
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace `session`
    async fn put(&self, session: &Session) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Session>, StoreError>;
}
