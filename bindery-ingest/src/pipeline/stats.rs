//! Session statistics accumulator
//!
//! The only state shared by all workers. Counter updates are serialized
//! behind one async mutex; the running session is persisted every
//! `batch_size` file completions or after `batch_interval`, whichever comes
//! first. Persistence happens outside the counter lock on a snapshot, and a
//! snapshot older than one already written is dropped. It is best effort:
//! failures are logged and kept as secondary errors.

use crate::store::SessionStore;
use crate::types::{Session, SessionStats};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// How one file ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// New object written to the store
    Processed,
    /// Identical content already stored
    Skipped,
    Failed,
}

struct Inner {
    session: Session,
    pending: usize,
    last_flush: Instant,
    /// Bumped for every snapshot taken
    generation: u64,
    secondary_errors: Vec<String>,
}

pub struct StatsAccumulator {
    inner: Mutex<Inner>,
    /// Generation of the newest snapshot handed to the store
    written: Mutex<u64>,
    store: Arc<dyn SessionStore>,
    batch_size: usize,
    batch_interval: Duration,
}

impl StatsAccumulator {
    pub fn new(
        session: Session,
        store: Arc<dyn SessionStore>,
        batch_size: usize,
        batch_interval: Duration,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                session,
                pending: 0,
                last_flush: Instant::now(),
                generation: 0,
                secondary_errors: Vec::new(),
            }),
            written: Mutex::new(0),
            store,
            batch_size: batch_size.max(1),
            batch_interval,
        }
    }

    /// Persist the session as it stands
    pub async fn persist(&self) {
        let snapshot = Self::snapshot(&mut *self.inner.lock().await);
        self.write(snapshot).await;
    }

    /// Count one finished file
    pub async fn record(&self, outcome: FileOutcome) {
        let snapshot = {
            let mut inner = self.inner.lock().await;
            let stats = &mut inner.session.stats;
            match outcome {
                FileOutcome::Processed => stats.processed += 1,
                FileOutcome::Skipped => stats.skipped += 1,
                FileOutcome::Failed => stats.failed += 1,
            }
            inner.pending += 1;

            if inner.pending >= self.batch_size || inner.last_flush.elapsed() >= self.batch_interval
            {
                Some(Self::snapshot(&mut inner))
            } else {
                None
            }
        };

        if let Some(snapshot) = snapshot {
            self.write(snapshot).await;
        }
    }

    pub async fn stats(&self) -> SessionStats {
        self.inner.lock().await.session.stats
    }

    /// Mark the session terminal, persist it, and hand it back
    pub async fn finalize(&self) -> (Session, Vec<String>) {
        let (generation, session) = {
            let mut inner = self.inner.lock().await;
            let stats = inner.session.stats;
            inner.session.finish(stats);
            Self::snapshot(&mut inner)
        };
        self.write((generation, session.clone())).await;

        let secondary = std::mem::take(&mut self.inner.lock().await.secondary_errors);
        (session, secondary)
    }

    fn snapshot(inner: &mut Inner) -> (u64, Session) {
        inner.pending = 0;
        inner.last_flush = Instant::now();
        inner.generation += 1;
        (inner.generation, inner.session.clone())
    }

    async fn write(&self, (generation, session): (u64, Session)) {
        let mut written = self.written.lock().await;
        if generation <= *written {
            return;
        }
        *written = generation;

        if let Err(e) = self.store.put(&session).await {
            tracing::warn!(
                session_id = %session.id,
                status = %session.status,
                error = %e,
                "Failed to persist session"
            );
            self.inner
                .lock()
                .await
                .secondary_errors
                .push(format!("session {} ({}): {}", session.id, session.status, e));
        }
    }
}
