//! Session audit records in SQLite
//!
//! One row per session ID; the stats are stored as a JSON document so the
//! record can grow counters without a migration.

use crate::store::{SessionStore, StoreError};
use crate::types::{Session, SessionStats, SessionStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Most recently started sessions, newest first
    pub async fn recent(&self, limit: u32) -> Result<Vec<Session>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT session_id, actor, root_dir, status, stats, started_at, completed_at
            FROM ingest_sessions
            ORDER BY started_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(session_from_row).collect()
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn put(&self, session: &Session) -> Result<(), StoreError> {
        // Prepare everything before touching the pool
        let session_id = session.id.to_string();
        let root_dir = session.root_dir.to_string_lossy().into_owned();
        let stats = serde_json::to_string(&session.stats)?;
        let started_at = session.started_at.to_rfc3339();
        let completed_at = session.completed_at.map(|dt| dt.to_rfc3339());

        sqlx::query(
            r#"
            INSERT INTO ingest_sessions (
                session_id, actor, root_dir, status, stats, started_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                status = excluded.status,
                stats = excluded.stats,
                completed_at = excluded.completed_at
            "#,
        )
        .bind(&session_id)
        .bind(&session.actor)
        .bind(&root_dir)
        .bind(session.status.as_str())
        .bind(&stats)
        .bind(&started_at)
        .bind(&completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT session_id, actor, root_dir, status, stats, started_at, completed_at
            FROM ingest_sessions
            WHERE session_id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(session_from_row).transpose()
    }
}

fn session_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Session, StoreError> {
    let id: String = row.try_get("session_id")?;
    let id = Uuid::parse_str(&id)
        .map_err(|e| StoreError::Corrupt(format!("session_id {}: {}", id, e)))?;

    let status: String = row.try_get("status")?;
    let status: SessionStatus = status.parse().map_err(StoreError::Corrupt)?;

    let stats: String = row.try_get("stats")?;
    let stats: SessionStats = serde_json::from_str(&stats)?;

    let started_at: String = row.try_get("started_at")?;
    let started_at = parse_timestamp(&started_at)?;

    let completed_at: Option<String> = row.try_get("completed_at")?;
    let completed_at = completed_at.as_deref().map(parse_timestamp).transpose()?;

    let root_dir: String = row.try_get("root_dir")?;

    Ok(Session {
        id,
        actor: row.try_get("actor")?,
        root_dir: PathBuf::from(root_dir),
        status,
        stats,
        started_at,
        completed_at,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {}: {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database_pool;
    use tempfile::TempDir;

    async fn store() -> (TempDir, SqliteSessionStore) {
        let dir = TempDir::new().unwrap();
        let pool = init_database_pool(&dir.path().join("db/bindery.db"))
            .await
            .unwrap();
        (dir, SqliteSessionStore::new(pool))
    }

    #[tokio::test]
    async fn test_round_trip_and_upsert() {
        let (_dir, store) = store().await;

        let mut session = Session::start("tester", "/srv/inbox");
        store.put(&session).await.unwrap();

        let loaded = store.get(session.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Running);
        assert_eq!(loaded.actor, "tester");
        assert_eq!(loaded.root_dir, PathBuf::from("/srv/inbox"));
        assert!(loaded.completed_at.is_none());

        session.finish(SessionStats {
            discovered: 3,
            processed: 2,
            skipped: 0,
            failed: 1,
        });
        store.put(&session).await.unwrap();

        let loaded = store.get(session.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Completed);
        assert_eq!(loaded.stats.failed, 1);
        assert!(loaded.completed_at.is_some());

        assert_eq!(store.recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_session() {
        let (_dir, store) = store().await;
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_status_is_reported() {
        let (_dir, store) = store().await;
        let session = Session::start("tester", "/srv");
        store.put(&session).await.unwrap();

        sqlx::query("UPDATE ingest_sessions SET status = 'exploded'")
            .execute(store.pool())
            .await
            .unwrap();

        let err = store.get(session.id).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
