//! src/services/session_store.rs
//!
//! Persistence for upload sessions. Beyond plain CRUD the store offers two
//! conditional updates that the coordinator relies on for all of its
//! concurrency safety: adding a chunk index to a session's completed set and
//! moving a session out of `UPLOADING`. Each is one SQL statement whose row
//! count says whether the predicate held, so several service instances can
//! share one database without any in-process locking.

use crate::models::upload_session::{UploadSession, UploadSessionRow, UploadStatus};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("record `{0}` not found")]
    Missing(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type MetadataResult<T> = Result<T, MetadataError>;

#[async_trait]
pub trait UploadSessionStore: Send + Sync {
    async fn insert(&self, session: &UploadSession) -> MetadataResult<()>;

    async fn get(&self, upload_id: &str) -> MetadataResult<Option<UploadSession>>;

    /// Overwrite the mutable fields of an existing session.
    async fn save(&self, session: &UploadSession) -> MetadataResult<()>;

    /// Atomically add `chunk_index` to the completed set.
    ///
    /// Succeeds only if the session exists, is `UPLOADING`, belongs to
    /// `expected_owner`, has `chunk_index < total_chunks`, and does not yet
    /// contain `chunk_index`. Returns whether the update happened.
    async fn try_add_chunk(
        &self,
        upload_id: &str,
        chunk_index: u32,
        expected_owner: &str,
    ) -> MetadataResult<bool>;

    /// Whether `owner`'s session `upload_id` already lists `chunk_index`.
    async fn has_chunk(&self, upload_id: &str, chunk_index: u32, owner: &str)
    -> MetadataResult<bool>;

    /// Atomically move `upload_id` from `from` to `to`. Returns whether the
    /// session was in `from` and therefore changed.
    async fn try_transition(
        &self,
        upload_id: &str,
        from: UploadStatus,
        to: UploadStatus,
    ) -> MetadataResult<bool>;
}

/// SQLite-backed session store.
#[derive(Clone)]
pub struct SqliteSessionStore {
    pub db: Arc<SqlitePool>,
}

impl SqliteSessionStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

fn encode_chunks(session: &UploadSession) -> MetadataResult<String> {
    serde_json::to_string(&session.completed_chunks)
        .map_err(|err| MetadataError::Corrupt(err.to_string()))
}

/// SQLite integers are signed; refuse sizes that would wrap.
fn to_sql_int(value: u64, field: &str) -> MetadataResult<i64> {
    i64::try_from(value).map_err(|_| MetadataError::Corrupt(format!("{field} {value} out of range")))
}

#[async_trait]
impl UploadSessionStore for SqliteSessionStore {
    async fn insert(&self, session: &UploadSession) -> MetadataResult<()> {
        sqlx::query(
            "INSERT INTO upload_sessions (
                id, owner_id, file_name, mime_type, parent_id, total_size, chunk_size,
                total_chunks, completed_chunks, storage_handle, status, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.upload_id)
        .bind(&session.owner_id)
        .bind(&session.file_name)
        .bind(&session.mime_type)
        .bind(&session.parent_id)
        .bind(to_sql_int(session.total_size, "total_size")?)
        .bind(to_sql_int(session.chunk_size, "chunk_size")?)
        .bind(i64::from(session.total_chunks))
        .bind(encode_chunks(session)?)
        .bind(&session.storage_handle)
        .bind(session.status.as_str())
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    async fn get(&self, upload_id: &str) -> MetadataResult<Option<UploadSession>> {
        let row = sqlx::query_as::<_, UploadSessionRow>(
            "SELECT id, owner_id, file_name, mime_type, parent_id, total_size, chunk_size,
                    total_chunks, completed_chunks, storage_handle, status, created_at, updated_at
             FROM upload_sessions WHERE id = ?",
        )
        .bind(upload_id)
        .fetch_optional(&*self.db)
        .await?;

        row.map(UploadSession::try_from)
            .transpose()
            .map_err(MetadataError::Corrupt)
    }

    async fn save(&self, session: &UploadSession) -> MetadataResult<()> {
        let result = sqlx::query(
            "UPDATE upload_sessions
             SET file_name = ?, mime_type = ?, parent_id = ?, completed_chunks = ?,
                 storage_handle = ?, status = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&session.file_name)
        .bind(&session.mime_type)
        .bind(&session.parent_id)
        .bind(encode_chunks(session)?)
        .bind(&session.storage_handle)
        .bind(session.status.as_str())
        .bind(session.updated_at)
        .bind(&session.upload_id)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::Missing(session.upload_id.clone()));
        }
        Ok(())
    }

    async fn try_add_chunk(
        &self,
        upload_id: &str,
        chunk_index: u32,
        expected_owner: &str,
    ) -> MetadataResult<bool> {
        let index = i64::from(chunk_index);
        let result = sqlx::query(
            "UPDATE upload_sessions
             SET completed_chunks = json_insert(completed_chunks, '$[#]', ?),
                 updated_at = ?
             WHERE id = ?
               AND owner_id = ?
               AND status = ?
               AND ? < total_chunks
               AND NOT EXISTS (
                   SELECT 1 FROM json_each(upload_sessions.completed_chunks)
                   WHERE json_each.value = ?
               )",
        )
        .bind(index)
        .bind(Utc::now())
        .bind(upload_id)
        .bind(expected_owner)
        .bind(UploadStatus::Uploading.as_str())
        .bind(index)
        .bind(index)
        .execute(&*self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn has_chunk(
        &self,
        upload_id: &str,
        chunk_index: u32,
        owner: &str,
    ) -> MetadataResult<bool> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT EXISTS (
                 SELECT 1 FROM upload_sessions, json_each(upload_sessions.completed_chunks)
                 WHERE upload_sessions.id = ?
                   AND upload_sessions.owner_id = ?
                   AND json_each.value = ?
             )",
        )
        .bind(upload_id)
        .bind(owner)
        .bind(i64::from(chunk_index))
        .fetch_one(&*self.db)
        .await?;
        Ok(found != 0)
    }

    async fn try_transition(
        &self,
        upload_id: &str,
        from: UploadStatus,
        to: UploadStatus,
    ) -> MetadataResult<bool> {
        let result = sqlx::query(
            "UPDATE upload_sessions SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(Utc::now())
        .bind(upload_id)
        .bind(from.as_str())
        .execute(&*self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    async fn store() -> (TempDir, SqliteSessionStore) {
        let dir = TempDir::new().unwrap();
        let pool = db::connect_file(&dir.path().join("sessions.db"), 4)
            .await
            .unwrap();
        db::run_migrations(&pool).await.unwrap();
        (dir, SqliteSessionStore::new(Arc::new(pool)))
    }

    fn session(id: &str, owner: &str, total_chunks: u32) -> UploadSession {
        let now = Utc::now();
        UploadSession {
            upload_id: id.to_string(),
            owner_id: owner.to_string(),
            file_name: "movie.mkv".into(),
            mime_type: Some("video/x-matroska".into()),
            parent_id: None,
            total_size: u64::from(total_chunks) * 4,
            chunk_size: 4,
            total_chunks,
            completed_chunks: BTreeSet::new(),
            storage_handle: id.to_string(),
            status: UploadStatus::Uploading,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn insert_get_save_round_trip() {
        let (_dir, store) = store().await;
        assert!(store.get("nope").await.unwrap().is_none());

        let mut s = session("s1", "alice", 3);
        store.insert(&s).await.unwrap();
        let loaded = store.get("s1").await.unwrap().unwrap();
        assert_eq!(loaded.owner_id, "alice");
        assert_eq!(loaded.total_chunks, 3);
        assert_eq!(loaded.status, UploadStatus::Uploading);
        assert!(loaded.completed_chunks.is_empty());

        s.completed_chunks.extend([0, 2]);
        s.status = UploadStatus::Aborted;
        store.save(&s).await.unwrap();
        let loaded = store.get("s1").await.unwrap().unwrap();
        assert_eq!(loaded.completed_chunks, BTreeSet::from([0, 2]));
        assert_eq!(loaded.status, UploadStatus::Aborted);

        let ghost = session("ghost", "alice", 1);
        assert!(matches!(
            store.save(&ghost).await,
            Err(MetadataError::Missing(_))
        ));
    }

    /// The conditional add must hold exactly when: the session exists, it is
    /// UPLOADING, the owner matches, the index is in range, and the index is
    /// not yet recorded.
    #[tokio::test]
    async fn try_add_chunk_predicate() {
        let (_dir, store) = store().await;
        store.insert(&session("s1", "alice", 2)).await.unwrap();

        assert!(!store.try_add_chunk("missing", 0, "alice").await.unwrap());
        assert!(!store.try_add_chunk("s1", 0, "mallory").await.unwrap());
        assert!(!store.try_add_chunk("s1", 2, "alice").await.unwrap());

        assert!(store.try_add_chunk("s1", 1, "alice").await.unwrap());
        assert!(!store.try_add_chunk("s1", 1, "alice").await.unwrap());
        assert!(store.try_add_chunk("s1", 0, "alice").await.unwrap());

        let loaded = store.get("s1").await.unwrap().unwrap();
        assert_eq!(loaded.completed_chunks, BTreeSet::from([0, 1]));
        assert!(loaded.is_complete());

        store.insert(&session("s2", "alice", 2)).await.unwrap();
        assert!(
            store
                .try_transition("s2", UploadStatus::Uploading, UploadStatus::Completed)
                .await
                .unwrap()
        );
        assert!(!store.try_add_chunk("s2", 0, "alice").await.unwrap());
    }

    #[tokio::test]
    async fn has_chunk_checks_owner_and_membership() {
        let (_dir, store) = store().await;
        store.insert(&session("s1", "alice", 4)).await.unwrap();
        store.try_add_chunk("s1", 3, "alice").await.unwrap();

        assert!(store.has_chunk("s1", 3, "alice").await.unwrap());
        assert!(!store.has_chunk("s1", 2, "alice").await.unwrap());
        assert!(!store.has_chunk("s1", 3, "mallory").await.unwrap());
        assert!(!store.has_chunk("missing", 3, "alice").await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_adds_of_distinct_indices_are_all_kept() {
        let (_dir, store) = store().await;
        store.insert(&session("s1", "alice", 32)).await.unwrap();

        let tasks: Vec<_> = (0..32u32)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.try_add_chunk("s1", i, "alice").await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().unwrap());
        }

        let loaded = store.get("s1").await.unwrap().unwrap();
        assert_eq!(loaded.completed_chunks, (0..32).collect::<BTreeSet<u32>>());
    }

    #[tokio::test]
    async fn transition_happens_once() {
        let (_dir, store) = store().await;
        store.insert(&session("s1", "alice", 1)).await.unwrap();

        assert!(
            store
                .try_transition("s1", UploadStatus::Uploading, UploadStatus::Aborted)
                .await
                .unwrap()
        );
        assert!(
            !store
                .try_transition("s1", UploadStatus::Uploading, UploadStatus::Completed)
                .await
                .unwrap()
        );
        let loaded = store.get("s1").await.unwrap().unwrap();
        assert_eq!(loaded.status, UploadStatus::Aborted);
    }

    #[test]
    fn sizes_that_would_wrap_are_refused() {
        assert_eq!(to_sql_int(42, "total_size").unwrap(), 42);
        assert!(matches!(
            to_sql_int(i64::MAX as u64 + 1, "total_size"),
            Err(MetadataError::Corrupt(_))
        ));
    }
}
