//! src/services/file_catalog.rs
//!
//! The slice of file metadata the upload path needs: checking that a parent
//! container exists, recording finalized files, and looking them up again
//! for download links. Listing and folder management live elsewhere.

use crate::{
    models::file::FinalizedFile,
    services::session_store::{MetadataError, MetadataResult},
};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;

#[async_trait]
pub trait FileCatalog: Send + Sync {
    /// Whether a container (folder) with this id exists.
    async fn container_exists(&self, id: &str) -> MetadataResult<bool>;

    async fn insert_file(&self, file: &FinalizedFile) -> MetadataResult<()>;

    async fn get_file(&self, id: &str) -> MetadataResult<Option<FinalizedFile>>;
}

#[derive(Clone)]
pub struct SqliteFileCatalog {
    pub db: Arc<SqlitePool>,
}

impl SqliteFileCatalog {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FileCatalog for SqliteFileCatalog {
    async fn container_exists(&self, id: &str) -> MetadataResult<bool> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT EXISTS (SELECT 1 FROM files WHERE id = ? AND kind = 'FOLDER' AND status = 'ACTIVE')",
        )
        .bind(id)
        .fetch_one(&*self.db)
        .await?;
        Ok(found != 0)
    }

    async fn insert_file(&self, file: &FinalizedFile) -> MetadataResult<()> {
        sqlx::query(
            "INSERT INTO files (
                id, name, parent_id, kind, size, mime_type, owner_id, storage_key,
                etag, status, created_at, updated_at
             ) VALUES (?, ?, ?, 'FILE', ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&file.id)
        .bind(&file.name)
        .bind(&file.parent_id)
        .bind(file.size)
        .bind(&file.mime_type)
        .bind(&file.owner_id)
        .bind(&file.storage_key)
        .bind(&file.etag)
        .bind(&file.status)
        .bind(file.created_at)
        .bind(file.created_at)
        .execute(&*self.db)
        .await
        .map_err(MetadataError::Sqlx)?;
        Ok(())
    }

    async fn get_file(&self, id: &str) -> MetadataResult<Option<FinalizedFile>> {
        let file = sqlx::query_as::<_, FinalizedFile>(
            "SELECT id, name, parent_id, size, mime_type, owner_id, storage_key, etag,
                    status, created_at
             FROM files WHERE id = ? AND kind = 'FILE' AND storage_key IS NOT NULL",
        )
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(file)
    }
}
