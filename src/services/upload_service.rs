//! src/services/upload_service.rs
//!
//! UploadService drives an upload session through its lifecycle:
//! `initiate`, any number of `complete_chunk` calls, then `finalize` or
//! `abort`. It never touches chunk bytes itself. Chunk completion and status
//! changes go through the session store's conditional updates, which are the
//! only thing keeping concurrent and duplicate requests consistent.

use crate::{
    models::{
        file::{FILE_STATUS_ACTIVE, FinalizedFile},
        upload_session::{UploadSession, UploadStatus, chunk_count},
    },
    services::{
        file_catalog::FileCatalog,
        session_store::{MetadataError, UploadSessionStore},
        storage_service::{MergedObject, StorageBackend, StorageError},
    },
};
use chrono::Utc;
use serde::Deserialize;
use std::{collections::BTreeSet, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("caller identity is required")]
    Unauthenticated,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("merge failed after {attempts} attempts: {source}")]
    MergeFailed {
        attempts: u32,
        #[source]
        source: StorageError,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

pub type UploadResult<T> = Result<T, UploadError>;

/// Client request to start an upload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUpload {
    #[serde(rename = "name")]
    pub file_name: String,
    pub size: u64,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// Where and how much a chunk write may store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSlot {
    pub storage_handle: String,
    /// Exact length the chunk should have; longer bodies are refused.
    pub max_len: u64,
}

/// What `complete_chunk` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    Recorded,
    AlreadyRecorded,
}

/// How often and how patiently a failed merge is retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

#[derive(Clone)]
pub struct UploadService {
    sessions: Arc<dyn UploadSessionStore>,
    files: Arc<dyn FileCatalog>,
    storage: Arc<dyn StorageBackend>,

    /// Chunk size handed to every new upload.
    chunk_size: u64,

    retry: RetryPolicy,
}

impl UploadService {
    pub fn new(
        sessions: Arc<dyn UploadSessionStore>,
        files: Arc<dyn FileCatalog>,
        storage: Arc<dyn StorageBackend>,
        chunk_size: u64,
    ) -> Self {
        Self {
            sessions,
            files,
            storage,
            chunk_size,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn ensure_caller(caller_id: &str) -> UploadResult<()> {
        if caller_id.trim().is_empty() {
            return Err(UploadError::Unauthenticated);
        }
        Ok(())
    }

    /// Load a session the caller owns. Missing and foreign sessions look the same.
    async fn load_owned(&self, upload_id: &str, caller_id: &str) -> UploadResult<UploadSession> {
        match self.sessions.get(upload_id).await? {
            Some(session) if session.owner_id == caller_id => Ok(session),
            Some(_) => {
                warn!(upload_id, caller_id, "caller does not own upload");
                Err(not_found(upload_id))
            }
            None => Err(not_found(upload_id)),
        }
    }

    /// Start a new upload and return its session.
    ///
    /// Nothing is persisted when validation fails, and the staging area is
    /// released again if the session cannot be stored.
    pub async fn initiate(&self, request: NewUpload, owner_id: &str) -> UploadResult<UploadSession> {
        Self::ensure_caller(owner_id)?;
        info!(file_name = %request.file_name, size = request.size, owner_id, "initiating upload");

        if request.file_name.trim().is_empty() {
            return Err(UploadError::Validation("file name is required".into()));
        }
        if request.size == 0 {
            return Err(UploadError::Validation(
                "file size must be greater than 0".into(),
            ));
        }
        if i64::try_from(request.size).is_err() || i64::try_from(self.chunk_size).is_err() {
            return Err(UploadError::Validation(format!(
                "file size {} is too large",
                request.size
            )));
        }
        let total_chunks = chunk_count(request.size, self.chunk_size).ok_or_else(|| {
            UploadError::Validation(format!(
                "file of {} bytes needs too many {}-byte chunks",
                request.size, self.chunk_size
            ))
        })?;

        let parent_id = request.parent_id.filter(|p| !p.is_empty());
        if let Some(parent) = parent_id.as_deref() {
            if !self.files.container_exists(parent).await? {
                return Err(UploadError::Validation(format!(
                    "parent `{parent}` does not exist"
                )));
            }
        }

        let upload_id = Uuid::new_v4().simple().to_string();
        let storage_handle = self.storage.prepare(&upload_id).await?;

        let now = Utc::now();
        let session = UploadSession {
            upload_id: upload_id.clone(),
            owner_id: owner_id.to_string(),
            file_name: request.file_name,
            mime_type: request.mime_type,
            parent_id,
            total_size: request.size,
            chunk_size: self.chunk_size,
            total_chunks,
            completed_chunks: BTreeSet::new(),
            storage_handle,
            status: UploadStatus::Uploading,
            created_at: now,
            updated_at: now,
        };

        if let Err(err) = self.sessions.insert(&session).await {
            error!(upload_id, error = %err, "failed to persist upload session");
            self.storage.discard(&session.storage_handle).await;
            return Err(err.into());
        }

        info!(
            upload_id,
            total_chunks,
            chunk_size = self.chunk_size,
            "upload session created"
        );
        Ok(session)
    }

    /// Check that the caller may write chunk bytes for `chunk_index` and
    /// return the slot to write them into.
    pub async fn authorize_chunk(
        &self,
        upload_id: &str,
        caller_id: &str,
        chunk_index: u32,
    ) -> UploadResult<ChunkSlot> {
        Self::ensure_caller(caller_id)?;
        let session = self.load_owned(upload_id, caller_id).await?;
        if session.status != UploadStatus::Uploading {
            return Err(UploadError::InvalidState(format!(
                "upload `{upload_id}` is {}",
                session.status
            )));
        }
        let Some(max_len) = session.chunk_len(chunk_index) else {
            return Err(UploadError::Validation(format!(
                "chunk index {chunk_index} is out of range 0..{}",
                session.total_chunks
            )));
        };
        Ok(ChunkSlot {
            storage_handle: session.storage_handle,
            max_len,
        })
    }

    /// Record that chunk `chunk_index` has been transferred.
    ///
    /// Safe under concurrent and duplicate calls: the add is a single
    /// conditional update, and a repeat of an already recorded index is a
    /// successful no-op.
    pub async fn complete_chunk(
        &self,
        upload_id: &str,
        caller_id: &str,
        chunk_index: u32,
    ) -> UploadResult<ChunkOutcome> {
        Self::ensure_caller(caller_id)?;

        if self
            .sessions
            .try_add_chunk(upload_id, chunk_index, caller_id)
            .await?
        {
            debug!(upload_id, chunk_index, "chunk recorded");
            return Ok(ChunkOutcome::Recorded);
        }

        // The update matched nothing: either the index is already there or
        // the session is missing, foreign, settled, or too short for it.
        if self
            .sessions
            .has_chunk(upload_id, chunk_index, caller_id)
            .await?
        {
            info!(upload_id, chunk_index, "duplicate chunk completion ignored");
            return Ok(ChunkOutcome::AlreadyRecorded);
        }

        warn!(upload_id, chunk_index, "chunk completion rejected");
        Err(UploadError::InvalidState(format!(
            "upload `{upload_id}` is not accepting chunk {chunk_index}"
        )))
    }

    /// Merge all chunks and turn the session into a finalized file.
    ///
    /// If every merge attempt fails the session stays `UPLOADING` and the
    /// whole call can be retried.
    pub async fn finalize(&self, upload_id: &str, caller_id: &str) -> UploadResult<FinalizedFile> {
        Self::ensure_caller(caller_id)?;
        let session = self.load_owned(upload_id, caller_id).await?;

        if session.status != UploadStatus::Uploading {
            return Err(UploadError::InvalidState(format!(
                "upload `{upload_id}` is already {}",
                session.status
            )));
        }
        if !session.is_complete() {
            return Err(UploadError::InvalidState(format!(
                "upload `{upload_id}` has {} of {} chunks",
                session.completed_chunks.len(),
                session.total_chunks
            )));
        }

        let merged = self.merge_with_retry(&session).await?;

        // Session first, file record second: a crash in between leaves a
        // completed session without a visible file, never the reverse.
        if !self
            .sessions
            .try_transition(upload_id, UploadStatus::Uploading, UploadStatus::Completed)
            .await?
        {
            let current = self.sessions.get(upload_id).await?.map(|s| s.status);
            if current == Some(UploadStatus::Aborted) {
                warn!(upload_id, "upload aborted during finalize, discarding merged object");
                self.storage.discard(&session.storage_handle).await;
            }
            return Err(UploadError::InvalidState(format!(
                "upload `{upload_id}` was settled concurrently"
            )));
        }

        if merged.size != session.total_size {
            warn!(
                upload_id,
                declared = session.total_size,
                merged = merged.size,
                "merged size differs from declared size"
            );
        }

        let file = FinalizedFile {
            id: session.upload_id.clone(),
            name: session.file_name.clone(),
            parent_id: session.parent_id.clone(),
            size: i64::try_from(merged.size).unwrap_or(i64::MAX),
            mime_type: session.mime_type.clone(),
            owner_id: session.owner_id.clone(),
            storage_key: merged.storage_key,
            etag: Some(merged.etag),
            status: FILE_STATUS_ACTIVE.to_string(),
            created_at: Utc::now(),
        };

        if let Err(err) = self.files.insert_file(&file).await {
            error!(upload_id, error = %err, "upload completed but file record was not written");
            return Err(err.into());
        }

        info!(upload_id, size = file.size, "upload finalized");
        Ok(file)
    }

    /// Merge, retrying transient failures. Gives up early when the session
    /// was settled meanwhile or the staged chunk set can never merge.
    async fn merge_with_retry(&self, session: &UploadSession) -> UploadResult<MergedObject> {
        let upload_id = session.upload_id.as_str();
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self
                .storage
                .merge_chunks(&session.storage_handle, session.total_chunks)
                .await
            {
                Ok(merged) => return Ok(merged),
                Err(err) => err,
            };

            // An abort removes the staging area; retrying cannot help.
            let current = self.sessions.get(upload_id).await?.map(|s| s.status);
            if current != Some(UploadStatus::Uploading) {
                warn!(upload_id, status = ?current, error = %err, "upload settled during merge");
                return Err(UploadError::InvalidState(format!(
                    "upload `{upload_id}` was settled concurrently"
                )));
            }

            if let StorageError::ChunkSetMismatch { expected, found, .. } = &err {
                warn!(upload_id, expected, ?found, "staged chunks do not match recorded ones");
                return Err(UploadError::InvalidState(format!(
                    "upload `{upload_id}` is missing staged chunk data ({} of {expected} present)",
                    found.len()
                )));
            }

            if attempt >= attempts {
                error!(upload_id, attempts, error = %err, "merge failed, giving up");
                return Err(UploadError::MergeFailed {
                    attempts,
                    source: err,
                });
            }
            warn!(upload_id, attempt, attempts, error = %err, "merge attempt failed");
            tokio::time::sleep(self.retry.delay).await;
        }
    }

    /// Abandon an upload and release its stored bytes.
    ///
    /// Missing and already settled uploads are a successful no-op.
    pub async fn abort(&self, upload_id: &str, caller_id: &str) -> UploadResult<()> {
        Self::ensure_caller(caller_id)?;
        info!(upload_id, "aborting upload");

        let Some(session) = self.sessions.get(upload_id).await? else {
            debug!(upload_id, "abort of unknown upload ignored");
            return Ok(());
        };
        if session.status.is_terminal() {
            debug!(upload_id, status = %session.status, "abort of settled upload ignored");
            return Ok(());
        }
        if session.owner_id != caller_id {
            warn!(upload_id, caller_id, "caller does not own upload");
            return Err(UploadError::InvalidState(
                "upload belongs to another caller".into(),
            ));
        }

        if !self
            .sessions
            .try_transition(upload_id, UploadStatus::Uploading, UploadStatus::Aborted)
            .await?
        {
            debug!(upload_id, "upload settled concurrently, nothing to abort");
            return Ok(());
        }

        self.storage.discard(&session.storage_handle).await;
        info!(upload_id, "upload aborted");
        Ok(())
    }

    /// Current state of an upload, for its owner.
    pub async fn status(&self, upload_id: &str, caller_id: &str) -> UploadResult<UploadSession> {
        Self::ensure_caller(caller_id)?;
        self.load_owned(upload_id, caller_id).await
    }
}

fn not_found(upload_id: &str) -> UploadError {
    UploadError::InvalidState(format!("upload `{upload_id}` not found"))
}
