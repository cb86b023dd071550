//! Time-limited download links for finalized files.

use crate::services::{
    file_catalog::FileCatalog, session_store::MetadataError, storage_service::StorageBackend,
};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("caller identity is required")]
    Unauthenticated,
    #[error("file `{0}` not found")]
    NotFound(String),
    #[error("file `{0}` belongs to another caller")]
    Forbidden(String),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

#[derive(Clone)]
pub struct DownloadService {
    files: Arc<dyn FileCatalog>,
    storage: Arc<dyn StorageBackend>,
    ttl: Duration,
}

impl DownloadService {
    pub fn new(files: Arc<dyn FileCatalog>, storage: Arc<dyn StorageBackend>, ttl: Duration) -> Self {
        Self { files, storage, ttl }
    }

    /// Signed URL for a file the caller owns.
    pub async fn download_url(&self, file_id: &str, caller_id: &str) -> Result<String, DownloadError> {
        if caller_id.trim().is_empty() {
            return Err(DownloadError::Unauthenticated);
        }

        let file = self
            .files
            .get_file(file_id)
            .await?
            .ok_or_else(|| DownloadError::NotFound(file_id.to_string()))?;

        if file.owner_id != caller_id {
            warn!(file_id, caller_id, "download link refused for foreign file");
            return Err(DownloadError::Forbidden(file_id.to_string()));
        }

        let url = self.storage.signed_url(&file.storage_key, &file.name, self.ttl);
        info!(file_id, ttl_secs = self.ttl.as_secs(), "issued download link");
        Ok(url)
    }
}
