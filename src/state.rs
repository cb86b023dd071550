use crate::services::{
    download_service::DownloadService, signed_url::SignedUrlIssuer,
    storage_service::StorageBackend, upload_service::UploadService,
};
use axum::http::HeaderName;
use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub uploads: UploadService,
    pub downloads: DownloadService,
    pub storage: Arc<dyn StorageBackend>,
    pub signer: Arc<SignedUrlIssuer>,
    pub db: Arc<SqlitePool>,

    /// Root of the local storage tree, probed by `/readyz`.
    pub storage_dir: PathBuf,

    /// Header an upstream gateway uses to forward the authenticated subject.
    pub identity_header: HeaderName,
}
