//! HTTP handlers for the chunked upload lifecycle.
//! Chunk bodies are streamed straight into storage without buffering.

use crate::{
    errors::AppError,
    handlers::identity::Caller,
    models::{
        file::FinalizedFile,
        upload_session::{UploadSession, UploadStatus},
    },
    services::{
        storage_service::ByteStream,
        upload_service::{ChunkOutcome, NewUpload},
    },
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use futures::StreamExt;
use serde::Serialize;
use std::io;
use tracing::debug;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadResponse {
    pub upload_id: String,
    pub chunk_size: u64,
    pub total_chunks: u32,
    pub total_size: u64,
    pub file_name: String,
}

impl From<UploadSession> for InitUploadResponse {
    fn from(session: UploadSession) -> Self {
        Self {
            upload_id: session.upload_id,
            chunk_size: session.chunk_size,
            total_chunks: session.total_chunks,
            total_size: session.total_size,
            file_name: session.file_name,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkStoredResponse {
    pub upload_id: String,
    pub chunk_index: u32,
    pub bytes: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkCompletedResponse {
    pub upload_id: String,
    pub chunk_index: u32,
    /// True when the index had already been recorded.
    pub duplicate: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgressResponse {
    pub upload_id: String,
    pub file_name: String,
    pub status: UploadStatus,
    pub total_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u32,
    pub completed_count: usize,
    pub completed_chunks: Vec<u32>,
}

impl From<UploadSession> for UploadProgressResponse {
    fn from(session: UploadSession) -> Self {
        Self {
            completed_count: session.completed_chunks.len(),
            completed_chunks: session.completed_chunks.into_iter().collect(),
            upload_id: session.upload_id,
            file_name: session.file_name,
            status: session.status,
            total_size: session.total_size,
            chunk_size: session.chunk_size,
            total_chunks: session.total_chunks,
        }
    }
}

/// `POST /upload/init`
pub async fn init_upload(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<NewUpload>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.uploads.initiate(request, caller.as_str()).await?;
    Ok((StatusCode::CREATED, Json(InitUploadResponse::from(session))))
}

/// `PUT /upload/chunk/{upload_id}/{chunk_index}` with the raw chunk bytes as body.
pub async fn put_chunk(
    State(state): State<AppState>,
    caller: Caller,
    Path((upload_id, chunk_index)): Path<(String, u32)>,
    body: Body,
) -> Result<Json<ChunkStoredResponse>, AppError> {
    let slot = state
        .uploads
        .authorize_chunk(&upload_id, caller.as_str(), chunk_index)
        .await?;

    let stream: ByteStream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other))
        .boxed();

    let bytes = state
        .storage
        .store_chunk(&slot.storage_handle, chunk_index, slot.max_len, stream)
        .await?;
    debug!(upload_id, chunk_index, bytes, "chunk bytes stored");

    Ok(Json(ChunkStoredResponse {
        upload_id,
        chunk_index,
        bytes,
    }))
}

/// `POST /upload/chunk/{upload_id}/{chunk_index}/complete`
pub async fn complete_chunk(
    State(state): State<AppState>,
    caller: Caller,
    Path((upload_id, chunk_index)): Path<(String, u32)>,
) -> Result<Json<ChunkCompletedResponse>, AppError> {
    let outcome = state
        .uploads
        .complete_chunk(&upload_id, caller.as_str(), chunk_index)
        .await?;

    Ok(Json(ChunkCompletedResponse {
        upload_id,
        chunk_index,
        duplicate: outcome == ChunkOutcome::AlreadyRecorded,
    }))
}

/// `POST /upload/complete/{upload_id}`
pub async fn finalize_upload(
    State(state): State<AppState>,
    caller: Caller,
    Path(upload_id): Path<String>,
) -> Result<Json<FinalizedFile>, AppError> {
    let file = state.uploads.finalize(&upload_id, caller.as_str()).await?;
    Ok(Json(file))
}

/// `POST /upload/abort/{upload_id}`
pub async fn abort_upload(
    State(state): State<AppState>,
    caller: Caller,
    Path(upload_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.uploads.abort(&upload_id, caller.as_str()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /upload/{upload_id}`
pub async fn upload_status(
    State(state): State<AppState>,
    caller: Caller,
    Path(upload_id): Path<String>,
) -> Result<Json<UploadProgressResponse>, AppError> {
    let session = state.uploads.status(&upload_id, caller.as_str()).await?;
    Ok(Json(session.into()))
}
