//! Issuing and serving signed download links.

use crate::{
    errors::AppError, handlers::identity::Caller, services::storage_service::StorageError,
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::warn;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUrlResponse {
    pub url: String,
}

/// Query string of a signed link. Missing fields fail verification like a
/// bad signature does.
#[derive(Debug, Deserialize)]
pub struct SignedLinkQuery {
    pub expires: Option<i64>,
    pub signature: Option<String>,
    pub filename: Option<String>,
}

/// `GET /files/{file_id}/download-url`
pub async fn download_url(
    State(state): State<AppState>,
    caller: Caller,
    Path(file_id): Path<String>,
) -> Result<Json<DownloadUrlResponse>, AppError> {
    let url = state.downloads.download_url(&file_id, caller.as_str()).await?;
    Ok(Json(DownloadUrlResponse { url }))
}

/// `GET /local-download/{handle}?expires=&signature=&filename=`
///
/// Needs no caller identity: the signature is the authorization.
pub async fn local_download(
    State(state): State<AppState>,
    Path(handle): Path<String>,
    Query(q): Query<SignedLinkQuery>,
) -> Result<Response, AppError> {
    let valid = match (q.expires, q.signature.as_deref()) {
        (Some(expires), Some(signature)) => state.signer.verify(&handle, expires, signature),
        _ => false,
    };
    if !valid {
        warn!(handle, "rejected download link");
        return Err(AppError::forbidden("invalid or expired download link"));
    }

    let (file, len) = state.storage.open_object(&handle).await.map_err(|err| match err {
        StorageError::ObjectNotFound(_) | StorageError::InvalidHandle => {
            AppError::not_found("object not found")
        }
        other => other.into(),
    })?;

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    if let Some(value) = q.filename.as_deref().and_then(content_disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// `attachment; filename="..."` with quotes and control characters dropped.
fn content_disposition(filename: &str) -> Option<HeaderValue> {
    let cleaned: String = filename
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    HeaderValue::from_str(&format!("attachment; filename=\"{cleaned}\"")).ok()
}
