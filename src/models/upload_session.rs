//! Represents a chunked upload session and its lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{collections::BTreeSet, fmt, str::FromStr};

/// Lifecycle of an upload session.
///
/// `Uploading` is the only non-terminal state. Once a session reaches
/// `Completed` or `Aborted` it never moves again.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    Uploading,
    Completed,
    Aborted,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Uploading => "UPLOADING",
            UploadStatus::Completed => "COMPLETED",
            UploadStatus::Aborted => "ABORTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, UploadStatus::Uploading)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPLOADING" => Ok(UploadStatus::Uploading),
            "COMPLETED" => Ok(UploadStatus::Completed),
            "ABORTED" => Ok(UploadStatus::Aborted),
            other => Err(format!("unknown upload status `{other}`")),
        }
    }
}

/// One upload's tracked progress.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UploadSession {
    /// Server-generated identifier returned to the client.
    pub upload_id: String,

    /// Identity of the caller that initiated the upload.
    pub owner_id: String,

    pub file_name: String,
    pub mime_type: Option<String>,

    /// Optional container the finalized file is placed in.
    pub parent_id: Option<String>,

    /// Declared byte length of the whole file.
    pub total_size: u64,

    /// Chunk size agreed at initiation. Every chunk but the last has this length.
    pub chunk_size: u64,

    /// `ceil(total_size / chunk_size)`.
    pub total_chunks: u32,

    /// Indices reported complete so far, each in `[0, total_chunks)`.
    pub completed_chunks: BTreeSet<u32>,

    /// Opaque token from the storage backend's `prepare`.
    pub storage_handle: String,

    pub status: UploadStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadSession {
    /// True once every chunk index has been reported complete.
    pub fn is_complete(&self) -> bool {
        self.completed_chunks.len() == self.total_chunks as usize
    }

    /// Byte length chunk `index` must have: `chunk_size`, except for the
    /// last chunk which carries the remainder. `None` when out of range.
    pub fn chunk_len(&self, index: u32) -> Option<u64> {
        if index >= self.total_chunks {
            return None;
        }
        let start = u64::from(index) * self.chunk_size;
        Some(self.chunk_size.min(self.total_size - start))
    }
}

/// Number of chunks needed to carry `total_size` bytes.
///
/// Returns `None` when either size is zero or the count overflows `u32`.
pub fn chunk_count(total_size: u64, chunk_size: u64) -> Option<u32> {
    if total_size == 0 || chunk_size == 0 {
        return None;
    }
    u32::try_from(total_size.div_ceil(chunk_size)).ok()
}

/// Raw `upload_sessions` row as stored in SQLite.
#[derive(FromRow, Debug)]
pub struct UploadSessionRow {
    pub id: String,
    pub owner_id: String,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub parent_id: Option<String>,
    pub total_size: i64,
    pub chunk_size: i64,
    pub total_chunks: i64,
    pub completed_chunks: String,
    pub storage_handle: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<UploadSessionRow> for UploadSession {
    type Error = String;

    fn try_from(row: UploadSessionRow) -> Result<Self, Self::Error> {
        let completed_chunks: BTreeSet<u32> = serde_json::from_str(&row.completed_chunks)
            .map_err(|err| format!("corrupt completed_chunks for `{}`: {err}", row.id))?;
        let status = row.status.parse()?;

        Ok(Self {
            upload_id: row.id,
            owner_id: row.owner_id,
            file_name: row.file_name,
            mime_type: row.mime_type,
            parent_id: row.parent_id,
            total_size: u64::try_from(row.total_size).map_err(|e| e.to_string())?,
            chunk_size: u64::try_from(row.chunk_size).map_err(|e| e.to_string())?,
            total_chunks: u32::try_from(row.total_chunks).map_err(|e| e.to_string())?,
            completed_chunks,
            storage_handle: row.storage_handle,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
