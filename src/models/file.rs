//! Represents a finalized file produced by a completed upload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Immutable record of a merged object.
///
/// Created once when an upload finalizes and never mutated by the upload path.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedFile {
    /// Same identifier as the upload session that produced it.
    pub id: String,

    pub name: String,

    pub parent_id: Option<String>,

    /// Size in bytes of the merged object.
    pub size: i64,

    pub mime_type: Option<String>,

    pub owner_id: String,

    /// Storage handle of the merged object, used to open or sign it.
    pub storage_key: String,

    /// MD5 of the merged object.
    pub etag: Option<String>,

    /// Always `ACTIVE` for records written here.
    pub status: String,

    pub created_at: DateTime<Utc>,
}

pub const FILE_STATUS_ACTIVE: &str = "ACTIVE";
