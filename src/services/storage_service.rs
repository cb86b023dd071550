//! src/services/storage_service.rs
//!
//! Chunk staging and merging on local disk. Each upload gets a staging
//! directory `base_path/staging/{handle}` holding one file per chunk index.
//! Merging streams those chunks into a temporary file next to the final
//! object and renames it into `base_path/objects/{shard}/{shard}/{handle}`.
//! Nothing here knows about sessions or owners.

use crate::services::signed_url::SignedUrlIssuer;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream::BoxStream};
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Raw chunk bytes as handed over by the transport.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage handle")]
    InvalidHandle,
    #[error("staging area for `{0}` not found")]
    StagingNotFound(String),
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error("chunk {chunk_index} of `{handle}` exceeds its {limit}-byte slot")]
    ChunkTooLarge {
        handle: String,
        chunk_index: u32,
        limit: u64,
    },
    #[error("staged chunks for `{handle}` do not cover 0..{expected}: found {found:?}")]
    ChunkSetMismatch {
        handle: String,
        expected: u32,
        found: Vec<u32>,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Result of a successful merge.
#[derive(Debug, Clone)]
pub struct MergedObject {
    /// Handle under which the merged object can be opened or signed.
    pub storage_key: String,
    pub size: u64,
    /// Hex MD5 of the merged bytes.
    pub etag: String,
}

/// Backend selected once at startup from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Local,
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(StorageKind::Local),
            other => Err(format!("unsupported storage backend `{other}`")),
        }
    }
}

/// Storage capability injected into the upload coordinator and HTTP layer.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Create an isolated staging area for `upload_id` and return its handle.
    async fn prepare(&self, upload_id: &str) -> StorageResult<String>;

    /// Write one chunk's bytes into its slot, replacing any earlier write.
    /// Fails with `ChunkTooLarge` as soon as more than `max_len` bytes
    /// arrive. Returns the number of bytes stored.
    async fn store_chunk(
        &self,
        handle: &str,
        chunk_index: u32,
        max_len: u64,
        stream: ByteStream,
    ) -> StorageResult<u64>;

    /// Concatenate chunks `0..expected_chunks` into the final object.
    ///
    /// Safe to call again after a failure or after a previous success.
    async fn merge_chunks(&self, handle: &str, expected_chunks: u32)
    -> StorageResult<MergedObject>;

    /// Remove everything stored for `handle`. Never fails.
    async fn discard(&self, handle: &str);

    /// Time-limited download link for a merged object.
    fn signed_url(&self, storage_key: &str, display_name: &str, ttl: Duration) -> String;

    /// Open a merged object for reading, with its length.
    async fn open_object(&self, storage_key: &str) -> StorageResult<(File, u64)>;
}

/// Local filesystem implementation of [`StorageBackend`].
#[derive(Clone)]
pub struct LocalStorage {
    /// Root directory holding `staging/` and `objects/`.
    pub base_path: PathBuf,

    signer: Arc<SignedUrlIssuer>,
}

const MAX_HANDLE_LEN: usize = 128;
const STAGING_DIR: &str = "staging";
const OBJECTS_DIR: &str = "objects";
const PART_SUFFIX: &str = ".part";

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>, signer: Arc<SignedUrlIssuer>) -> Self {
        Self {
            base_path: base_path.into(),
            signer,
        }
    }

    /// Handles become path components, so only `[A-Za-z0-9_-]` is accepted.
    fn ensure_handle_safe(handle: &str) -> StorageResult<()> {
        if handle.is_empty() || handle.len() > MAX_HANDLE_LEN {
            return Err(StorageError::InvalidHandle);
        }
        if !handle
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(StorageError::InvalidHandle);
        }
        Ok(())
    }

    fn staging_dir(&self, handle: &str) -> PathBuf {
        self.base_path.join(STAGING_DIR).join(handle)
    }

    fn objects_root(&self) -> PathBuf {
        self.base_path.join(OBJECTS_DIR)
    }

    /// Two-level shard directories from MD5(handle), as lowercase hex bytes.
    fn object_shards(handle: &str) -> (String, String) {
        let digest = md5::compute(handle);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, handle: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(handle);
        let mut path = self.objects_root();
        path.push(shard_a);
        path.push(shard_b);
        path.push(handle);
        path
    }

    /// Chunk indices currently staged, sorted numerically.
    ///
    /// Only names made entirely of ASCII digits count; temporary writes and
    /// stray files are skipped.
    async fn staged_indices(staging: &Path) -> io::Result<Vec<u32>> {
        let mut indices = Vec::new();
        let mut entries = fs::read_dir(staging).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            match name.parse::<u32>() {
                Ok(index) => indices.push(index),
                Err(_) => debug!("ignoring out-of-range chunk file {}", name),
            }
        }
        indices.sort_unstable();
        indices.dedup();
        Ok(indices)
    }

    /// Stream `indices` from `staging` into `tmp_path`, returning size and etag.
    async fn write_merged(
        staging: &Path,
        indices: &[u32],
        tmp_path: &Path,
    ) -> io::Result<(u64, String)> {
        let mut out = File::create(tmp_path).await?;
        let mut size: u64 = 0;
        let mut digest = Context::new();

        for index in indices {
            let chunk_path = staging.join(index.to_string());
            debug!("merging chunk {}", chunk_path.display());
            let mut reader = ReaderStream::new(File::open(&chunk_path).await?);
            while let Some(block) = reader.next().await {
                let block = block?;
                size += block.len() as u64;
                digest.consume(&block);
                out.write_all(&block).await?;
            }
        }

        out.flush().await?;
        out.sync_all().await?;
        Ok((size, format!("{:x}", digest.compute())))
    }

    /// Size and etag of an object that is already in place.
    async fn describe_existing(path: &Path) -> io::Result<(u64, String)> {
        let mut reader = ReaderStream::new(File::open(path).await?);
        let mut size: u64 = 0;
        let mut digest = Context::new();
        while let Some(block) = reader.next().await {
            let block = block?;
            size += block.len() as u64;
            digest.consume(&block);
        }
        Ok((size, format!("{:x}", digest.compute())))
    }

    /// Remove a single file, logging anything other than "already gone".
    async fn remove_quietly(path: &Path) {
        match fs::remove_file(path).await {
            Ok(_) => debug!("removed {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!("failed to remove {}: {}", path.display(), err),
        }
    }

    /// Remove leftover `.{handle}.*.part` merge files in the object's shard.
    async fn remove_merge_leftovers(&self, handle: &str) {
        let Some(shard_dir) = self.object_path(handle).parent().map(Path::to_path_buf) else {
            return;
        };
        let mut entries = match fs::read_dir(&shard_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return,
            Err(err) => {
                warn!("failed to scan {}: {}", shard_dir.display(), err);
                return;
            }
        };
        let prefix = format!(".{handle}.");
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let name = entry.file_name();
                    let name = name.to_string_lossy();
                    if name.starts_with(&prefix) && name.ends_with(PART_SUFFIX) {
                        Self::remove_quietly(&entry.path()).await;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!("failed to scan {}: {}", shard_dir.display(), err);
                    break;
                }
            }
        }
    }

    /// Recursively remove empty directories up to `stop`, exclusive.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn prepare(&self, upload_id: &str) -> StorageResult<String> {
        Self::ensure_handle_safe(upload_id)?;
        let staging = self.staging_dir(upload_id);
        fs::create_dir_all(&staging).await?;
        info!(upload_id, "prepared staging area {}", staging.display());
        Ok(upload_id.to_string())
    }

    /// Writes go to a temporary sibling first and are renamed over the slot,
    /// so concurrent re-sends of one index leave a whole chunk behind.
    async fn store_chunk(
        &self,
        handle: &str,
        chunk_index: u32,
        max_len: u64,
        mut stream: ByteStream,
    ) -> StorageResult<u64> {
        Self::ensure_handle_safe(handle)?;
        let staging = self.staging_dir(handle);
        if !fs::try_exists(&staging).await? {
            return Err(StorageError::StagingNotFound(handle.to_string()));
        }

        let slot = staging.join(chunk_index.to_string());
        let tmp_path = staging.join(format!(".{}.{}{}", chunk_index, Uuid::new_v4(), PART_SUFFIX));
        let mut file = File::create(&tmp_path).await?;

        let mut written: u64 = 0;
        while let Some(block) = stream.next().await {
            let block = match block {
                Ok(block) => block,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StorageError::Io(err));
                }
            };
            written += block.len() as u64;
            if written > max_len {
                drop(file);
                let _ = fs::remove_file(&tmp_path).await;
                warn!(handle, chunk_index, max_len, "chunk body exceeds its slot");
                return Err(StorageError::ChunkTooLarge {
                    handle: handle.to_string(),
                    chunk_index,
                    limit: max_len,
                });
            }
            if let Err(err) = file.write_all(&block).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        drop(file);

        if let Err(err) = restrict_to_owner(&tmp_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = fs::rename(&tmp_path, &slot).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        debug!(handle, chunk_index, bytes = written, "stored chunk");
        Ok(written)
    }

    async fn merge_chunks(
        &self,
        handle: &str,
        expected_chunks: u32,
    ) -> StorageResult<MergedObject> {
        Self::ensure_handle_safe(handle)?;
        let staging = self.staging_dir(handle);
        let final_path = self.object_path(handle);

        let indices = match Self::staged_indices(&staging).await {
            Ok(indices) => indices,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                // A previous merge may have completed and cleaned up already.
                if fs::try_exists(&final_path).await? {
                    let (size, etag) = Self::describe_existing(&final_path).await?;
                    info!(handle, "merged object already in place");
                    return Ok(MergedObject {
                        storage_key: handle.to_string(),
                        size,
                        etag,
                    });
                }
                return Err(StorageError::StagingNotFound(handle.to_string()));
            }
            Err(err) => return Err(StorageError::Io(err)),
        };

        let contiguous = indices.len() == expected_chunks as usize
            && indices.iter().enumerate().all(|(pos, idx)| pos as u32 == *idx);
        if !contiguous {
            return Err(StorageError::ChunkSetMismatch {
                handle: handle.to_string(),
                expected: expected_chunks,
                found: indices,
            });
        }

        let parent = final_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".{}.{}{}", handle, Uuid::new_v4(), PART_SUFFIX));

        let (size, etag) = match Self::write_merged(&staging, &indices, &tmp_path).await {
            Ok(result) => result,
            Err(err) => {
                Self::remove_quietly(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        };

        if let Err(err) = restrict_to_owner(&tmp_path).await {
            Self::remove_quietly(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = fs::rename(&tmp_path, &final_path).await {
            Self::remove_quietly(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        info!(handle, size, chunks = indices.len(), "merged chunks into {}", final_path.display());

        if let Err(err) = fs::remove_dir_all(&staging).await {
            warn!("failed to clean staging area {}: {}", staging.display(), err);
        }

        Ok(MergedObject {
            storage_key: handle.to_string(),
            size,
            etag,
        })
    }

    async fn discard(&self, handle: &str) {
        if Self::ensure_handle_safe(handle).is_err() {
            warn!(handle, "refusing to discard invalid handle");
            return;
        }

        let final_path = self.object_path(handle);
        Self::remove_quietly(&final_path).await;
        self.remove_merge_leftovers(handle).await;
        if let Some(parent) = final_path.parent() {
            self.prune_empty_dirs(parent, &self.objects_root()).await;
        }

        let staging = self.staging_dir(handle);
        match fs::remove_dir_all(&staging).await {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!("failed to remove staging area {}: {}", staging.display(), err),
        }
        info!(handle, "discarded stored data");
    }

    fn signed_url(&self, storage_key: &str, display_name: &str, ttl: Duration) -> String {
        self.signer.issue(storage_key, display_name, ttl)
    }

    async fn open_object(&self, storage_key: &str) -> StorageResult<(File, u64)> {
        Self::ensure_handle_safe(storage_key)?;
        let path = self.object_path(storage_key);
        let file = File::open(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::ObjectNotFound(storage_key.to_string())
            } else {
                StorageError::Io(err)
            }
        })?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }
}

/// Owner read/write only on unix (0600).
async fn restrict_to_owner(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tempfile::TempDir;

    /// Slot size large enough for every payload below.
    const LIMIT: u64 = 1024;

    fn storage(dir: &TempDir) -> LocalStorage {
        let signer = SignedUrlIssuer::new(b"test-secret", "http://localhost:8080").unwrap();
        LocalStorage::new(dir.path(), Arc::new(signer))
    }

    fn bytes_stream(parts: &[&'static [u8]]) -> ByteStream {
        let items: Vec<io::Result<Bytes>> =
            parts.iter().map(|p| Ok(Bytes::from_static(p))).collect();
        stream::iter(items).boxed()
    }

    async fn read_object(store: &LocalStorage, key: &str) -> Vec<u8> {
        let (_, len) = store.open_object(key).await.unwrap();
        let data = fs::read(store.object_path(key)).await.unwrap();
        assert_eq!(data.len() as u64, len);
        data
    }

    #[tokio::test]
    async fn merge_orders_chunks_numerically() {
        let dir = TempDir::new().unwrap();
        let store = storage(&dir);
        let handle = store.prepare("up1").await.unwrap();

        // 0..=10 sent in reverse; lexicographic order would put 10 after 1.
        let payloads: Vec<Vec<u8>> = (0..=10u32).map(|i| format!("<{i}>").into_bytes()).collect();
        for i in (0..=10u32).rev() {
            let body = Bytes::from(payloads[i as usize].clone());
            store
                .store_chunk(&handle, i, LIMIT, stream::iter(vec![Ok(body)]).boxed())
                .await
                .unwrap();
        }

        let merged = store.merge_chunks(&handle, 11).await.unwrap();
        let expected: Vec<u8> = payloads.concat();
        assert_eq!(merged.size, expected.len() as u64);
        assert_eq!(merged.etag, format!("{:x}", md5::compute(&expected)));
        assert_eq!(read_object(&store, &merged.storage_key).await, expected);
        assert!(!store.staging_dir(&handle).exists());
    }

    #[tokio::test]
    async fn merge_ignores_stray_files() {
        let dir = TempDir::new().unwrap();
        let store = storage(&dir);
        let handle = store.prepare("up2").await.unwrap();
        store.store_chunk(&handle, 1, LIMIT, bytes_stream(&[b"world"])).await.unwrap();
        store.store_chunk(&handle, 0, LIMIT, bytes_stream(&[b"hello ", b""])).await.unwrap();
        fs::write(store.staging_dir(&handle).join("notes.txt"), b"junk").await.unwrap();
        fs::write(store.staging_dir(&handle).join("-1"), b"junk").await.unwrap();

        let merged = store.merge_chunks(&handle, 2).await.unwrap();
        assert_eq!(read_object(&store, &merged.storage_key).await, b"hello world");
    }

    #[tokio::test]
    async fn store_chunk_overwrites_slot() {
        let dir = TempDir::new().unwrap();
        let store = storage(&dir);
        let handle = store.prepare("up3").await.unwrap();
        store.store_chunk(&handle, 0, LIMIT, bytes_stream(&[b"first attempt"])).await.unwrap();
        let written = store.store_chunk(&handle, 0, LIMIT, bytes_stream(&[b"retry"])).await.unwrap();
        assert_eq!(written, 5);

        let slot = store.staging_dir(&handle).join("0");
        assert_eq!(fs::read(&slot).await.unwrap(), b"retry");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&slot).await.unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn store_chunk_requires_prepared_staging() {
        let dir = TempDir::new().unwrap();
        let store = storage(&dir);
        let err = store
            .store_chunk("never-prepared", 0, LIMIT, bytes_stream(&[b"x"]))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::StagingNotFound(_)));

        let err = store
            .store_chunk("../escape", 0, LIMIT, bytes_stream(&[b"x"]))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidHandle));
    }

    #[tokio::test]
    async fn failed_stream_leaves_no_partial_chunk() {
        let dir = TempDir::new().unwrap();
        let store = storage(&dir);
        let handle = store.prepare("up4").await.unwrap();
        let broken: ByteStream = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(ErrorKind::ConnectionReset, "client went away")),
        ])
        .boxed();

        assert!(store.store_chunk(&handle, 0, LIMIT, broken).await.is_err());
        let mut entries = fs::read_dir(store.staging_dir(&handle)).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_chunk_is_rejected_mid_stream() {
        let dir = TempDir::new().unwrap();
        let store = storage(&dir);
        let handle = store.prepare("up8").await.unwrap();
        store.store_chunk(&handle, 0, 4, bytes_stream(&[b"good"])).await.unwrap();

        let err = store
            .store_chunk(&handle, 0, 4, bytes_stream(&[b"way", b"too", b"long"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::ChunkTooLarge { chunk_index: 0, limit: 4, .. }
        ));

        // The earlier write survives and no temp file is left behind.
        let slot = store.staging_dir(&handle).join("0");
        assert_eq!(fs::read(&slot).await.unwrap(), b"good");
        let mut entries = fs::read_dir(store.staging_dir(&handle)).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name());
        }
        assert_eq!(names, vec![std::ffi::OsString::from("0")]);
    }

    #[tokio::test]
    async fn merge_rejects_missing_chunk_and_keeps_staging() {
        let dir = TempDir::new().unwrap();
        let store = storage(&dir);
        let handle = store.prepare("up5").await.unwrap();
        store.store_chunk(&handle, 0, LIMIT, bytes_stream(&[b"a"])).await.unwrap();
        store.store_chunk(&handle, 2, LIMIT, bytes_stream(&[b"c"])).await.unwrap();

        let err = store.merge_chunks(&handle, 3).await.unwrap_err();
        assert!(matches!(err, StorageError::ChunkSetMismatch { .. }));
        assert!(store.staging_dir(&handle).exists());
        assert!(!store.object_path(&handle).exists());

        store.store_chunk(&handle, 1, LIMIT, bytes_stream(&[b"b"])).await.unwrap();
        let merged = store.merge_chunks(&handle, 3).await.unwrap();
        assert_eq!(read_object(&store, &merged.storage_key).await, b"abc");
    }

    #[tokio::test]
    async fn merge_is_safe_to_repeat() {
        let dir = TempDir::new().unwrap();
        let store = storage(&dir);
        let handle = store.prepare("up6").await.unwrap();
        store.store_chunk(&handle, 0, LIMIT, bytes_stream(&[b"once"])).await.unwrap();

        let first = store.merge_chunks(&handle, 1).await.unwrap();
        let second = store.merge_chunks(&handle, 1).await.unwrap();
        assert_eq!(first.etag, second.etag);
        assert_eq!(second.size, 4);
    }

    #[tokio::test]
    async fn discard_removes_everything_and_tolerates_absence() {
        let dir = TempDir::new().unwrap();
        let store = storage(&dir);
        let handle = store.prepare("up7").await.unwrap();
        store.store_chunk(&handle, 0, LIMIT, bytes_stream(&[b"data"])).await.unwrap();
        store.merge_chunks(&handle, 1).await.unwrap();

        let shard = store.object_path(&handle).parent().unwrap().to_path_buf();
        let leftover = shard.join(format!(".{handle}.stale{PART_SUFFIX}"));
        fs::write(&leftover, b"half").await.unwrap();

        store.discard(&handle).await;
        assert!(!store.object_path(&handle).exists());
        assert!(!leftover.exists());
        assert!(!store.staging_dir(&handle).exists());

        // Second discard and discard of unknown handles are silent.
        store.discard(&handle).await;
        store.discard("unknown").await;
        assert!(matches!(
            store.open_object(&handle).await,
            Err(StorageError::ObjectNotFound(_))
        ));
    }

    #[test]
    fn storage_kind_parses_local_only() {
        assert_eq!("local".parse::<StorageKind>(), Ok(StorageKind::Local));
        assert_eq!(" LOCAL ".parse::<StorageKind>(), Ok(StorageKind::Local));
        assert!("s3".parse::<StorageKind>().is_err());
    }
}
