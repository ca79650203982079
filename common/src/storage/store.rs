use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{future::try_join_all, StreamExt, TryStreamExt};
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{
    path::Path as ObjPath, MultipartUpload, ObjectStore, PutPayload, UploadPart,
};
use uuid::Uuid;

use crate::utils::config::{AppConfig, StorageKind};

pub type DynStore = Arc<dyn ObjectStore>;

/// Blob storage for rendered documents.
///
/// Blobs live at `<namespace>/<blob-id>/<name>`; the blob id is the handle
/// callers keep, the name is only used for downloads.
#[derive(Clone)]
pub struct StorageManager {
    store: DynStore,
    backend_kind: StorageKind,
    local_base: Option<PathBuf>,
}

/// Streaming upload handle returned by [`StorageManager::open_write`].
///
/// Nothing is visible to readers until [`BlobWriter::finish`] succeeds. A
/// failed finish aborts the upload so no staged parts are left behind.
pub struct BlobWriter {
    id: String,
    location: ObjPath,
    upload: Box<dyn MultipartUpload>,
    buffer: Vec<u8>,
    parts: Vec<UploadPart>,
    bytes_written: usize,
}

impl BlobWriter {
    /// Parts are flushed once this much data is buffered.
    pub const PART_SIZE: usize = 5 * 1024 * 1024;

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    pub fn write(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        self.bytes_written = self.bytes_written.saturating_add(chunk.len());
        if self.buffer.len() >= Self::PART_SIZE {
            self.flush_part();
        }
    }

    fn flush_part(&mut self) {
        let part = std::mem::take(&mut self.buffer);
        self.parts.push(self.upload.put_part(PutPayload::from(part)));
    }

    /// Completes the upload and returns the blob id.
    pub async fn finish(mut self) -> object_store::Result<String> {
        if !self.buffer.is_empty() {
            self.flush_part();
        }

        let parts = std::mem::take(&mut self.parts);
        let completed = match try_join_all(parts).await {
            Ok(_) => self.upload.complete().await.map(|_| ()),
            Err(err) => Err(err),
        };

        if let Err(err) = completed {
            if let Err(abort_err) = self.upload.abort().await {
                tracing::warn!(
                    location = %self.location,
                    error = %abort_err,
                    "failed to abort blob upload"
                );
            }
            return Err(err);
        }

        tracing::debug!(
            location = %self.location,
            bytes = self.bytes_written,
            "blob upload finished"
        );
        Ok(self.id)
    }

    pub async fn abort(mut self) -> object_store::Result<()> {
        self.upload.abort().await
    }
}

/// A stored blob opened for reading.
pub struct BlobRead {
    pub name: String,
    pub size: usize,
    pub stream: BoxStream<'static, object_store::Result<Bytes>>,
}

impl StorageManager {
    /// Create a new StorageManager with the specified configuration.
    pub async fn new(cfg: &AppConfig) -> object_store::Result<Self> {
        let backend_kind = cfg.storage.clone();
        let (store, local_base) = create_storage_backend(cfg).await?;

        Ok(Self {
            store,
            backend_kind,
            local_base,
        })
    }

    /// Create a StorageManager with a custom storage backend.
    pub fn with_backend(store: DynStore, backend_kind: StorageKind) -> Self {
        Self {
            store,
            backend_kind,
            local_base: None,
        }
    }

    pub fn backend_kind(&self) -> &StorageKind {
        &self.backend_kind
    }

    /// Starts a streaming upload of a new blob under `namespace`.
    pub async fn open_write(&self, namespace: &str, name: &str) -> object_store::Result<BlobWriter> {
        let id = Uuid::new_v4().to_string();
        let location = ObjPath::from(format!("{namespace}/{id}/{name}"));
        let upload = self.store.put_multipart(&location).await?;

        Ok(BlobWriter {
            id,
            location,
            upload,
            buffer: Vec::new(),
            parts: Vec::new(),
            bytes_written: 0,
        })
    }

    /// Opens a blob by id. `None` when no such blob exists.
    pub async fn open_read(
        &self,
        namespace: &str,
        blob_id: &str,
    ) -> object_store::Result<Option<BlobRead>> {
        let Some(prefix) = blob_prefix(namespace, blob_id) else {
            return Ok(None);
        };

        let Some(meta) = self.store.list(Some(&prefix)).try_next().await? else {
            return Ok(None);
        };

        let name = meta
            .location
            .filename()
            .map(str::to_owned)
            .unwrap_or_default();

        match self.store.get(&meta.location).await {
            Ok(result) => Ok(Some(BlobRead {
                name,
                size: meta.size,
                stream: result.into_stream(),
            })),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Removes a single blob. Deleting a blob that does not exist is not an error.
    pub async fn delete_blob(&self, namespace: &str, blob_id: &str) -> object_store::Result<()> {
        match blob_prefix(namespace, blob_id) {
            Some(prefix) => self.delete_prefix(prefix.as_ref()).await,
            None => Ok(()),
        }
    }

    /// Delete all objects below the specified prefix.
    ///
    /// For local filesystem backends, this also attempts to clean up empty directories.
    pub async fn delete_prefix(&self, prefix: &str) -> object_store::Result<()> {
        let prefix_path = ObjPath::from(prefix);
        let locations = self
            .store
            .list(Some(&prefix_path))
            .map_ok(|m| m.location)
            .boxed();
        self.store
            .delete_stream(locations)
            .try_collect::<Vec<_>>()
            .await?;

        if self.backend_kind == StorageKind::Local {
            self.prune_empty_dirs(prefix).await;
        }

        Ok(())
    }

    /// Touches the backend with a cheap listing; used by readiness checks.
    pub async fn check_available(&self, namespace: &str) -> object_store::Result<()> {
        let prefix = ObjPath::from(namespace);
        match self.store.list(Some(&prefix)).next().await {
            Some(Err(err)) => Err(err),
            _ => Ok(()),
        }
    }

    /// Removes the directories the local backend leaves behind once every
    /// object under `prefix` is gone. Stops at the first one still in use.
    async fn prune_empty_dirs(&self, prefix: &str) {
        let Some(base) = &self.local_base else {
            return;
        };

        let relative = Path::new(prefix);
        if !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        {
            tracing::warn!(%prefix, "not pruning directories for a non-relative prefix");
            return;
        }

        let target = base.join(relative);
        for dir in target.ancestors().take_while(|dir| *dir != base.as_path()) {
            match tokio::fs::remove_dir(dir).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::debug!(error = %err, path = %dir.display(), "stopped pruning");
                    break;
                }
            }
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl StorageManager {
    /// Memory-backed storage for tests.
    pub fn in_memory() -> Self {
        Self::with_backend(Arc::new(InMemory::new()), StorageKind::Memory)
    }

    /// Resolved directory of the local backend, if that is the one in use.
    pub fn local_base_path(&self) -> Option<&Path> {
        self.local_base.as_deref()
    }

    /// Store bytes at the specified location.
    pub async fn put(&self, location: &str, data: Bytes) -> object_store::Result<()> {
        let path = ObjPath::from(location);
        let payload = object_store::PutPayload::from_bytes(data);
        self.store.put(&path, payload).await.map(|_| ())
    }

    /// Retrieve bytes from the specified location, buffered in memory.
    pub async fn get(&self, location: &str) -> object_store::Result<Bytes> {
        let path = ObjPath::from(location);
        let result = self.store.get(&path).await?;
        result.bytes().await
    }

    /// List all objects below the specified prefix.
    pub async fn list(
        &self,
        prefix: Option<&str>,
    ) -> object_store::Result<Vec<object_store::ObjectMeta>> {
        let prefix_path = prefix.map(ObjPath::from);
        self.store.list(prefix_path.as_ref()).try_collect().await
    }

    /// Check if an object exists at the specified location.
    pub async fn exists(&self, location: &str) -> object_store::Result<bool> {
        let path = ObjPath::from(location);
        self.store
            .head(&path)
            .await
            .map(|_| true)
            .or_else(|e| match e {
                object_store::Error::NotFound { .. } => Ok(false),
                _ => Err(e),
            })
    }
}

fn blob_prefix(namespace: &str, blob_id: &str) -> Option<ObjPath> {
    if blob_id.is_empty() || blob_id.contains('/') || blob_id.contains("..") {
        return None;
    }
    Some(ObjPath::from(format!("{namespace}/{blob_id}")))
}

async fn create_storage_backend(
    cfg: &AppConfig,
) -> object_store::Result<(DynStore, Option<PathBuf>)> {
    if cfg.storage == StorageKind::Memory {
        return Ok((Arc::new(InMemory::new()), None));
    }

    let base = resolve_base_dir(cfg);
    tokio::fs::create_dir_all(&base)
        .await
        .map_err(|err| object_store::Error::Generic {
            store: "LocalFileSystem",
            source: Box::new(err),
        })?;
    let store = LocalFileSystem::new_with_prefix(&base)?;

    Ok((Arc::new(store), Some(base)))
}

/// Absolute directory backing the local blob store. A relative `data_dir`
/// is taken relative to the working directory.
pub fn resolve_base_dir(cfg: &AppConfig) -> PathBuf {
    let configured = Path::new(&cfg.data_dir);
    if configured.is_absolute() {
        return configured.to_path_buf();
    }

    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(configured)
}
