//! Blob backend that fails one kind of operation on purpose, for exercising
//! the partial-failure paths around PDF storage.

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use futures::stream::BoxStream;
use object_store::{
    memory::InMemory, path::Path, GetOptions, GetResult, ListResult, MultipartUpload, ObjectMeta,
    ObjectStore, PutMultipartOpts, PutOptions, PutPayload, PutResult, Result, UploadPart,
};

use crate::utils::config::StorageKind;

use super::store::StorageManager;

/// The operation a [`FlakyStore`] refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Opening a streaming upload fails.
    OpenWrite,
    /// Uploads open and accept parts but fail to complete.
    CompleteWrite,
    /// Deleting any object fails.
    Delete,
}

fn injected(operation: &str) -> object_store::Error {
    object_store::Error::Generic {
        store: "FlakyStore",
        source: format!("injected {operation} failure").into(),
    }
}

/// In-memory store with a single injected fault.
#[derive(Debug)]
pub struct FlakyStore {
    inner: InMemory,
    fault: Fault,
    aborted_uploads: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub fn new(fault: Fault) -> Self {
        Self {
            inner: InMemory::new(),
            fault,
            aborted_uploads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wraps the store in a [`StorageManager`] and hands back the abort
    /// counter so tests can check cleanup after a failed upload.
    pub fn into_storage(self) -> (StorageManager, Arc<AtomicUsize>) {
        let aborted = Arc::clone(&self.aborted_uploads);
        (
            StorageManager::with_backend(Arc::new(self), StorageKind::Memory),
            aborted,
        )
    }
}

impl fmt::Display for FlakyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FlakyStore({:?})", self.fault)
    }
}

#[derive(Debug)]
struct UncompletableUpload {
    inner: Box<dyn MultipartUpload>,
    aborted: Arc<AtomicUsize>,
}

#[async_trait]
impl MultipartUpload for UncompletableUpload {
    fn put_part(&mut self, data: PutPayload) -> UploadPart {
        self.inner.put_part(data)
    }

    async fn complete(&mut self) -> Result<PutResult> {
        Err(injected("complete"))
    }

    async fn abort(&mut self) -> Result<()> {
        self.aborted.fetch_add(1, Ordering::SeqCst);
        self.inner.abort().await
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn put_opts(
        &self,
        location: &Path,
        payload: PutPayload,
        opts: PutOptions,
    ) -> Result<PutResult> {
        self.inner.put_opts(location, payload, opts).await
    }

    async fn put_multipart_opts(
        &self,
        location: &Path,
        opts: PutMultipartOpts,
    ) -> Result<Box<dyn MultipartUpload>> {
        if self.fault == Fault::OpenWrite {
            return Err(injected("open write"));
        }

        let upload = self.inner.put_multipart_opts(location, opts).await?;
        if self.fault == Fault::CompleteWrite {
            return Ok(Box::new(UncompletableUpload {
                inner: upload,
                aborted: Arc::clone(&self.aborted_uploads),
            }));
        }
        Ok(upload)
    }

    async fn get_opts(&self, location: &Path, options: GetOptions) -> Result<GetResult> {
        self.inner.get_opts(location, options).await
    }

    async fn delete(&self, location: &Path) -> Result<()> {
        if self.fault == Fault::Delete {
            return Err(injected("delete"));
        }
        self.inner.delete(location).await
    }

    fn list(&self, prefix: Option<&Path>) -> BoxStream<'_, Result<ObjectMeta>> {
        self.inner.list(prefix)
    }

    async fn list_with_delimiter(&self, prefix: Option<&Path>) -> Result<ListResult> {
        self.inner.list_with_delimiter(prefix).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        self.inner.copy(from, to).await
    }

    async fn copy_if_not_exists(&self, from: &Path, to: &Path) -> Result<()> {
        self.inner.copy_if_not_exists(from, to).await
    }
}
