//! PDF rendering and the coordinator that streams rendered bytes into blob
//! storage.

mod danfe;

pub use danfe::DanfeRenderer;

use std::sync::Arc;

use bytes::Bytes;
use common::{
    error::AppError,
    storage::{store::StorageManager, types::fiscal_document::FiscalDocument},
};
use thiserror::Error;
use tracing::{debug, warn};

/// Size of the slices handed to the blob writer.
pub const BLOB_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("document could not be read: {0}")]
    Document(String),
    #[error("pdf generation failed: {0}")]
    Pdf(String),
}

/// Turns document XML into PDF bytes. Implementations are synchronous and are
/// driven from the blocking pool.
pub trait PdfRenderer: Send + Sync {
    fn render(&self, xml: &str) -> Result<Bytes, RenderError>;
}

/// Renders `xml` on the blocking pool.
pub async fn render_pdf(renderer: Arc<dyn PdfRenderer>, xml: String) -> Result<Bytes, AppError> {
    tokio::task::spawn_blocking(move || renderer.render(&xml))
        .await
        .map_err(|err| AppError::RenderFailure(format!("renderer panicked: {err}")))?
        .map_err(|err| AppError::RenderFailure(err.to_string()))
}

/// Renders a document and stores the PDF as `NFE-<number>.pdf` under
/// `namespace`, returning the blob id once the upload has completed.
pub async fn render_to_blob(
    renderer: Arc<dyn PdfRenderer>,
    storage: &StorageManager,
    namespace: &str,
    xml: String,
    number: &str,
) -> Result<String, AppError> {
    let pdf = render_pdf(renderer, xml).await?;
    let name = FiscalDocument::pdf_file_name(number);

    let mut writer = storage
        .open_write(namespace, &name)
        .await
        .map_err(|err| AppError::BlobWriteFailure(err.to_string()))?;

    for chunk in pdf.chunks(BLOB_CHUNK_SIZE) {
        writer.write(chunk);
    }

    let blob_id = writer.id().to_string();
    match writer.finish().await {
        Ok(blob_id) => {
            debug!(%blob_id, bytes = pdf.len(), %name, "pdf stored");
            Ok(blob_id)
        }
        Err(err) => {
            warn!(%blob_id, error = %err, "pdf upload failed");
            Err(AppError::BlobWriteFailure(err.to_string()))
        }
    }
}
