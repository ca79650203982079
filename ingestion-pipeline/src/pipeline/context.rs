use std::sync::Arc;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        store::StorageManager,
        types::fiscal_document::{DocumentDraft, FiscalDocument},
    },
};
use tracing::error;

use crate::{
    document::{DocumentKeys, ParsedDocument},
    render::PdfRenderer,
};

pub struct PipelineContext<'a> {
    pub ingestion_id: String,
    pub db: &'a SurrealDbClient,
    pub storage: &'a StorageManager,
    pub pdf_namespace: &'a str,
    pub renderer: &'a Arc<dyn PdfRenderer>,
    pub raw_xml: String,
    pub parsed: Option<ParsedDocument>,
    pub keys: Option<DocumentKeys>,
    pub draft: Option<DocumentDraft>,
    pub document: Option<FiscalDocument>,
    pub blob_id: Option<String>,
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        ingestion_id: String,
        raw_xml: String,
        db: &'a SurrealDbClient,
        storage: &'a StorageManager,
        pdf_namespace: &'a str,
        renderer: &'a Arc<dyn PdfRenderer>,
    ) -> Self {
        Self {
            ingestion_id,
            db,
            storage,
            pdf_namespace,
            renderer,
            raw_xml,
            parsed: None,
            keys: None,
            draft: None,
            document: None,
            blob_id: None,
        }
    }

    pub fn parsed(&self) -> Result<&ParsedDocument, AppError> {
        self.parsed
            .as_ref()
            .ok_or_else(|| AppError::InternalError("parsed document expected to be available".into()))
    }

    pub fn keys(&self) -> Result<&DocumentKeys, AppError> {
        self.keys
            .as_ref()
            .ok_or_else(|| AppError::InternalError("document keys expected to be available".into()))
    }

    pub fn take_parsed(&mut self) -> Result<ParsedDocument, AppError> {
        self.parsed.take().ok_or_else(|| {
            AppError::InternalError("parsed document expected to be available for normalization".into())
        })
    }

    pub fn take_draft(&mut self) -> Result<DocumentDraft, AppError> {
        self.draft.take().ok_or_else(|| {
            AppError::InternalError("normalized draft expected to be available for persistence".into())
        })
    }

    pub fn document(&self) -> Result<&FiscalDocument, AppError> {
        self.document
            .as_ref()
            .ok_or_else(|| AppError::InternalError("persisted document expected to be available".into()))
    }

    pub fn take_document(&mut self) -> Result<FiscalDocument, AppError> {
        self.document.take().ok_or_else(|| {
            AppError::InternalError("attached document expected to be available".into())
        })
    }

    pub fn blob_id(&self) -> Result<&str, AppError> {
        self.blob_id
            .as_deref()
            .ok_or_else(|| AppError::InternalError("blob id expected to be available".into()))
    }

    pub fn abort(&mut self, err: AppError) -> AppError {
        let document_id = self.document.as_ref().map(|document| document.id.as_str());
        if err.is_input_error() {
            tracing::warn!(
                ingestion_id = %self.ingestion_id,
                document_id,
                error = %err,
                "document rejected"
            );
        } else {
            error!(
                ingestion_id = %self.ingestion_id,
                document_id,
                error = %err,
                "ingestion pipeline aborted"
            );
        }
        err
    }
}
