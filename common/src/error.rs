use thiserror::Error;

use crate::storage::types::fiscal_document::DocumentSummary;

/// Which identity key collided with an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKey {
    Number,
    DocumentKey,
}

impl DuplicateKey {
    pub fn as_str(self) -> &'static str {
        match self {
            DuplicateKey::Number => "number",
            DuplicateKey::DocumentKey => "document key",
        }
    }
}

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed document: {0}")]
    MalformedDocument(String),
    #[error("Missing identity: {0}")]
    MissingIdentity(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Duplicate document: {} already registered", key.as_str())]
    DuplicateDocument {
        key: DuplicateKey,
        conflict: Option<Box<DocumentSummary>>,
    },
    #[error("Render failure: {0}")]
    RenderFailure(String),
    #[error("Blob write failure: {0}")]
    BlobWriteFailure(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid id: {0}")]
    InvalidId(String),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("Storage error: {0}")]
    Storage(#[from] object_store::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// True for failures that happen before anything was written.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            AppError::MalformedDocument(_)
                | AppError::MissingIdentity(_)
                | AppError::InvalidAmount(_)
                | AppError::DuplicateDocument { .. }
                | AppError::InvalidId(_)
                | AppError::Validation(_)
        )
    }
}
