#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod document;
pub mod duplicate_guard;
pub mod pipeline;
pub mod render;

pub use pipeline::IngestionPipeline;
pub use render::{DanfeRenderer, PdfRenderer, RenderError};
