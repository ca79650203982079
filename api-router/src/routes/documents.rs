use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use common::{error::AppError, storage::types::fiscal_document::{DocumentQuery, FiscalDocument}};
use serde::Deserialize;
use serde_json::json;
use tempfile::NamedTempFile;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    api_state::ApiState,
    error::ApiError,
    view::{DocumentListView, DocumentView},
};

#[derive(Debug, TryFromMultipart)]
pub struct DocumentUpload {
    #[form_data(limit = "unlimited")]
    pub file: FieldData<NamedTempFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub search: Option<String>,
    pub number: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PdfParams {
    pub download: Option<String>,
}

impl PdfParams {
    fn wants_attachment(&self) -> bool {
        self.download
            .as_deref()
            .is_some_and(|flag| matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
    }
}

/// Record ids are UUIDs; anything else is rejected before touching the store.
fn parse_id(id: &str) -> Result<String, AppError> {
    Uuid::parse_str(id)
        .map(|uuid| uuid.to_string())
        .map_err(|_| AppError::InvalidId(format!("{id:?} is not a valid document id")))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn pdf_response(body: Body, file_name: &str, attachment: bool, size: Option<usize>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
    if let Some(size) = size {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    }

    let disposition = if attachment { "attachment" } else { "inline" };
    let Ok(disposition_value) =
        HeaderValue::from_str(&format!("{disposition}; filename=\"{file_name}\""))
    else {
        headers.insert(header::CONTENT_DISPOSITION, HeaderValue::from_static("inline"));
        return (StatusCode::OK, headers, body).into_response();
    };
    headers.insert(header::CONTENT_DISPOSITION, disposition_value);

    (StatusCode::OK, headers, body).into_response()
}

pub async fn ingest_document(
    State(state): State<ApiState>,
    TypedMultipart(input): TypedMultipart<DocumentUpload>,
) -> Result<impl IntoResponse, ApiError> {
    let file_name = input
        .file
        .metadata
        .file_name
        .clone()
        .unwrap_or_else(|| "unnamed".to_string());
    let bytes = tokio::fs::read(input.file.contents.path())
        .await
        .map_err(AppError::from)?;

    info!(%file_name, bytes = bytes.len(), "Received document upload");

    let xml = String::from_utf8(bytes)
        .map_err(|_| ApiError::ValidationError("uploaded file is not valid UTF-8 text".into()))?;
    if xml.trim().is_empty() {
        return Err(ApiError::ValidationError("uploaded file is empty".into()));
    }

    let document = state.pipeline.ingest(xml).await?;

    Ok((StatusCode::CREATED, Json(DocumentView::listed(document))))
}

pub async fn list_documents(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let max_page_size = state.config.max_page_size.max(1);
    let limit = params
        .limit
        .filter(|limit| *limit > 0)
        .unwrap_or(state.config.default_page_size)
        .clamp(1, max_page_size);

    let query = DocumentQuery {
        number: non_empty(params.number),
        search: non_empty(params.search),
        min_value: params.min_value,
        max_value: params.max_value,
        page: params.page.unwrap_or(1).max(1),
        limit,
    };

    let page = FiscalDocument::query(&query, &state.db).await?;

    Ok(Json(DocumentListView {
        records: page.records.into_iter().map(DocumentView::listed).collect(),
        pagination: page.pagination,
    }))
}

pub async fn get_document(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let document = FiscalDocument::get_by_id(&id, &state.db).await?;

    Ok(Json(DocumentView::full(document)))
}

pub async fn get_document_pdf(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(params): Query<PdfParams>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let document = FiscalDocument::get_by_id(&id, &state.db).await?;

    let Some(blob_id) = document.pdf_blob_ref.as_deref() else {
        return Err(ApiError::NotFound(format!("document {id} has no pdf")));
    };

    let blob = state
        .storage
        .open_read(&state.config.pdf_namespace, blob_id)
        .await
        .map_err(|err| {
            warn!(document_id = %id, %blob_id, error = %err, "blob store read failed");
            AppError::StoreUnavailable("pdf storage is unavailable".into())
        })?
        .ok_or_else(|| ApiError::NotFound(format!("pdf for document {id} not found")))?;

    let file_name = FiscalDocument::pdf_file_name(&document.number);
    Ok(pdf_response(
        Body::from_stream(blob.stream),
        &file_name,
        params.wants_attachment(),
        Some(blob.size),
    ))
}

pub async fn rerender_document_pdf(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let document = state.pipeline.rerender(&id).await?;

    Ok(Json(DocumentView::full(document)))
}

pub async fn delete_document(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let summary = FiscalDocument::delete_with_pdf(
        &id,
        &state.db,
        &state.storage,
        &state.config.pdf_namespace,
    )
    .await?;

    info!(document_id = %summary.id, number = %summary.number, "document deleted");

    Ok(Json(json!({ "status": "deleted", "document": summary })))
}

pub async fn delete_all_documents(
    State(state): State<ApiState>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted =
        FiscalDocument::delete_all(&state.db, &state.storage, &state.config.pdf_namespace).await?;

    Ok(Json(json!({ "status": "deleted", "deleted": deleted })))
}

pub async fn preview_pdf(
    State(state): State<ApiState>,
    body: String,
) -> Result<Response, ApiError> {
    if body.trim().is_empty() {
        return Err(ApiError::ValidationError("request body is empty".into()));
    }

    let pdf = state.pipeline.preview(body).await?;
    let size = pdf.len();

    Ok(pdf_response(Body::from(pdf), "preview.pdf", false, Some(size)))
}
