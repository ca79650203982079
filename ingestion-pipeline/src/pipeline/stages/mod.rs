use std::sync::Arc;

use common::{
    error::AppError,
    storage::{db::is_unique_violation, types::fiscal_document::FiscalDocument},
};
use state_machines::core::GuardError;
use tracing::{debug, info, instrument, warn};

use super::{
    context::PipelineContext,
    state::{
        Attached, DocumentMachine, Done, DuplicateChecked, KeysExtracted, Normalized, Parsed,
        Persisted, Received, Rendered,
    },
};
use crate::{
    document::{extract_keys, normalize, parse_document},
    duplicate_guard::{check_duplicates, duplicate_from_violation},
    render::render_to_blob,
};

#[instrument(level = "trace", skip_all, fields(ingestion_id = %ctx.ingestion_id))]
pub async fn parse(
    machine: DocumentMachine<(), Received>,
    ctx: &mut PipelineContext<'_>,
) -> Result<DocumentMachine<(), Parsed>, AppError> {
    let parsed = parse_document(&ctx.raw_xml)?;

    debug!(
        ingestion_id = %ctx.ingestion_id,
        xml_bytes = ctx.raw_xml.len(),
        items = parsed.items.len(),
        has_recipient = parsed.recipient.is_some(),
        has_carrier = parsed.carrier.is_some(),
        "document parsed"
    );

    ctx.parsed = Some(parsed);

    machine
        .parse()
        .map_err(|(_, guard)| map_guard_error("parse", &guard))
}

#[instrument(level = "trace", skip_all, fields(ingestion_id = %ctx.ingestion_id))]
pub async fn extract_identity(
    machine: DocumentMachine<(), Parsed>,
    ctx: &mut PipelineContext<'_>,
) -> Result<DocumentMachine<(), KeysExtracted>, AppError> {
    let keys = extract_keys(ctx.parsed()?)?;

    debug!(
        ingestion_id = %ctx.ingestion_id,
        number = %keys.number,
        document_key = %keys.document_key,
        "document identity extracted"
    );

    ctx.keys = Some(keys);

    machine
        .extract_keys()
        .map_err(|(_, guard)| map_guard_error("extract_keys", &guard))
}

#[instrument(level = "trace", skip_all, fields(ingestion_id = %ctx.ingestion_id))]
pub async fn guard_duplicates(
    machine: DocumentMachine<(), KeysExtracted>,
    ctx: &mut PipelineContext<'_>,
) -> Result<DocumentMachine<(), DuplicateChecked>, AppError> {
    check_duplicates(ctx.keys()?, ctx.db).await?;

    machine
        .check_duplicates()
        .map_err(|(_, guard)| map_guard_error("check_duplicates", &guard))
}

#[instrument(level = "trace", skip_all, fields(ingestion_id = %ctx.ingestion_id))]
pub async fn normalize_record(
    machine: DocumentMachine<(), DuplicateChecked>,
    ctx: &mut PipelineContext<'_>,
) -> Result<DocumentMachine<(), Normalized>, AppError> {
    let parsed = ctx.take_parsed()?;
    let keys = ctx.keys()?.clone();
    let draft = normalize(parsed, keys, &ctx.raw_xml)?;

    debug!(
        ingestion_id = %ctx.ingestion_id,
        items = draft.items.len(),
        total_value = draft.total_value,
        "document normalized"
    );

    ctx.draft = Some(draft);

    machine
        .normalize()
        .map_err(|(_, guard)| map_guard_error("normalize", &guard))
}

/// Inserts the record without a blob reference. The unique indexes make this
/// the authoritative duplicate check.
#[instrument(level = "trace", skip_all, fields(ingestion_id = %ctx.ingestion_id))]
pub async fn persist(
    machine: DocumentMachine<(), Normalized>,
    ctx: &mut PipelineContext<'_>,
) -> Result<DocumentMachine<(), Persisted>, AppError> {
    let document = FiscalDocument::new(ctx.take_draft()?);

    let stored = match ctx.db.store_item(document).await {
        Ok(Some(stored)) => stored,
        Ok(None) => {
            return Err(AppError::InternalError(
                "store returned no record after insert".into(),
            ))
        }
        Err(err) if is_unique_violation(&err) => {
            warn!(
                ingestion_id = %ctx.ingestion_id,
                error = %err,
                "insert rejected by unique index after duplicate pre-check passed"
            );
            return Err(duplicate_from_violation(ctx.keys()?, &err.to_string(), ctx.db).await);
        }
        Err(err) => return Err(err.into()),
    };

    info!(
        ingestion_id = %ctx.ingestion_id,
        document_id = %stored.id,
        number = %stored.number,
        document_key = %stored.document_key,
        "document persisted"
    );

    ctx.document = Some(stored);

    machine
        .persist()
        .map_err(|(_, guard)| map_guard_error("persist", &guard))
}

/// Renders the PDF and uploads it. A failure leaves the persisted record in
/// place without a blob reference.
#[instrument(level = "trace", skip_all, fields(ingestion_id = %ctx.ingestion_id))]
pub async fn render(
    machine: DocumentMachine<(), Persisted>,
    ctx: &mut PipelineContext<'_>,
) -> Result<DocumentMachine<(), Rendered>, AppError> {
    let (document_id, number) = {
        let document = ctx.document()?;
        (document.id.clone(), document.number.clone())
    };

    let blob_id = render_to_blob(
        Arc::clone(ctx.renderer),
        ctx.storage,
        ctx.pdf_namespace,
        ctx.raw_xml.clone(),
        &number,
    )
    .await
    .map_err(|err| match err {
        AppError::RenderFailure(reason) => AppError::RenderFailure(format!(
            "document {document_id} stored without pdf: {reason}"
        )),
        AppError::BlobWriteFailure(reason) => AppError::BlobWriteFailure(format!(
            "document {document_id} stored without pdf: {reason}"
        )),
        other => other,
    })?;

    debug!(
        ingestion_id = %ctx.ingestion_id,
        %document_id,
        %blob_id,
        "pdf rendered"
    );

    ctx.blob_id = Some(blob_id);

    machine
        .render()
        .map_err(|(_, guard)| map_guard_error("render", &guard))
}

/// Records the blob reference on the stored document. A failure leaves the
/// uploaded blob orphaned.
#[instrument(level = "trace", skip_all, fields(ingestion_id = %ctx.ingestion_id))]
pub async fn attach(
    machine: DocumentMachine<(), Rendered>,
    ctx: &mut PipelineContext<'_>,
) -> Result<DocumentMachine<(), Attached>, AppError> {
    let document_id = ctx.document()?.id.clone();
    let blob_id = ctx.blob_id()?.to_string();

    let attached = match FiscalDocument::attach_pdf(&document_id, &blob_id, ctx.db).await {
        Ok(attached) => attached,
        Err(err) => {
            warn!(
                ingestion_id = %ctx.ingestion_id,
                %document_id,
                %blob_id,
                error = %err,
                "pdf uploaded but not attached; blob is orphaned"
            );
            return Err(err);
        }
    };

    ctx.document = Some(attached);

    machine
        .attach()
        .map_err(|(_, guard)| map_guard_error("attach", &guard))
}

pub fn complete(
    machine: DocumentMachine<(), Attached>,
    ctx: &mut PipelineContext<'_>,
) -> Result<(DocumentMachine<(), Done>, FiscalDocument), AppError> {
    let document = ctx.take_document()?;
    let machine = machine
        .complete()
        .map_err(|(_, guard)| map_guard_error("complete", &guard))?;
    Ok((machine, document))
}

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid ingestion pipeline transition during {event}: {guard:?}"
    ))
}
