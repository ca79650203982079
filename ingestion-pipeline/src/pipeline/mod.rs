mod context;
mod stages;
mod state;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use common::{
    error::AppError,
    storage::{db::SurrealDbClient, store::StorageManager, types::fiscal_document::FiscalDocument},
};
use tracing::{info, warn};
use uuid::Uuid;

use self::{
    context::PipelineContext,
    stages::{
        attach, complete, extract_identity, guard_duplicates, normalize_record, parse, persist,
        render,
    },
    state::received,
};
use crate::render::{render_pdf, render_to_blob, DanfeRenderer, PdfRenderer};

/// Runs a submitted XML document through parsing, identity checks,
/// persistence and PDF rendering.
#[allow(clippy::module_name_repetitions)]
pub struct IngestionPipeline {
    db: Arc<SurrealDbClient>,
    storage: StorageManager,
    pdf_namespace: String,
    renderer: Arc<dyn PdfRenderer>,
}

impl IngestionPipeline {
    pub fn new(db: Arc<SurrealDbClient>, storage: StorageManager, pdf_namespace: String) -> Self {
        Self::with_renderer(db, storage, pdf_namespace, Arc::new(DanfeRenderer))
    }

    pub fn with_renderer(
        db: Arc<SurrealDbClient>,
        storage: StorageManager,
        pdf_namespace: String,
        renderer: Arc<dyn PdfRenderer>,
    ) -> Self {
        Self {
            db,
            storage,
            pdf_namespace,
            renderer,
        }
    }

    fn duration_millis(duration: Duration) -> u64 {
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
    }

    /// Ingests one document and returns it with its PDF attached.
    ///
    /// Failures before persistence leave nothing behind. Render and attach
    /// failures leave the record stored without a PDF.
    #[tracing::instrument(skip_all, fields(xml_bytes = raw_xml.len()))]
    pub async fn ingest(&self, raw_xml: String) -> Result<FiscalDocument, AppError> {
        let ingestion_id = Uuid::new_v4().to_string();
        let mut ctx = PipelineContext::new(
            ingestion_id,
            raw_xml,
            self.db.as_ref(),
            &self.storage,
            &self.pdf_namespace,
            &self.renderer,
        );

        let machine = received();
        let pipeline_started = Instant::now();

        let stage_start = Instant::now();
        let machine = parse(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let machine = extract_identity(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let parse_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let machine = guard_duplicates(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let guard_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let machine = normalize_record(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let machine = persist(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let persist_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let machine = render(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let render_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let machine = attach(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let attach_duration = stage_start.elapsed();

        let (_machine, document) = complete(machine, &mut ctx).map_err(|err| ctx.abort(err))?;

        info!(
            ingestion_id = %ctx.ingestion_id,
            document_id = %document.id,
            number = %document.number,
            total_ms = Self::duration_millis(pipeline_started.elapsed()),
            parse_ms = Self::duration_millis(parse_duration),
            guard_ms = Self::duration_millis(guard_duration),
            persist_ms = Self::duration_millis(persist_duration),
            render_ms = Self::duration_millis(render_duration),
            attach_ms = Self::duration_millis(attach_duration),
            "ingestion pipeline finished"
        );

        Ok(document)
    }

    /// Renders and attaches a PDF for a stored document that has none.
    #[tracing::instrument(skip(self))]
    pub async fn rerender(&self, id: &str) -> Result<FiscalDocument, AppError> {
        let document = FiscalDocument::get_by_id(id, &self.db).await?;
        if document.pdf_blob_ref.is_some() {
            return Err(AppError::Validation(format!(
                "document {id} already has a rendered pdf"
            )));
        }

        let blob_id = render_to_blob(
            Arc::clone(&self.renderer),
            &self.storage,
            &self.pdf_namespace,
            document.raw_xml.clone(),
            &document.number,
        )
        .await?;

        match FiscalDocument::attach_pdf(id, &blob_id, &self.db).await {
            Ok(attached) => {
                info!(document_id = %id, %blob_id, "pdf re-rendered and attached");
                Ok(attached)
            }
            Err(err) => {
                if let Err(cleanup) = self.storage.delete_blob(&self.pdf_namespace, &blob_id).await
                {
                    warn!(
                        document_id = %id,
                        %blob_id,
                        error = %cleanup,
                        "failed to remove unattached pdf"
                    );
                }
                Err(err)
            }
        }
    }

    /// Renders a PDF without storing anything.
    pub async fn preview(&self, raw_xml: String) -> Result<Bytes, AppError> {
        render_pdf(Arc::clone(&self.renderer), raw_xml).await
    }
}
