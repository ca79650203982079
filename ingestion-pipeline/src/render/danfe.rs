use std::io::BufWriter;

use bytes::Bytes;
use common::storage::types::fiscal_document::{DocumentDraft, Party};
use printpdf::{
    BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
};
use serde_json::Value;

use super::{PdfRenderer, RenderError};
use crate::document::{extract_keys, normalize, parse_document, parser::text_of};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const TOP: f32 = 280.0;
const BOTTOM: f32 = 20.0;
const LEFT: f32 = 15.0;
const LINE: f32 = 5.0;
const DESCRIPTION_CHARS: usize = 48;

/// Auxiliary printout (DANFE-style) of an NF-e, drawn with the PDF builtin fonts.
#[derive(Debug, Default, Clone, Copy)]
pub struct DanfeRenderer;

impl PdfRenderer for DanfeRenderer {
    fn render(&self, xml: &str) -> Result<Bytes, RenderError> {
        let parsed = parse_document(xml).map_err(|err| RenderError::Document(err.to_string()))?;
        let keys = extract_keys(&parsed).map_err(|err| RenderError::Document(err.to_string()))?;
        let draft =
            normalize(parsed, keys, xml).map_err(|err| RenderError::Document(err.to_string()))?;

        draw(&draft)
    }
}

struct Pages {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
    page: usize,
}

impl Pages {
    fn new(title: &str) -> Result<Self, RenderError> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let layer = doc.get_page(page).get_layer(layer);
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|err| RenderError::Pdf(format!("font error: {err}")))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|err| RenderError::Pdf(format!("font error: {err}")))?;

        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            y: TOP,
            page: 1,
        })
    }

    fn text(&self, text: &str, size: f32, x: f32) {
        self.layer
            .use_text(text, size, Mm(x), Mm(self.y), &self.regular);
    }

    fn heading(&self, text: &str, size: f32, x: f32) {
        self.layer.use_text(text, size, Mm(x), Mm(self.y), &self.bold);
    }

    fn advance(&mut self, by: f32) {
        self.y -= by;
    }

    /// Starts a new page when fewer than `needed` millimetres remain.
    /// Returns true when a page break happened.
    fn reserve(&mut self, needed: f32) -> bool {
        if self.y - needed >= BOTTOM {
            return false;
        }
        self.footer();
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.page = self.page.saturating_add(1);
        self.y = TOP;
        true
    }

    fn footer(&self) {
        self.layer.use_text(
            format!("Page {}", self.page),
            8.0,
            Mm(PAGE_WIDTH - 35.0),
            Mm(BOTTOM - 10.0),
            &self.regular,
        );
    }

    fn finish(self) -> Result<Bytes, RenderError> {
        self.footer();
        let mut buf = BufWriter::new(Vec::new());
        self.doc
            .save(&mut buf)
            .map_err(|err| RenderError::Pdf(format!("save error: {err}")))?;
        buf.into_inner()
            .map(Bytes::from)
            .map_err(|err| RenderError::Pdf(format!("buffer error: {err}")))
    }
}

fn draw(draft: &DocumentDraft) -> Result<Bytes, RenderError> {
    let mut pages = Pages::new(&format!("NF-e {}", draft.number))?;

    pages.heading("DANFE", 16.0, LEFT);
    pages.advance(6.0);
    pages.text(
        "Documento Auxiliar da Nota Fiscal Eletronica",
        9.0,
        LEFT,
    );
    pages.advance(LINE * 2.0);

    pages.heading(&format!("Numero: {}", draft.number), 11.0, LEFT);
    if let Some(issue_date) = &draft.issue_date {
        pages.text(&format!("Emissao: {issue_date}"), 10.0, 110.0);
    }
    pages.advance(LINE + 1.0);
    pages.text("Chave de acesso", 8.0, LEFT);
    pages.advance(4.0);
    pages.text(&group_key(&draft.document_key), 10.0, LEFT);
    pages.advance(LINE * 2.0);

    draw_party(&mut pages, "EMITENTE", draft.sender.as_ref());
    draw_party(&mut pages, "DESTINATARIO", draft.recipient.as_ref());

    pages.reserve(LINE * 3.0);
    pages.heading("PRODUTOS", 11.0, LEFT);
    pages.advance(LINE + 1.0);
    item_header(&pages);
    pages.advance(LINE);

    for item in &draft.items {
        if pages.reserve(LINE) {
            item_header(&pages);
            pages.advance(LINE);
        }
        draw_item(&pages, item);
        pages.advance(LINE);
    }

    pages.reserve(LINE * 3.0);
    pages.advance(LINE);
    pages.heading(
        &format!("VALOR TOTAL DA NOTA: {:.2}", draft.total_value),
        11.0,
        LEFT,
    );

    pages.finish()
}

fn draw_party(pages: &mut Pages, title: &str, party: Option<&Party>) {
    pages.reserve(LINE * 5.0);
    pages.heading(title, 11.0, LEFT);
    pages.advance(LINE + 1.0);

    let Some(party) = party else {
        pages.text("-", 9.0, LEFT);
        pages.advance(LINE * 2.0);
        return;
    };

    if let Some(name) = &party.name {
        pages.text(name, 10.0, LEFT);
        pages.advance(LINE);
    }
    let identifier = party
        .tax_id
        .as_deref()
        .map(|id| format!("CNPJ: {id}"))
        .or_else(|| party.national_id.as_deref().map(|id| format!("CPF: {id}")));
    if let Some(identifier) = identifier {
        pages.text(&identifier, 9.0, LEFT);
        pages.advance(LINE);
    }
    if let Some(address) = &party.address {
        let line = [
            address.street.as_deref(),
            address.number.as_deref(),
            address.district.as_deref(),
            address.city.as_deref(),
            address.region.as_deref(),
            address.postal_code.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ");
        if !line.is_empty() {
            pages.text(&line, 9.0, LEFT);
            pages.advance(LINE);
        }
    }
    pages.advance(LINE);
}

fn item_header(pages: &Pages) {
    pages.heading("Codigo", 9.0, LEFT);
    pages.heading("Descricao", 9.0, 40.0);
    pages.heading("Qtd", 9.0, 125.0);
    pages.heading("Unit.", 9.0, 148.0);
    pages.heading("Total", 9.0, 175.0);
}

fn draw_item(pages: &Pages, item: &Value) {
    let field = |name: &str| item.get(name).and_then(text_of).unwrap_or_default();

    let description: String = field("xProd").chars().take(DESCRIPTION_CHARS).collect();
    pages.text(&field("cProd"), 8.0, LEFT);
    pages.text(&description, 8.0, 40.0);
    pages.text(&field("qCom"), 8.0, 125.0);
    pages.text(&field("vUnCom"), 8.0, 148.0);
    pages.text(&field("vProd"), 8.0, 175.0);
}

/// Access keys are printed in groups of four digits.
fn group_key(key: &str) -> String {
    key.chars()
        .collect::<Vec<_>>()
        .chunks(4)
        .map(|group| group.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}
