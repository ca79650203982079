use chrono::{DateTime, Utc};
use common::storage::types::fiscal_document::{FiscalDocument, PageInfo, Party};
use serde::Serialize;
use serde_json::Value;

/// Public JSON shape of a stored document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentView {
    pub id: String,
    pub numero: String,
    pub chave: String,
    pub data_emissao: Option<String>,
    pub emitente: Option<Party>,
    pub destinatario: Option<Party>,
    pub transportadora: Option<Value>,
    pub produtos: Vec<Value>,
    pub valor_total: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xml_original: Option<String>,
    pub xml_sha256: String,
    pub pdf_file_id: Option<String>,
    /// False when the record was stored but its PDF never got attached.
    pub pdf_disponivel: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentView {
    /// Everything, including the original XML.
    pub fn full(document: FiscalDocument) -> Self {
        let xml = document.raw_xml.clone();
        let mut view = Self::listed(document);
        view.xml_original = Some(xml);
        view
    }

    /// Listing shape, without the original XML.
    pub fn listed(document: FiscalDocument) -> Self {
        Self {
            pdf_disponivel: document.pdf_blob_ref.is_some(),
            id: document.id,
            numero: document.number,
            chave: document.document_key,
            data_emissao: document.issue_date,
            emitente: document.sender,
            destinatario: document.recipient,
            transportadora: document.carrier,
            produtos: document.items,
            valor_total: document.total_value,
            xml_original: None,
            xml_sha256: document.xml_sha256,
            pdf_file_id: document.pdf_blob_ref,
            created_at: document.created_at,
            updated_at: document.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DocumentListView {
    pub records: Vec<DocumentView>,
    pub pagination: PageInfo,
}
