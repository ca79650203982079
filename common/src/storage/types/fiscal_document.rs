use surrealdb::sql::Datetime as SurrealDatetime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, store::StorageManager},
    stored_object,
};

/// Postal address block. Every field is independent; an absent source field
/// stays absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}

/// Sender or recipient of a fiscal document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
    /// Individual-person identifier, only set when the party is not a business.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub national_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

/// A normalized document that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentDraft {
    pub number: String,
    pub document_key: String,
    pub issue_date: Option<String>,
    pub sender: Option<Party>,
    pub recipient: Option<Party>,
    pub carrier: Option<serde_json::Value>,
    pub items: Vec<serde_json::Value>,
    pub total_value: f64,
    pub raw_xml: String,
    pub xml_sha256: String,
}

stored_object!(FiscalDocument, "fiscal_document", {
    number: String,
    document_key: String,
    issue_date: Option<String>,
    sender: Option<Party>,
    recipient: Option<Party>,
    carrier: Option<serde_json::Value>,
    items: Vec<serde_json::Value>,
    total_value: f64,
    raw_xml: String,
    xml_sha256: String,
    #[serde(default)]
    pdf_blob_ref: Option<String>
});

/// Short identification of a stored document, used for conflicts and deletions.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DocumentSummary {
    pub id: String,
    #[serde(rename = "numero")]
    pub number: String,
    #[serde(rename = "chave")]
    pub document_key: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Filters and paging for [`FiscalDocument::query`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentQuery {
    pub number: Option<String>,
    pub search: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    /// 1-indexed
    pub page: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub items_per_page: usize,
}

impl PageInfo {
    pub fn new(current_page: usize, items_per_page: usize, total_items: usize) -> Self {
        let items_per_page = items_per_page.max(1);
        Self {
            current_page,
            total_pages: total_items.div_ceil(items_per_page),
            total_items,
            items_per_page,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentPage {
    pub records: Vec<FiscalDocument>,
    pub pagination: PageInfo,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

impl FiscalDocument {
    pub fn new(draft: DocumentDraft) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            number: draft.number,
            document_key: draft.document_key,
            issue_date: draft.issue_date,
            sender: draft.sender,
            recipient: draft.recipient,
            carrier: draft.carrier,
            items: draft.items,
            total_value: draft.total_value,
            raw_xml: draft.raw_xml,
            xml_sha256: draft.xml_sha256,
            pdf_blob_ref: None,
        }
    }

    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id.clone(),
            number: self.number.clone(),
            document_key: self.document_key.clone(),
            created_at: self.created_at,
        }
    }

    /// Name under which the rendered PDF is stored and downloaded.
    pub fn pdf_file_name(number: &str) -> String {
        let sanitized: String = number
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("NFE-{sanitized}.pdf")
    }

    pub async fn get_by_id(id: &str, db: &SurrealDbClient) -> Result<Self, AppError> {
        db.get_item::<Self>(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("document {id} not found")))
    }

    pub async fn find_by_number(
        number: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let found: Option<Self> = db
            .client
            .query("SELECT * FROM type::table($table) WHERE number = $number LIMIT 1")
            .bind(("table", Self::table_name()))
            .bind(("number", number.to_owned()))
            .await?
            .take(0)?;
        Ok(found)
    }

    pub async fn find_by_document_key(
        document_key: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let found: Option<Self> = db
            .client
            .query("SELECT * FROM type::table($table) WHERE document_key = $document_key LIMIT 1")
            .bind(("table", Self::table_name()))
            .bind(("document_key", document_key.to_owned()))
            .await?
            .take(0)?;
        Ok(found)
    }

    /// Sets the blob reference of a stored document. The reference is written
    /// at most once; a document that already carries one is left untouched.
    pub async fn attach_pdf(
        id: &str,
        blob_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let updated: Vec<Self> = db
            .client
            .query(
                "UPDATE type::thing($table, $id)
                SET pdf_blob_ref = $blob_id,
                    updated_at = $updated_at
                WHERE pdf_blob_ref = NONE OR pdf_blob_ref = NULL
                RETURN AFTER",
            )
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_owned()))
            .bind(("blob_id", blob_id.to_owned()))
            .bind(("updated_at", SurrealDatetime::from(Utc::now())))
            .await?
            .take(0)?;

        if let Some(document) = updated.into_iter().next() {
            return Ok(document);
        }

        match db.get_item::<Self>(id).await? {
            Some(_) => Err(AppError::Validation(format!(
                "document {id} already has a rendered pdf"
            ))),
            None => Err(AppError::NotFound(format!("document {id} not found"))),
        }
    }

    /// Filtered, paginated listing sorted by creation time, newest first.
    ///
    /// `search` matches case-insensitively against the sender name, the
    /// recipient name and the number (any of them). Value bounds are inclusive.
    pub async fn query(
        params: &DocumentQuery,
        db: &SurrealDbClient,
    ) -> Result<DocumentPage, AppError> {
        let page = params.page.max(1);
        let limit = params.limit.max(1);
        // SurrealDB takes LIMIT and START as signed 64-bit integers.
        let start = i64::try_from(limit.saturating_mul(page.saturating_sub(1))).unwrap_or(i64::MAX);
        let limit_bound = i64::try_from(limit).unwrap_or(i64::MAX);

        let mut conditions: Vec<&'static str> = Vec::new();
        if params.number.is_some() {
            conditions.push("number = $number");
        }
        if params.search.is_some() {
            conditions.push(
                "(string::lowercase(sender.name ?? '') CONTAINS $search \
                 OR string::lowercase(recipient.name ?? '') CONTAINS $search \
                 OR string::lowercase(number) CONTAINS $search)",
            );
        }
        if params.min_value.is_some() {
            conditions.push("total_value >= $min_value");
        }
        if params.max_value.is_some() {
            conditions.push("total_value <= $max_value");
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT * FROM type::table($table){where_clause} ORDER BY created_at DESC LIMIT $limit START $start;
             SELECT count() AS count FROM type::table($table){where_clause} GROUP ALL;"
        );

        let mut response = db
            .client
            .query(sql)
            .bind(("table", Self::table_name()))
            .bind(("number", params.number.clone()))
            .bind((
                "search",
                params.search.as_ref().map(|s| s.trim().to_lowercase()),
            ))
            .bind(("min_value", params.min_value))
            .bind(("max_value", params.max_value))
            .bind(("limit", limit_bound))
            .bind(("start", start))
            .await?;

        let records: Vec<Self> = response.take(0)?;
        let count: Option<CountResult> = response.take(1)?;
        let total_items = count.map_or(0, |c| c.count);

        Ok(DocumentPage {
            records,
            pagination: PageInfo::new(page, limit, total_items),
        })
    }

    /// Removes a document and, when it has one, its rendered PDF.
    ///
    /// Failing to delete the blob is logged and does not fail the call.
    pub async fn delete_with_pdf(
        id: &str,
        db: &SurrealDbClient,
        storage: &StorageManager,
        pdf_namespace: &str,
    ) -> Result<DocumentSummary, AppError> {
        let deleted = db
            .delete_item::<Self>(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("document {id} not found")))?;

        if let Some(blob_id) = deleted.pdf_blob_ref.as_deref() {
            match storage.delete_blob(pdf_namespace, blob_id).await {
                Ok(()) => info!(document_id = %id, %blob_id, "deleted document pdf"),
                Err(err) => warn!(
                    document_id = %id,
                    %blob_id,
                    error = %err,
                    "failed to delete document pdf; blob left behind"
                ),
            }
        }

        Ok(deleted.summary())
    }

    /// Removes every document and every blob under the pdf namespace.
    /// Returns the number of documents removed.
    pub async fn delete_all(
        db: &SurrealDbClient,
        storage: &StorageManager,
        pdf_namespace: &str,
    ) -> Result<usize, AppError> {
        let deleted = db.drop_table::<Self>().await?;
        storage.delete_prefix(pdf_namespace).await?;
        info!(count = deleted.len(), "deleted all documents");
        Ok(deleted.len())
    }
}
