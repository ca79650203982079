use common::{
    error::{AppError, DuplicateKey},
    storage::{db::SurrealDbClient, types::fiscal_document::FiscalDocument},
};
use tracing::debug;

use crate::document::DocumentKeys;

/// Rejects keys that already belong to a stored document.
///
/// The number is checked before the document key, so a document colliding on
/// both reports the number. This is a pre-check only; the unique indexes on
/// the table have the final word.
pub async fn check_duplicates(keys: &DocumentKeys, db: &SurrealDbClient) -> Result<(), AppError> {
    if let Some(existing) = FiscalDocument::find_by_number(&keys.number, db).await? {
        debug!(number = %keys.number, existing_id = %existing.id, "number already registered");
        return Err(AppError::DuplicateDocument {
            key: DuplicateKey::Number,
            conflict: Some(Box::new(existing.summary())),
        });
    }

    if let Some(existing) = FiscalDocument::find_by_document_key(&keys.document_key, db).await? {
        debug!(
            document_key = %keys.document_key,
            existing_id = %existing.id,
            "document key already registered"
        );
        return Err(AppError::DuplicateDocument {
            key: DuplicateKey::DocumentKey,
            conflict: Some(Box::new(existing.summary())),
        });
    }

    Ok(())
}

/// Builds the duplicate error for an insert the store rejected on a unique
/// index, re-reading the conflicting document when it is visible.
pub async fn duplicate_from_violation(
    keys: &DocumentKeys,
    violation: &str,
    db: &SurrealDbClient,
) -> AppError {
    match check_duplicates(keys, db).await {
        Err(err @ AppError::DuplicateDocument { .. }) => err,
        _ => {
            let key = if violation.contains("document_key") {
                DuplicateKey::DocumentKey
            } else {
                DuplicateKey::Number
            };
            AppError::DuplicateDocument {
                key,
                conflict: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::fiscal_document::{DocumentDraft, FiscalDocument};
    use uuid::Uuid;

    async fn db_with(documents: &[(&str, &str)]) -> SurrealDbClient {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");
        db.ensure_initialized().await.expect("init");
        for (number, key) in documents {
            let document = FiscalDocument::new(DocumentDraft {
                number: (*number).to_string(),
                document_key: (*key).to_string(),
                issue_date: None,
                sender: None,
                recipient: None,
                carrier: None,
                items: Vec::new(),
                total_value: 1.0,
                raw_xml: String::new(),
                xml_sha256: String::new(),
            });
            db.store_item(document).await.expect("store");
        }
        db
    }

    fn keys(number: &str, document_key: &str) -> DocumentKeys {
        DocumentKeys {
            number: number.to_string(),
            document_key: document_key.to_string(),
        }
    }

    #[tokio::test]
    async fn passes_when_both_keys_are_new() {
        let db = db_with(&[("1", "a")]).await;
        check_duplicates(&keys("2", "b"), &db).await.expect("no conflict");
    }

    #[tokio::test]
    async fn reports_key_collision_with_summary() {
        let db = db_with(&[("1", "a")]).await;
        let err = check_duplicates(&keys("2", "a"), &db)
            .await
            .expect_err("key conflict");
        match err {
            AppError::DuplicateDocument {
                key: DuplicateKey::DocumentKey,
                conflict: Some(summary),
            } => {
                assert_eq!(summary.number, "1");
                assert_eq!(summary.document_key, "a");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn number_collision_is_reported_first() {
        let db = db_with(&[("1", "a"), ("2", "b")]).await;
        let err = check_duplicates(&keys("1", "b"), &db)
            .await
            .expect_err("conflict");
        assert!(matches!(
            err,
            AppError::DuplicateDocument {
                key: DuplicateKey::Number,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn violation_without_visible_conflict_uses_index_name() {
        let db = db_with(&[]).await;
        let err = duplicate_from_violation(
            &keys("1", "a"),
            "Database index `idx_fiscal_document_document_key` already contains 'a'",
            &db,
        )
        .await;
        assert!(matches!(
            err,
            AppError::DuplicateDocument {
                key: DuplicateKey::DocumentKey,
                conflict: None
            }
        ));
    }
}
