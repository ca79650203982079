use common::error::AppError;

use super::parser::ParsedDocument;

/// Literal prefix carried by the `infNFe` identifier.
pub const KEY_PREFIX: &str = "NFe";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentKeys {
    pub number: String,
    pub document_key: String,
}

/// Removes a single leading [`KEY_PREFIX`]; values without it pass through.
pub fn strip_key_prefix(identifier: &str) -> &str {
    identifier.strip_prefix(KEY_PREFIX).unwrap_or(identifier)
}

pub fn extract_keys(parsed: &ParsedDocument) -> Result<DocumentKeys, AppError> {
    let number = parsed
        .header
        .number
        .as_deref()
        .map(str::trim)
        .filter(|number| !number.is_empty())
        .ok_or_else(|| AppError::MissingIdentity("document number is missing".to_string()))?;

    let document_key = parsed
        .identifier
        .as_deref()
        .map(str::trim)
        .map(strip_key_prefix)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| AppError::MissingIdentity("document key is missing".to_string()))?;

    Ok(DocumentKeys {
        number: number.to_string(),
        document_key: document_key.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parser::DocumentHeader;

    fn parsed(number: Option<&str>, identifier: Option<&str>) -> ParsedDocument {
        ParsedDocument {
            identifier: identifier.map(str::to_string),
            header: DocumentHeader {
                number: number.map(str::to_string),
                issue_date: None,
            },
            sender: None,
            recipient: None,
            carrier: None,
            items: Vec::new(),
            grand_total: None,
        }
    }

    #[test]
    fn strips_prefix_exactly_once() {
        assert_eq!(strip_key_prefix("NFe3520"), "3520");
        assert_eq!(strip_key_prefix("3520"), "3520");
        assert_eq!(strip_key_prefix("NFeNFe1"), "NFe1");
        assert_eq!(strip_key_prefix(strip_key_prefix("NFe3520")), "3520");
    }

    #[test]
    fn extracts_both_keys() {
        let keys = extract_keys(&parsed(
            Some("123"),
            Some("NFe35200114200166000187550010000000046550010463"),
        ))
        .expect("keys");
        assert_eq!(keys.number, "123");
        assert_eq!(
            keys.document_key,
            "35200114200166000187550010000000046550010463"
        );
    }

    #[test]
    fn missing_or_empty_values_fail() {
        for (number, identifier) in [
            (None, Some("NFe1")),
            (Some("  "), Some("NFe1")),
            (Some("1"), None),
            (Some("1"), Some("NFe")),
            (Some("1"), Some("")),
        ] {
            let err = extract_keys(&parsed(number, identifier)).expect_err("missing identity");
            assert!(matches!(err, AppError::MissingIdentity(_)));
        }
    }
}
