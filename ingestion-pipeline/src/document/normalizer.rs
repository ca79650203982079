use common::{
    error::AppError,
    storage::types::fiscal_document::{Address, DocumentDraft, Party},
};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::{
    keys::DocumentKeys,
    parser::{text_of, ParsedDocument},
};

/// Which side of the document a party block describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartyRole {
    Sender,
    Recipient,
}

impl PartyRole {
    fn address_element(self) -> &'static str {
        match self {
            PartyRole::Sender => "enderEmit",
            PartyRole::Recipient => "enderDest",
        }
    }
}

/// Maps a parsed document onto the canonical record fields.
pub fn normalize(
    parsed: ParsedDocument,
    keys: DocumentKeys,
    raw_xml: &str,
) -> Result<DocumentDraft, AppError> {
    let total_value = parse_amount(parsed.grand_total.as_deref())?;

    let items = parsed
        .items
        .into_iter()
        .map(|item| item.get("prod").cloned().unwrap_or(Value::Null))
        .collect();

    Ok(DocumentDraft {
        number: keys.number,
        document_key: keys.document_key,
        issue_date: parsed.header.issue_date,
        sender: parsed
            .sender
            .as_ref()
            .and_then(|value| party(value, PartyRole::Sender)),
        recipient: parsed
            .recipient
            .as_ref()
            .and_then(|value| party(value, PartyRole::Recipient)),
        carrier: parsed.carrier,
        items,
        total_value,
        raw_xml: raw_xml.to_string(),
        xml_sha256: sha256_hex(raw_xml),
    })
}

/// Strict decimal parsing: `150.50` is accepted, `150,50` and `NaN` are not.
pub fn parse_amount(raw: Option<&str>) -> Result<f64, AppError> {
    let raw = raw
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| AppError::InvalidAmount("grand total is missing".to_string()))?;

    let is_decimal = raw
        .strip_prefix('-')
        .unwrap_or(raw)
        .split_once('.')
        .map_or_else(
            || all_digits(raw.strip_prefix('-').unwrap_or(raw)),
            |(whole, fraction)| all_digits(whole) && (fraction.is_empty() || all_digits(fraction)),
        );
    if !is_decimal {
        return Err(AppError::InvalidAmount(format!(
            "grand total {raw:?} is not a decimal number"
        )));
    }

    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| AppError::InvalidAmount(format!("grand total {raw:?} is out of range")))
}

fn all_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|byte| byte.is_ascii_digit())
}

pub fn sha256_hex(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

fn party(value: &Value, role: PartyRole) -> Option<Party> {
    if !value.is_object() {
        return None;
    }

    let field = |name: &str| value.get(name).and_then(text_of);

    let (tax_id, national_id) = match role {
        PartyRole::Sender => (field("CNPJ").or_else(|| field("CPF")), None),
        PartyRole::Recipient => (field("CNPJ"), field("CPF")),
    };

    Some(Party {
        name: field("xNome"),
        tax_id,
        national_id,
        address: value.get(role.address_element()).and_then(address),
    })
}

fn address(value: &Value) -> Option<Address> {
    if !value.is_object() {
        return None;
    }
    let field = |name: &str| value.get(name).and_then(text_of);

    Some(Address {
        street: field("xLgr"),
        number: field("nro"),
        district: field("xBairro"),
        city: field("xMun"),
        region: field("UF"),
        postal_code: field("CEP"),
    })
}
