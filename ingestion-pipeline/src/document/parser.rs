use common::error::AppError;
use serde_json::Value;

use super::xml_tree::{parse_xml_tree, ATTRIBUTES_KEY, TEXT_KEY};

/// An element the XML tree reports either once or as a repetition.
#[derive(Debug, Clone, PartialEq)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl OneOrMany<Value> {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(values) => OneOrMany::Many(values),
            other => OneOrMany::One(other),
        }
    }
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }

    pub fn into_first(self) -> Option<T> {
        self.into_vec().into_iter().next()
    }
}

/// Fields read from the `ide` block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentHeader {
    pub number: Option<String>,
    pub issue_date: Option<String>,
}

/// The parts of an NF-e the rest of the pipeline reads. Repetitions are
/// already resolved: `items` is always a sequence and the other blocks are
/// always single values.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub identifier: Option<String>,
    pub header: DocumentHeader,
    pub sender: Option<Value>,
    pub recipient: Option<Value>,
    pub carrier: Option<Value>,
    pub items: Vec<Value>,
    pub grand_total: Option<String>,
}

/// Parses the raw XML of an NF-e, bare (`NFe`) or wrapped in `nfeProc`.
pub fn parse_document(xml: &str) -> Result<ParsedDocument, AppError> {
    let tree = parse_xml_tree(xml).map_err(|err| AppError::MalformedDocument(err.to_string()))?;

    let envelope = tree
        .get("nfeProc")
        .and_then(|proc| proc.get("NFe"))
        .or_else(|| tree.get("NFe"))
        .ok_or_else(|| AppError::MalformedDocument("missing NFe envelope".to_string()))?;
    if envelope.is_array() {
        return Err(AppError::MalformedDocument(
            "expected a single NFe envelope".to_string(),
        ));
    }

    let document = envelope
        .get("infNFe")
        .filter(|value| value.is_object())
        .ok_or_else(|| AppError::MalformedDocument("missing infNFe document".to_string()))?;

    let header = document
        .get("ide")
        .filter(|value| value.is_object())
        .ok_or_else(|| AppError::MalformedDocument("missing ide header".to_string()))?;

    let identifier = document
        .get(ATTRIBUTES_KEY)
        .and_then(|attributes| attributes.get("Id"))
        .and_then(text_of)
        .or_else(|| document.get("Id").and_then(text_of));

    let grand_total = document
        .get("total")
        .and_then(|total| total.get("ICMSTot"))
        .and_then(|icms| icms.get("vNF"))
        .and_then(text_of);

    Ok(ParsedDocument {
        identifier,
        header: DocumentHeader {
            number: header.get("nNF").and_then(text_of),
            issue_date: header
                .get("dhEmi")
                .or_else(|| header.get("dEmi"))
                .and_then(text_of),
        },
        sender: single(document.get("emit")),
        recipient: single(document.get("dest")),
        carrier: single(document.get("transp")),
        items: document
            .get("det")
            .cloned()
            .map(OneOrMany::from_value)
            .map(OneOrMany::into_vec)
            .unwrap_or_default(),
        grand_total,
    })
}

/// Text content of a leaf, whether it was reported as a plain string or as an
/// object carrying attributes. Repeated leaves yield the first occurrence.
pub fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Object(object) => object.get(TEXT_KEY).and_then(text_of),
        Value::Array(values) => values.first().and_then(text_of),
        _ => None,
    }
}

fn single(value: Option<&Value>) -> Option<Value> {
    value
        .cloned()
        .map(OneOrMany::from_value)
        .and_then(OneOrMany::into_first)
}
