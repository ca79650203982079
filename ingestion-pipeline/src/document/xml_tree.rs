//! Generic XML to JSON tree conversion.
//!
//! The resulting shape mirrors what loosely typed XML parsers produce:
//! - an element without attributes or children becomes a string of its text;
//! - any other element becomes an object keyed by child element name, with
//!   attributes under `"$"` and text content under `"_"`;
//! - a child element that repeats becomes an array, while a child that occurs
//!   once stays a single value.
//!
//! The single-vs-many ambiguity is intentional and is resolved by the parser
//! adapter, not here.

use quick_xml::{events::Event, Reader};
use serde_json::{Map, Value};
use thiserror::Error;

pub const ATTRIBUTES_KEY: &str = "$";
pub const TEXT_KEY: &str = "_";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum XmlTreeError {
    #[error("invalid xml at position {position}: {message}")]
    Syntax { position: usize, message: String },
    #[error("{0}")]
    Structure(String),
}

#[derive(Default)]
struct Frame {
    name: String,
    attributes: Map<String, Value>,
    children: Map<String, Value>,
    text: String,
}

impl Frame {
    fn into_value(self) -> Value {
        if self.attributes.is_empty() && self.children.is_empty() {
            return Value::String(self.text);
        }

        let mut object = self.children;
        if !self.attributes.is_empty() {
            object.insert(ATTRIBUTES_KEY.to_string(), Value::Object(self.attributes));
        }
        if !self.text.is_empty() {
            object.insert(TEXT_KEY.to_string(), Value::String(self.text));
        }
        Value::Object(object)
    }

    fn push_child(&mut self, name: String, value: Value) {
        match self.children.get_mut(&name) {
            Some(Value::Array(existing)) => existing.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                self.children.insert(name, value);
            }
        }
    }
}

/// Parses `text` into `{ "<root>": <root value> }`.
pub fn parse_xml_tree(text: &str) -> Result<Value, XmlTreeError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        let position = reader.buffer_position();
        let event = reader.read_event().map_err(|err| XmlTreeError::Syntax {
            position,
            message: err.to_string(),
        })?;

        match event {
            Event::Start(start) => {
                let frame = open_frame(&start, position)?;
                stack.push(frame);
            }
            Event::Empty(start) => {
                let frame = open_frame(&start, position)?;
                close_frame(frame, &mut stack, &mut root)?;
            }
            Event::End(_) => {
                let frame = stack.pop().ok_or_else(|| XmlTreeError::Syntax {
                    position,
                    message: "closing tag without matching opening tag".to_string(),
                })?;
                close_frame(frame, &mut stack, &mut root)?;
            }
            Event::Text(content) => {
                let value = content.unescape().map_err(|err| XmlTreeError::Syntax {
                    position,
                    message: err.to_string(),
                })?;
                append_text(&mut stack, &value)?;
            }
            Event::CData(content) => {
                let value = String::from_utf8_lossy(&content).into_owned();
                append_text(&mut stack, &value)?;
            }
            Event::Eof => break,
            Event::Decl(_) | Event::PI(_) | Event::Comment(_) | Event::DocType(_) => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlTreeError::Structure(format!(
            "element <{}> is never closed",
            open.name
        )));
    }

    let (name, value) =
        root.ok_or_else(|| XmlTreeError::Structure("document has no root element".to_string()))?;

    let mut tree = Map::new();
    tree.insert(name, value);
    Ok(Value::Object(tree))
}

fn open_frame(
    start: &quick_xml::events::BytesStart<'_>,
    position: usize,
) -> Result<Frame, XmlTreeError> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attributes = Map::new();

    for attribute in start.attributes() {
        let attribute = attribute.map_err(|err| XmlTreeError::Syntax {
            position,
            message: err.to_string(),
        })?;
        let raw_key = attribute.key.as_ref();
        if raw_key == b"xmlns" || raw_key.starts_with(b"xmlns:") {
            continue;
        }
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|err| XmlTreeError::Syntax {
                position,
                message: err.to_string(),
            })?
            .into_owned();
        attributes.insert(key, Value::String(value));
    }

    Ok(Frame {
        name,
        attributes,
        ..Frame::default()
    })
}

fn close_frame(
    frame: Frame,
    stack: &mut [Frame],
    root: &mut Option<(String, Value)>,
) -> Result<(), XmlTreeError> {
    let name = frame.name.clone();
    let value = frame.into_value();

    match stack.last_mut() {
        Some(parent) => {
            parent.push_child(name, value);
            Ok(())
        }
        None if root.is_some() => Err(XmlTreeError::Structure(format!(
            "unexpected second root element <{name}>"
        ))),
        None => {
            *root = Some((name, value));
            Ok(())
        }
    }
}

fn append_text(stack: &mut [Frame], text: &str) -> Result<(), XmlTreeError> {
    if text.trim().is_empty() {
        return Ok(());
    }
    match stack.last_mut() {
        Some(frame) => {
            frame.text.push_str(text);
            Ok(())
        }
        None => Err(XmlTreeError::Structure(
            "text content outside of the root element".to_string(),
        )),
    }
}
