//! Turning NF-e XML into a record draft: tree building, envelope parsing,
//! identity extraction and normalization.

pub mod keys;
pub mod normalizer;
pub mod parser;
pub mod xml_tree;

pub use keys::{extract_keys, strip_key_prefix, DocumentKeys};
pub use normalizer::normalize;
pub use parser::{parse_document, OneOrMany, ParsedDocument};
