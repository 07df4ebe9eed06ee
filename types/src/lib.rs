//! Shared document and query types
//!
//! Documents are JSON objects; selectors are documents matched field by field.
//! These types describe what callers hand to a collection, they carry no
//! routing knowledge.

use serde::{Deserialize, Serialize};

pub use serde_json::Value;

/// A single stored document
pub type Document = serde_json::Map<String, Value>;

/// Query selector (an empty selector matches every document)
pub type Selector = Document;

/// Field holding a document's identifier
pub const ID_FIELD: &str = "_id";

/// Sort direction for a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Options accepted by `find` and `find_one`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FindOptions {
    /// Number of matching documents to skip
    pub skip: Option<usize>,

    /// Maximum number of documents to return
    pub limit: Option<usize>,

    /// Fields to return (empty = all fields)
    pub fields: Vec<String>,

    /// Sort keys, applied in order
    pub sort: Vec<(String, SortOrder)>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push((field.into(), order));
        self
    }
}

/// Options accepted by `update`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateOptions {
    /// Insert the update document when nothing matches
    pub upsert: bool,

    /// Update every match instead of the first one
    pub multi: bool,
}

impl UpdateOptions {
    pub fn upsert() -> Self {
        Self { upsert: true, multi: false }
    }

    pub fn multi() -> Self {
        Self { upsert: false, multi: true }
    }
}

/// Index definition used by `create_index`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name
    pub name: String,

    /// Indexed fields with their order
    pub keys: Vec<(String, SortOrder)>,

    /// Reject duplicate keys
    pub unique: bool,
}

impl IndexSpec {
    /// Single-field ascending index named `<field>_1`
    pub fn ascending(field: &str) -> Self {
        Self {
            name: format!("{}_1", field),
            keys: vec![(field.to_string(), SortOrder::Ascending)],
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Build a document from key/value pairs
///
/// Non-object JSON is discarded; this is meant for literals in callers and tests.
pub fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

/// Check whether `document` matches every field of `selector` by equality
pub fn matches(document: &Document, selector: &Selector) -> bool {
    selector
        .iter()
        .all(|(key, expected)| document.get(key) == Some(expected))
}
