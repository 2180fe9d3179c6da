//! Schemas declared as JSON documents.
//!
//! ```json
//! {
//!   "name": "ObservationSchema",
//!   "keywords": {
//!     "TELESCOP": {"mandatory": true, "value": {"type": "string"}},
//!     "NAXISn": {"indices": {"n": [1, 2]}, "value": [{"type": "integer"}, 512]}
//!   }
//! }
//! ```
//!
//! Documents only carry static rules: literals, type tags, conjunctions and
//! fixed index lists. Keywords are validated in name order.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::property::{IndexSource, IndexValue, KeywordProperties, ValueTest, ValueType};
use super::Schema;
use crate::error::SchemaError;
use crate::value::Value;

/// Top level of a schema document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDocument {
    pub name: String,
    #[serde(default)]
    pub keywords: BTreeMap<String, PropertyDocument>,
}

/// Properties of one keyword in a document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertyDocument {
    pub mandatory: Option<bool>,
    pub valid: Option<bool>,
    pub position: Option<i64>,
    pub value: Option<ValueDocument>,
    pub indices: Option<BTreeMap<String, Vec<IndexDocument>>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeTag {
    #[serde(rename = "type")]
    pub kind: ValueType,
}

/// A value test: `{"type": ...}`, an array of tests, or a literal.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ValueDocument {
    Type(TypeTag),
    All(Vec<ValueDocument>),
    Logical(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum IndexDocument {
    Int(i64),
    Str(String),
}

impl From<&ValueDocument> for ValueTest {
    fn from(doc: &ValueDocument) -> Self {
        match doc {
            ValueDocument::Type(tag) => ValueTest::Type(tag.kind),
            ValueDocument::All(tests) => ValueTest::All(tests.iter().map(ValueTest::from).collect()),
            ValueDocument::Logical(b) => ValueTest::Literal(Value::Logical(*b)),
            ValueDocument::Integer(n) => ValueTest::Literal(Value::Integer(*n)),
            ValueDocument::Float(f) => ValueTest::Literal(Value::Float(*f)),
            ValueDocument::String(s) => ValueTest::Literal(Value::String(s.clone())),
        }
    }
}

impl From<&IndexDocument> for IndexValue {
    fn from(doc: &IndexDocument) -> Self {
        match doc {
            IndexDocument::Int(n) => IndexValue::Int(*n),
            IndexDocument::Str(s) => IndexValue::Str(s.clone()),
        }
    }
}

impl PropertyDocument {
    pub fn to_properties(&self) -> KeywordProperties {
        let mut props = KeywordProperties::new();
        if let Some(m) = self.mandatory {
            props = props.mandatory(m);
        }
        if let Some(v) = self.valid {
            props = props.valid(v);
        }
        if let Some(p) = self.position {
            props = props.position(p);
        }
        if let Some(v) = &self.value {
            props = props.value(ValueTest::from(v));
        }
        if let Some(indices) = &self.indices {
            for (placeholder, values) in indices {
                let values = values.iter().map(IndexValue::from).collect();
                props = props.index(placeholder.as_str(), IndexSource::Values(values));
            }
        }
        props
    }
}

impl SchemaDocument {
    /// Parse a document. Malformed JSON, unknown property names and
    /// ill-typed properties are definition errors.
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(text)
            .map_err(|e| SchemaError::definition("schema document", e.to_string()))
    }

    /// Compose the document over `parents`, earliest parent first in
    /// precedence.
    pub fn build(&self, parents: &[&Schema]) -> Result<Schema, SchemaError> {
        let mut builder = Schema::builder(self.name.as_str());
        for parent in parents {
            builder = builder.extends(*parent);
        }
        for (keyword, doc) in &self.keywords {
            builder = builder.keyword(keyword.as_str(), doc.to_properties());
        }
        builder.build()
    }
}

impl Schema {
    /// Parse a JSON schema document and compose it over `parents`.
    pub fn from_json(text: &str, parents: &[&Schema]) -> Result<Schema, SchemaError> {
        SchemaDocument::from_json(text)?.build(parents)
    }
}
