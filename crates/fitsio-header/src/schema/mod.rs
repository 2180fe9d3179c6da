//! Header schemas: per-keyword validation rules with inheritance.
//!
//! A [`Schema`] is built once with a [`SchemaBuilder`] from a list of
//! parent schemas and its own keyword declarations, and is immutable
//! afterwards. Schemas are `Send + Sync`, so one schema can validate many
//! headers concurrently.
//!
//! Composition follows the usual method-resolution precedence: parents
//! listed earlier win over parents listed later, and the schema's own
//! declarations win over every parent. Merging is per property, so a
//! derived schema can tighten the `value` of a keyword while keeping the
//! `mandatory` flag it inherited.
//!
//! ```
//! use fitsio_header::{Header, KeywordProperties, Schema};
//!
//! let a = Schema::builder("A")
//!     .keyword("TEST1", KeywordProperties::new().mandatory(true))
//!     .build()
//!     .unwrap();
//! let b = Schema::builder("B")
//!     .extends(&a)
//!     .keyword("TEST1", KeywordProperties::new().value(1))
//!     .build()
//!     .unwrap();
//!
//! let mut header = Header::new();
//! header.set("TEST1", 1).unwrap();
//! assert!(b.validate(&header).is_ok());
//! ```

pub mod datetime;
pub mod document;
pub mod property;
pub mod standard;
mod validate;

use std::collections::BTreeSet;

use tracing::warn;

use crate::block::CARD_SIZE;
use crate::error::SchemaError;
pub use property::{
    IndexSource, IndexValue, KeywordContext, KeywordProperties, Position, PositionRule,
    Requirement, ValueTest, ValueType,
};
pub use validate::MAX_EXPANSION;

/// Longest keyword that composition upper-cases.
const MAX_NORMALIZED_LEN: usize = 8;

/// A keyword declaration that composition rewrote to upper case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizationWarning {
    pub schema: String,
    pub declared: String,
    pub normalized: String,
}

/// A composed, immutable set of keyword rules.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    name: String,
    keywords: Vec<(String, KeywordProperties)>,
    explicit: BTreeSet<String>,
    diagnostics: Vec<NormalizationWarning>,
}

impl Schema {
    pub fn builder<'a>(name: impl Into<String>) -> SchemaBuilder<'a> {
        SchemaBuilder {
            name: name.into(),
            parents: Vec::new(),
            declarations: Vec::new(),
        }
    }

    /// A schema without rules. Every header conforms to it.
    pub fn empty(name: impl Into<String>) -> Self {
        Schema {
            name: name.into(),
            keywords: Vec::new(),
            explicit: BTreeSet::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Composed properties of a keyword (or keyword template), looked up by
    /// its normalized name.
    pub fn keyword(&self, keyword: &str) -> Option<&KeywordProperties> {
        self.keywords
            .iter()
            .find(|(k, _)| k == keyword)
            .map(|(_, p)| p)
    }

    /// Every keyword with its composed properties, inherited ones included,
    /// in validation order.
    pub fn keywords(&self) -> impl Iterator<Item = (&str, &KeywordProperties)> {
        self.keywords.iter().map(|(k, p)| (k.as_str(), p))
    }

    /// Keywords declared by this schema itself rather than only inherited.
    pub fn explicit_keywords(&self) -> impl Iterator<Item = &str> {
        self.keywords
            .iter()
            .map(|(k, _)| k.as_str())
            .filter(|k| self.explicit.contains(*k))
    }

    pub fn is_explicit(&self, keyword: &str) -> bool {
        self.explicit.contains(keyword)
    }

    /// Returns `true` if the schema says anything about `keyword`, even
    /// trivially. The test is case-insensitive and looks at templates as
    /// written, not at their expansions.
    pub fn contains(&self, keyword: &str) -> bool {
        let keyword = keyword.trim();
        self.keywords
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case(keyword))
    }

    /// Keyword normalizations performed while this schema was composed.
    pub fn diagnostics(&self) -> &[NormalizationWarning] {
        &self.diagnostics
    }

    fn find_case_insensitive(&self, keyword: &str) -> Option<&KeywordProperties> {
        self.keyword(keyword).or_else(|| {
            self.keywords
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(keyword))
                .map(|(_, p)| p)
        })
    }
}

// ── Composition ──

/// Collects parents and declarations for a new [`Schema`].
#[derive(Debug)]
pub struct SchemaBuilder<'a> {
    name: String,
    parents: Vec<&'a Schema>,
    declarations: Vec<(String, KeywordProperties)>,
}

impl<'a> SchemaBuilder<'a> {
    /// Add a parent. Earlier parents take precedence over later ones.
    pub fn extends(mut self, parent: &'a Schema) -> Self {
        self.parents.push(parent);
        self
    }

    /// Declare properties for a keyword or keyword template.
    pub fn keyword(mut self, keyword: impl Into<String>, properties: KeywordProperties) -> Self {
        self.declarations.push((keyword.into(), properties));
        self
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        let mut schema = Schema::empty(self.name);

        // Parents fold in most-base first so earlier parents override later
        // ones. A parent contributes the keywords it declares itself; ones it
        // merely inherits only fill gaps.
        for parent in self.parents.iter().rev() {
            for (keyword, props) in &parent.keywords {
                let slot = schema.keywords.iter_mut().find(|(k, _)| k == keyword);
                match slot {
                    Some((_, existing)) if parent.is_explicit(keyword) => existing.merge(props),
                    Some(_) => {}
                    None => schema.keywords.push((keyword.clone(), props.clone())),
                }
            }
        }

        let mut own: Vec<(String, KeywordProperties)> = Vec::new();
        for (declared, props) in self.declarations {
            let mut props = props;
            let indices = match props.indices() {
                Some(indices) => Some(indices.to_vec()),
                None => schema
                    .find_case_insensitive(declared.trim())
                    .and_then(KeywordProperties::indices)
                    .map(<[_]>::to_vec),
            };
            let normalized = normalize_keyword(&schema.name, declared.trim(), indices.as_deref())?;
            if normalized != declared {
                warn!(
                    schema = %schema.name,
                    declared = %declared,
                    normalized = %normalized,
                    "schema keyword normalized"
                );
                schema.diagnostics.push(NormalizationWarning {
                    schema: schema.name.clone(),
                    declared,
                    normalized: normalized.clone(),
                });
            }
            if props.indices().is_none() && !schema.contains_exact(&normalized) {
                props.set_indices(indices);
            }
            check_properties(&schema.name, &normalized, &props)?;
            match own.iter_mut().find(|(k, _)| *k == normalized) {
                Some((_, existing)) => existing.merge(&props),
                None => own.push((normalized, props)),
            }
        }

        for (keyword, props) in own {
            schema.explicit.insert(keyword.clone());
            match schema.keywords.iter_mut().find(|(k, _)| *k == keyword) {
                Some((_, existing)) => existing.merge(&props),
                None => schema.keywords.push((keyword, props)),
            }
        }
        Ok(schema)
    }
}

impl Schema {
    fn contains_exact(&self, keyword: &str) -> bool {
        self.keywords.iter().any(|(k, _)| k == keyword)
    }
}

/// Upper-case the fixed segments of a keyword template, leaving index
/// placeholders alone. Keywords longer than the standard limit are kept as
/// written.
fn normalize_keyword(
    schema: &str,
    keyword: &str,
    indices: Option<&[(String, IndexSource)]>,
) -> Result<String, SchemaError> {
    let placeholders = placeholder_chars(schema, keyword, indices)?;
    if keyword.len() > MAX_NORMALIZED_LEN {
        return Ok(String::from(keyword));
    }
    Ok(keyword
        .chars()
        .map(|c| {
            if placeholders.contains(&c) {
                c
            } else {
                c.to_ascii_uppercase()
            }
        })
        .collect())
}

/// Validate the placeholders of a template and return them as characters.
pub(crate) fn placeholder_chars(
    schema: &str,
    keyword: &str,
    indices: Option<&[(String, IndexSource)]>,
) -> Result<Vec<char>, SchemaError> {
    let Some(indices) = indices else {
        return Ok(Vec::new());
    };
    if indices.is_empty() {
        return Err(SchemaError::definition(
            schema,
            format!("the 'indices' property of keyword '{keyword}' declares no placeholders"),
        ));
    }
    let mut chars = Vec::with_capacity(indices.len());
    for (placeholder, _) in indices {
        let mut it = placeholder.chars();
        let ch = match (it.next(), it.next()) {
            (Some(ch), None) => ch,
            _ => {
                return Err(SchemaError::definition(
                    schema,
                    format!(
                        "index placeholder '{placeholder}' of keyword '{keyword}' must be a single character"
                    ),
                ))
            }
        };
        let count = keyword.chars().filter(|c| *c == ch).count();
        if count != 1 {
            return Err(SchemaError::definition(
                schema,
                format!(
                    "index placeholder '{ch}' must appear exactly once in keyword '{keyword}'; found {count}"
                ),
            ));
        }
        if chars.contains(&ch) {
            return Err(SchemaError::definition(
                schema,
                format!("index placeholder '{ch}' of keyword '{keyword}' is declared twice"),
            ));
        }
        chars.push(ch);
    }
    Ok(chars)
}

/// Shape checks that the type system does not already guarantee.
fn check_properties(schema: &str, keyword: &str, props: &KeywordProperties) -> Result<(), SchemaError> {
    if keyword.is_empty() || keyword.len() > CARD_SIZE {
        return Err(SchemaError::definition(
            schema,
            format!("'{keyword}' is not a usable keyword name"),
        ));
    }
    if let Some(PositionRule::Fixed(n)) = props.position_rule() {
        if *n < 0 {
            return Err(SchemaError::definition(
                schema,
                format!("the 'position' property of keyword '{keyword}' must be non-negative; got {n}"),
            ));
        }
    }
    if let Some(test) = props.value_test() {
        check_value_test(schema, keyword, test)?;
    }
    Ok(())
}

fn check_value_test(schema: &str, keyword: &str, test: &ValueTest) -> Result<(), SchemaError> {
    match test {
        ValueTest::Literal(v) => {
            let nan = match v {
                crate::Value::Float(f) => f.is_nan(),
                crate::Value::ComplexFloat(re, im) => re.is_nan() || im.is_nan(),
                _ => false,
            };
            if nan {
                return Err(SchemaError::definition(
                    schema,
                    format!("the 'value' property of keyword '{keyword}' is NaN, which never compares equal"),
                ));
            }
            Ok(())
        }
        ValueTest::All(tests) => tests
            .iter()
            .try_for_each(|t| check_value_test(schema, keyword, t)),
        ValueTest::Type(_) | ValueTest::Predicate(_) => Ok(()),
    }
}
