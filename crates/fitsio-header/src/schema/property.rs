//! Keyword properties a schema can declare.
//!
//! Every property is a closed set of variants: a static form chosen when the
//! schema is written, or a predicate called during validation. Predicates
//! receive a [`KeywordContext`] describing the concrete keyword being checked.

use core::fmt;
use core::ops::RangeInclusive;
use std::sync::Arc;

use super::MAX_EXPANSION;
use crate::card::lookup_key;
use crate::header::Header;
use crate::value::Value;

// ── Index values ──

/// One substitution value for an index placeholder (`n` in `NAXISn`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexValue {
    Int(i64),
    Str(String),
}

impl IndexValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            IndexValue::Int(n) => Some(*n),
            IndexValue::Str(_) => None,
        }
    }
}

impl fmt::Display for IndexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexValue::Int(n) => write!(f, "{n}"),
            IndexValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for IndexValue {
    fn from(n: i64) -> Self {
        IndexValue::Int(n)
    }
}

impl From<i32> for IndexValue {
    fn from(n: i32) -> Self {
        IndexValue::Int(i64::from(n))
    }
}

impl From<&str> for IndexValue {
    fn from(s: &str) -> Self {
        IndexValue::Str(String::from(s))
    }
}

impl From<String> for IndexValue {
    fn from(s: String) -> Self {
        IndexValue::Str(s)
    }
}

/// The concrete keyword a rule is being applied to.
#[derive(Debug, Clone, Copy)]
pub struct KeywordContext<'a> {
    /// Concrete keyword, placeholders already substituted.
    pub keyword: &'a str,
    pub header: &'a Header,
    /// Placeholder assignment that produced `keyword`, empty for plain keywords.
    pub indices: &'a [(char, IndexValue)],
}

impl KeywordContext<'_> {
    pub fn index(&self, placeholder: char) -> Option<&IndexValue> {
        self.indices
            .iter()
            .find(|(ch, _)| *ch == placeholder)
            .map(|(_, v)| v)
    }

    pub fn index_int(&self, placeholder: char) -> Option<i64> {
        self.index(placeholder).and_then(IndexValue::as_i64)
    }
}

// ── Predicate signatures ──

pub type RequirementFn = dyn Fn(&KeywordContext<'_>) -> Result<bool, String> + Send + Sync;
pub type PositionFn = dyn Fn(&KeywordContext<'_>) -> Result<Position, String> + Send + Sync;
pub type ValueFn = dyn Fn(&Value, &KeywordContext<'_>) -> Result<bool, String> + Send + Sync;
pub type IndexFn = dyn Fn(&str, &Header) -> Result<Vec<IndexValue>, String> + Send + Sync;

// ── mandatory / valid ──

/// A yes/no rule, used for the `mandatory` and `valid` properties.
#[derive(Clone)]
pub enum Requirement {
    Static(bool),
    Predicate(Arc<RequirementFn>),
}

impl Requirement {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&KeywordContext<'_>) -> bool + Send + Sync + 'static,
    {
        Requirement::Predicate(Arc::new(move |ctx| Ok(f(ctx))))
    }

    /// A predicate that can fail. A failure is reported as a schema
    /// definition error.
    pub fn fallible<F>(f: F) -> Self
    where
        F: Fn(&KeywordContext<'_>) -> Result<bool, String> + Send + Sync + 'static,
    {
        Requirement::Predicate(Arc::new(f))
    }

    pub(crate) fn evaluate(&self, ctx: &KeywordContext<'_>) -> Result<bool, String> {
        match self {
            Requirement::Static(b) => Ok(*b),
            Requirement::Predicate(f) => f(ctx),
        }
    }
}

impl From<bool> for Requirement {
    fn from(b: bool) -> Self {
        Requirement::Static(b)
    }
}

impl fmt::Debug for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Static(b) => write!(f, "Static({b})"),
            Requirement::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl PartialEq for Requirement {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Requirement::Static(a), Requirement::Static(b)) => a == b,
            (Requirement::Predicate(a), Requirement::Predicate(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// ── position ──

/// Result of a position predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// The keyword must sit at this zero-based position. Negative positions
    /// are definition errors.
    At(i64),
    /// The keyword's position is acceptable (or not) without naming a
    /// required position.
    Valid(bool),
}

#[derive(Clone)]
pub enum PositionRule {
    Fixed(i64),
    Predicate(Arc<PositionFn>),
}

impl PositionRule {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&KeywordContext<'_>) -> Position + Send + Sync + 'static,
    {
        PositionRule::Predicate(Arc::new(move |ctx| Ok(f(ctx))))
    }

    pub fn fallible<F>(f: F) -> Self
    where
        F: Fn(&KeywordContext<'_>) -> Result<Position, String> + Send + Sync + 'static,
    {
        PositionRule::Predicate(Arc::new(f))
    }

    pub(crate) fn evaluate(&self, ctx: &KeywordContext<'_>) -> Result<Position, String> {
        match self {
            PositionRule::Fixed(n) => Ok(Position::At(*n)),
            PositionRule::Predicate(f) => f(ctx),
        }
    }
}

impl From<i64> for PositionRule {
    fn from(n: i64) -> Self {
        PositionRule::Fixed(n)
    }
}

impl From<i32> for PositionRule {
    fn from(n: i32) -> Self {
        PositionRule::Fixed(i64::from(n))
    }
}

impl fmt::Debug for PositionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionRule::Fixed(n) => write!(f, "Fixed({n})"),
            PositionRule::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl PartialEq for PositionRule {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PositionRule::Fixed(a), PositionRule::Fixed(b)) => a == b,
            (PositionRule::Predicate(a), PositionRule::Predicate(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// ── value ──

/// Type classes a value test can require.
///
/// Logical values belong only to [`ValueType::Logical`]. Integers also
/// satisfy `Float`, and every number satisfies `Complex`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Logical,
    Integer,
    Float,
    Complex,
    String,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Logical => "logical",
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::Complex => "complex",
            ValueType::String => "string",
        }
    }

    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ValueType::Logical => matches!(value, Value::Logical(_)),
            ValueType::Integer => matches!(value, Value::Integer(_)),
            ValueType::Float => matches!(value, Value::Integer(_) | Value::Float(_)),
            ValueType::Complex => matches!(
                value,
                Value::Integer(_) | Value::Float(_) | Value::ComplexInt(..) | Value::ComplexFloat(..)
            ),
            ValueType::String => matches!(value, Value::String(_)),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A test applied to a keyword's value.
#[derive(Clone)]
pub enum ValueTest {
    /// The value must equal this literal. Logical literals only match
    /// logical values, and logical values only match logical literals.
    Literal(Value),
    Type(ValueType),
    Predicate(Arc<ValueFn>),
    /// Every member must pass, checked in order.
    All(Vec<ValueTest>),
}

impl ValueTest {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Value, &KeywordContext<'_>) -> bool + Send + Sync + 'static,
    {
        ValueTest::Predicate(Arc::new(move |v, ctx| Ok(f(v, ctx))))
    }

    pub fn fallible<F>(f: F) -> Self
    where
        F: Fn(&Value, &KeywordContext<'_>) -> Result<bool, String> + Send + Sync + 'static,
    {
        ValueTest::Predicate(Arc::new(f))
    }

    pub fn all(tests: impl IntoIterator<Item = ValueTest>) -> Self {
        ValueTest::All(tests.into_iter().collect())
    }

    /// An integer within `range`.
    pub fn integer_in(range: RangeInclusive<i64>) -> Self {
        ValueTest::all([
            ValueTest::Type(ValueType::Integer),
            ValueTest::predicate(move |v, _| v.as_i64().is_some_and(|n| range.contains(&n))),
        ])
    }

    /// One of the listed integers.
    pub fn integer_of(allowed: &'static [i64]) -> Self {
        ValueTest::all([
            ValueTest::Type(ValueType::Integer),
            ValueTest::predicate(move |v, _| v.as_i64().is_some_and(|n| allowed.contains(&n))),
        ])
    }
}

impl From<Value> for ValueTest {
    fn from(v: Value) -> Self {
        ValueTest::Literal(v)
    }
}

impl From<bool> for ValueTest {
    fn from(b: bool) -> Self {
        ValueTest::Literal(Value::Logical(b))
    }
}

impl From<i64> for ValueTest {
    fn from(n: i64) -> Self {
        ValueTest::Literal(Value::Integer(n))
    }
}

impl From<i32> for ValueTest {
    fn from(n: i32) -> Self {
        ValueTest::Literal(Value::Integer(i64::from(n)))
    }
}

impl From<f64> for ValueTest {
    fn from(f: f64) -> Self {
        ValueTest::Literal(Value::Float(f))
    }
}

impl From<&str> for ValueTest {
    fn from(s: &str) -> Self {
        ValueTest::Literal(Value::String(String::from(s)))
    }
}

impl From<String> for ValueTest {
    fn from(s: String) -> Self {
        ValueTest::Literal(Value::String(s))
    }
}

impl From<ValueType> for ValueTest {
    fn from(t: ValueType) -> Self {
        ValueTest::Type(t)
    }
}

impl From<Vec<ValueTest>> for ValueTest {
    fn from(tests: Vec<ValueTest>) -> Self {
        ValueTest::All(tests)
    }
}

impl fmt::Debug for ValueTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueTest::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            ValueTest::Type(t) => f.debug_tuple("Type").field(t).finish(),
            ValueTest::Predicate(_) => f.write_str("Predicate(..)"),
            ValueTest::All(tests) => f.debug_tuple("All").field(tests).finish(),
        }
    }
}

impl PartialEq for ValueTest {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ValueTest::Literal(a), ValueTest::Literal(b)) => a == b,
            (ValueTest::Type(a), ValueTest::Type(b)) => a == b,
            (ValueTest::Predicate(a), ValueTest::Predicate(b)) => Arc::ptr_eq(a, b),
            (ValueTest::All(a), ValueTest::All(b)) => a == b,
            _ => false,
        }
    }
}

// ── indices ──

/// Where the substitution values for one placeholder come from.
#[derive(Clone)]
pub enum IndexSource {
    Values(Vec<IndexValue>),
    /// Called with the keyword template and the header being validated.
    Predicate(Arc<IndexFn>),
}

impl IndexSource {
    pub fn values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<IndexValue>,
    {
        IndexSource::Values(values.into_iter().map(Into::into).collect())
    }

    pub fn range(range: RangeInclusive<i64>) -> Self {
        IndexSource::Values(range.map(IndexValue::Int).collect())
    }

    pub fn from_header<F>(f: F) -> Self
    where
        F: Fn(&str, &Header) -> Result<Vec<IndexValue>, String> + Send + Sync + 'static,
    {
        IndexSource::Predicate(Arc::new(f))
    }

    /// `1..=N` where `N` is the integer value of `keyword` in the header.
    /// Yields nothing when the keyword is absent or not a positive integer,
    /// and fails when `N` exceeds [`MAX_EXPANSION`].
    pub fn counted_by(keyword: &str) -> Self {
        let keyword = String::from(keyword);
        IndexSource::from_header(move |_, header| {
            let count = header.get(&keyword).and_then(Value::as_i64).unwrap_or(0);
            if count > 0 && count as u64 > MAX_EXPANSION as u64 {
                return Err(format!(
                    "{keyword} = {count} exceeds the limit of {MAX_EXPANSION} indices"
                ));
            }
            Ok((1..=count).map(IndexValue::Int).collect())
        })
    }

    /// The non-empty remainders of every header keyword starting with
    /// `prefix` (`-OBS` for `DATE-OBS` under prefix `DATE`).
    pub fn suffixes(prefix: &str) -> Self {
        let prefix = lookup_key(prefix);
        IndexSource::from_header(move |_, header| {
            let mut found: Vec<IndexValue> = Vec::new();
            for keyword in header.keywords() {
                let key = lookup_key(keyword);
                if let Some(rest) = key.strip_prefix(prefix.as_str()) {
                    let value = IndexValue::Str(String::from(rest));
                    if !rest.is_empty() && !found.contains(&value) {
                        found.push(value);
                    }
                }
            }
            Ok(found)
        })
    }

    pub(crate) fn resolve(&self, template: &str, header: &Header) -> Result<Vec<IndexValue>, String> {
        match self {
            IndexSource::Values(values) => Ok(values.clone()),
            IndexSource::Predicate(f) => f(template, header),
        }
    }
}

impl fmt::Debug for IndexSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexSource::Values(values) => f.debug_tuple("Values").field(values).finish(),
            IndexSource::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl PartialEq for IndexSource {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (IndexSource::Values(a), IndexSource::Values(b)) => a == b,
            (IndexSource::Predicate(a), IndexSource::Predicate(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// ── Property set ──

/// The properties declared for one keyword (or keyword template).
///
/// Unset properties place no requirement on the keyword. Merging one set
/// over another replaces each property the newer set declares and keeps
/// the rest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordProperties {
    mandatory: Option<Requirement>,
    valid: Option<Requirement>,
    position: Option<PositionRule>,
    value: Option<ValueTest>,
    indices: Option<Vec<(String, IndexSource)>>,
}

impl KeywordProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mandatory(mut self, rule: impl Into<Requirement>) -> Self {
        self.mandatory = Some(rule.into());
        self
    }

    pub fn valid(mut self, rule: impl Into<Requirement>) -> Self {
        self.valid = Some(rule.into());
        self
    }

    pub fn position(mut self, rule: impl Into<PositionRule>) -> Self {
        self.position = Some(rule.into());
        self
    }

    pub fn value(mut self, test: impl Into<ValueTest>) -> Self {
        self.value = Some(test.into());
        self
    }

    /// Declare an index placeholder. Placeholders are single characters
    /// that appear exactly once in the keyword template.
    pub fn index(mut self, placeholder: impl Into<String>, source: IndexSource) -> Self {
        let placeholder = placeholder.into();
        let indices = self.indices.get_or_insert_with(Vec::new);
        match indices.iter_mut().find(|(p, _)| *p == placeholder) {
            Some(slot) => slot.1 = source,
            None => indices.push((placeholder, source)),
        }
        self
    }

    pub fn mandatory_rule(&self) -> Option<&Requirement> {
        self.mandatory.as_ref()
    }

    pub fn valid_rule(&self) -> Option<&Requirement> {
        self.valid.as_ref()
    }

    pub fn position_rule(&self) -> Option<&PositionRule> {
        self.position.as_ref()
    }

    pub fn value_test(&self) -> Option<&ValueTest> {
        self.value.as_ref()
    }

    pub fn indices(&self) -> Option<&[(String, IndexSource)]> {
        self.indices.as_deref()
    }

    pub(crate) fn set_indices(&mut self, indices: Option<Vec<(String, IndexSource)>>) {
        self.indices = indices;
    }

    /// Returns `true` if no property is declared.
    pub fn is_empty(&self) -> bool {
        self.mandatory.is_none()
            && self.valid.is_none()
            && self.position.is_none()
            && self.value.is_none()
            && self.indices.is_none()
    }

    /// Overwrite every property `newer` declares.
    pub fn merge(&mut self, newer: &KeywordProperties) {
        if let Some(m) = &newer.mandatory {
            self.mandatory = Some(m.clone());
        }
        if let Some(v) = &newer.valid {
            self.valid = Some(v.clone());
        }
        if let Some(p) = &newer.position {
            self.position = Some(p.clone());
        }
        if let Some(v) = &newer.value {
            self.value = Some(v.clone());
        }
        if let Some(i) = &newer.indices {
            self.indices = Some(i.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overwrites_declared_properties_only() {
        let mut base = KeywordProperties::new().mandatory(true).value(1);
        base.merge(&KeywordProperties::new().value(2));
        assert_eq!(base, KeywordProperties::new().mandatory(true).value(2));
    }

    #[test]
    fn empty_properties() {
        assert!(KeywordProperties::new().is_empty());
        assert!(!KeywordProperties::new().valid(false).is_empty());
    }

    #[test]
    fn index_redeclaration_replaces_source() {
        let props = KeywordProperties::new()
            .index("n", IndexSource::range(1..=2))
            .index("n", IndexSource::range(1..=3));
        let indices = props.indices().unwrap();
        assert_eq!(indices.len(), 1);
        assert_eq!(indices[0].1, IndexSource::range(1..=3));
    }

    #[test]
    fn predicates_compare_by_identity() {
        let a = ValueTest::predicate(|_, _| true);
        let b = ValueTest::predicate(|_, _| true);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn type_classes() {
        assert!(ValueType::Float.accepts(&Value::Integer(1)));
        assert!(ValueType::Complex.accepts(&Value::Float(1.5)));
        assert!(!ValueType::Integer.accepts(&Value::Logical(true)));
        assert!(!ValueType::Complex.accepts(&Value::Logical(false)));
        assert!(!ValueType::Integer.accepts(&Value::Float(1.0)));
        assert!(ValueType::Logical.accepts(&Value::Logical(false)));
    }

    #[test]
    fn counted_by_reads_header() {
        let mut header = Header::new();
        header.set("NAXIS", 3).unwrap();
        let values = IndexSource::counted_by("NAXIS").resolve("NAXISn", &header).unwrap();
        assert_eq!(values, vec![IndexValue::Int(1), IndexValue::Int(2), IndexValue::Int(3)]);

        let empty = IndexSource::counted_by("TFIELDS").resolve("TFORMn", &header).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn counted_by_rejects_counts_past_the_limit() {
        let mut header = Header::new();
        header.set("TFIELDS", MAX_EXPANSION as i64).unwrap();
        let values = IndexSource::counted_by("TFIELDS").resolve("TFORMn", &header).unwrap();
        assert_eq!(values.len(), MAX_EXPANSION);

        header.set("TFIELDS", i64::MAX).unwrap();
        let err = IndexSource::counted_by("TFIELDS").resolve("TFORMn", &header).unwrap_err();
        assert!(err.contains("TFIELDS"));

        header.set("TFIELDS", -5).unwrap();
        assert!(IndexSource::counted_by("TFIELDS").resolve("TFORMn", &header).unwrap().is_empty());
    }

    #[test]
    fn suffixes_skip_bare_prefix() {
        let mut header = Header::new();
        header.set("DATE", "2000-01-01").unwrap();
        header.set("DATE-OBS", "2000-01-01").unwrap();
        header.set("DATE-END", "2000-01-02").unwrap();
        let values = IndexSource::suffixes("DATE").resolve("DATEx", &header).unwrap();
        assert_eq!(values, vec![IndexValue::from("-OBS"), IndexValue::from("-END")]);
    }

    #[test]
    fn context_index_lookup() {
        let header = Header::new();
        let indices = [('n', IndexValue::Int(2))];
        let ctx = KeywordContext {
            keyword: "NAXIS2",
            header: &header,
            indices: &indices,
        };
        assert_eq!(ctx.index_int('n'), Some(2));
        assert!(ctx.index('m').is_none());
    }

    #[test]
    fn integer_range_test_rejects_logical() {
        let header = Header::new();
        let ctx = KeywordContext {
            keyword: "NAXIS",
            header: &header,
            indices: &[],
        };
        let ValueTest::All(tests) = ValueTest::integer_in(0..=999) else {
            panic!("expected conjunction");
        };
        assert_eq!(tests[0], ValueTest::Type(ValueType::Integer));
        let ValueTest::Predicate(f) = &tests[1] else {
            panic!("expected predicate");
        };
        assert_eq!(f(&Value::Integer(5), &ctx), Ok(true));
        assert_eq!(f(&Value::Integer(1000), &ctx), Ok(false));
    }
}
