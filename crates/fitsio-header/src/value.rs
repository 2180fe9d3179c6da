use core::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::card::NonStandard;

/// A parsed FITS header value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// FITS logical value (`T` or `F`).
    Logical(bool),
    /// FITS integer value.
    Integer(i64),
    /// FITS floating-point value.
    Float(f64),
    /// FITS character string (content between single quotes), or the free
    /// text of a commentary card.
    String(String),
    /// FITS complex integer `(real, imaginary)`.
    ComplexInt(i64, i64),
    /// FITS complex float `(real, imaginary)`.
    ComplexFloat(f64, f64),
    /// Keyword present with an empty value field.
    Undefined,
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Logical(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Integer and float values as `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Any numeric value as a `(real, imaginary)` pair. Logicals are not numbers.
    pub fn as_complex(&self) -> Option<(f64, f64)> {
        match self {
            Value::Integer(n) => Some((*n as f64, 0.0)),
            Value::Float(f) => Some((*f, 0.0)),
            Value::ComplexInt(re, im) => Some((*re as f64, *im as f64)),
            Value::ComplexFloat(re, im) => Some((*re, *im)),
            _ => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Short name of the value kind, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Logical(_) => "logical",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::ComplexInt(..) | Value::ComplexFloat(..) => "complex",
            Value::Undefined => "undefined",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "'{}'", escape_quotes(s)),
            Value::Undefined => f.write_str("undefined"),
            other => f.write_str(&value_text(other)),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Logical(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(String::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

const FSC_NUMBER: &str = r"[+-]?(?:\.[0-9]+|[0-9]+(?:\.[0-9]*)?)(?:[DE][+-]?[0-9]+)?";
const NFSC_NUMBER: &str = r"[+-]? *(?:\.[0-9]+|[0-9]+(?:\.[0-9]*)?) *(?:[deDE] *[+-]? *[0-9]+)?";

static FSC_REAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{FSC_NUMBER}$")).expect("valid number pattern"));

static NFSC_REAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{NFSC_NUMBER}$")).expect("valid number pattern"));

static FSC_COMPLEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^\( *(?P<re>{FSC_NUMBER}) *, *(?P<im>{FSC_NUMBER}) *\)$"
    ))
    .expect("valid complex pattern")
});

static NFSC_COMPLEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^\( *(?P<re>{NFSC_NUMBER}) *, *(?P<im>{NFSC_NUMBER}) *\)$"
    ))
    .expect("valid complex pattern")
});

enum Number {
    Int(i64),
    Real(f64),
}

/// Convert text already matched by one of the number patterns.
fn convert_number(text: &str) -> Option<Number> {
    let compact: String = text
        .chars()
        .filter(|c| *c != ' ')
        .map(|c| match c {
            'D' | 'd' | 'e' => 'E',
            other => other,
        })
        .collect();
    if compact.contains('.') || compact.contains('E') {
        return compact.parse::<f64>().ok().map(Number::Real);
    }
    match compact.parse::<i64>() {
        Ok(n) => Some(Number::Int(n)),
        // Too wide for i64; keep the magnitude as a float.
        Err(_) => compact.parse::<f64>().ok().map(Number::Real),
    }
}

fn number_value(text: &str) -> Option<Value> {
    match convert_number(text)? {
        Number::Int(n) => Some(Value::Integer(n)),
        Number::Real(f) => Some(Value::Float(f)),
    }
}

fn complex_value(re: &str, im: &str) -> Option<Value> {
    match (convert_number(re)?, convert_number(im)?) {
        (Number::Int(a), Number::Int(b)) => Some(Value::ComplexInt(a, b)),
        (a, b) => {
            let as_f = |n: Number| match n {
                Number::Int(i) => i as f64,
                Number::Real(f) => f,
            };
            Some(Value::ComplexFloat(as_f(a), as_f(b)))
        }
    }
}

/// Parse an unquoted value under the fixed-format FITS grammar.
fn parse_fixed(text: &str) -> Option<Value> {
    match text {
        "T" => return Some(Value::Logical(true)),
        "F" => return Some(Value::Logical(false)),
        _ => {}
    }
    if FSC_REAL.is_match(text) {
        return number_value(text);
    }
    let caps = FSC_COMPLEX.captures(text)?;
    complex_value(&caps["re"], &caps["im"])
}

/// Parse an unquoted value under the looser free-format rules: blanks
/// inside numbers and lower-case exponent markers.
fn parse_free(text: &str) -> Option<Value> {
    if NFSC_REAL.is_match(text) {
        return number_value(text);
    }
    let caps = NFSC_COMPLEX.captures(text)?;
    complex_value(&caps["re"], &caps["im"])
}

/// Canonical spelling of a free-format real number: blanks removed and the
/// exponent marker upper-cased.
fn repaired_number_text(text: &str) -> String {
    text.chars()
        .filter(|c| *c != ' ')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// The decoded value field of one record.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedField {
    pub value: Value,
    pub comment: Option<String>,
    pub status: Option<NonStandard>,
    /// Canonical text for a free-format number, kept so a repaired card can
    /// preserve the number as written.
    pub repaired: Option<String>,
}

impl ParsedField {
    fn new(value: Value, comment: Option<String>) -> Self {
        ParsedField {
            value,
            comment,
            status: None,
            repaired: None,
        }
    }
}

fn clean_comment(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(String::from(text))
    }
}

/// Scan a quoted string starting at the opening quote. Returns the decoded
/// content and the byte offset just past the closing quote, or `None` for
/// the offset if the string is never closed.
pub(crate) fn scan_string(field: &str) -> (String, Option<usize>) {
    let bytes = field.as_bytes();
    let mut content = String::new();
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            if i + 1 < bytes.len() && bytes[i + 1] == b'\'' {
                content.push('\'');
                i += 2;
            } else {
                return (content, Some(i + 1));
            }
        } else {
            content.push(bytes[i] as char);
            i += 1;
        }
    }
    (content, None)
}

/// Parse the value field of a keyed record (everything after the `=`).
pub(crate) fn parse_field(field: &str) -> ParsedField {
    let field = field.trim_start();

    if field.starts_with('\'') {
        let (content, end) = scan_string(field);
        let Some(end) = end else {
            let mut parsed = ParsedField::new(Value::String(String::from(content.trim_end())), None);
            parsed.status = Some(NonStandard::UnterminatedString);
            return parsed;
        };
        let rest = &field[end..];
        let (junk, comment) = match rest.find('/') {
            Some(pos) => (&rest[..pos], clean_comment(&rest[pos + 1..])),
            None => (rest, None),
        };
        let mut parsed =
            ParsedField::new(Value::String(String::from(content.trim_end())), comment);
        if !junk.trim().is_empty() {
            parsed.status = Some(NonStandard::UnparsableValue);
        }
        return parsed;
    }

    let (text, comment) = match field.find('/') {
        Some(pos) => (field[..pos].trim(), clean_comment(&field[pos + 1..])),
        None => (field.trim(), None),
    };

    if text.is_empty() {
        return ParsedField::new(Value::Undefined, comment);
    }
    if let Some(value) = parse_fixed(text) {
        return ParsedField::new(value, comment);
    }
    if let Some(value) = parse_free(text) {
        let repaired = match value {
            Value::Integer(_) | Value::Float(_) => Some(repaired_number_text(text)),
            _ => None,
        };
        let mut parsed = ParsedField::new(value, comment);
        parsed.status = Some(NonStandard::FreeFormatNumber);
        parsed.repaired = repaired;
        return parsed;
    }

    let mut parsed = ParsedField::new(Value::String(String::from(text)), comment);
    parsed.status = Some(NonStandard::UnparsableValue);
    parsed
}

/// Double embedded single quotes.
pub(crate) fn escape_quotes(s: &str) -> String {
    s.replace('\'', "''")
}

/// Render a float in the FITS real grammar: a decimal point is always
/// present and exponents carry an explicit sign and at least two digits.
/// The result never exceeds 20 characters.
pub fn format_float(f: f64) -> String {
    let (mantissa, exp) = split_exponent(&format!("{f:E}"));
    let text = if (-5..16).contains(&exp) {
        let mut s = format!("{f}");
        if !s.contains('.') {
            s.push_str(".0");
        }
        s
    } else {
        exponent_form(&mantissa, exp)
    };
    if text.len() <= 20 {
        return text;
    }

    // Reduce precision until the exponent form fits the fixed-format field.
    let mut precision = 16usize;
    loop {
        let (mantissa, exp) = split_exponent(&format!("{f:.precision$E}"));
        let text = exponent_form(&mantissa, exp);
        if text.len() <= 20 || precision == 0 {
            return text;
        }
        precision -= 1;
    }
}

fn split_exponent(sci: &str) -> (String, i32) {
    match sci.split_once('E') {
        Some((m, e)) => (String::from(m), e.parse().unwrap_or(0)),
        None => (String::from(sci), 0),
    }
}

fn exponent_form(mantissa: &str, exp: i32) -> String {
    let sign = if exp < 0 { '-' } else { '+' };
    if mantissa.contains('.') {
        format!("{mantissa}E{sign}{:02}", exp.unsigned_abs())
    } else {
        format!("{mantissa}.0E{sign}{:02}", exp.unsigned_abs())
    }
}

/// Compact text of a value as it appears after the value indicator, without
/// column alignment. String values are quoted and padded to eight characters.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Logical(b) => String::from(if *b { "T" } else { "F" }),
        Value::Integer(n) => n.to_string(),
        Value::Float(f) => format_float(*f),
        Value::String(s) if s.is_empty() => String::from("''"),
        Value::String(s) => format!("'{:<8}'", escape_quotes(s)),
        Value::ComplexInt(re, im) => format!("({re}, {im})"),
        Value::ComplexFloat(re, im) => format!("({}, {})", format_float(*re), format_float(*im)),
        Value::Undefined => String::new(),
    }
}

/// Fixed-format value field: numbers and logicals right-justified to column
/// 30, strings left-justified from column 11 and padded to column 30.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(_) => format!("{:<20}", value_text(value)),
        Value::Undefined => " ".repeat(20),
        other => format!("{:>20}", value_text(other)),
    }
}
