//! A single FITS header card: keyword, value, and comment, encoded as one
//! or more 80-column records.
//!
//! Handles the standard fixed-format layout, HIERARCH compound keywords,
//! CONTINUE long strings, and commentary keywords (`HISTORY`, `COMMENT`,
//! blank). Records that deviate from the standard but can still be read are
//! kept as written and flagged with a [`NonStandard`] reason until
//! [`Card::fix`] is called.

use core::fmt;

use tracing::{debug, warn};

use crate::block::CARD_SIZE;
use crate::error::{Error, Result};
use crate::value::{escape_quotes, format_value, parse_field, scan_string, value_text, Value};

/// Keywords whose value is free text starting at column 9.
pub const COMMENTARY_KEYWORDS: [&str; 3] = ["COMMENT", "HISTORY", ""];

const HIERARCH: &str = "HIERARCH";
const CONTINUE: &str = "CONTINUE";
const CONTINUE_HEAD: &str = "CONTINUE  ";

/// Widest string segment on a CONTINUE record (`CONTINUE  '` + 67 + `&'`).
const LONG_VALUE_WIDTH: usize = 67;
/// Widest comment fragment on a CONTINUE record (`CONTINUE  '&' / ` + 64).
const LONG_COMMENT_WIDTH: usize = 64;
/// Text columns available to a commentary record.
const COMMENTARY_WIDTH: usize = CARD_SIZE - 8;

/// Why a parsed card is not in standard form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonStandard {
    /// Keyword written in lower case or not left-justified.
    MalformedKeyword,
    /// `=` present in columns 1-10 but not at column 9.
    MisplacedValueIndicator,
    /// Number readable only under free-format rules (embedded blanks,
    /// lower-case exponent).
    FreeFormatNumber,
    /// Value is not a recognisable FITS value and was read as a string.
    UnparsableValue,
    /// String value with no closing quote.
    UnterminatedString,
}

impl fmt::Display for NonStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            NonStandard::MalformedKeyword => "keyword is not upper case or not left-justified",
            NonStandard::MisplacedValueIndicator => "equal sign not at column 9",
            NonStandard::FreeFormatNumber => "number is not in fixed FITS format",
            NonStandard::UnparsableValue => "unparsable value read as a string",
            NonStandard::UnterminatedString => "string value has no closing quote",
        };
        f.write_str(text)
    }
}

/// Layout family of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardKind {
    /// 8-column keyword, `=` at column 9.
    Standard,
    /// `HIERARCH` compound keyword.
    Hierarch,
    /// No value indicator; the value is free text from column 9.
    Commentary,
}

/// One logical header entry.
#[derive(Debug, Clone)]
pub struct Card {
    keyword: String,
    kind: CardKind,
    value: Value,
    comment: Option<String>,
    /// Records as read, rendered verbatim until the card is modified.
    image: Option<String>,
    status: Option<NonStandard>,
    /// Canonical spelling of a free-format number, used by `fix`.
    repaired: Option<String>,
}

impl PartialEq for Card {
    fn eq(&self, other: &Self) -> bool {
        self.keyword.eq_ignore_ascii_case(&other.keyword)
            && self.kind == other.kind
            && self.value == other.value
            && self.comment == other.comment
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for record in self.records() {
            f.write_str(&record)?;
        }
        Ok(())
    }
}

// ── Keyword rules ──

/// Returns `true` for `HISTORY`, `COMMENT`, and the blank keyword.
pub fn is_commentary_keyword(keyword: &str) -> bool {
    let keyword = keyword.trim();
    COMMENTARY_KEYWORDS
        .iter()
        .any(|k| k.eq_ignore_ascii_case(keyword))
}

/// The compound name of a `HIERARCH` keyword, if `keyword` uses the prefix.
fn strip_hierarch(keyword: &str) -> Option<&str> {
    let head = keyword.get(..HIERARCH.len())?;
    let rest = &keyword[HIERARCH.len()..];
    (head.eq_ignore_ascii_case(HIERARCH) && rest.starts_with(' ')).then(|| rest.trim())
}

/// Case-folded form used to compare keywords: HIERARCH prefix dropped and
/// compound words single-spaced.
pub(crate) fn lookup_key(keyword: &str) -> String {
    let keyword = keyword.trim();
    let name = strip_hierarch(keyword).unwrap_or(keyword);
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

fn is_keyword_byte(b: u8) -> bool {
    b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_' || b == b'-'
}

fn is_printable(b: u8) -> bool {
    (0x20..=0x7e).contains(&b)
}

fn check_standard_keyword(keyword: &str) -> Result<String> {
    let upper = keyword.trim().to_ascii_uppercase();
    if upper.len() > 8 {
        return Err(Error::KeywordTooLong(upper));
    }
    if upper.is_empty() || !upper.bytes().all(is_keyword_byte) {
        return Err(Error::InvalidKeyword(upper));
    }
    if upper == "END" || upper == CONTINUE {
        return Err(Error::InvalidKeyword(upper));
    }
    Ok(upper)
}

fn check_hierarch_name(name: &str) -> Result<String> {
    let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
    if name.is_empty() || name.contains('=') || !name.bytes().all(is_printable) {
        return Err(Error::InvalidKeyword(name));
    }
    Ok(name)
}

/// A HIERARCH card must leave room for its value on the first record.
fn check_hierarch_fits(name: &str, value: &Value) -> Result<()> {
    let head = HIERARCH.len() + 1 + name.len() + 3;
    let fits = match value {
        Value::String(_) => head + 5 <= CARD_SIZE,
        other => head - 1 + value_text(other).len() <= CARD_SIZE,
    };
    if fits {
        Ok(())
    } else {
        Err(Error::KeywordTooLong(format!("{HIERARCH} {name}")))
    }
}

fn check_text(text: &str, what: &str) -> Result<()> {
    if text.bytes().all(is_printable) {
        Ok(())
    } else {
        Err(Error::InvalidValue(format!(
            "{what} contains characters outside printable ASCII"
        )))
    }
}

fn check_value(value: &Value) -> Result<()> {
    match value {
        Value::String(s) => check_text(s, "string value"),
        Value::Float(f) if !f.is_finite() => {
            Err(Error::InvalidValue(format!("non-finite float {f}")))
        }
        Value::ComplexFloat(re, im) if !re.is_finite() || !im.is_finite() => Err(
            Error::InvalidValue(format!("non-finite complex ({re}, {im})")),
        ),
        _ => Ok(()),
    }
}

// ── Construction and access ──

impl Card {
    /// Build a card from a keyword and value.
    ///
    /// Standard keywords are upper-cased and must be at most 8 characters
    /// from `[A-Z0-9_-]`. A keyword starting with `HIERARCH ` keeps its case
    /// and may be longer. Commentary keywords take a string value.
    pub fn new(keyword: &str, value: impl Into<Value>) -> Result<Self> {
        Self::build(keyword, value.into(), None)
    }

    /// Build a card with a comment. Commentary cards have no comment field,
    /// so the comment is dropped for them.
    pub fn with_comment(keyword: &str, value: impl Into<Value>, comment: &str) -> Result<Self> {
        Self::build(keyword, value.into(), Some(comment))
    }

    fn build(keyword: &str, value: Value, comment: Option<&str>) -> Result<Self> {
        let keyword = keyword.trim();
        let (keyword, kind) = match strip_hierarch(keyword) {
            Some(name) => (check_hierarch_name(name)?, CardKind::Hierarch),
            None if is_commentary_keyword(keyword) => {
                (keyword.to_ascii_uppercase(), CardKind::Commentary)
            }
            None => (check_standard_keyword(keyword)?, CardKind::Standard),
        };
        let mut card = Card {
            keyword,
            kind,
            value: Value::Undefined,
            comment: None,
            image: None,
            status: None,
            repaired: None,
        };
        card.set_value(value)?;
        if kind != CardKind::Commentary {
            card.set_comment(comment)?;
        }
        Ok(card)
    }

    /// Keyword name. For HIERARCH cards this is the compound name without
    /// the prefix.
    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn kind(&self) -> CardKind {
        self.kind
    }

    pub fn is_commentary(&self) -> bool {
        self.kind == CardKind::Commentary
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// The reason this card is non-standard, if it was parsed that way and
    /// has not been modified or fixed since.
    pub fn status(&self) -> Option<NonStandard> {
        self.status
    }

    /// Replace the value. The card is re-rendered in canonical form.
    pub fn set_value(&mut self, value: impl Into<Value>) -> Result<()> {
        let value = match (self.kind, value.into()) {
            (CardKind::Commentary, Value::Undefined) => Value::String(String::new()),
            (CardKind::Commentary, text @ Value::String(_)) => text,
            (CardKind::Commentary, other) => {
                return Err(Error::InvalidValue(format!(
                    "commentary keyword {:?} takes text, not a {} value",
                    self.keyword,
                    other.type_name()
                )))
            }
            (_, value) => value,
        };
        check_value(&value)?;
        if self.kind == CardKind::Hierarch {
            check_hierarch_fits(&self.keyword, &value)?;
        }
        self.value = value;
        self.touch();
        Ok(())
    }

    /// Replace or clear the comment. Surrounding blanks are removed and an
    /// empty comment clears it.
    pub fn set_comment(&mut self, comment: Option<&str>) -> Result<()> {
        let comment = comment.map(str::trim).filter(|c| !c.is_empty());
        if let Some(text) = comment {
            if self.is_commentary() {
                return Err(Error::InvalidValue(format!(
                    "commentary keyword {:?} has no comment field",
                    self.keyword
                )));
            }
            check_text(text, "comment")?;
        }
        self.comment = comment.map(String::from);
        self.touch();
        Ok(())
    }

    /// Give the card a new keyword. A commentary card can only become
    /// another commentary card, and a keyed card another keyed card.
    pub fn rename(&mut self, keyword: &str) -> Result<()> {
        let to_commentary =
            strip_hierarch(keyword.trim()).is_none() && is_commentary_keyword(keyword);
        if to_commentary != self.is_commentary() {
            return Err(Error::InvalidRename {
                from: self.keyword.clone(),
                to: keyword.trim().to_ascii_uppercase(),
                reason: "commentary and regular keywords cannot be renamed to each other",
            });
        }
        *self = Card::build(keyword, self.value.clone(), self.comment.as_deref())?;
        Ok(())
    }

    fn touch(&mut self) {
        self.image = None;
        self.status = None;
        self.repaired = None;
    }

    /// Rewrite a non-standard card in standard form. Free-format numbers
    /// keep their digits as written. Fails if the value or comment holds
    /// characters a standard card cannot carry.
    pub fn fix(&mut self) -> Result<()> {
        let Some(reason) = self.status else {
            return Ok(());
        };
        check_value(&self.value)?;
        if let Some(comment) = &self.comment {
            check_text(comment, "comment")?;
        }
        let repaired = self.repaired.take();
        self.image = None;
        self.status = None;
        if let Some(text) = repaired {
            let field = match self.kind {
                CardKind::Hierarch => text,
                _ => format!("{text:>20}"),
            };
            self.image = Some(self.keyed_records(&field).concat());
        }
        debug!(keyword = %self.keyword, %reason, "fixed non-standard card");
        Ok(())
    }
}

// ── Rendering ──

fn pad_record(line: &str) -> String {
    format!("{line:<CARD_SIZE$}")
}

/// Fixed-width slices of ASCII text.
fn fixed_chunks(text: &str, width: usize) -> Vec<&str> {
    (0..text.len())
        .step_by(width)
        .map(|start| &text[start..text.len().min(start + width)])
        .collect()
}

/// Returns `true` when cutting `text` at byte `at` would separate the two
/// quotes of an escaped `''`.
fn splits_quote_pair(text: &str, at: usize) -> bool {
    text.as_bytes()[..at].iter().filter(|&&b| b == b'\'').count() % 2 == 1
}

/// Split an escaped string value into pieces of at most `first` (then
/// `rest`) bytes, breaking after the last blank that fits. A word wider than
/// the limit is cut in the middle, never inside an escaped `''`. Always
/// yields at least one piece.
fn split_words(text: &str, first: usize, rest: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut width = first;
    loop {
        if text.len() - start <= width {
            pieces.push(&text[start..]);
            return pieces;
        }
        let limit = start + width;
        let mut end = match text[start..limit].rfind(' ') {
            Some(i) => start + i + 1,
            None => limit,
        };
        if splits_quote_pair(text, end) {
            end = if end - 1 > start { end - 1 } else { end + 1 };
        }
        pieces.push(&text[start..end]);
        start = end;
        width = rest;
    }
}

/// Split a comment into CONTINUE fragments that [`Card::parse`] joins back
/// exactly. A fragment either fills its record, and is joined to the next
/// one directly, or ends in a non-blank that was followed by one blank,
/// which the join restores. Blanks at the start of a fragment are kept.
fn split_comment(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut pieces = Vec::new();
    let mut start = 0;
    while text.len() - start > LONG_COMMENT_WIDTH {
        let window = &bytes[start..start + LONG_COMMENT_WIDTH];
        let word_end = (1..LONG_COMMENT_WIDTH)
            .rev()
            .find(|&i| window[i] == b' ' && window[i - 1] != b' ');
        match word_end {
            Some(i) => {
                pieces.push(&text[start..start + i]);
                start += i + 1;
            }
            None => {
                pieces.push(&text[start..start + LONG_COMMENT_WIDTH]);
                start += LONG_COMMENT_WIDTH;
            }
        }
    }
    pieces.push(&text[start..]);
    pieces
}

fn long_string_records(head: &str, text: &str, comment: Option<&str>) -> Vec<String> {
    let escaped = escape_quotes(text);
    let first = CARD_SIZE - head.len() - 3;
    let mut records: Vec<String> = split_words(&escaped, first, LONG_VALUE_WIDTH)
        .into_iter()
        .enumerate()
        .map(|(i, piece)| {
            let lead = if i == 0 { head } else { CONTINUE_HEAD };
            pad_record(&format!("{lead}'{piece}&'"))
        })
        .collect();
    if let Some(comment) = comment {
        for piece in split_comment(comment) {
            records.push(pad_record(&format!("{CONTINUE_HEAD}'&' / {piece}")));
        }
    }
    records
}

impl Card {
    /// The 80-character records of this card, in order.
    pub fn records(&self) -> Vec<String> {
        if let Some(image) = &self.image {
            return fixed_chunks(image, CARD_SIZE)
                .into_iter()
                .map(String::from)
                .collect();
        }
        match self.kind {
            CardKind::Commentary => self.commentary_records(),
            CardKind::Hierarch => self.keyed_records(&value_text(&self.value)),
            CardKind::Standard => self.keyed_records(&format_value(&self.value)),
        }
    }

    /// All records concatenated.
    pub fn render(&self) -> String {
        self.records().concat()
    }

    /// Number of records this card occupies.
    pub fn record_count(&self) -> usize {
        self.records().len()
    }

    fn commentary_records(&self) -> Vec<String> {
        let text = self.value.as_str().unwrap_or_default();
        if text.len() <= COMMENTARY_WIDTH {
            return vec![pad_record(&format!("{:<8}{text}", self.keyword))];
        }
        fixed_chunks(text, COMMENTARY_WIDTH)
            .into_iter()
            .map(|chunk| pad_record(&format!("{:<8}{chunk}", self.keyword)))
            .collect()
    }

    fn keyed_records(&self, field: &str) -> Vec<String> {
        let head = match self.kind {
            CardKind::Hierarch => format!("{HIERARCH} {} = ", self.keyword),
            _ => format!("{:<8}= ", self.keyword),
        };
        let mut line = format!("{head}{field}");
        if let Some(comment) = &self.comment {
            line.push_str(" / ");
            line.push_str(comment);
        }
        if self.kind == CardKind::Hierarch && line.len() == CARD_SIZE + 1 {
            line = line.replacen(" = ", "= ", 1);
        }
        if line.len() <= CARD_SIZE {
            return vec![pad_record(&line)];
        }
        if let Value::String(text) = &self.value {
            return long_string_records(&head, text, self.comment.as_deref());
        }
        warn!(keyword = %self.keyword, "card too long, comment truncated");
        line.truncate(CARD_SIZE);
        vec![line]
    }
}

// ── Parsing ──

/// Returns `true` if `record` is a `CONTINUE` record.
pub(crate) fn is_continue_record(record: &str) -> bool {
    record
        .get(..CONTINUE.len())
        .is_some_and(|k| k.eq_ignore_ascii_case(CONTINUE))
}

/// The value field of a keyed or CONTINUE record.
fn value_field(record: &str) -> Option<&str> {
    let key = &record[..8];
    if is_continue_record(record) {
        return Some(&record[8..]);
    }
    if key.eq_ignore_ascii_case(HIERARCH) && record.as_bytes()[8] == b' ' {
        return record.find('=').map(|eq| &record[eq + 1..]);
    }
    if is_commentary_keyword(key) {
        return None;
    }
    if record.as_bytes()[8] == b'=' {
        return Some(&record[9..]);
    }
    record[..10].find('=').map(|eq| &record[eq + 1..])
}

/// Returns `true` if the record holds a string whose content ends in `&`,
/// announcing a CONTINUE record.
pub(crate) fn announces_continuation(record: &str) -> bool {
    let Some(field) = value_field(record).map(str::trim_start) else {
        return false;
    };
    if !field.starts_with('\'') {
        return false;
    }
    scan_string(field).0.trim_end().ends_with('&')
}

/// Returns `true` if the last column of the record is not blank.
fn fills_record(record: &str) -> bool {
    record.as_bytes().last().is_some_and(|&b| b != b' ')
}

/// The comment fragment of a CONTINUE value field, without the blank that
/// follows `/`. Blanks after that one are part of the fragment.
fn continuation_comment(field: &str) -> Option<&str> {
    let rest = &field[scan_string(field).1?..];
    let text = &rest[rest.find('/')? + 1..];
    let text = text.strip_prefix(' ').unwrap_or(text).trim_end();
    (!text.is_empty()).then_some(text)
}

fn strip_ampersand(text: &str) -> &str {
    text.strip_suffix('&').unwrap_or(text)
}

fn parse_record(record: &str) -> Result<Card> {
    let key_field = &record[..8];

    if key_field.eq_ignore_ascii_case(HIERARCH) && record.as_bytes()[8] == b' ' {
        if let Some(eq) = record.find('=') {
            let name = check_hierarch_name(&record[9..eq])?;
            return Ok(Card::from_field(name, CardKind::Hierarch, &record[eq + 1..], None));
        }
    }

    let keyword = key_field.trim().to_ascii_uppercase();
    let malformed = (keyword != key_field.trim_end()).then_some(NonStandard::MalformedKeyword);

    if is_commentary_keyword(&keyword) || keyword == CONTINUE {
        return Ok(Card::commentary_parsed(keyword, &record[8..], malformed));
    }

    let (keyword, field, status) = if record.as_bytes()[8] == b'=' {
        (keyword, &record[9..], malformed)
    } else if let Some(eq) = record[..10].find('=') {
        (
            record[..eq].trim().to_ascii_uppercase(),
            &record[eq + 1..],
            Some(NonStandard::MisplacedValueIndicator),
        )
    } else {
        if !keyword.bytes().all(is_keyword_byte) {
            return Err(Error::InvalidKeyword(keyword));
        }
        return Ok(Card::commentary_parsed(keyword, &record[8..], malformed));
    };

    if keyword.is_empty() || keyword.len() > 8 || !keyword.bytes().all(is_keyword_byte) {
        return Err(Error::InvalidKeyword(keyword));
    }
    Ok(Card::from_field(keyword, CardKind::Standard, field, status))
}

impl Card {
    fn from_field(
        keyword: String,
        kind: CardKind,
        field: &str,
        status: Option<NonStandard>,
    ) -> Card {
        let parsed = parse_field(field);
        Card {
            keyword,
            kind,
            value: parsed.value,
            comment: parsed.comment,
            image: None,
            status: status.or(parsed.status),
            repaired: parsed.repaired,
        }
    }

    fn commentary_parsed(keyword: String, text: &str, status: Option<NonStandard>) -> Card {
        Card {
            keyword,
            kind: CardKind::Commentary,
            value: Value::String(String::from(text.trim_end())),
            comment: None,
            image: None,
            status,
            repaired: None,
        }
    }

    /// Parse a card from text holding one or more 80-column records. Short
    /// input is blank-padded to a whole record.
    ///
    /// A keyed string card may be followed by `CONTINUE` records; a
    /// commentary card by records with the same keyword.
    pub fn parse(text: &str) -> Result<Self> {
        if !text.is_ascii() {
            return Err(Error::InvalidHeader);
        }
        let width = text.len().div_ceil(CARD_SIZE).max(1) * CARD_SIZE;
        let padded = format!("{text:<width$}");
        Self::from_records(&fixed_chunks(&padded, CARD_SIZE))
    }

    /// Parse a card from raw record bytes.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self> {
        let text = core::str::from_utf8(bytes).map_err(|_| Error::InvalidHeader)?;
        Self::parse(text)
    }

    /// Parse a card from whole 80-character ASCII records.
    pub(crate) fn from_records(records: &[&str]) -> Result<Self> {
        let (first, rest) = records.split_first().ok_or(Error::UnexpectedEof)?;
        let mut card = parse_record(first)?;
        if !rest.is_empty() {
            if card.is_commentary() {
                card.absorb_commentary(rest)?;
            } else {
                card.absorb_continuation(first, rest)?;
            }
        }
        if let Some(reason) = card.status {
            warn!(keyword = %card.keyword, %reason, "non-standard card");
        }
        card.image = Some(records.concat());
        Ok(card)
    }

    fn absorb_commentary(&mut self, rest: &[&str]) -> Result<()> {
        let mut text = match &self.value {
            Value::String(s) => s.clone(),
            _ => String::new(),
        };
        text = format!("{text:<COMMENTARY_WIDTH$}");
        for record in rest {
            if !record[..8].trim().eq_ignore_ascii_case(&self.keyword) {
                return Err(Error::InvalidHeader);
            }
            text.push_str(&record[8..]);
        }
        self.value = Value::String(String::from(text.trim_end()));
        Ok(())
    }

    fn absorb_continuation(&mut self, first: &str, rest: &[&str]) -> Result<()> {
        let Value::String(text) = &self.value else {
            return Err(Error::InvalidHeader);
        };
        let mut value = String::from(strip_ampersand(text));
        let mut comment = self.comment.take();
        let mut filled = comment.is_some() && fills_record(first);

        for record in rest {
            if !is_continue_record(record) {
                return Err(Error::InvalidHeader);
            }
            let field = record[8..].trim_start();
            if !field.starts_with('\'') {
                return Err(Error::InvalidHeader);
            }
            let parsed = parse_field(field);
            let Value::String(segment) = parsed.value else {
                return Err(Error::InvalidHeader);
            };
            value.push_str(strip_ampersand(&segment));
            if let Some(fragment) = continuation_comment(field) {
                match comment.as_mut() {
                    Some(joined) => {
                        if !filled {
                            joined.push(' ');
                        }
                        joined.push_str(fragment);
                    }
                    None => comment = Some(String::from(fragment)),
                }
                filled = fills_record(record);
            }
            self.status = self.status.or(parsed.status);
        }

        self.value = Value::String(value);
        self.comment = comment
            .map(|c| String::from(c.trim()))
            .filter(|c| !c.is_empty());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad(s: &str) -> String {
        format!("{s:<80}")
    }

    // ── Construction ──

    #[test]
    fn keyword_is_uppercased() {
        let c = Card::new("abc", 99).unwrap();
        assert_eq!(c.keyword(), "ABC");
        assert_eq!(c.kind(), CardKind::Standard);
    }

    #[test]
    fn keyword_too_long_rejected() {
        assert!(matches!(
            Card::new("abcdefghi", "long"),
            Err(Error::KeywordTooLong(_))
        ));
    }

    #[test]
    fn illegal_keyword_characters_rejected() {
        assert!(matches!(Card::new("abc+", 9), Err(Error::InvalidKeyword(_))));
        assert!(matches!(Card::new("A B", 9), Err(Error::InvalidKeyword(_))));
    }

    #[test]
    fn reserved_keywords_rejected() {
        assert!(Card::new("END", 1).is_err());
        assert!(Card::new("continue", "x").is_err());
    }

    #[test]
    fn non_finite_float_rejected() {
        assert!(matches!(
            Card::new("X", f64::NAN),
            Err(Error::InvalidValue(_))
        ));
    }

    #[test]
    fn non_printable_comment_rejected() {
        assert!(Card::with_comment("X", 1, "tab\there").is_err());
    }

    #[test]
    fn commentary_requires_text() {
        assert!(Card::new("HISTORY", 5).is_err());
        let blank = Card::new("", Value::Undefined).unwrap();
        assert_eq!(blank.value(), &Value::from(""));
        assert!(blank.is_commentary());
    }

    #[test]
    fn commentary_comment_dropped() {
        let c = Card::with_comment("comment", "A commentary card has no comment.", "x").unwrap();
        assert!(c.comment().is_none());
    }

    #[test]
    fn hierarch_keeps_case_and_joins_words() {
        let c = Card::new("hierarch  ESO   INS slit", 1).unwrap();
        assert_eq!(c.kind(), CardKind::Hierarch);
        assert_eq!(c.keyword(), "ESO INS slit");
    }

    #[test]
    fn hierarch_name_must_leave_room() {
        let name = format!("HIERARCH {}", "X".repeat(70));
        assert!(matches!(Card::new(&name, 1), Err(Error::KeywordTooLong(_))));
    }

    #[test]
    fn empty_comment_is_none() {
        let c = Card::with_comment("X", 1, "   ").unwrap();
        assert!(c.comment().is_none());
    }

    // ── Rendering ──

    #[test]
    fn integer_card() {
        let c = Card::with_comment("NAXIS", 2, "number of axes").unwrap();
        assert_eq!(
            c.render(),
            pad("NAXIS   =                    2 / number of axes")
        );
    }

    #[test]
    fn rendered_length_is_whole_records() {
        let c = Card::with_comment("X", "word ".repeat(40).as_str(), "note").unwrap();
        assert!(c.record_count() > 1);
        assert_eq!(c.render().len(), c.record_count() * CARD_SIZE);
    }

    #[test]
    fn long_commentary_spans_records() {
        let text = "x".repeat(100);
        let c = Card::new("HISTORY", text.as_str()).unwrap();
        let records = c.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], format!("HISTORY {}", "x".repeat(72)));
        assert_eq!(records[1], pad(&format!("HISTORY {}", "x".repeat(28))));
        assert_eq!(Card::parse(&c.render()).unwrap(), c);
    }

    #[test]
    fn non_string_overflow_truncates_comment() {
        let c = Card::with_comment("abc", 9, &"abcde".repeat(20)).unwrap();
        let records = c.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].len(), CARD_SIZE);
    }

    #[test]
    fn split_words_breaks_after_blank() {
        assert_eq!(split_words("aaa bbb ccc", 8, 8), vec!["aaa bbb ", "ccc"]);
        assert_eq!(split_words("abcdefgh", 3, 3), vec!["abc", "def", "gh"]);
        assert_eq!(split_words("", 5, 5), vec![""]);
    }

    #[test]
    fn split_comment_breaks_after_word() {
        let text = format!("{}   tail", "w ".repeat(30) + "w");
        let pieces = split_comment(&text);
        assert_eq!(pieces, vec![&text[..61], "  tail"]);

        let text = format!("{} y", "x".repeat(64));
        assert_eq!(split_comment(&text), vec![&text[..64], " y"]);
    }

    #[test]
    fn comment_blanks_survive_continue_records() {
        for comment in [
            format!("{} y", "x".repeat(64)),
            format!("{}   tail", "w ".repeat(30) + "w"),
            format!("{}  {}", "a".repeat(63), "b".repeat(70)),
            format!("lead {}  mid {}", "c".repeat(62), "d ".repeat(40).trim_end()),
        ] {
            let c = Card::with_comment("KEY", "v", &comment).unwrap();
            assert!(c.record_count() > 1);
            let back = Card::parse(&c.render()).unwrap();
            assert_eq!(back.comment(), Some(comment.as_str()));
            assert_eq!(back.render(), c.render());
        }
    }

    #[test]
    fn split_words_keeps_escaped_quotes_together() {
        let pieces = split_words("abc''def", 4, 4);
        assert_eq!(pieces, vec!["abc", "''de", "f"]);
    }

    #[test]
    fn quote_pair_straddling_segment_boundary() {
        let text = format!("{}'{}", "a".repeat(66), "b".repeat(10));
        let c = Card::new("QUOTED", text.as_str()).unwrap();
        let records = c.records();
        assert!(records[0].trim_end().ends_with("a&'"));
        assert_eq!(Card::parse(&c.render()).unwrap().value(), &Value::from(text));
    }

    // ── Parsing ──

    #[test]
    fn parse_standard_record() {
        let c = Card::parse("BITPIX  =                   16 / bits per pixel").unwrap();
        assert_eq!(c.keyword(), "BITPIX");
        assert_eq!(c.value(), &Value::Integer(16));
        assert_eq!(c.comment(), Some("bits per pixel"));
        assert!(c.status().is_none());
    }

    #[test]
    fn parse_keeps_original_image() {
        let text = pad("DATE    = '2001-02-28'   /   odd spacing");
        let c = Card::parse(&text).unwrap();
        assert_eq!(c.render(), text);
    }

    #[test]
    fn parse_rejects_non_ascii() {
        assert!(matches!(
            Card::parse("KEY     = 'caf\u{e9}'"),
            Err(Error::InvalidHeader)
        ));
    }

    #[test]
    fn parse_rejects_illegal_keyword() {
        assert!(matches!(
            Card::parse("AB+C    = 1"),
            Err(Error::InvalidKeyword(_))
        ));
    }

    #[test]
    fn parse_commentary_keeps_slash() {
        let c = Card::parse("COMMENT card has no comments. / text after slash").unwrap();
        assert_eq!(
            c.value(),
            &Value::from("card has no comments. / text after slash")
        );
        assert!(c.comment().is_none());
    }

    #[test]
    fn parse_keyword_without_value_indicator() {
        let c = Card::parse("ORIGIN    written by hand").unwrap();
        assert!(c.is_commentary());
        assert_eq!(c.keyword(), "ORIGIN");
        assert_eq!(c.value(), &Value::from("  written by hand"));
    }

    #[test]
    fn lone_continue_is_commentary() {
        let c = Card::parse("CONTINUE  'orphan'").unwrap();
        assert!(c.is_commentary());
        assert_eq!(c.keyword(), "CONTINUE");
    }

    #[test]
    fn continue_requires_string_value() {
        let text = pad("A       = 1") + &pad("CONTINUE  'x'");
        assert!(matches!(Card::parse(&text), Err(Error::InvalidHeader)));
    }

    #[test]
    fn announces_continuation_only_for_ampersand_strings() {
        assert!(announces_continuation(&pad("A       = 'abc&'")));
        assert!(announces_continuation(&pad("CONTINUE  'abc&  ' / x")));
        assert!(!announces_continuation(&pad("A       = 'abc'")));
        assert!(!announces_continuation(&pad("HISTORY 'abc&'")));
        assert!(!announces_continuation(&pad("A       = 5")));
    }

    #[test]
    fn parse_hierarch() {
        let c = Card::parse("HIERARCH ESO DET CHIP = 'CCD42' / chip").unwrap();
        assert_eq!(c.kind(), CardKind::Hierarch);
        assert_eq!(c.keyword(), "ESO DET CHIP");
        assert_eq!(c.value(), &Value::from("CCD42"));
        assert_eq!(c.comment(), Some("chip"));
    }

    #[test]
    fn lookup_key_normalises() {
        assert_eq!(lookup_key("hierarch eso  det"), "ESO DET");
        assert_eq!(lookup_key(" naxis1 "), "NAXIS1");
    }

    // ── Modification ──

    #[test]
    fn set_value_clears_image_and_status() {
        let mut c = Card::parse("xyz     = 100").unwrap();
        assert_eq!(c.status(), Some(NonStandard::MalformedKeyword));
        c.set_value(200).unwrap();
        assert!(c.status().is_none());
        assert_eq!(c.render(), pad("XYZ     =                  200"));
    }

    #[test]
    fn fix_without_status_is_noop() {
        let mut c = Card::new("A", 1).unwrap();
        let before = c.render();
        c.fix().unwrap();
        assert_eq!(c.render(), before);
    }

    #[test]
    fn rename_across_commentary_rejected() {
        let mut c = Card::new("FNAME", "x").unwrap();
        assert!(matches!(
            c.rename("HISTORY"),
            Err(Error::InvalidRename { .. })
        ));
        let mut h = Card::new("HISTORY", "text").unwrap();
        assert!(h.rename("OBJECT").is_err());
        h.rename("comment").unwrap();
        assert_eq!(h.keyword(), "COMMENT");
    }

    #[test]
    fn rename_keeps_value_and_comment() {
        let mut c = Card::with_comment("FILENAME", "v.fits", "File name").unwrap();
        c.rename("fname").unwrap();
        assert_eq!(c.keyword(), "FNAME");
        assert_eq!(c.value(), &Value::from("v.fits"));
        assert_eq!(c.comment(), Some("File name"));
    }

    #[test]
    fn equality_ignores_rendering() {
        let parsed = Card::parse("abc     = 5").unwrap();
        let built = Card::new("ABC", 5).unwrap();
        assert_eq!(parsed, built);
        assert_ne!(parsed.render(), built.render());
    }
}
