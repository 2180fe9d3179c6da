//! Ordered header container with keyword-addressed access, plus header
//! block reading and writing.

use std::collections::BTreeSet;

use regex::{Regex, RegexBuilder};

use crate::block::{self, pad_header_blocks, BLOCK_SIZE, CARD_SIZE};
use crate::card::{self, is_commentary_keyword, lookup_key, Card};
use crate::error::{Error, Result};
use crate::value::Value;

// ── Types ──

/// An ordered sequence of cards.
///
/// Keywords are unique under case-insensitive comparison, except for
/// commentary cards and keywords declared repeatable. Positions are indices
/// into the card sequence and shift whenever cards are inserted or removed
/// before them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    cards: Vec<Card>,
    repeatable: BTreeSet<String>,
}

impl<'a> IntoIterator for &'a Header {
    type Item = &'a Card;
    type IntoIter = core::slice::Iter<'a, Card>;

    fn into_iter(self) -> Self::IntoIter {
        self.cards.iter()
    }
}

fn is_end_record(record: &str) -> bool {
    record[..8].trim_end() == "END"
}

/// Translate a keyword wildcard pattern into an anchored, case-insensitive
/// regular expression. `*` and `...` match any run, `?` one character.
fn wildcard_regex(pattern: &str) -> Result<Regex> {
    let pattern = lookup_key(pattern);
    let mut expr = String::from("^");
    let mut rest = pattern.as_str();
    while let Some(ch) = rest.chars().next() {
        if let Some(after) = rest.strip_prefix("...") {
            expr.push_str(".*");
            rest = after;
            continue;
        }
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
        rest = &rest[ch.len_utf8()..];
    }
    expr.push('$');
    RegexBuilder::new(&expr)
        .case_insensitive(true)
        .build()
        .map_err(|_| Error::InvalidKeyword(pattern))
}

// ── Construction and serialization ──

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a header from cards, enforcing keyword uniqueness.
    pub fn from_cards(cards: impl IntoIterator<Item = Card>) -> Result<Self> {
        let mut header = Header::new();
        for card in cards {
            header.append(card)?;
        }
        Ok(header)
    }

    /// Parse header text made of 80-character records. Parsing stops at an
    /// `END` record if one is present. Duplicate keywords found in the input
    /// are kept as read.
    pub fn parse(text: &str) -> Result<Self> {
        if !text.is_ascii() {
            return Err(Error::InvalidHeader);
        }
        let width = text.len().div_ceil(CARD_SIZE) * CARD_SIZE;
        let padded = format!("{text:<width$}");
        Ok(Self::from_records(&block::records(&padded))?.0)
    }

    /// Read a header from 2880-byte blocks.
    ///
    /// Returns the header and the number of bytes it occupies (always a
    /// multiple of [`BLOCK_SIZE`]). Only complete blocks are scanned; data
    /// without an `END` record is an [`Error::UnexpectedEof`].
    pub fn from_blocks(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < BLOCK_SIZE {
            return Err(Error::UnexpectedEof);
        }
        let scanned = block::complete_blocks(data);
        let text = core::str::from_utf8(scanned).map_err(|_| Error::InvalidHeader)?;
        if !text.is_ascii() {
            return Err(Error::InvalidHeader);
        }
        match Self::from_records(&block::records(text))? {
            (header, Some(end)) => Ok((header, block::header_byte_len(end))),
            (_, None) => Err(Error::UnexpectedEof),
        }
    }

    /// Group records into cards. Returns the header and the index of the
    /// `END` record, if one was found.
    fn from_records(records: &[&str]) -> Result<(Self, Option<usize>)> {
        let mut header = Header::new();
        let mut i = 0;
        while i < records.len() {
            if is_end_record(records[i]) {
                return Ok((header, Some(i)));
            }
            let mut end = i + 1;
            while end < records.len()
                && card::is_continue_record(records[end])
                && card::announces_continuation(records[end - 1])
            {
                end += 1;
            }
            header.cards.push(Card::from_records(&records[i..end])?);
            i = end;
        }
        Ok((header, None))
    }

    /// The 80-character records of every card, in order, without `END`.
    pub fn to_records(&self) -> Vec<String> {
        self.cards.iter().flat_map(Card::records).collect()
    }

    /// All records concatenated, without `END`.
    pub fn render(&self) -> String {
        self.to_records().concat()
    }

    /// Serialize into complete header blocks: every record, the `END`
    /// record, then blank padding to a multiple of [`BLOCK_SIZE`].
    pub fn to_blocks(&self) -> Vec<u8> {
        let mut text = self.render();
        text.push_str(&format!("{:<CARD_SIZE$}", "END"));
        pad_header_blocks(text.as_bytes())
    }
}

// ── Lookup ──

impl Header {
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Card> {
        self.cards.iter()
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Keywords in physical order, repeats included.
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.cards.iter().map(Card::keyword)
    }

    fn positions<'a>(&'a self, keyword: &str) -> impl Iterator<Item = usize> + 'a {
        let key = lookup_key(keyword);
        self.cards
            .iter()
            .enumerate()
            .filter(move |(_, c)| lookup_key(c.keyword()) == key)
            .map(|(i, _)| i)
    }

    /// Case-insensitive containment test. A `HIERARCH ` prefix is optional.
    pub fn contains(&self, keyword: &str) -> bool {
        self.position(keyword).is_some()
    }

    /// Position of the first card with this keyword.
    pub fn position(&self, keyword: &str) -> Option<usize> {
        self.positions(keyword).next()
    }

    /// Position of the first card with this keyword, or
    /// [`Error::KeywordNotFound`].
    pub fn index(&self, keyword: &str) -> Result<usize> {
        self.position(keyword)
            .ok_or_else(|| Error::KeywordNotFound(String::from(keyword.trim())))
    }

    pub fn get_card(&self, keyword: &str) -> Option<&Card> {
        self.position(keyword).map(|i| &self.cards[i])
    }

    /// Value of the first card with this keyword.
    pub fn get(&self, keyword: &str) -> Option<&Value> {
        self.get_card(keyword).map(Card::value)
    }

    /// The `n`th (zero-based) card with this keyword.
    pub fn get_occurrence(&self, keyword: &str, n: usize) -> Option<&Card> {
        self.positions(keyword).nth(n).map(|i| &self.cards[i])
    }

    /// Number of cards carrying this keyword.
    pub fn occurrences(&self, keyword: &str) -> usize {
        self.positions(keyword).count()
    }

    pub fn comment(&self, keyword: &str) -> Option<&str> {
        self.get_card(keyword).and_then(Card::comment)
    }

    /// Cards whose keyword matches a wildcard pattern (`*`, `?`, `...`).
    pub fn matching(&self, pattern: &str) -> Result<Vec<&Card>> {
        let re = wildcard_regex(pattern)?;
        Ok(self
            .cards
            .iter()
            .filter(|c| re.is_match(&lookup_key(c.keyword())))
            .collect())
    }

    /// `(EXTNAME, EXTVER)` of an extension header. EXTVER defaults to 1.
    pub fn extension_id(&self) -> Option<(&str, i64)> {
        let name = self.get("EXTNAME")?.as_str()?;
        let version = self.get("EXTVER").and_then(Value::as_i64).unwrap_or(1);
        Some((name.trim(), version))
    }

    /// Returns `true` if EXTNAME matches `name` (case-insensitive) and, when
    /// given, EXTVER matches `version`.
    pub fn is_extension(&self, name: &str, version: Option<i64>) -> bool {
        match self.extension_id() {
            Some((extname, extver)) => {
                extname.eq_ignore_ascii_case(name.trim()) && version.map_or(true, |v| v == extver)
            }
            None => false,
        }
    }

    /// Cards still in a non-standard form, with their positions.
    pub fn non_standard(&self) -> Vec<(usize, &Card)> {
        self.cards
            .iter()
            .enumerate()
            .filter(|(_, c)| c.status().is_some())
            .collect()
    }
}

// ── Mutation ──

impl Header {
    /// Allow `keyword` to appear more than once.
    pub fn declare_repeatable(&mut self, keyword: &str) {
        self.repeatable.insert(lookup_key(keyword));
    }

    pub fn is_repeatable(&self, keyword: &str) -> bool {
        is_commentary_keyword(keyword) || self.repeatable.contains(&lookup_key(keyword))
    }

    fn allows_repeat(&self, card: &Card) -> bool {
        card.is_commentary() || self.repeatable.contains(&lookup_key(card.keyword()))
    }

    fn check_unique(&self, card: &Card) -> Result<()> {
        if !self.allows_repeat(card) && self.contains(card.keyword()) {
            return Err(Error::DuplicateKeyword(String::from(card.keyword())));
        }
        Ok(())
    }

    /// Append a card at the end.
    pub fn append(&mut self, card: Card) -> Result<()> {
        self.check_unique(&card)?;
        self.cards.push(card);
        Ok(())
    }

    /// Insert a card before `position` (`position == len()` appends).
    pub fn insert(&mut self, position: usize, card: Card) -> Result<()> {
        if position > self.cards.len() {
            return Err(Error::PositionOutOfRange {
                position,
                len: self.cards.len(),
            });
        }
        self.check_unique(&card)?;
        self.cards.insert(position, card);
        Ok(())
    }

    /// Update the value of the first card with this keyword, keeping its
    /// comment, or append a new card. Commentary keywords always append.
    pub fn set(&mut self, keyword: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        match self.position(keyword) {
            Some(i) if !is_commentary_keyword(keyword) => self.cards[i].set_value(value),
            _ => self.append(Card::new(keyword, value)?),
        }
    }

    /// Like [`Header::set`], replacing the comment as well.
    pub fn set_with_comment(
        &mut self,
        keyword: &str,
        value: impl Into<Value>,
        comment: &str,
    ) -> Result<()> {
        let value = value.into();
        match self.position(keyword) {
            Some(i) if !is_commentary_keyword(keyword) => {
                let card = &mut self.cards[i];
                card.set_value(value)?;
                card.set_comment(Some(comment))
            }
            _ => self.append(Card::with_comment(keyword, value, comment)?),
        }
    }

    /// Rename the first card with keyword `from`.
    ///
    /// Fails if `from` is absent, if `to` already exists and may not repeat,
    /// or if the rename would turn a commentary card into a keyed one or the
    /// reverse.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let i = self.index(from)?;
        let same = lookup_key(from) == lookup_key(to);
        if !same && !self.is_repeatable(to) && self.contains(to) {
            return Err(Error::InvalidRename {
                from: String::from(self.cards[i].keyword()),
                to: String::from(to.trim()),
                reason: "keyword already exists",
            });
        }
        self.cards[i].rename(to)
    }

    /// Remove every card with this keyword. Returns how many were removed.
    pub fn delete(&mut self, keyword: &str) -> Result<usize> {
        let key = lookup_key(keyword);
        let before = self.cards.len();
        self.cards.retain(|c| lookup_key(c.keyword()) != key);
        match before - self.cards.len() {
            0 => Err(Error::KeywordNotFound(String::from(keyword.trim()))),
            n => Ok(n),
        }
    }

    /// Remove the card at `position`.
    pub fn remove(&mut self, position: usize) -> Result<Card> {
        if position >= self.cards.len() {
            return Err(Error::PositionOutOfRange {
                position,
                len: self.cards.len(),
            });
        }
        Ok(self.cards.remove(position))
    }

    /// Remove every card matching a wildcard pattern. Returns how many were
    /// removed.
    pub fn delete_matching(&mut self, pattern: &str) -> Result<usize> {
        let re = wildcard_regex(pattern)?;
        let before = self.cards.len();
        self.cards.retain(|c| !re.is_match(&lookup_key(c.keyword())));
        Ok(before - self.cards.len())
    }

    /// Repair every non-standard card. Returns how many were repaired.
    pub fn fix(&mut self) -> Result<usize> {
        let mut fixed = 0;
        for card in self.cards.iter_mut().filter(|c| c.status().is_some()) {
            card.fix()?;
            fixed += 1;
        }
        Ok(fixed)
    }
}



#[cfg(test)]
mod edit_tests {
    use super::*;

    fn sample() -> Header {
        let mut h = Header::new();
        h.set("SIMPLE", true).unwrap();
        h.set("BITPIX", 16).unwrap();
        h.set_with_comment("NAXIS", 2, "axes").unwrap();
        h.set("NAXIS1", 10).unwrap();
        h.set("NAXIS2", 20).unwrap();
        h
    }

    #[test]
    fn index_and_contains_are_case_insensitive() {
        let h = sample();
        assert!(h.contains("naxis"));
        assert_eq!(h.index("Naxis1").unwrap(), 3);
        assert!(matches!(h.index("NAXIS3"), Err(Error::KeywordNotFound(_))));
    }

    #[test]
    fn set_updates_in_place_and_keeps_comment() {
        let mut h = sample();
        h.set("NAXIS", 3).unwrap();
        assert_eq!(h.index("NAXIS").unwrap(), 2);
        assert_eq!(h.get("NAXIS"), Some(&Value::Integer(3)));
        assert_eq!(h.comment("NAXIS"), Some("axes"));
        assert_eq!(h.len(), 5);
    }

    #[test]
    fn commentary_set_appends() {
        let mut h = sample();
        h.set("HISTORY", "first").unwrap();
        h.set("HISTORY", "second").unwrap();
        assert_eq!(h.occurrences("HISTORY"), 2);
        assert_eq!(
            h.get_occurrence("history", 1).map(Card::value),
            Some(&Value::from("second"))
        );
    }

    #[test]
    fn append_rejects_duplicates() {
        let mut h = sample();
        assert!(matches!(
            h.append(Card::new("BITPIX", 8).unwrap()),
            Err(Error::DuplicateKeyword(_))
        ));
    }

    #[test]
    fn declared_repeatable_keywords_may_repeat() {
        let mut h = sample();
        h.declare_repeatable("TAG");
        h.append(Card::new("TAG", "a").unwrap()).unwrap();
        h.append(Card::new("TAG", "b").unwrap()).unwrap();
        assert_eq!(h.occurrences("TAG"), 2);
    }

    #[test]
    fn insert_shifts_positions() {
        let mut h = sample();
        h.insert(1, Card::new("EXTEND", true).unwrap()).unwrap();
        assert_eq!(h.index("EXTEND").unwrap(), 1);
        assert_eq!(h.index("BITPIX").unwrap(), 2);
        assert!(matches!(
            h.insert(99, Card::new("LATE", 1).unwrap()),
            Err(Error::PositionOutOfRange { position: 99, .. })
        ));
    }

    #[test]
    fn rename_rules() {
        let mut h = sample();
        h.set("FILENAME", "vtest3.fits").unwrap();
        h.rename("filename", "fname").unwrap();
        assert!(h.contains("FNAME"));
        assert!(!h.contains("FILENAME"));

        assert!(matches!(
            h.rename("fname", "history"),
            Err(Error::InvalidRename { .. })
        ));
        assert!(matches!(
            h.rename("fname", "simple"),
            Err(Error::InvalidRename { .. })
        ));
        h.rename("fname", "filename").unwrap();
        assert_eq!(h.get("FILENAME"), Some(&Value::from("vtest3.fits")));
    }

    #[test]
    fn delete_removes_all_occurrences() {
        let mut h = sample();
        h.set("HISTORY", "a").unwrap();
        h.set("HISTORY", "b").unwrap();
        assert_eq!(h.delete("HISTORY").unwrap(), 2);
        assert!(matches!(h.delete("HISTORY"), Err(Error::KeywordNotFound(_))));
    }

    #[test]
    fn remove_by_position() {
        let mut h = sample();
        let removed = h.remove(0).unwrap();
        assert_eq!(removed.keyword(), "SIMPLE");
        assert_eq!(h.index("BITPIX").unwrap(), 0);
        assert!(h.remove(10).is_err());
    }

    #[test]
    fn wildcard_matching() {
        let mut h = sample();
        let names: Vec<&str> = h.matching("NAXIS*").unwrap().iter().map(|c| c.keyword()).collect();
        assert_eq!(names, ["NAXIS", "NAXIS1", "NAXIS2"]);
        assert_eq!(h.matching("naxis?").unwrap().len(), 2);
        assert_eq!(h.matching("N...2").unwrap().len(), 1);
        assert_eq!(h.delete_matching("NAXIS?").unwrap(), 2);
        assert!(h.contains("NAXIS"));
    }

    #[test]
    fn hierarch_lookup_with_or_without_prefix() {
        let mut h = Header::new();
        h.set("HIERARCH ESO DET CHIP", "CCD42").unwrap();
        assert!(h.contains("eso det chip"));
        assert!(h.contains("HIERARCH ESO DET CHIP"));
        h.set("HIERARCH ESO DET CHIP", "CCD43").unwrap();
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn extension_identity() {
        let mut h = Header::new();
        assert!(h.extension_id().is_none());
        h.set("EXTNAME", "SCI").unwrap();
        assert_eq!(h.extension_id(), Some(("SCI", 1)));
        assert!(h.is_extension("sci", Some(1)));
        h.set("EXTVER", 2).unwrap();
        assert!(h.is_extension("SCI", None));
        assert!(h.is_extension("SCI", Some(2)));
        assert!(!h.is_extension("SCI", Some(1)));
    }
}
