//! Date and time literals as allowed in DATE and DATExxxx keywords.
//!
//! Three forms are accepted: `YYYY-MM-DD`, `YYYY-MM-DDThh:mm:ss[.fff]`, and
//! the legacy `DD/MM/YY`, where `YY` below 69 is read as 20YY and the rest as
//! 19YY. Each must name a real calendar date and time.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

use super::property::{KeywordContext, ValueTest, ValueType};
use crate::value::Value;

static DATETIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?P<date>[0-9]{4}-[01][0-9]-[0-3][0-9])|(?P<datetime>[0-9]{4}-[01][0-9]-[0-3][0-9]T[012][0-9]:[0-5][0-9]:[0-5][0-9])(?:\.[0-9]+)?|(?P<legacy>[0-3][0-9]/[01][0-9]/[0-9]{2}))$",
    )
    .expect("datetime pattern is valid")
});

/// Returns `true` if `text` is a FITS date or date-time literal naming a
/// real calendar instant.
pub fn is_fits_datetime(text: &str) -> bool {
    let Some(caps) = DATETIME_RE.captures(text) else {
        return false;
    };
    if let Some(m) = caps.name("date") {
        return NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d").is_ok();
    }
    if let Some(m) = caps.name("datetime") {
        return NaiveDateTime::parse_from_str(m.as_str(), "%Y-%m-%dT%H:%M:%S").is_ok();
    }
    if let Some(m) = caps.name("legacy") {
        let (day_month, yy) = m.as_str().split_at(6);
        let century = if yy < "69" { "20" } else { "19" };
        return NaiveDate::parse_from_str(&format!("{day_month}{century}{yy}"), "%d/%m/%Y").is_ok();
    }
    false
}

/// Value predicate for schemas: the value is a string holding a FITS
/// date-time literal.
pub fn validate_fits_datetime(value: &Value, _ctx: &KeywordContext<'_>) -> bool {
    value.as_str().is_some_and(is_fits_datetime)
}

/// `string` type test followed by [`validate_fits_datetime`].
pub fn fits_datetime() -> ValueTest {
    ValueTest::all([
        ValueTest::Type(ValueType::String),
        ValueTest::predicate(validate_fits_datetime),
    ])
}
