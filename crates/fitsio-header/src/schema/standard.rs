//! Schemas for the mandatory keywords of standard FITS header units.

use std::sync::LazyLock;

use super::datetime::fits_datetime;
use super::property::{
    IndexSource, KeywordContext, KeywordProperties, Position, PositionRule, ValueTest, ValueType,
};
use super::Schema;
use crate::error::{Property, SchemaError};
use crate::header::Header;
use crate::value::Value;

const BITPIX_VALUES: &[i64] = &[8, 16, 32, 64, -32, -64];

fn props() -> KeywordProperties {
    KeywordProperties::new()
}

/// Position `offset + NAXIS` when NAXIS is a usable integer.
fn after_axes(offset: i64) -> PositionRule {
    PositionRule::predicate(move |ctx: &KeywordContext<'_>| {
        match ctx.header.get("NAXIS").and_then(Value::as_i64) {
            Some(naxis) if naxis >= 0 => Position::At(offset + naxis),
            _ => Position::Valid(true),
        }
    })
}

fn xtension_is(name: &'static str) -> ValueTest {
    ValueTest::all([
        ValueTest::Type(ValueType::String),
        ValueTest::predicate(move |v, _| v.as_str().is_some_and(|s| s.trim_end() == name)),
    ])
}

static BASE: LazyLock<Schema> = LazyLock::new(|| {
    Schema::builder("BaseSchema")
        .keyword(
            "BITPIX",
            props()
                .mandatory(true)
                .position(1)
                .value(ValueTest::integer_of(BITPIX_VALUES)),
        )
        .keyword(
            "NAXIS",
            props()
                .mandatory(true)
                .position(2)
                .value(ValueTest::integer_in(0..=999)),
        )
        .keyword(
            "NAXISn",
            props()
                .index("n", IndexSource::counted_by("NAXIS"))
                .mandatory(true)
                .position(PositionRule::predicate(|ctx| {
                    Position::At(2 + ctx.index_int('n').unwrap_or(0))
                }))
                .value(ValueTest::integer_in(0..=i64::MAX)),
        )
        .keyword("BLOCKED", props().valid(false).value(ValueType::Logical))
        .keyword("DATE", props().value(fits_datetime()))
        .keyword(
            "DATEx",
            props()
                .index("x", IndexSource::suffixes("DATE"))
                .value(fits_datetime()),
        )
        .build()
        .expect("base schema declarations are well formed")
});

static PRIMARY: LazyLock<Schema> = LazyLock::new(|| {
    Schema::builder("PrimarySchema")
        .extends(base())
        .keyword("SIMPLE", props().mandatory(true).position(0).value(true))
        .keyword("EXTEND", props().value(ValueType::Logical))
        .keyword("BLOCKED", props().valid(true))
        .keyword("XTENSION", props().valid(false))
        .build()
        .expect("primary schema declarations are well formed")
});

static EXTENSION: LazyLock<Schema> = LazyLock::new(|| {
    Schema::builder("ExtensionSchema")
        .extends(base())
        .keyword(
            "XTENSION",
            props().mandatory(true).position(0).value(ValueType::String),
        )
        .keyword(
            "PCOUNT",
            props()
                .mandatory(true)
                .position(after_axes(3))
                .value(ValueTest::integer_in(0..=i64::MAX)),
        )
        .keyword(
            "GCOUNT",
            props()
                .mandatory(true)
                .position(after_axes(4))
                .value(ValueTest::integer_in(1..=i64::MAX)),
        )
        .keyword("SIMPLE", props().valid(false))
        .build()
        .expect("extension schema declarations are well formed")
});

static IMAGE_EXTENSION: LazyLock<Schema> = LazyLock::new(|| {
    Schema::builder("ImageExtensionSchema")
        .extends(extension())
        .keyword("XTENSION", props().value(xtension_is("IMAGE")))
        .keyword("PCOUNT", props().value(0))
        .keyword("GCOUNT", props().value(1))
        .build()
        .expect("image extension schema declarations are well formed")
});

/// Keywords shared by both table flavours.
static TABLE: LazyLock<Schema> = LazyLock::new(|| {
    Schema::builder("TableSchema")
        .extends(extension())
        .keyword("BITPIX", props().value(8))
        .keyword("NAXIS", props().value(2))
        .keyword("GCOUNT", props().value(1))
        .keyword(
            "TFIELDS",
            props()
                .mandatory(true)
                .position(after_axes(5))
                .value(ValueTest::integer_in(0..=999)),
        )
        .keyword(
            "TFORMn",
            props()
                .index("n", IndexSource::counted_by("TFIELDS"))
                .mandatory(true)
                .value(ValueType::String),
        )
        .build()
        .expect("table schema declarations are well formed")
});

static ASCII_TABLE: LazyLock<Schema> = LazyLock::new(|| {
    Schema::builder("AsciiTableSchema")
        .extends(&TABLE)
        .keyword("XTENSION", props().value(xtension_is("TABLE")))
        .keyword("PCOUNT", props().value(0))
        .keyword(
            "TBCOLn",
            props()
                .index("n", IndexSource::counted_by("TFIELDS"))
                .mandatory(true)
                .value(ValueTest::integer_in(1..=i64::MAX)),
        )
        .build()
        .expect("ASCII table schema declarations are well formed")
});

static BINARY_TABLE: LazyLock<Schema> = LazyLock::new(|| {
    Schema::builder("BinaryTableSchema")
        .extends(&TABLE)
        .keyword("XTENSION", props().value(xtension_is("BINTABLE")))
        .build()
        .expect("binary table schema declarations are well formed")
});

/// Keywords common to every header unit.
pub fn base() -> &'static Schema {
    &BASE
}

pub fn primary() -> &'static Schema {
    &PRIMARY
}

/// Keywords common to every extension.
pub fn extension() -> &'static Schema {
    &EXTENSION
}

pub fn image_extension() -> &'static Schema {
    &IMAGE_EXTENSION
}

pub fn ascii_table() -> &'static Schema {
    &ASCII_TABLE
}

pub fn binary_table() -> &'static Schema {
    &BINARY_TABLE
}

/// Standard header unit types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HduType {
    Primary,
    Image,
    AsciiTable,
    BinaryTable,
}

impl HduType {
    /// Identify the unit type from SIMPLE or XTENSION.
    pub fn detect(header: &Header) -> Option<HduType> {
        if header.contains("SIMPLE") {
            return Some(HduType::Primary);
        }
        match header.get("XTENSION")?.as_str()?.trim_end() {
            "IMAGE" => Some(HduType::Image),
            "TABLE" => Some(HduType::AsciiTable),
            "BINTABLE" => Some(HduType::BinaryTable),
            _ => None,
        }
    }

    pub fn schema(self) -> &'static Schema {
        match self {
            HduType::Primary => primary(),
            HduType::Image => image_extension(),
            HduType::AsciiTable => ascii_table(),
            HduType::BinaryTable => binary_table(),
        }
    }

    /// Detect the unit type and validate the header against its schema.
    pub fn validate(header: &Header) -> Result<HduType, SchemaError> {
        let Some(kind) = HduType::detect(header) else {
            let (keyword, property, message) = match header.get("XTENSION") {
                Some(value) => (
                    "XTENSION",
                    Property::Value,
                    format!("unrecognized extension type {value}"),
                ),
                None => (
                    "SIMPLE",
                    Property::Mandatory,
                    String::from("header has neither SIMPLE nor XTENSION"),
                ),
            };
            return Err(SchemaError::validation("StandardSchema", keyword, property, message));
        };
        kind.schema().validate(header)?;
        Ok(kind)
    }
}
