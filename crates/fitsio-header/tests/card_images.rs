//! Card images checked against records written by established FITS
//! writers, plus parse/render round trips.

use fitsio_header::{Card, CardKind, Error, NonStandard, Value};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn pad(s: &str) -> String {
    format!("{s:<80}")
}

fn image(lines: &[&str]) -> String {
    lines.iter().map(|l| pad(l)).collect()
}

fn fixed(text: &str) -> Card {
    let mut card = Card::parse(text).unwrap();
    card.fix().unwrap();
    card
}

// ---------------------------------------------------------------------------
// Canonical rendering
// ---------------------------------------------------------------------------

#[test]
fn commentary_cards() {
    let c = Card::new("history", "A commentary card's value has no quotes around it.").unwrap();
    assert_eq!(
        c.render(),
        pad("HISTORY A commentary card's value has no quotes around it.")
    );

    let c = Card::with_comment("comment", "A commentary card has no comment.", "comment").unwrap();
    assert_eq!(c.render(), pad("COMMENT A commentary card has no comment."));
    assert_eq!(c.comment(), None);
}

#[test]
fn undefined_value() {
    let c = Card::new("undef", Value::Undefined).unwrap();
    assert_eq!(c.render(), pad("UNDEF   ="));
}

#[test]
fn float_with_large_exponent() {
    let c = Card::new("xxx", 1.234e56).unwrap();
    assert_eq!(c.render(), pad("XXX     =            1.234E+56"));
}

#[test]
fn logical_and_string_columns() {
    let c = Card::with_comment("SIMPLE", true, "conforms to FITS standard").unwrap();
    assert_eq!(
        c.render(),
        pad("SIMPLE  =                    T / conforms to FITS standard")
    );
    let c = Card::with_comment("EXPFLAG", "NORMAL", "Exposure interruption indicator").unwrap();
    assert_eq!(
        c.render(),
        pad("EXPFLAG = 'NORMAL  '           / Exposure interruption indicator")
    );
}

#[test]
fn hierarch_cards() {
    let c = Card::new("hierarch abcdefghi", 10).unwrap();
    assert_eq!(c.kind(), CardKind::Hierarch);
    assert_eq!(c.render(), pad("HIERARCH abcdefghi = 10"));

    // One character too long with " = ", so the blank before "=" is dropped.
    let c = Card::new(
        "HIERARCH ESO INS SLIT2 Y1FRML",
        "ENC=OFFSET+RESOL*acos((WID-(MAX+MIN))/(MAX-MIN)",
    )
    .unwrap();
    assert_eq!(
        c.render(),
        "HIERARCH ESO INS SLIT2 Y1FRML= 'ENC=OFFSET+RESOL*acos((WID-(MAX+MIN))/(MAX-MIN)'"
    );
}

// ---------------------------------------------------------------------------
// CONTINUE long strings
// ---------------------------------------------------------------------------

#[test]
fn long_string_value() {
    let c = Card::with_comment("abc", "long string value ".repeat(10), &"long comment ".repeat(10))
        .unwrap();
    assert_eq!(
        c.render(),
        image(&[
            "ABC     = 'long string value long string value long string value long string &'",
            "CONTINUE  'value long string value long string value long string value long &'",
            "CONTINUE  'string value long string value long string value &'",
            "CONTINUE  '&' / long comment long comment long comment long comment long",
            "CONTINUE  '&' / comment long comment long comment long comment long comment",
            "CONTINUE  '&' / long comment",
        ])
    );
    assert_eq!(c.record_count(), 6);

    let back = Card::parse(&c.render()).unwrap();
    assert_eq!(back, c);
    assert_eq!(back.value().as_str(), Some("long string value ".repeat(10).as_str()));
}

#[test]
fn word_in_long_string_too_long() {
    let c = Card::with_comment("abc", "longstringvalue".repeat(10), &"longcomment".repeat(10))
        .unwrap();
    assert_eq!(
        c.render(),
        image(&[
            "ABC     = 'longstringvaluelongstringvaluelongstringvaluelongstringvaluelongstr&'",
            "CONTINUE  'ingvaluelongstringvaluelongstringvaluelongstringvaluelongstringvalu&'",
            "CONTINUE  'elongstringvalue&'",
            "CONTINUE  '&' / longcommentlongcommentlongcommentlongcommentlongcommentlongcomme",
            "CONTINUE  '&' / ntlongcommentlongcommentlongcommentlongcomment",
        ])
    );

    // Comment fragments that fill their record are joined without a blank.
    let back = Card::parse(&c.render()).unwrap();
    assert_eq!(back.comment(), Some("longcomment".repeat(10).as_str()));
    assert_eq!(back, c);
}

#[test]
fn long_string_value_from_records() {
    let text = image(&[
        "abc     = 'longstring''s testing  &  ' / comments in line 1",
        "continue  'continue with long string but without the ampersand at the end' /",
        "continue  'continue must have string value (with quotes)' / comments with ''. ",
    ]);
    let c = fixed(&text);
    assert_eq!(
        c.value().as_str(),
        Some(
            "longstring's testing  continue with long string but without the \
             ampersand at the endcontinue must have string value (with quotes)"
        )
    );
    assert_eq!(c.comment(), Some("comments in line 1 comments with ''."));
    assert_eq!(
        c.render(),
        image(&[
            "ABC     = 'longstring''s testing  continue with long string but without the &'",
            "CONTINUE  'ampersand at the endcontinue must have string value (with quotes)&'",
            "CONTINUE  '&' / comments in line 1 comments with ''.",
        ])
    );
}

#[test]
fn short_string_with_long_comment_round_trips() {
    let c = Card::with_comment("OBJECT", "a".repeat(60), &"note ".repeat(8)).unwrap();
    assert!(c.record_count() > 1);
    let back = Card::parse(&c.render()).unwrap();
    assert_eq!(back, c);
}

#[test]
fn canonical_rendering_is_idempotent() {
    let c = Card::with_comment("abc", "long string value ".repeat(10), "x").unwrap();
    let once = Card::parse(&c.render()).unwrap().render();
    let twice = Card::parse(&once).unwrap().render();
    assert_eq!(once, twice);
    assert_eq!(once, c.render());
}

// ---------------------------------------------------------------------------
// Non-standard input
// ---------------------------------------------------------------------------

#[test]
fn commentary_card_keeps_slash() {
    let c = Card::parse("COMMENT card has no comments. / text after slash is still part of the value.")
        .unwrap();
    assert_eq!(
        c.value().as_str(),
        Some("card has no comments. / text after slash is still part of the value.")
    );
    assert_eq!(c.comment(), None);
}

#[test]
fn commentary_card_does_not_parse_numbers() {
    assert_eq!(fixed("history  (1, 2)").render(), pad("HISTORY  (1, 2)"));
    assert_eq!(fixed("history =   (1, 2)").render(), pad("HISTORY =   (1, 2)"));
}

#[test]
fn complex_value_from_string() {
    let c = fixed("abc     = (8, 9)");
    assert_eq!(c.value(), &Value::ComplexInt(8, 9));
    assert_eq!(c.render(), pad("ABC     =               (8, 9)"));
}

#[test]
fn free_format_number_keeps_digits() {
    let c = Card::parse("abc     = +  2.1   e + 12").unwrap();
    assert_eq!(c.value(), &Value::Float(2100000000000.0));
    assert!(c.status().is_some());
    let mut c = c;
    c.fix().unwrap();
    assert_eq!(c.render(), pad("ABC     =             +2.1E+12"));
    assert_eq!(c.status(), None);
}

#[test]
fn unquoted_string_is_repaired() {
    let c = Card::parse("no_quote=  this card's value has no quotes / let's also try the comment")
        .unwrap();
    assert!(c.status().is_some());
    let mut c = c;
    c.fix().unwrap();
    assert_eq!(
        c.render(),
        pad("NO_QUOTE= 'this card''s value has no quotes' / let's also try the comment")
    );
}

#[test]
fn undefined_value_from_string() {
    assert_eq!(fixed("abc     =    ").render(), pad("ABC     ="));
}

#[test]
fn misplaced_value_indicator() {
    let c = Card::parse("xyz= 100").unwrap();
    assert_eq!(c.keyword(), "XYZ");
    assert_eq!(c.value(), &Value::Integer(100));
    assert_eq!(c.status(), Some(NonStandard::MisplacedValueIndicator));
    assert_eq!(fixed("xyz= 100").render(), pad("XYZ     =                  100"));
}

#[test]
fn unfixed_card_renders_as_read() {
    let c = Card::parse("abc= a6").unwrap();
    assert_eq!(c.render(), pad("abc= a6"));
    assert_eq!(fixed("abc= a6").render(), pad("ABC     = 'a6      '"));
}

#[test]
fn fix_rejects_control_characters() {
    let mut c = Card::parse("abc     = +  2.1   e + 12 / abcde\0").unwrap();
    assert!(matches!(c.fix(), Err(Error::InvalidValue(_))));
}
