use tracing::debug;

use super::placeholder_chars;
use super::property::{
    IndexValue, KeywordContext, KeywordProperties, Position, PositionRule, ValueTest,
};
use super::Schema;
use crate::error::{Property, SchemaError};
use crate::header::Header;
use crate::value::Value;

/// Upper bound on the concrete keywords one template may expand to.
pub const MAX_EXPANSION: usize = 100_000;

type Expansion = Vec<(String, Vec<(char, IndexValue)>)>;

impl Schema {
    /// Check `header` against every rule of the schema.
    ///
    /// Stops at the first unmet rule. A [`SchemaError::Validation`] names the
    /// keyword and property; a [`SchemaError::Definition`] means a predicate
    /// in the schema itself failed or misbehaved.
    pub fn validate(&self, header: &Header) -> Result<(), SchemaError> {
        debug!(schema = %self.name, cards = header.len(), "validating header");
        for (template, props) in &self.keywords {
            for (keyword, indices) in self.expand(template, props, header)? {
                let ctx = KeywordContext {
                    keyword: &keyword,
                    header,
                    indices: &indices,
                };
                self.check_keyword(props, &ctx)?;
            }
        }
        Ok(())
    }

    /// Concrete keywords a template stands for in this header.
    fn expand(
        &self,
        template: &str,
        props: &KeywordProperties,
        header: &Header,
    ) -> Result<Expansion, SchemaError> {
        let Some(indices) = props.indices() else {
            return Ok(vec![(String::from(template), Vec::new())]);
        };
        let chars = placeholder_chars(&self.name, template, Some(indices))?;

        let mut slots: Vec<(usize, char, Vec<IndexValue>)> = Vec::with_capacity(chars.len());
        for (ch, (_, source)) in chars.iter().zip(indices) {
            let values = source.resolve(template, header).map_err(|e| {
                SchemaError::definition(
                    &self.name,
                    format!("the function used to determine the '{ch}' indices for '{template}' failed: {e}"),
                )
            })?;
            let first = template.find(*ch).unwrap_or(0);
            slots.push((first, *ch, values));
        }
        slots.sort_by_key(|(first, _, _)| *first);

        let total = slots
            .iter()
            .try_fold(1usize, |acc, (_, _, v)| acc.checked_mul(v.len()))
            .filter(|n| *n <= MAX_EXPANSION)
            .ok_or_else(|| {
                SchemaError::definition(
                    &self.name,
                    format!("keyword template '{template}' expands to more than {MAX_EXPANSION} keywords"),
                )
            })?;
        debug!(schema = %self.name, template, keywords = total, "expanding indexed keyword");

        let mut out = Vec::with_capacity(total);
        if total == 0 {
            return Ok(out);
        }
        // Odometer over the slots; the first placeholder varies slowest.
        let mut counters = vec![0usize; slots.len()];
        loop {
            let assignment: Vec<(char, IndexValue)> = slots
                .iter()
                .zip(&counters)
                .map(|((_, ch, values), &i)| (*ch, values[i].clone()))
                .collect();
            out.push((substitute(template, &assignment), assignment));

            let mut slot = slots.len();
            loop {
                if slot == 0 {
                    return Ok(out);
                }
                slot -= 1;
                counters[slot] += 1;
                if counters[slot] < slots[slot].2.len() {
                    break;
                }
                counters[slot] = 0;
            }
        }
    }

    fn check_keyword(
        &self,
        props: &KeywordProperties,
        ctx: &KeywordContext<'_>,
    ) -> Result<(), SchemaError> {
        let keyword = ctx.keyword;
        let position = ctx.header.position(keyword);

        if let Some(rule) = props.mandatory_rule() {
            let mandatory = rule
                .evaluate(ctx)
                .map_err(|e| self.predicate_failed(Property::Mandatory, keyword, &e))?;
            if mandatory && position.is_none() {
                return Err(self.violation(
                    keyword,
                    Property::Mandatory,
                    format!("mandatory keyword '{keyword}' missing from header"),
                ));
            }
        }
        let Some(actual) = position else {
            return Ok(());
        };

        if let Some(rule) = props.valid_rule() {
            let valid = rule
                .evaluate(ctx)
                .map_err(|e| self.predicate_failed(Property::Valid, keyword, &e))?;
            if !valid {
                return Err(self.violation(
                    keyword,
                    Property::Valid,
                    format!("keyword '{keyword}' is invalid in this header"),
                ));
            }
        }

        if let Some(rule) = props.position_rule() {
            self.check_position(rule, ctx, actual)?;
        }

        if let Some(test) = props.value_test() {
            let value = ctx.header.get(keyword).unwrap_or(&Value::Undefined);
            self.check_value(test, value, ctx)?;
        }
        Ok(())
    }

    fn check_position(
        &self,
        rule: &PositionRule,
        ctx: &KeywordContext<'_>,
        actual: usize,
    ) -> Result<(), SchemaError> {
        let keyword = ctx.keyword;
        let outcome = rule
            .evaluate(ctx)
            .map_err(|e| self.predicate_failed(Property::Position, keyword, &e))?;
        match outcome {
            Position::At(required) if required < 0 => Err(SchemaError::definition(
                &self.name,
                format!(
                    "the position rule for keyword '{keyword}' must give a non-negative position \
                     or a validity flag; returned {required} instead"
                ),
            )),
            Position::At(required) if required as u64 != actual as u64 => Err(self.violation(
                keyword,
                Property::Position,
                format!(
                    "keyword '{keyword}' is required to have position {required} in the header; \
                     instead it was found in position {actual} (note: position is zero-indexed)"
                ),
            )),
            Position::Valid(false) => Err(self.violation(
                keyword,
                Property::Position,
                format!("keyword '{keyword}' is not in a valid position in the header (found in position {actual})"),
            )),
            Position::At(_) | Position::Valid(true) => Ok(()),
        }
    }

    fn check_value(
        &self,
        test: &ValueTest,
        value: &Value,
        ctx: &KeywordContext<'_>,
    ) -> Result<(), SchemaError> {
        let keyword = ctx.keyword;
        match test {
            ValueTest::Literal(expected) => {
                if literal_matches(expected, value) {
                    return Ok(());
                }
                Err(self.violation(
                    keyword,
                    Property::Value,
                    format!("keyword '{keyword}' is required to have the value {expected}; got {value} instead"),
                ))
            }
            ValueTest::Type(kind) => {
                if kind.accepts(value) {
                    return Ok(());
                }
                Err(self.violation(
                    keyword,
                    Property::Value,
                    format!(
                        "keyword '{keyword}' is required to have a value of type {kind}; \
                         got a value of type {} instead",
                        value.type_name()
                    ),
                ))
            }
            ValueTest::Predicate(f) => match f(value, ctx) {
                Ok(true) => Ok(()),
                Ok(false) => Err(self.violation(
                    keyword,
                    Property::Value,
                    format!("the value {value} of keyword '{keyword}' failed validation"),
                )),
                Err(e) => Err(self.predicate_failed(Property::Value, keyword, &e)),
            },
            ValueTest::All(tests) => tests
                .iter()
                .try_for_each(|t| self.check_value(t, value, ctx)),
        }
    }

    fn violation(&self, keyword: &str, property: Property, message: String) -> SchemaError {
        SchemaError::validation(&self.name, keyword, property, message)
    }

    fn predicate_failed(&self, property: Property, keyword: &str, error: &str) -> SchemaError {
        SchemaError::definition(
            &self.name,
            format!("an error occurred in the {property} function for keyword '{keyword}': {error}"),
        )
    }
}

fn substitute(template: &str, assignment: &[(char, IndexValue)]) -> String {
    let mut out = String::with_capacity(template.len() + 4);
    for c in template.chars() {
        match assignment.iter().find(|(ch, _)| *ch == c) {
            Some((_, value)) => out.push_str(&value.to_string()),
            None => out.push(c),
        }
    }
    out
}

/// Literal comparison. Logicals are never equal to numbers, integers compare
/// exactly, and other numbers compare as complex pairs.
fn literal_matches(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Logical(a), Value::Logical(b)) => a == b,
        (Value::Logical(_), _) | (_, Value::Logical(_)) => false,
        (Value::Integer(a), Value::Integer(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Undefined, Value::Undefined) => true,
        _ => match (expected.as_complex(), actual.as_complex()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}
