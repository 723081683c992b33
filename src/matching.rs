//! Authoritative verification of decoded records against patterns.
//!
//! Index scans admit false positives (tokenized strings, predicate leaves
//! resolved per token, pruned paths); every candidate is re-checked here.

use crate::{
    pattern::{Pattern, PatternKey, Verdict},
    value::Value,
};

/// Does `value` satisfy `pattern`?
pub fn match_value(pattern: &Pattern, value: &Value) -> bool {
    verdict(pattern, value).is_match()
}

/// Like [`match_value`], keeping the scan hint of predicate leaves.
pub fn verdict(pattern: &Pattern, value: &Value) -> Verdict {
    match pattern {
        Pattern::Literal(expected) => Verdict::from(literal(expected, value)),
        Pattern::Regex(re) => Verdict::from(
            value.coerce_str().is_some_and(|s| re.is_match(&s)),
        ),
        Pattern::Predicate(f) => f(value),
        Pattern::Operator(op) => op.test(value),
        Pattern::Nested(fields) => Verdict::from(nested(fields, value)),
    }
}

fn literal(expected: &Value, value: &Value) -> bool {
    match (expected, value) {
        (Value::Date(a), Value::Date(b)) => a == b,
        // An undefined literal matches a missing property.
        (Value::Undefined, actual) => actual.is_undefined(),
        _ => expected == value,
    }
}

fn nested(fields: &[(PatternKey, Pattern)], value: &Value) -> bool {
    if !value.is_container() {
        return false;
    }
    fields.iter().all(|(key, pattern)| match key {
        PatternKey::Name(name) => {
            let child = value.get(name).unwrap_or(&Value::Undefined);
            match_value(pattern, child)
        }
        PatternKey::Dynamic(re) => value
            .children()
            .into_iter()
            .filter(|(name, _)| re.is_match(name))
            .all(|(_, child)| match_value(pattern, child)),
    })
}
