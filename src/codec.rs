//! Tagged encoding of non-JSON scalars.
//!
//! Records are persisted as JSON. Values JSON cannot carry are written as
//! reserved `@`-prefixed strings and recognised again on the way out:
//!
//! | value        | encoded                 |
//! |--------------|-------------------------|
//! | `Date`       | `@Date(<epoch millis>)` |
//! | `RegExp`     | `@RegExp(/<src>/<flags>)` |
//! | `NaN`        | `@NaN`                  |
//! | `±Infinity`  | `@Infinity`, `@-Infinity` |
//! | `Undefined`  | `@undefined` (opt-in)   |
//! | `Symbol`     | `@Symbol(<name>)`       |
//!
//! A string matching no tag passes through unchanged.

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Number};

use crate::{keys::KeyPart, value::Value};

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Encode a value for storage.
///
/// Undefined object fields are dropped (and undefined array slots become
/// `null`) unless `keep_undefined` is set.
pub fn encode(value: &Value, keep_undefined: bool) -> serde_json::Value {
    match value {
        Value::Undefined => serde_json::Value::String("@undefined".into()),
        Value::Array(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|item| {
                    if item.is_undefined() && !keep_undefined {
                        serde_json::Value::Null
                    } else {
                        encode(item, keep_undefined)
                    }
                })
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, item) in map {
                if item.is_undefined() && !keep_undefined {
                    continue;
                }
                out.insert(key.clone(), encode(item, keep_undefined));
            }
            serde_json::Value::Object(out)
        }
        Value::Number(n) => encode_number(*n),
        scalar => match encode_scalar(scalar) {
            Some(tagged) => serde_json::Value::String(tagged),
            None => match scalar {
                Value::Null => serde_json::Value::Null,
                Value::Bool(b) => serde_json::Value::Bool(*b),
                Value::String(s) => serde_json::Value::String(s.clone()),
                _ => serde_json::Value::Null,
            },
        },
    }
}

#[allow(clippy::cast_possible_truncation)]
fn encode_number(n: f64) -> serde_json::Value {
    if !n.is_finite() {
        return serde_json::Value::String(tag_number(n));
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return serde_json::Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

fn tag_number(n: f64) -> String {
    if n.is_nan() {
        "@NaN".to_string()
    } else if n > 0.0 {
        "@Infinity".to_string()
    } else {
        "@-Infinity".to_string()
    }
}

/// The tagged string form of a scalar JSON cannot represent, if any.
pub fn encode_scalar(value: &Value) -> Option<String> {
    match value {
        Value::Undefined => Some("@undefined".to_string()),
        Value::Number(n) if !n.is_finite() => Some(tag_number(*n)),
        Value::Date(ms) => Some(format!("@Date({ms})")),
        Value::RegExp { source, flags } => {
            Some(format!("@RegExp(/{source}/{flags})"))
        }
        Value::Symbol(name) => Some(format!("@Symbol({name})")),
        _ => None,
    }
}

/// Decode a stored JSON value, reversing the tags written by [`encode`].
pub fn decode(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::String(s) => decode_str(s),
        serde_json::Value::Array(items) => {
            Value::Array(items.into_iter().map(decode).collect())
        }
        serde_json::Value::Object(map) => Value::Object(
            map.into_iter().map(|(k, v)| (k, decode(v))).collect(),
        ),
        other => Value::from(other),
    }
}

/// Decode a single string, recognising the reserved tags.
pub fn decode_str(s: String) -> Value {
    match s.as_str() {
        "@undefined" => return Value::Undefined,
        "@NaN" => return Value::Number(f64::NAN),
        "@Infinity" => return Value::Number(f64::INFINITY),
        "@-Infinity" => return Value::Number(f64::NEG_INFINITY),
        _ => {}
    }
    if let Some(ms) = tag_body(&s, "@Date(")
        && let Ok(ms) = ms.parse::<i64>()
    {
        return Value::Date(ms);
    }
    if let Some(literal) = tag_body(&s, "@RegExp(")
        && let Some((source, flags)) = split_regex_literal(literal)
    {
        return Value::RegExp {
            source: source.to_string(),
            flags: flags.to_string(),
        };
    }
    if let Some(name) = tag_body(&s, "@Symbol(") {
        return Value::Symbol(name.to_string());
    }
    Value::String(s)
}

fn tag_body<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    s.strip_prefix(prefix)?.strip_suffix(')')
}

/// Split `/source/flags` into its parts.
pub fn split_regex_literal(literal: &str) -> Option<(&str, &str)> {
    let rest = literal.strip_prefix('/')?;
    let last = rest.rfind('/')?;
    let (source, flags) = (&rest[..last], &rest[last + 1..]);
    flags
        .chars()
        .all(|c| "gimsuyx".contains(c))
        .then_some((source, flags))
}

/// Compile a regex honouring the `i`, `m`, `s` and `x` flags. The stateful
/// `g`/`y` flags and `u` have no meaning here and are ignored.
pub fn build_regex(source: &str, flags: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(source)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .ignore_whitespace(flags.contains('x'))
        .build()
}

/// Parse a `/source/flags` string into a regex, if it is one.
pub fn parse_regex_literal(literal: &str) -> Option<Regex> {
    let (source, flags) = split_regex_literal(literal)?;
    build_regex(source, flags).ok()
}

/// The index leaf for a scalar. Containers and undefined have none.
pub fn leaf_part(value: &Value) -> Option<KeyPart> {
    match value {
        Value::Undefined | Value::Array(_) | Value::Object(_) => None,
        Value::Null => Some(KeyPart::Null),
        Value::Bool(b) => Some(KeyPart::Bool(*b)),
        Value::Number(n) if !n.is_nan() => Some(KeyPart::Number(*n)),
        Value::String(s) => Some(KeyPart::Text(s.clone())),
        scalar => encode_scalar(scalar).map(KeyPart::Text),
    }
}

/// The decoded value of an index leaf.
pub fn leaf_value(part: &KeyPart) -> Value {
    match part {
        KeyPart::Null => Value::Null,
        KeyPart::Bool(b) => Value::Bool(*b),
        KeyPart::Number(n) => Value::Number(*n),
        KeyPart::Text(s) | KeyPart::Segment(s) => decode_str(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: &Value) -> Value {
        decode(encode(value, true))
    }

    #[test]
    fn special_scalars_round_trip() {
        for value in [
            Value::Date(1_700_000_000_000),
            Value::Date(-5),
            Value::RegExp {
                source: "a/b+c".into(),
                flags: "gi".into(),
            },
            Value::Number(f64::NAN),
            Value::Number(f64::INFINITY),
            Value::Number(f64::NEG_INFINITY),
            Value::Undefined,
            Value::Symbol("token".into()),
        ] {
            assert_eq!(round_trip(&value), value, "{value:?}");
        }
    }

    #[test]
    fn tags_have_documented_form() {
        assert_eq!(encode(&Value::Date(42), false), "@Date(42)");
        assert_eq!(
            encode(
                &Value::RegExp {
                    source: "x".into(),
                    flags: "i".into()
                },
                false
            ),
            "@RegExp(/x/i)"
        );
        assert_eq!(encode(&Value::Symbol("s".into()), false), "@Symbol(s)");
        assert_eq!(encode(&Value::Number(f64::NAN), false), "@NaN");
    }

    #[test]
    fn infinities_are_ordered_number_leaves() {
        assert_eq!(
            leaf_part(&Value::Number(f64::INFINITY)),
            Some(KeyPart::Number(f64::INFINITY))
        );
        assert_eq!(
            leaf_part(&Value::Number(f64::NEG_INFINITY)),
            Some(KeyPart::Number(f64::NEG_INFINITY))
        );
        assert_eq!(
            leaf_part(&Value::Number(f64::NAN)),
            Some(KeyPart::Text("@NaN".into()))
        );
    }

    #[test]
    fn undefined_fields_dropped_unless_kept() {
        let value = Value::object()
            .with("a", 1)
            .with("b", Value::Undefined);
        let dropped = encode(&value, false);
        assert_eq!(dropped, serde_json::json!({"a": 1}));

        let kept = encode(&value, true);
        assert_eq!(kept, serde_json::json!({"a": 1, "b": "@undefined"}));
        assert_eq!(decode(kept), value);
    }

    #[test]
    fn untagged_strings_pass_through() {
        for s in ["hello", "@Date(abc)", "@Other(1)", "@RegExp(nope)", "@"] {
            assert_eq!(decode_str(s.to_string()), Value::String(s.into()));
        }
    }

    #[test]
    fn integers_stay_integers() {
        assert_eq!(encode(&Value::Number(21.0), false), serde_json::json!(21));
        assert_eq!(encode(&Value::Number(2.5), false), serde_json::json!(2.5));
    }

    #[test]
    fn regex_literals_parse_with_flags() {
        let re = parse_regex_literal("/^jo/i").unwrap();
        assert!(re.is_match("Joe"));
        assert!(parse_regex_literal("plain").is_none());
        assert!(parse_regex_literal("/x/q").is_none());
    }

    #[test]
    fn leaves_round_trip_through_key_parts() {
        for value in [
            Value::Null,
            Value::Bool(false),
            Value::Number(3.5),
            Value::from("joe"),
            Value::Date(7),
            Value::Number(f64::INFINITY),
        ] {
            let part = leaf_part(&value).unwrap();
            assert_eq!(leaf_value(&part), value);
        }
        assert!(leaf_part(&Value::Undefined).is_none());
        assert!(leaf_part(&Value::object()).is_none());
    }
}
