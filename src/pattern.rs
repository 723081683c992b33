//! Query patterns.
//!
//! A pattern mirrors the shape of the records it matches. Leaves are
//! literals, regexes, predicates or operators; nested patterns recurse into
//! objects and arrays.

use std::{fmt, sync::Arc};

use regex::Regex;

use crate::{codec, ops::Operator, value::Value};

/// Outcome of testing a value against a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Match,
    NoMatch,
    /// No match, and no later value in the same ordered index scan can match
    /// either. Outside of scans this is the same as `NoMatch`.
    Done,
}

impl Verdict {
    pub fn is_match(self) -> bool {
        self == Self::Match
    }
}

impl From<bool> for Verdict {
    fn from(matched: bool) -> Self {
        if matched { Self::Match } else { Self::NoMatch }
    }
}

pub type Predicate = Arc<dyn Fn(&Value) -> Verdict + Send + Sync>;

/// A property selector inside a nested pattern.
#[derive(Debug, Clone)]
pub enum PatternKey {
    Name(String),
    /// Matches every property whose name matches the regex.
    Dynamic(Regex),
}

impl PatternKey {
    /// A `/source/flags` string becomes a dynamic key, anything else a name.
    pub fn parse(key: &str) -> Self {
        codec::parse_regex_literal(key)
            .map_or_else(|| Self::Name(key.to_string()), Self::Dynamic)
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Name(n) => n == name,
            Self::Dynamic(re) => re.is_match(name),
        }
    }
}

impl From<&str> for PatternKey {
    fn from(key: &str) -> Self {
        Self::Name(key.to_string())
    }
}

impl From<String> for PatternKey {
    fn from(key: String) -> Self {
        Self::Name(key)
    }
}

impl From<usize> for PatternKey {
    fn from(index: usize) -> Self {
        Self::Name(index.to_string())
    }
}

impl From<Regex> for PatternKey {
    fn from(re: Regex) -> Self {
        Self::Dynamic(re)
    }
}

#[derive(Clone)]
pub enum Pattern {
    /// A scalar that must compare equal. Dates compare by timestamp.
    Literal(Value),
    /// Matches strings (and numbers/booleans through their text form).
    Regex(Regex),
    Predicate(Predicate),
    /// Every listed key must match, in order.
    Nested(Vec<(PatternKey, Pattern)>),
    Operator(Operator),
}

impl Pattern {
    /// An empty nested pattern, extended with [`Pattern::with`].
    pub fn object() -> Self {
        Self::Nested(Vec::new())
    }

    pub fn with(
        mut self,
        key: impl Into<PatternKey>,
        pattern: impl Into<Pattern>,
    ) -> Self {
        if !matches!(self, Self::Nested(_)) {
            self = Self::object();
        }
        if let Self::Nested(fields) = &mut self {
            fields.push((key.into(), pattern.into()));
        }
        self
    }

    /// A predicate leaf from a boolean test.
    pub fn test<F>(f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(move |v| Verdict::from(f(v))))
    }

    /// A predicate leaf that may end an ordered scan early.
    pub fn verdict<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Verdict + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    /// Matches any value that is present.
    pub fn any() -> Self {
        Self::test(|v| !v.is_undefined())
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Self::Regex(re) => f.debug_tuple("Regex").field(re).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
            Self::Nested(fields) => f.debug_tuple("Nested").field(fields).finish(),
            Self::Operator(op) => f.debug_tuple("Operator").field(op).finish(),
        }
    }
}

/// Objects and arrays become nested patterns; scalars become literals.
impl From<Value> for Pattern {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Nested(
                map.into_iter()
                    .map(|(k, v)| (PatternKey::parse(&k), Self::from(v)))
                    .collect(),
            ),
            Value::Array(items) => Self::Nested(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (PatternKey::from(i), Self::from(v)))
                    .collect(),
            ),
            scalar => Self::Literal(scalar),
        }
    }
}

impl From<serde_json::Value> for Pattern {
    fn from(json: serde_json::Value) -> Self {
        Self::from(Value::from(json))
    }
}

impl From<Regex> for Pattern {
    fn from(re: Regex) -> Self {
        Self::Regex(re)
    }
}

impl From<Operator> for Pattern {
    fn from(op: Operator) -> Self {
        Self::Operator(op)
    }
}

macro_rules! literal_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Pattern {
            fn from(v: $t) -> Self {
                Self::Literal(Value::from(v))
            }
        })*
    };
}

literal_from!(bool, f64, i32, i64, u32, u64, usize, &str, String);
