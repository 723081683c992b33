//! Comparison and boolean operators usable as pattern leaves.
//!
//! ```
//! use kvdex::{Pattern, ops};
//!
//! let adults = Pattern::object().with("age", ops::gte(18));
//! let teens = Pattern::object()
//!     .with("age", ops::and([ops::gte(13), ops::lt(20)]));
//! # let _ = (adults, teens);
//! ```

use std::{cmp::Ordering, ops::Bound};

use crate::{
    matching,
    pattern::{Pattern, Verdict},
    value::Value,
};

#[derive(Debug, Clone)]
pub enum Operator {
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    Eq(Value),
    Neq(Value),
    /// Inclusive on both ends.
    Between(Value, Value),
    And(Vec<Pattern>),
    Or(Vec<Pattern>),
    Not(Box<Pattern>),
}

impl Operator {
    /// Test a value. Upper-bounded comparisons answer [`Verdict::Done`] once
    /// an ordered scan has passed the bound.
    pub fn test(&self, value: &Value) -> Verdict {
        match self {
            Self::Lt(t) => upper(value, t, |o| o == Ordering::Less),
            Self::Lte(t) => upper(value, t, |o| o != Ordering::Greater),
            Self::Gt(t) => lower(value, t, |o| o == Ordering::Greater),
            Self::Gte(t) => lower(value, t, |o| o != Ordering::Less),
            Self::Eq(t) => Verdict::from(value == t),
            Self::Neq(t) => Verdict::from(value != t),
            Self::Between(lo, hi) => match lower(value, lo, |o| o != Ordering::Less) {
                Verdict::Match => upper(value, hi, |o| o != Ordering::Greater),
                other => other,
            },
            Self::And(patterns) => {
                for pattern in patterns {
                    let verdict = matching::verdict(pattern, value);
                    if verdict != Verdict::Match {
                        return verdict;
                    }
                }
                Verdict::Match
            }
            Self::Or(patterns) => {
                let mut all_done = !patterns.is_empty();
                for pattern in patterns {
                    match matching::verdict(pattern, value) {
                        Verdict::Match => return Verdict::Match,
                        Verdict::NoMatch => all_done = false,
                        Verdict::Done => {}
                    }
                }
                if all_done { Verdict::Done } else { Verdict::NoMatch }
            }
            Self::Not(pattern) => {
                Verdict::from(!matching::verdict(pattern, value).is_match())
            }
        }
    }

    /// The numeric interval this operator accepts, when it is a plain
    /// comparison against a finite number. Such leaves can be answered by a
    /// range scan over the value index.
    pub fn number_range(&self) -> Option<(Bound<f64>, Bound<f64>)> {
        let finite = |v: &Value| v.as_f64().filter(|n| n.is_finite());
        match self {
            Self::Lt(t) => Some((Bound::Unbounded, Bound::Excluded(finite(t)?))),
            Self::Lte(t) => Some((Bound::Unbounded, Bound::Included(finite(t)?))),
            Self::Gt(t) => Some((Bound::Excluded(finite(t)?), Bound::Unbounded)),
            Self::Gte(t) => Some((Bound::Included(finite(t)?), Bound::Unbounded)),
            Self::Eq(t) => {
                let n = finite(t)?;
                Some((Bound::Included(n), Bound::Included(n)))
            }
            Self::Between(lo, hi) => {
                Some((Bound::Included(finite(lo)?), Bound::Included(finite(hi)?)))
            }
            _ => None,
        }
    }
}

/// Order two values of the same comparable kind.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Date(x), Value::Date(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn lower(value: &Value, bound: &Value, ok: impl Fn(Ordering) -> bool) -> Verdict {
    match compare(value, bound) {
        Some(o) => Verdict::from(ok(o)),
        None => Verdict::NoMatch,
    }
}

fn upper(value: &Value, bound: &Value, ok: impl Fn(Ordering) -> bool) -> Verdict {
    match compare(value, bound) {
        Some(o) if ok(o) => Verdict::Match,
        // Index leaves of one path are ordered for numbers and plain strings,
        // so nothing past the bound can match.
        Some(_) if matches!(bound, Value::Number(_) | Value::String(_)) => {
            Verdict::Done
        }
        _ => Verdict::NoMatch,
    }
}

pub fn lt(threshold: impl Into<Value>) -> Pattern {
    Pattern::Operator(Operator::Lt(threshold.into()))
}

pub fn lte(threshold: impl Into<Value>) -> Pattern {
    Pattern::Operator(Operator::Lte(threshold.into()))
}

pub fn gt(threshold: impl Into<Value>) -> Pattern {
    Pattern::Operator(Operator::Gt(threshold.into()))
}

pub fn gte(threshold: impl Into<Value>) -> Pattern {
    Pattern::Operator(Operator::Gte(threshold.into()))
}

pub fn eq(value: impl Into<Value>) -> Pattern {
    Pattern::Operator(Operator::Eq(value.into()))
}

pub fn neq(value: impl Into<Value>) -> Pattern {
    Pattern::Operator(Operator::Neq(value.into()))
}

pub fn between(low: impl Into<Value>, high: impl Into<Value>) -> Pattern {
    Pattern::Operator(Operator::Between(low.into(), high.into()))
}

pub fn and(patterns: impl IntoIterator<Item = Pattern>) -> Pattern {
    Pattern::Operator(Operator::And(patterns.into_iter().collect()))
}

pub fn or(patterns: impl IntoIterator<Item = Pattern>) -> Pattern {
    Pattern::Operator(Operator::Or(patterns.into_iter().collect()))
}

pub fn not(pattern: impl Into<Pattern>) -> Pattern {
    Pattern::Operator(Operator::Not(Box::new(pattern.into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test(pattern: &Pattern, value: impl Into<Value>) -> Verdict {
        matching::verdict(pattern, &value.into())
    }

    #[test]
    fn comparisons() {
        assert_eq!(test(&lt(21), 20), Verdict::Match);
        assert_eq!(test(&lt(21), 21), Verdict::Done);
        assert_eq!(test(&lte(21), 21), Verdict::Match);
        assert_eq!(test(&gt(21), 21), Verdict::NoMatch);
        assert_eq!(test(&gte(21), 21), Verdict::Match);
        assert_eq!(test(&eq("a"), "a"), Verdict::Match);
        assert_eq!(test(&neq("a"), "a"), Verdict::NoMatch);
        assert_eq!(test(&between(1, 3), 3), Verdict::Match);
        assert_eq!(test(&between(1, 3), 4), Verdict::Done);
        assert_eq!(test(&between(1, 3), 0), Verdict::NoMatch);
    }

    #[test]
    fn mismatched_kinds_never_match() {
        assert_eq!(test(&lt(21), "20"), Verdict::NoMatch);
        assert_eq!(test(&gt("a"), 5), Verdict::NoMatch);
    }

    #[test]
    fn dates_compare_by_timestamp_without_ending_scans() {
        let before = lt(Value::Date(1000));
        assert_eq!(test(&before, Value::Date(999)), Verdict::Match);
        assert_eq!(test(&before, Value::Date(1000)), Verdict::NoMatch);
    }

    #[test]
    fn combinators() {
        let teen = and([gte(13), lt(20)]);
        assert_eq!(test(&teen, 15), Verdict::Match);
        assert_eq!(test(&teen, 12), Verdict::NoMatch);
        assert_eq!(test(&teen, 20), Verdict::Done);

        let edges = or([lt(0), gt(100)]);
        assert_eq!(test(&edges, -1), Verdict::Match);
        assert_eq!(test(&edges, 50), Verdict::NoMatch);

        assert_eq!(test(&not(eq(1)), 2), Verdict::Match);
        assert_eq!(test(&not(lt(1)), 5), Verdict::Match);
    }

    #[test]
    fn number_ranges() {
        let Pattern::Operator(op) = gt(20) else {
            unreachable!()
        };
        assert_eq!(
            op.number_range(),
            Some((Bound::Excluded(20.0), Bound::Unbounded))
        );
        let Pattern::Operator(op) = lt("m") else {
            unreachable!()
        };
        assert_eq!(op.number_range(), None);
    }
}
