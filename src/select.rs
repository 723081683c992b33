//! Projection of matched records.

use std::{fmt, sync::Arc};

use regex::Regex;

use crate::{pattern::PatternKey, value::Value};

/// Where a projected value sits in the record being projected.
#[derive(Debug, Clone, Copy)]
pub struct SelectContext<'a> {
    pub root: &'a Value,
    pub parent: Option<&'a Value>,
    pub key: Option<&'a str>,
}

/// Result of a projection function.
#[derive(Debug, Clone, PartialEq)]
pub enum Selected {
    Value(Value),
    /// Leave the field out of the projection.
    Omit,
}

pub type SelectFn =
    Arc<dyn Fn(&Value, &SelectContext<'_>) -> Selected + Send + Sync>;

#[derive(Clone)]
pub enum Projection {
    /// Copy the value through unchanged.
    All,
    /// Keep the value only if it equals the literal.
    Literal(Value),
    /// Keep capture group 1 of a string value.
    Regex(Regex),
    Function(SelectFn),
    /// Keep only the named properties, each projected further. Over an
    /// array the names are indexes; selected elements keep their positions,
    /// unselected ones before the last selected become `Undefined`.
    Nested(Vec<(PatternKey, Projection)>),
}

impl Projection {
    pub fn object() -> Self {
        Self::Nested(Vec::new())
    }

    pub fn with(
        mut self,
        key: impl Into<PatternKey>,
        projection: impl Into<Projection>,
    ) -> Self {
        if !matches!(self, Self::Nested(_)) {
            self = Self::object();
        }
        if let Self::Nested(fields) = &mut self {
            fields.push((key.into(), projection.into()));
        }
        self
    }

    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&Value, &SelectContext<'_>) -> Selected + Send + Sync + 'static,
    {
        Self::Function(Arc::new(f))
    }

    /// A projection function that always produces a value.
    pub fn map<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Self::function(move |v, _| Selected::Value(f(v)))
    }
}

impl fmt::Debug for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Self::Regex(re) => f.debug_tuple("Regex").field(re).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
            Self::Nested(fields) => f.debug_tuple("Nested").field(fields).finish(),
        }
    }
}

impl From<Regex> for Projection {
    fn from(re: Regex) -> Self {
        Self::Regex(re)
    }
}

impl From<Value> for Projection {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

impl From<bool> for Projection {
    /// `true` keeps a field as is; `false` keeps it only if it is `false`.
    fn from(keep: bool) -> Self {
        if keep { Self::All } else { Self::Literal(Value::Bool(false)) }
    }
}

/// Project `value`. The source is only read; the result is a fresh value.
///
/// Returns `None` when the projection omits the value entirely.
pub fn select(value: &Value, projection: &Projection) -> Option<Value> {
    let ctx = SelectContext {
        root: value,
        parent: None,
        key: None,
    };
    select_at(value, projection, &ctx)
}

fn select_at(
    value: &Value,
    projection: &Projection,
    ctx: &SelectContext<'_>,
) -> Option<Value> {
    match projection {
        Projection::All => Some(value.clone()),
        Projection::Literal(expected) => {
            (expected == value).then(|| value.clone())
        }
        Projection::Regex(re) => {
            let text = value.as_str()?;
            let captures = re.captures(text)?;
            captures.get(1).map(|m| Value::from(m.as_str()))
        }
        Projection::Function(f) => match f(value, ctx) {
            Selected::Value(v) => Some(v),
            Selected::Omit => None,
        },
        Projection::Nested(fields) => {
            let selected = matching_children(value, fields)
                .into_iter()
                .filter_map(|(name, child, sub)| {
                    let child_ctx = SelectContext {
                        root: ctx.root,
                        parent: Some(value),
                        key: Some(name.as_str()),
                    };
                    let projected = select_at(child, sub, &child_ctx)?;
                    Some((name, projected))
                });
            match value {
                Value::Object(_) => Some(Value::Object(selected.collect())),
                Value::Array(_) => {
                    let mut items = Vec::new();
                    for (name, item) in selected {
                        let Ok(index) = name.parse::<usize>() else {
                            continue;
                        };
                        if index >= items.len() {
                            items.resize(index + 1, Value::Undefined);
                        }
                        items[index] = item;
                    }
                    Some(Value::Array(items))
                }
                _ => None,
            }
        }
    }
}

/// Pair each projected field with the source children it names, in
/// projection order. A missing named field is only offered to projection
/// functions, which may synthesize it.
fn matching_children<'v, 'p>(
    value: &'v Value,
    fields: &'p [(PatternKey, Projection)],
) -> Vec<(String, &'v Value, &'p Projection)> {
    let mut out = Vec::new();
    for (key, projection) in fields {
        match key {
            PatternKey::Name(name) => match value.get(name) {
                Some(child) => out.push((name.clone(), child, projection)),
                None if matches!(projection, Projection::Function(_)) => {
                    out.push((name.clone(), &Value::Undefined, projection));
                }
                None => {}
            },
            PatternKey::Dynamic(re) => {
                for (name, child) in value.children() {
                    if re.is_match(&name) {
                        out.push((name, child, projection));
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn person() -> Value {
        Value::from(json!({
            "name": "joe",
            "age": 21,
            "address": {"city": "New York", "state": "NY"},
        }))
    }

    #[test]
    fn unnamed_properties_are_dropped() {
        let projection = Projection::object().with("name", true);
        assert_eq!(
            select(&person(), &projection),
            Some(Value::object().with("name", "joe"))
        );
    }

    #[test]
    fn function_receives_context_and_can_omit() {
        let projection = Projection::object()
            .with(
                "greeting",
                Projection::function(|_, ctx| {
                    let name = ctx.root.get("name").and_then(Value::as_str);
                    Selected::Value(Value::from(format!("hi {}", name.unwrap_or("?"))))
                }),
            )
            .with("age", Projection::function(|_, _| Selected::Omit));
        assert_eq!(
            select(&person(), &projection),
            Some(Value::object().with("greeting", "hi joe"))
        );
    }

    #[test]
    fn parent_and_key_are_reported() {
        let projection = Projection::object().with(
            "address",
            Projection::object().with(
                "city",
                Projection::function(|_, ctx| {
                    let state = ctx.parent.and_then(|p| p.get("state")).cloned();
                    assert_eq!(ctx.key, Some("city"));
                    Selected::Value(state.unwrap_or_default())
                }),
            ),
        );
        assert_eq!(
            select(&person(), &projection),
            Some(Value::object().with("address", Value::object().with("city", "NY")))
        );
    }

    #[test]
    fn regex_captures_group_one() {
        let projection = Projection::object()
            .with("address", Projection::object().with("city", Regex::new(r"New (\w+)").unwrap()));
        assert_eq!(
            select(&person(), &projection),
            Some(Value::object().with("address", Value::object().with("city", "York")))
        );
    }

    #[test]
    fn literal_keeps_only_equal_values() {
        let projection = Projection::object()
            .with("name", Value::from("joe"))
            .with("age", Value::from(22));
        assert_eq!(
            select(&person(), &projection),
            Some(Value::object().with("name", "joe"))
        );
    }

    #[test]
    fn dynamic_keys_select_many() {
        let projection = Projection::object().with(
            "address",
            Projection::object().with(Regex::new("^(city|state)$").unwrap(), true),
        );
        let selected = select(&person(), &projection).unwrap();
        assert_eq!(selected.get_path(&["address", "state"]), Some(&Value::from("NY")));
        assert_eq!(
            selected.get_path(&["address", "city"]),
            Some(&Value::from("New York"))
        );
    }

    #[test]
    fn array_elements_keep_their_positions() {
        let tags = Value::from(json!(["a", "b", "c", "d"]));
        let second = Projection::object().with(1usize, true);
        assert_eq!(
            select(&tags, &second),
            Some(Value::Array(vec![Value::Undefined, Value::from("b")]))
        );

        let ends = Projection::object().with(Regex::new("^(0|3)$").unwrap(), true);
        assert_eq!(
            select(&tags, &ends),
            Some(Value::Array(vec![
                Value::from("a"),
                Value::Undefined,
                Value::Undefined,
                Value::from("d"),
            ]))
        );
        assert_eq!(
            select(&tags, &Projection::object().with(9usize, true)),
            Some(Value::Array(Vec::new()))
        );
    }

    #[test]
    fn root_function_replaces_value() {
        let projection = Projection::map(|v| v.get("name").cloned().unwrap_or_default());
        assert_eq!(select(&person(), &projection), Some(Value::from("joe")));
    }

    #[test]
    fn source_is_untouched() {
        let source = person();
        let before = source.clone();
        let _ = select(&source, &Projection::object().with("name", true));
        assert_eq!(source, before);
    }
}
