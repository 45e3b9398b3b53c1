//! Dynamic value model for recipe context.
//!
//! The engine's context is a loosely-typed tree (the source system's context
//! is a plain Python dict); `Value` is the typed equivalent, with a resolver
//! for the dotted paths used by templates and conditions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A value living in recipe context: string, bool, number, list, map, or null.
///
/// `Map` uses a `BTreeMap` so iteration order (e.g. when listing available
/// variable names in an error message) is stable and sorted without an
/// extra sort step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn map() -> Self {
        Value::Map(BTreeMap::new())
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Resolve a dotted path (`a.b.c`) by walking `Map` entries only — lists
    /// are not indexed by this resolver (spec note: "the resolver walks
    /// mappings only").
    pub fn resolve_path<'a>(&'a self, path: &str) -> Option<&'a Value> {
        let mut current = self;
        for part in path.split('.') {
            current = current.as_map()?.get(part)?;
        }
        Some(current)
    }

    /// Insert a value at a top-level key, creating the root map entry.
    pub fn insert_top(map: &mut BTreeMap<String, Value>, key: impl Into<String>, value: Value) {
        map.insert(key.into(), value);
    }

    /// Render as the string form used by variable substitution: plain text
    /// for strings, `true`/`false` for booleans, decimal for numbers.
    /// Lists/maps/null stringify via their JSON-ish `Display` impl — callers
    /// needing a literal-quoted form for condition evaluation use
    /// [`Value::quoted_literal`] instead.
    pub fn display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            Value::List(_) | Value::Map(_) => self.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::List(items) => {
                let rendered: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            Value::Map(m) => {
                let rendered: Vec<String> =
                    m.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                write!(f, "{{{}}}", rendered.join(", "))
            }
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => serde_json::Value::Number(n),
            Value::String(s) => serde_json::Value::String(s),
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

/// Convert a `serde_yaml::Value` (the loader's native type) into `Value`.
pub fn from_yaml(v: serde_yaml::Value) -> Value {
    match v {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            let num = if let Some(i) = n.as_i64() {
                serde_json::Number::from(i)
            } else if let Some(u) = n.as_u64() {
                serde_json::Number::from(u)
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f).unwrap_or_else(|| serde_json::Number::from(0))
            } else {
                serde_json::Number::from(0)
            };
            Value::Number(num)
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => Value::List(items.into_iter().map(from_yaml).collect()),
        serde_yaml::Value::Mapping(map) => {
            let mut out = BTreeMap::new();
            for (k, v) in map {
                if let serde_yaml::Value::String(key) = k {
                    out.insert(key, from_yaml(v));
                }
                // Non-string keys are not representable in our model; the
                // recipe schema never produces them, so they're dropped.
            }
            Value::Map(out)
        }
        serde_yaml::Value::Tagged(tagged) => from_yaml(tagged.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_nested_path() {
        let mut inner = BTreeMap::new();
        inner.insert("name".to_string(), Value::String("r".to_string()));
        let mut root = BTreeMap::new();
        root.insert("recipe".to_string(), Value::Map(inner));
        let v = Value::Map(root);

        assert_eq!(
            v.resolve_path("recipe.name"),
            Some(&Value::String("r".to_string()))
        );
        assert_eq!(v.resolve_path("recipe.missing"), None);
        assert_eq!(v.resolve_path("missing"), None);
    }

    #[test]
    fn does_not_index_lists() {
        let mut root = BTreeMap::new();
        root.insert(
            "items".to_string(),
            Value::List(vec![Value::String("a".to_string())]),
        );
        let v = Value::Map(root);
        assert_eq!(v.resolve_path("items.0"), None);
    }

    #[test]
    fn display_string_formats_primitives() {
        assert_eq!(Value::Bool(true).display_string(), "true");
        assert_eq!(Value::String("hi".into()).display_string(), "hi");
        assert_eq!(
            Value::Number(serde_json::Number::from(42)).display_string(),
            "42"
        );
    }
}
