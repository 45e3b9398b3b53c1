//! `{{path.to.value}}` substitution, used for prompts, sub-recipe paths, and
//! sub-recipe context values alike — one function, three callers.

use crate::error::{EvalError, EvalResult};
use recipe_core::Value;
use regex::Regex;
use std::sync::LazyLock;

static VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)\s*\}\}")
        .expect("valid regex")
});

/// Replace every `{{ident(.ident)*}}` reference in `template` with its
/// resolved value, stringified. Errors name the missing path and list the
/// sorted top-level keys available in `context` for diagnosis.
pub fn substitute(template: &str, context: &Value) -> EvalResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut last_end = 0;

    for caps in VAR_RE.captures_iter(template) {
        let whole = caps.get(0).expect("group 0 always matches");
        let path = caps.get(1).expect("group 1 required by pattern").as_str();

        out.push_str(&template[last_end..whole.start()]);

        let resolved = context.resolve_path(path).ok_or_else(|| {
            EvalError::UndefinedVariable {
                path: path.to_string(),
                available: available_keys(context),
            }
        })?;
        out.push_str(&resolved.display_string());

        last_end = whole.end();
    }
    out.push_str(&template[last_end..]);

    Ok(out)
}

/// Does `template` contain at least one `{{...}}` reference? Used to enforce
/// the `foreach` field's "must be a template" shape rule.
pub fn has_variable_reference(template: &str) -> bool {
    template.contains("{{")
}

/// All `{{path}}` references appearing in `template`, as the raw dotted
/// path strings (used by the static validator's reachability check).
pub fn extract_variable_paths(template: &str) -> Vec<String> {
    VAR_RE
        .captures_iter(template)
        .map(|c| c.get(1).expect("group 1 required by pattern").as_str().to_string())
        .collect()
}

fn available_keys(context: &Value) -> Vec<String> {
    match context.as_map() {
        Some(map) => map.keys().cloned().collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn ctx(pairs: &[(&str, Value)]) -> Value {
        let mut map = BTreeMap::new();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.clone());
        }
        Value::Map(map)
    }

    #[test]
    fn substitutes_simple_variable() {
        let context = ctx(&[("who", Value::String("world".to_string()))]);
        assert_eq!(substitute("hello {{who}}", &context).unwrap(), "hello world");
    }

    #[test]
    fn substitutes_dotted_path() {
        let mut inner = BTreeMap::new();
        inner.insert("name".to_string(), Value::String("r".to_string()));
        let context = ctx(&[("recipe", Value::Map(inner))]);
        assert_eq!(
            substitute("{{recipe.name}}", &context).unwrap(),
            "r"
        );
    }

    #[test]
    fn missing_variable_lists_available_keys() {
        let context = ctx(&[("who", Value::String("world".to_string()))]);
        let err = substitute("{{missing}}", &context).unwrap_err();
        match err {
            EvalError::UndefinedVariable { path, available } => {
                assert_eq!(path, "missing");
                assert_eq!(available, vec!["who".to_string()]);
            }
            _ => panic!("expected UndefinedVariable"),
        }
    }

    #[test]
    fn passes_through_text_with_no_variables() {
        let context = ctx(&[]);
        assert_eq!(substitute("plain text", &context).unwrap(), "plain text");
    }

    #[test]
    fn has_variable_reference_detects_templates() {
        assert!(has_variable_reference("{{items}}"));
        assert!(!has_variable_reference("items"));
    }
}
