//! Safe boolean condition evaluation: no host `eval`, no function calls, no
//! arithmetic. `evaluate` can only observe the context it's given.
//!
//! The splitter below is deliberately naive — it looks for the literal
//! sequences `" or "` / `" and "` / `"=="` / `"!="` rather than building a
//! real token stream. That mirrors the grammar's whitespace-sensitivity
//! around keywords (spec: `or`/`and` bind as keywords, not substrings of a
//! bareword), so a bareword that happens to contain "and" mid-word is safe,
//! but one that contains the literal sequence `" and "` is not — same
//! limitation the evaluator this was modeled on has.

use crate::error::{EvalError, EvalResult};
use recipe_core::Value;
use regex::Regex;
use std::sync::LazyLock;

static VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)\s*\}\}")
        .expect("valid regex")
});

/// Evaluate a condition expression against `context`. Empty/whitespace-only
/// input is always true.
pub fn evaluate(expr: &str, context: &Value) -> EvalResult<bool> {
    if expr.trim().is_empty() {
        return Ok(true);
    }
    let substituted = substitute_literals(expr, context)?;
    evaluate_expression(&substituted)
}

/// Substitute `{{path}}` references with their *literal* textual form: a
/// single-quoted string for `Value::String`, `true`/`false` for booleans,
/// and the bare decimal/display form otherwise.
fn substitute_literals(template: &str, context: &Value) -> EvalResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut last_end = 0;

    for caps in VAR_RE.captures_iter(template) {
        let whole = caps.get(0).expect("group 0 always matches");
        let path = caps.get(1).expect("group 1 required by pattern").as_str();

        out.push_str(&template[last_end..whole.start()]);

        let resolved = context.resolve_path(path);
        let literal = match resolved {
            None | Some(Value::Null) => {
                return Err(EvalError::UndefinedVariable {
                    path: path.to_string(),
                    available: available_keys(context),
                })
            }
            Some(Value::String(s)) => format!("'{s}'"),
            Some(Value::Bool(b)) => b.to_string(),
            Some(other) => other.to_string(),
        };
        out.push_str(&literal);

        last_end = whole.end();
    }
    out.push_str(&template[last_end..]);

    Ok(out)
}

fn available_keys(context: &Value) -> Vec<String> {
    match context.as_map() {
        Some(map) => map.keys().cloned().collect(),
        None => Vec::new(),
    }
}

fn evaluate_expression(expr: &str) -> EvalResult<bool> {
    let expr = expr.trim();

    if let Some(idx) = expr.find(" or ") {
        let (left, right) = (&expr[..idx], &expr[idx + 4..]);
        return Ok(evaluate_expression(left)? || evaluate_expression(right)?);
    }
    if let Some(idx) = expr.find(" and ") {
        let (left, right) = (&expr[..idx], &expr[idx + 5..]);
        return Ok(evaluate_expression(left)? && evaluate_expression(right)?);
    }
    evaluate_comparison(expr)
}

#[derive(Debug, PartialEq, Eq)]
enum Literal {
    Bool(bool),
    Str(String),
}

fn parse_value(token: &str) -> Literal {
    let t = token.trim();
    let quoted_single = t.len() >= 2 && t.starts_with('\'') && t.ends_with('\'');
    let quoted_double = t.len() >= 2 && t.starts_with('"') && t.ends_with('"');
    if quoted_single || quoted_double {
        Literal::Str(t[1..t.len() - 1].to_string())
    } else if t.eq_ignore_ascii_case("true") {
        Literal::Bool(true)
    } else if t.eq_ignore_ascii_case("false") {
        Literal::Bool(false)
    } else {
        Literal::Str(t.to_string())
    }
}

fn evaluate_comparison(expr: &str) -> EvalResult<bool> {
    let expr = expr.trim();

    if let Some(idx) = expr.find("==") {
        let left = parse_value(&expr[..idx]);
        let right = parse_value(&expr[idx + 2..]);
        return Ok(left == right);
    }
    if let Some(idx) = expr.find("!=") {
        let left = parse_value(&expr[..idx]);
        let right = parse_value(&expr[idx + 2..]);
        return Ok(left != right);
    }

    match parse_value(expr) {
        Literal::Bool(b) => Ok(b),
        Literal::Str(_) => Err(EvalError::InvalidSyntax(format!(
            "trailing value must be 'true' or 'false', got '{expr}'"
        ))),
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
    fn empty_condition_is_true() {
        assert!(evaluate("", &Value::map()).unwrap());
        assert!(evaluate("   ", &Value::map()).unwrap());
    }

    #[test]
    fn bare_boolean_literal() {
        assert!(evaluate("true", &Value::map()).unwrap());
        assert!(!evaluate("false", &Value::map()).unwrap());
    }

    #[test]
    fn string_equality() {
        let context = ctx(&[("greet", Value::String("bye".to_string()))]);
        assert!(evaluate("{{greet}} == 'bye'", &context).unwrap());
        assert!(!evaluate("{{greet}} == 'hello'", &context).unwrap());
    }

    #[test]
    fn not_equal() {
        let context = ctx(&[("greet", Value::String("hello world".to_string()))]);
        assert!(evaluate("{{greet}} != 'bye'", &context).unwrap());
    }

    #[test]
    fn and_binds_tighter_than_or() {
        // (false and false) or true -> true
        assert!(evaluate("false and false or true", &Value::map()).unwrap());
    }

    #[test]
    fn or_short_circuits_left_to_right_value() {
        assert!(evaluate("true or false", &Value::map()).unwrap());
        assert!(!evaluate("false or false", &Value::map()).unwrap());
    }

    #[test]
    fn unquoted_bareword_compares_as_string() {
        let context = ctx(&[("greet", Value::String("hello world".to_string()))]);
        // bareword "hello world" on the right, matched as raw string content
        assert!(evaluate("{{greet}} == hello world", &context).unwrap());
    }

    #[test]
    fn missing_variable_errors() {
        let err = evaluate("{{missing}} == 'x'", &Value::map()).unwrap_err();
        assert!(matches!(err, EvalError::UndefinedVariable { .. }));
    }

    #[test]
    fn invalid_trailing_value_errors() {
        let err = evaluate("not_a_boolean", &Value::map()).unwrap_err();
        assert!(matches!(err, EvalError::InvalidSyntax(_)));
    }
}
