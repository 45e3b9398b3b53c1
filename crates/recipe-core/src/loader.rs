//! Pure YAML → `Recipe` loading: no I/O beyond reading the file, and only
//! the parse-time rejections spelled out for the loader (root shape,
//! steps/stages shape and mutual exclusion, recursion bounds). Everything
//! else — required fields, step shape, cross-step checks — is left to
//! `Recipe::validate` and `recipe-validate`, which run after a successful
//! load.

use crate::error::{RecipeError, RecipeResult};
use crate::model::Recipe;
use std::path::Path;

/// Load and parse a recipe from a YAML string. The caller is responsible for
/// attributing `path` to error messages (pass `"<in-memory>"` if there isn't
/// a real one).
pub fn load_from_str(yaml: &str, path: &str) -> RecipeResult<Recipe> {
    let raw: serde_yaml::Value = serde_yaml::from_str(yaml).map_err(|source| RecipeError::Yaml {
        path: path.to_string(),
        source,
    })?;

    let mapping = raw.as_mapping().ok_or(RecipeError::NotAMapping)?;

    let steps_value = mapping.get("steps");
    let stages_value = mapping.get("stages");

    let has_steps = matches!(steps_value, Some(v) if !v.is_null());
    let has_stages = matches!(stages_value, Some(v) if !v.is_null());

    if let Some(v) = steps_value {
        if !v.is_null() && !v.is_sequence() {
            return Err(RecipeError::StepsNotAList);
        }
    }
    if let Some(v) = stages_value {
        if !v.is_null() && !v.is_sequence() {
            return Err(RecipeError::StagesNotAList);
        }
    }
    if has_steps && has_stages {
        return Err(RecipeError::BothStepsAndStages);
    }

    for key in ["steps", "stages"] {
        if let Some(serde_yaml::Value::Sequence(items)) = mapping.get(key) {
            for item in items {
                if !item.is_mapping() {
                    return Err(RecipeError::EntryNotAMapping);
                }
            }
        }
    }

    let recipe: Recipe = serde_yaml::from_value(raw).map_err(|source| RecipeError::Yaml {
        path: path.to_string(),
        source,
    })?;

    if let Some(recursion) = &recipe.recursion {
        recursion.validate()?;
    }
    for step in recipe.get_all_steps() {
        if let Some(recursion) = &step.recursion {
            recursion.validate()?;
        }
    }

    Ok(recipe)
}

/// Load a recipe from disk.
pub fn load_from_path(path: impl AsRef<Path>) -> RecipeResult<Recipe> {
    let path = path.as_ref();
    let display_path = path.display().to_string();
    let contents = std::fs::read_to_string(path).map_err(|source| RecipeError::Io {
        path: display_path.clone(),
        source,
    })?;
    load_from_str(&contents, &display_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
name: r
description: d
version: 1.0.0
context:
  who: world
steps:
  - id: a
    agent: x
    prompt: "hello {{who}}"
    output: greet
"#;

    #[test]
    fn loads_valid_flat_recipe() {
        let recipe = load_from_str(VALID, "test.yaml").expect("should parse");
        assert_eq!(recipe.name, "r");
        assert_eq!(recipe.steps.len(), 1);
        assert!(!recipe.is_staged());
    }

    #[test]
    fn rejects_non_mapping_root() {
        let err = load_from_str("- a\n- b\n", "test.yaml").unwrap_err();
        assert!(matches!(err, RecipeError::NotAMapping));
    }

    #[test]
    fn rejects_both_steps_and_stages() {
        let yaml = r#"
name: r
description: d
version: 1.0.0
steps:
  - id: a
    agent: x
    prompt: hi
stages:
  - name: s
    steps:
      - id: b
        agent: x
        prompt: hi
"#;
        let err = load_from_str(yaml, "test.yaml").unwrap_err();
        assert!(matches!(err, RecipeError::BothStepsAndStages));
    }

    #[test]
    fn rejects_steps_not_a_list() {
        let yaml = "name: r\ndescription: d\nversion: 1.0.0\nsteps: nope\n";
        let err = load_from_str(yaml, "test.yaml").unwrap_err();
        assert!(matches!(err, RecipeError::StepsNotAList));
    }

    #[test]
    fn rejects_out_of_range_max_depth() {
        let yaml = r#"
name: r
description: d
version: 1.0.0
recursion:
  max_depth: 21
steps:
  - id: a
    agent: x
    prompt: hi
"#;
        let err = load_from_str(yaml, "test.yaml").unwrap_err();
        assert!(matches!(err, RecipeError::MaxDepthOutOfRange(21)));
    }
}
