//! Variable reachability (spec.md §4.4): simulate step order with an
//! initially-available set `{context keys} ∪ {recipe, session, step}`; for
//! each step, collect `{{path}}` references from `prompt`, `condition`,
//! `foreach`, sub-recipe `recipe`, and sub-recipe `context` values. A dotted
//! `{{ns.field}}` only requires that `ns` is available. After the step,
//! `step.output` and `step.collect` join the set; inside a `foreach` step,
//! the loop variable (`as` or `item`) is locally available for that step's
//! own templates.

use recipe_core::Recipe;
use recipe_eval::extract_variable_paths;
use std::collections::HashSet;

pub fn check_reachability(recipe: &Recipe) -> Result<(), String> {
    let mut available: HashSet<String> = recipe.context.keys().cloned().collect();
    available.insert("recipe".to_string());
    available.insert("session".to_string());
    available.insert("step".to_string());

    for step in recipe.get_all_steps() {
        let mut local = available.clone();
        if step.foreach.is_some() {
            local.insert(step.as_var.clone());
        }

        let mut refs = Vec::new();
        if let Some(prompt) = &step.prompt {
            refs.extend(extract_variable_paths(prompt));
        }
        if let Some(condition) = &step.condition {
            refs.extend(extract_variable_paths(condition));
        }
        if let Some(foreach) = &step.foreach {
            refs.extend(extract_variable_paths(foreach));
        }
        if let Some(sub_recipe) = &step.recipe {
            refs.extend(extract_variable_paths(sub_recipe));
        }
        if let Some(ctx) = &step.step_context {
            for value in ctx.values() {
                if let Some(s) = value.as_str() {
                    refs.extend(extract_variable_paths(s));
                }
            }
        }

        for path in refs {
            let namespace = path.split('.').next().unwrap_or(path.as_str());
            if !local.contains(namespace) {
                return Err(format!(
                    "step '{}': variable '{{{{{path}}}}}' references unknown namespace '{namespace}'",
                    step.id
                ));
            }
        }

        if let Some(output) = &step.output {
            available.insert(output.clone());
        }
        if let Some(collect) = &step.collect {
            available.insert(collect.clone());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use recipe_core::load_from_str;

    #[test]
    fn prior_step_output_is_reachable() {
        let yaml = r#"
name: r
description: d
version: 1.0.0
steps:
  - id: a
    agent: x
    prompt: hi
    output: greet
  - id: b
    agent: y
    prompt: "{{greet}}"
"#;
        let recipe = load_from_str(yaml, "r.yaml").unwrap();
        assert!(check_reachability(&recipe).is_ok());
    }

    #[test]
    fn forward_reference_is_unreachable() {
        let yaml = r#"
name: r
description: d
version: 1.0.0
steps:
  - id: a
    agent: x
    prompt: "{{greet}}"
  - id: b
    agent: y
    prompt: hi
    output: greet
"#;
        let recipe = load_from_str(yaml, "r.yaml").unwrap();
        assert!(check_reachability(&recipe).is_err());
    }

    #[test]
    fn loop_variable_reachable_inside_its_own_step() {
        let yaml = r#"
name: r
description: d
version: 1.0.0
context:
  items:
    - a
    - b
steps:
  - id: a
    agent: x
    foreach: "{{items}}"
    as: thing
    prompt: "{{thing}}"
"#;
        let recipe = load_from_str(yaml, "r.yaml").unwrap();
        assert!(check_reachability(&recipe).is_ok());
    }

    #[test]
    fn reserved_namespaces_always_available() {
        let yaml = r#"
name: r
description: d
version: 1.0.0
steps:
  - id: a
    agent: x
    prompt: "{{recipe.name}} {{session.id}} {{step.id}}"
"#;
        let recipe = load_from_str(yaml, "r.yaml").unwrap();
        assert!(check_reachability(&recipe).is_ok());
    }
}
