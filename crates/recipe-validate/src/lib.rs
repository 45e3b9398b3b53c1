//! Whole-recipe static validation (spec.md §4.4 "C4"): structural checks
//! delegate to `recipe_core::Recipe::validate` (own-shape rules plus
//! id-uniqueness/dependency-acyclicity, already enforced there since a
//! backward-only `depends_on` graph cannot contain a cycle); this crate adds
//! the variable-reachability walk and the optional agent-inventory warnings
//! pass.

mod reachability;

use recipe_core::Recipe;

pub use reachability::check_reachability;

/// Injectable agent name lookup (spec.md §4.4: "when a coordinator supplies
/// an agent inventory"). Absent, no agent-unknown warnings are produced.
pub trait AgentInventory {
    fn has_agent(&self, name: &str) -> bool;
}

/// `{errors, warnings, is_valid}` as spec.md §4.4 describes it.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a loaded recipe end to end. Never panics; every failure mode
/// becomes an entry in `errors` rather than a short-circuiting `Result`, so
/// callers always get the full picture in one pass.
pub fn validate_recipe(recipe: &Recipe, agents: Option<&dyn AgentInventory>) -> ValidationReport {
    let mut report = ValidationReport::default();

    if let Err(e) = recipe.validate() {
        report.errors.push(e.to_string());
        // Structural validation failed — the recipe's shape can't be
        // trusted enough to walk for reachability or agent names.
        return report;
    }

    if let Err(e) = check_reachability(recipe) {
        report.errors.push(e);
    }

    if let Some(inventory) = agents {
        for step in recipe.get_all_steps() {
            if let Some(agent) = &step.agent {
                if !inventory.has_agent(agent) {
                    report
                        .warnings
                        .push(format!("step '{}': unknown agent '{agent}'", step.id));
                }
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use recipe_core::load_from_str;

    struct Known(Vec<&'static str>);
    impl AgentInventory for Known {
        fn has_agent(&self, name: &str) -> bool {
            self.0.contains(&name)
        }
    }

    #[test]
    fn valid_recipe_has_no_errors() {
        let yaml = r#"
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
  - id: b
    agent: y
    prompt: "echo {{greet}}"
"#;
        let recipe = load_from_str(yaml, "r.yaml").unwrap();
        let report = validate_recipe(&recipe, None);
        assert!(report.is_valid(), "{:?}", report.errors);
    }

    #[test]
    fn unreachable_variable_is_an_error() {
        let yaml = r#"
name: r
description: d
version: 1.0.0
steps:
  - id: a
    agent: x
    prompt: "{{nope}}"
"#;
        let recipe = load_from_str(yaml, "r.yaml").unwrap();
        let report = validate_recipe(&recipe, None);
        assert!(!report.is_valid());
    }

    #[test]
    fn unknown_agent_is_a_warning_not_an_error() {
        let yaml = r#"
name: r
description: d
version: 1.0.0
steps:
  - id: a
    agent: mystery
    prompt: hi
"#;
        let recipe = load_from_str(yaml, "r.yaml").unwrap();
        let report = validate_recipe(&recipe, Some(&Known(vec!["x"])));
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
    }
}
