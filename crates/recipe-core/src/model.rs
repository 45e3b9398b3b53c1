//! Typed recipe/stage/step records and their own-shape validation.
//!
//! Cross-step checks (id uniqueness, dependency acyclicity, variable
//! reachability) are deliberately not here — they live in `recipe-validate`,
//! which walks a fully-loaded `Recipe` and can see the whole graph at once.
//! What's here mirrors each type's own structural rules, one method per type,
//! the way the source dataclasses validated themselves.

use crate::error::RecipeError;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const RESERVED_OUTPUT_NAMES: [&str; 3] = ["recipe", "session", "step"];

fn is_ident_with_dashes(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

fn is_ident_with_dashes_and_spaces(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == ' ')
}

fn is_ident(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// Strict `MAJOR.MINOR.PATCH`: three numeric, dot-separated parts, no `v`
/// prefix and no pre-release/build metadata suffix.
fn is_strict_semver(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    parts.len() == 3 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecursionConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: i64,
    #[serde(default = "default_max_total_steps")]
    pub max_total_steps: i64,
}

fn default_max_depth() -> i64 {
    5
}

fn default_max_total_steps() -> i64 {
    100
}

impl Default for RecursionConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_total_steps: default_max_total_steps(),
        }
    }
}

impl RecursionConfig {
    pub fn validate(&self) -> Result<(), RecipeError> {
        if !(1..=20).contains(&self.max_depth) {
            return Err(RecipeError::MaxDepthOutOfRange(self.max_depth));
        }
        if !(1..=1000).contains(&self.max_total_steps) {
            return Err(RecipeError::MaxTotalStepsOutOfRange(self.max_total_steps));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDefault {
    Approve,
    Deny,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub timeout: i64,
    #[serde(default = "default_approval_default")]
    pub default: ApprovalDefault,
}

fn default_approval_default() -> ApprovalDefault {
    ApprovalDefault::Deny
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            required: false,
            prompt: String::new(),
            timeout: 0,
            default: default_approval_default(),
        }
    }
}

impl ApprovalConfig {
    pub fn validate(&self) -> Result<(), RecipeError> {
        if self.timeout < 0 {
            return Err(RecipeError::InvalidApproval(
                "timeout must be non-negative".to_string(),
            ));
        }
        if self.required && self.prompt.trim().is_empty() {
            return Err(RecipeError::InvalidApproval(
                "prompt is required when required=true".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Exponential,
    Linear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: i64,
    #[serde(default = "default_backoff")]
    pub backoff: BackoffKind,
    #[serde(default = "default_initial_delay")]
    pub initial_delay: i64,
    #[serde(default = "default_max_delay")]
    pub max_delay: i64,
}

fn default_backoff() -> BackoffKind {
    BackoffKind::Exponential
}

fn default_initial_delay() -> i64 {
    5
}

fn default_max_delay() -> i64 {
    300
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts <= 0 {
            return Err("retry.max_attempts must be a positive integer".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    Fail,
    Continue,
    SkipRemaining,
}

impl Default for OnError {
    fn default() -> Self {
        OnError::Fail
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Agent,
    Recipe,
}

impl Default for StepType {
    fn default() -> Self {
        StepType::Agent
    }
}

fn default_as_var() -> String {
    "item".to_string()
}

fn default_max_iterations() -> i64 {
    100
}

fn default_step_timeout() -> i64 {
    600
}

/// A single unit of work: either an `agent` call or a `recipe` composition,
/// distinguished by `r#type`. Flat-field layout (rather than a Rust `enum`
/// with payload variants) so the YAML shape stays a plain mapping and
/// own-shape checks can report exactly which forbidden/missing field is at
/// fault, the way the source's dataclass did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,

    #[serde(rename = "type", default)]
    pub step_type: StepType,

    // agent variant
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub agent_config: Option<BTreeMap<String, Value>>,

    // recipe variant
    #[serde(default)]
    pub recipe: Option<String>,
    #[serde(rename = "context", default)]
    pub step_context: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub recursion: Option<RecursionConfig>,

    // common
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub foreach: Option<String>,
    #[serde(rename = "as", default = "default_as_var")]
    pub as_var: String,
    #[serde(default)]
    pub collect: Option<String>,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: i64,
    #[serde(default = "default_step_timeout")]
    pub timeout: i64,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub on_error: OnError,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Step {
    pub fn validate(&self) -> Result<(), RecipeError> {
        let fail = |reason: &str| {
            Err(RecipeError::InvalidStep {
                id: self.id.clone(),
                reason: reason.to_string(),
            })
        };

        if self.id.trim().is_empty() {
            return fail("id is required");
        }

        match self.step_type {
            StepType::Agent => {
                if self.agent.is_none() || self.prompt.is_none() {
                    return fail("agent-type step requires 'agent' and 'prompt'");
                }
                if self.recipe.is_some() || self.step_context.is_some() {
                    return fail("agent-type step must not carry 'recipe' or 'context'");
                }
            }
            StepType::Recipe => {
                if self.recipe.is_none() {
                    return fail("recipe-type step requires 'recipe'");
                }
                if self.agent.is_some() || self.prompt.is_some() || self.mode.is_some() {
                    return fail("recipe-type step must not carry 'agent', 'prompt', or 'mode'");
                }
                if let Some(r) = &self.recursion {
                    r.validate().map_err(|e| RecipeError::InvalidStep {
                        id: self.id.clone(),
                        reason: e.to_string(),
                    })?;
                }
            }
        }

        if self.timeout <= 0 {
            return fail("timeout must be positive");
        }

        if !matches!(self.on_error, OnError::Fail | OnError::Continue | OnError::SkipRemaining) {
            return fail("on_error must be fail, continue, or skip_remaining");
        }

        if let Some(output) = &self.output {
            if !is_ident(output) || RESERVED_OUTPUT_NAMES.contains(&output.as_str()) {
                return fail("output must be alphanumeric/underscore and not a reserved name (recipe, session, step)");
            }
        }

        if let Some(retry) = &self.retry {
            retry.validate().map_err(|e| RecipeError::InvalidStep {
                id: self.id.clone(),
                reason: e,
            })?;
        }

        if let Some(foreach) = &self.foreach {
            if !foreach.contains("{{") {
                return fail("foreach must be a template containing '{{...}}'");
            }
            if !is_ident(&self.as_var) {
                return fail("'as' must be alphanumeric/underscore");
            }
            if let Some(collect) = &self.collect {
                if !is_ident(collect) {
                    return fail("collect must be alphanumeric/underscore");
                }
            }
            if self.max_iterations <= 0 {
                return fail("max_iterations must be positive");
            }
        } else if self.parallel {
            return fail("parallel requires foreach");
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub approval: Option<ApprovalConfig>,
}

impl Stage {
    pub fn validate(&self) -> Result<(), RecipeError> {
        if !is_ident_with_dashes_and_spaces(&self.name) {
            return Err(RecipeError::InvalidStageName);
        }
        if self.steps.is_empty() {
            return Err(RecipeError::EmptyStage(self.name.clone()));
        }

        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            step.validate()?;
            if !seen.insert(step.id.clone()) {
                return Err(RecipeError::InvalidStep {
                    id: step.id.clone(),
                    reason: format!("duplicate step id within stage '{}'", self.name),
                });
            }
        }

        if let Some(approval) = &self.approval {
            approval
                .validate()
                .map_err(|e| RecipeError::InvalidApproval(format!("stage '{}': {e}", self.name)))?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    pub description: String,
    pub version: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
    #[serde(default)]
    pub recursion: Option<RecursionConfig>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub stages: Vec<Stage>,
}

impl Recipe {
    pub fn is_staged(&self) -> bool {
        !self.stages.is_empty()
    }

    pub fn get_all_steps(&self) -> Vec<&Step> {
        if self.is_staged() {
            self.stages.iter().flat_map(|s| s.steps.iter()).collect()
        } else {
            self.steps.iter().collect()
        }
    }

    pub fn get_step(&self, id: &str) -> Option<&Step> {
        self.get_all_steps().into_iter().find(|s| s.id == id)
    }

    pub fn get_stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn validate(&self) -> Result<(), RecipeError> {
        if self.name.trim().is_empty() {
            return Err(RecipeError::MissingField {
                field: "name".to_string(),
            });
        }
        if !is_ident_with_dashes(&self.name) {
            return Err(RecipeError::InvalidName);
        }
        if self.description.trim().is_empty() {
            return Err(RecipeError::MissingField {
                field: "description".to_string(),
            });
        }
        if self.version.trim().is_empty() {
            return Err(RecipeError::MissingField {
                field: "version".to_string(),
            });
        }
        if !is_strict_semver(&self.version) {
            return Err(RecipeError::InvalidVersion(self.version.clone()));
        }

        if self.steps.is_empty() && self.stages.is_empty() {
            return Err(RecipeError::NeitherStepsNorStages);
        }

        if let Some(recursion) = &self.recursion {
            recursion.validate()?;
        }

        if self.is_staged() {
            self.validate_staged_mode()
        } else {
            self.validate_flat_mode()
        }
    }

    fn validate_flat_mode(&self) -> Result<(), RecipeError> {
        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            step.validate()?;
            if !seen.insert(step.id.clone()) {
                return Err(RecipeError::InvalidStep {
                    id: step.id.clone(),
                    reason: "duplicate step id".to_string(),
                });
            }
        }

        for (i, step) in self.steps.iter().enumerate() {
            for dep in &step.depends_on {
                if dep == &step.id {
                    return Err(RecipeError::InvalidStep {
                        id: step.id.clone(),
                        reason: "step cannot depend on itself".to_string(),
                    });
                }
                let dep_index = self.steps.iter().position(|s| &s.id == dep);
                match dep_index {
                    None => {
                        return Err(RecipeError::InvalidStep {
                            id: step.id.clone(),
                            reason: format!("depends_on references unknown step '{dep}'"),
                        })
                    }
                    Some(idx) if idx >= i => {
                        return Err(RecipeError::InvalidStep {
                            id: step.id.clone(),
                            reason: format!("depends_on '{dep}' must reference an earlier step"),
                        })
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }

    fn validate_staged_mode(&self) -> Result<(), RecipeError> {
        let mut stage_names = std::collections::HashSet::new();
        for stage in &self.stages {
            stage.validate()?;
            if !stage_names.insert(stage.name.clone()) {
                return Err(RecipeError::InvalidStageName);
            }
        }

        let flattened: Vec<&Step> = self.get_all_steps();
        let mut seen = std::collections::HashSet::new();
        for step in &flattened {
            if !seen.insert(step.id.clone()) {
                return Err(RecipeError::InvalidStep {
                    id: step.id.clone(),
                    reason: "step id must be unique across all stages".to_string(),
                });
            }
        }

        for (i, step) in flattened.iter().enumerate() {
            for dep in &step.depends_on {
                if dep == &step.id {
                    return Err(RecipeError::InvalidStep {
                        id: step.id.clone(),
                        reason: "step cannot depend on itself".to_string(),
                    });
                }
                let dep_index = flattened.iter().position(|s| &s.id == dep);
                match dep_index {
                    None => {
                        return Err(RecipeError::InvalidStep {
                            id: step.id.clone(),
                            reason: format!("depends_on references unknown step '{dep}'"),
                        })
                    }
                    Some(idx) if idx >= i => {
                        return Err(RecipeError::InvalidStep {
                            id: step.id.clone(),
                            reason: format!("depends_on '{dep}' must reference an earlier step"),
                        })
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_step(id: &str) -> Step {
        Step {
            id: id.to_string(),
            step_type: StepType::Agent,
            agent: Some("x".to_string()),
            prompt: Some("hello".to_string()),
            mode: None,
            agent_config: None,
            recipe: None,
            step_context: None,
            recursion: None,
            output: None,
            condition: None,
            foreach: None,
            as_var: default_as_var(),
            collect: None,
            parallel: false,
            max_iterations: default_max_iterations(),
            timeout: default_step_timeout(),
            retry: None,
            on_error: OnError::Fail,
            depends_on: vec![],
        }
    }

    #[test]
    fn semver_is_strict() {
        assert!(is_strict_semver("1.0.0"));
        assert!(!is_strict_semver("v1.0.0"));
        assert!(!is_strict_semver("1.0.0-beta"));
        assert!(!is_strict_semver("1.0"));
    }

    #[test]
    fn agent_step_rejects_recipe_fields() {
        let mut step = agent_step("a");
        step.recipe = Some("sub.yaml".to_string());
        assert!(step.validate().is_err());
    }

    #[test]
    fn reserved_output_name_rejected() {
        let mut step = agent_step("a");
        step.output = Some("session".to_string());
        assert!(step.validate().is_err());
    }

    #[test]
    fn parallel_without_foreach_rejected() {
        let mut step = agent_step("a");
        step.parallel = true;
        assert!(step.validate().is_err());
    }

    #[test]
    fn flat_recipe_rejects_forward_dependency() {
        let mut b = agent_step("b");
        b.depends_on = vec!["a".to_string()];
        let a = agent_step("a");
        let recipe = Recipe {
            name: "r".to_string(),
            description: "d".to_string(),
            version: "1.0.0".to_string(),
            author: None,
            created: None,
            updated: None,
            tags: vec![],
            context: BTreeMap::new(),
            recursion: None,
            steps: vec![b, a],
            stages: vec![],
        };
        assert!(recipe.validate().is_err());
    }

    #[test]
    fn valid_flat_recipe_passes() {
        let a = agent_step("a");
        let mut b = agent_step("b");
        b.depends_on = vec!["a".to_string()];
        let recipe = Recipe {
            name: "r".to_string(),
            description: "d".to_string(),
            version: "1.0.0".to_string(),
            author: None,
            created: None,
            updated: None,
            tags: vec![],
            context: BTreeMap::new(),
            recursion: None,
            steps: vec![a, b],
            stages: vec![],
        };
        assert!(recipe.validate().is_ok());
    }
}
