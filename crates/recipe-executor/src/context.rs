//! Shared run-scoped handles (spawner, config, identity) and the three
//! reserved-namespace injectors (`recipe`, `session`, `step`) every driver
//! and sub-recipe call writes into context before evaluating templates.

use crate::spawner::DynSpawner;
use chrono::{DateTime, Utc};
use recipe_core::{Recipe, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Everything a step dispatch needs that doesn't change for the lifetime of
/// one `execute`/`resume` call: who spawns agents, where the project lives,
/// which session this run belongs to, and when it started.
#[derive(Clone)]
pub struct RunCtx {
    pub spawner: DynSpawner,
    pub project_path: PathBuf,
    pub session_id: String,
    pub started: DateTime<Utc>,
}

pub fn inject_recipe_ns(context: &mut Value, recipe: &Recipe) {
    let mut ns = BTreeMap::new();
    ns.insert("name".to_string(), Value::String(recipe.name.clone()));
    ns.insert("version".to_string(), Value::String(recipe.version.clone()));
    ns.insert("description".to_string(), Value::String(recipe.description.clone()));
    if let Some(map) = context.as_map_mut() {
        map.insert("recipe".to_string(), Value::Map(ns));
    }
}

pub fn inject_session_ns(context: &mut Value, session_id: &str, started: DateTime<Utc>, project_path: &str) {
    let mut ns = BTreeMap::new();
    ns.insert("id".to_string(), Value::String(session_id.to_string()));
    ns.insert("started".to_string(), Value::String(started.to_rfc3339()));
    ns.insert("project".to_string(), Value::String(project_path.to_string()));
    if let Some(map) = context.as_map_mut() {
        map.insert("session".to_string(), Value::Map(ns));
    }
}

pub fn inject_step_ns(context: &mut Value, id: &str, index: usize, stage: Option<&str>) {
    let mut ns = BTreeMap::new();
    ns.insert("id".to_string(), Value::String(id.to_string()));
    ns.insert("index".to_string(), Value::Number(serde_json::Number::from(index as u64)));
    if let Some(stage) = stage {
        ns.insert("stage".to_string(), Value::String(stage.to_string()));
    }
    if let Some(map) = context.as_map_mut() {
        map.insert("step".to_string(), Value::Map(ns));
    }
}

pub fn set_context_key(context: &mut Value, key: &str, value: Value) {
    if let Some(map) = context.as_map_mut() {
        map.insert(key.to_string(), value);
    }
}

pub fn remove_context_key(context: &mut Value, key: &str) {
    if let Some(map) = context.as_map_mut() {
        map.remove(key);
    }
}

pub fn append_skipped(context: &mut Value, step_id: &str) {
    if let Some(map) = context.as_map_mut() {
        let entry = map
            .entry("_skipped_steps".to_string())
            .or_insert_with(|| Value::List(Vec::new()));
        if let Value::List(list) = entry {
            list.push(Value::String(step_id.to_string()));
        }
    }
}

pub fn top_level_keys(context: &Value) -> Vec<String> {
    context.as_map().map(|m| m.keys().cloned().collect()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipe_namespace_carries_name_version_description() {
        let recipe = recipe_core::load_from_str(
            "name: r\ndescription: d\nversion: 1.0.0\nsteps:\n  - id: a\n    agent: x\n    prompt: hi\n",
            "r.yaml",
        )
        .unwrap();
        let mut context = Value::map();
        inject_recipe_ns(&mut context, &recipe);
        assert_eq!(context.resolve_path("recipe.name"), Some(&Value::String("r".into())));
        assert_eq!(context.resolve_path("recipe.description"), Some(&Value::String("d".into())));
    }

    #[test]
    fn skipped_steps_accumulate_in_order() {
        let mut context = Value::map();
        append_skipped(&mut context, "a");
        append_skipped(&mut context, "b");
        let list = context.resolve_path("_skipped_steps").unwrap().as_list().unwrap();
        assert_eq!(list.len(), 2);
    }
}
