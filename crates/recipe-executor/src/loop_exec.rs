//! `foreach` fan-out (spec.md §4.8 "C8"): sequential iteration with
//! fail-fast early exit, or parallel iteration over isolated context
//! snapshots via a `tokio::task::JoinSet`, results always returned in input
//! order regardless of completion order.

use crate::context::{remove_context_key, set_context_key, top_level_keys, RunCtx};
use crate::driver::{self, owned, StepRunOutcome};
use crate::error::{EngineError, EngineResult};
use crate::recursion::RecursionState;
use crate::step::OnErrorOutcome;
use recipe_core::Value;
use recipe_eval::EvalError;
use std::path::Path;

pub(crate) async fn run_foreach(
    ctx: &RunCtx,
    step: &recipe_core::Step,
    context: &mut Value,
    recursion: &mut RecursionState,
    recipe_dir: Option<&Path>,
) -> EngineResult<StepRunOutcome> {
    let foreach_template = step
        .foreach
        .as_ref()
        .expect("foreach step requires foreach (enforced by Step::validate)");
    let path = recipe_eval::extract_variable_paths(foreach_template)
        .into_iter()
        .next()
        .unwrap_or_default();

    let items: Vec<Value> = match context.resolve_path(&path) {
        None => {
            return Err(EngineError::Template(EvalError::UndefinedVariable {
                path,
                available: top_level_keys(context),
            }))
        }
        Some(Value::List(list)) => list.clone(),
        Some(_) => return Err(EngineError::ForeachNotASequence { step_id: step.id.clone() }),
    };

    if items.is_empty() {
        crate::context::append_skipped(context, &step.id);
        return Ok(StepRunOutcome::Skipped);
    }

    if items.len() as i64 > step.max_iterations {
        return Err(EngineError::TooManyIterations {
            step_id: step.id.clone(),
            count: items.len(),
            max: step.max_iterations,
        });
    }

    let results = if step.parallel {
        run_parallel(ctx, step, context, recursion, recipe_dir, &items).await?
    } else {
        run_sequential(ctx, step, context, recursion, recipe_dir, &items).await?
    };

    let Some(results) = results else {
        return Ok(StepRunOutcome::SkipRemaining);
    };

    if let Some(collect) = &step.collect {
        set_context_key(context, collect, Value::List(results));
    } else if let Some(output) = &step.output {
        if let Some(last) = results.into_iter().last() {
            set_context_key(context, output, last);
        }
    }

    Ok(StepRunOutcome::Completed)
}

async fn run_sequential(
    ctx: &RunCtx,
    step: &recipe_core::Step,
    context: &mut Value,
    recursion: &mut RecursionState,
    recipe_dir: Option<&Path>,
    items: &[Value],
) -> EngineResult<Option<Vec<Value>>> {
    let mut results = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        set_context_key(context, &step.as_var, item.clone());
        let outcome = driver::execute_direct_step(ctx, step, context, recursion, recipe_dir).await;
        remove_context_key(context, &step.as_var);

        match outcome {
            Ok(OnErrorOutcome::Value(v)) => results.push(v),
            Ok(OnErrorOutcome::SkipRemaining) => return Ok(None),
            Err(e) => {
                return Err(EngineError::IterationFailed {
                    step_id: step.id.clone(),
                    index,
                    source: Box::new(e),
                })
            }
        }
    }
    Ok(Some(results))
}

/// Parallel iterations run on independent context/recursion clones, so each
/// is free of cross-iteration interference. Budget accounting is charged
/// once up front — `items.len()` units, agent or recipe step alike — rather
/// than absorbed per iteration afterward; spec.md §9 flags this pre-check as
/// missing for recipe-type parallel loops in the source, and this is the
/// extension that closes the gap. The tradeoff: a sub-recipe iteration's own
/// nested agent calls are still bounded by its *own* inherited budget, just
/// not reflected back into the parent total beyond the one reserved unit.
async fn run_parallel(
    ctx: &RunCtx,
    step: &recipe_core::Step,
    context: &Value,
    recursion: &mut RecursionState,
    recipe_dir: Option<&Path>,
    items: &[Value],
) -> EngineResult<Option<Vec<Value>>> {
    recursion.increment_steps(items.len() as i64)?;

    let mut set = tokio::task::JoinSet::new();
    for (index, item) in items.iter().enumerate() {
        let ctx = ctx.clone();
        let step = step.clone();
        let recipe_dir = owned(recipe_dir);
        let mut iter_context = context.clone();
        set_context_key(&mut iter_context, &step.as_var, item.clone());
        let mut iter_recursion = recursion.clone();

        set.spawn(async move {
            let outcome =
                driver::execute_direct_step(&ctx, &step, &mut iter_context, &mut iter_recursion, recipe_dir.as_deref())
                    .await;
            (index, outcome)
        });
    }

    let mut results: Vec<Option<Value>> = vec![None; items.len()];
    let mut first_error: Option<(usize, EngineError)> = None;
    let mut skip_remaining = false;

    while let Some(joined) = set.join_next().await {
        let (index, outcome) = match joined {
            Ok(v) => v,
            Err(join_err) => {
                if first_error.is_none() {
                    first_error = Some((
                        0,
                        EngineError::Spawn {
                            step_id: step.id.clone(),
                            message: join_err.to_string(),
                        },
                    ));
                    set.abort_all();
                }
                continue;
            }
        };
        match outcome {
            Ok(OnErrorOutcome::Value(v)) => results[index] = Some(v),
            Ok(OnErrorOutcome::SkipRemaining) => skip_remaining = true,
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some((index, e));
                    set.abort_all();
                }
            }
        }
    }

    if let Some((index, e)) = first_error {
        return Err(EngineError::IterationFailed {
            step_id: step.id.clone(),
            index,
            source: Box::new(e),
        });
    }
    if skip_remaining {
        return Ok(None);
    }

    Ok(Some(results.into_iter().map(|r| r.unwrap_or(Value::Null)).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use recipe_core::{OnError, RecursionConfig, Step, StepType};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Echo;
    #[async_trait]
    impl crate::spawner::AgentSpawner for Echo {
        async fn spawn(
            &self,
            _agent_name: &str,
            instruction: &str,
            _parent_session: &str,
            _agent_configs: Option<&Value>,
            _sub_session_id: Option<&str>,
        ) -> Result<Value, crate::spawner::SpawnError> {
            Ok(Value::String(instruction.to_string()))
        }
    }

    struct FailOnThird(AtomicUsize);
    #[async_trait]
    impl crate::spawner::AgentSpawner for FailOnThird {
        async fn spawn(
            &self,
            _agent_name: &str,
            instruction: &str,
            _parent_session: &str,
            _agent_configs: Option<&Value>,
            _sub_session_id: Option<&str>,
        ) -> Result<Value, crate::spawner::SpawnError> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            if n == 2 {
                Err(crate::spawner::SpawnError("boom".to_string()))
            } else {
                Ok(Value::String(instruction.to_string()))
            }
        }
    }

    fn foreach_step(parallel: bool) -> Step {
        Step {
            id: "loop".to_string(),
            step_type: StepType::Agent,
            agent: Some("x".to_string()),
            prompt: Some("{{item}}".to_string()),
            mode: None,
            agent_config: None,
            recipe: None,
            step_context: None,
            recursion: None,
            output: None,
            condition: None,
            foreach: Some("{{items}}".to_string()),
            as_var: "item".to_string(),
            collect: Some("results".to_string()),
            parallel,
            max_iterations: 10,
            timeout: 600,
            retry: None,
            on_error: OnError::Fail,
            depends_on: vec![],
        }
    }

    fn run_ctx(spawner: crate::spawner::DynSpawner) -> RunCtx {
        RunCtx {
            spawner,
            project_path: std::path::PathBuf::from("/proj"),
            session_id: "s1".to_string(),
            started: Utc::now(),
        }
    }

    fn context_with_items(items: Vec<&str>) -> Value {
        let mut m = BTreeMap::new();
        m.insert(
            "items".to_string(),
            Value::List(items.into_iter().map(|s| Value::String(s.to_string())).collect()),
        );
        Value::Map(m)
    }

    #[tokio::test]
    async fn empty_sequence_is_skipped_not_errored() {
        let ctx = run_ctx(Arc::new(Echo));
        let step = foreach_step(false);
        let mut context = context_with_items(vec![]);
        let mut recursion = RecursionState::new("r", RecursionConfig::default());
        let outcome = run_foreach(&ctx, &step, &mut context, &mut recursion, None).await.unwrap();
        assert!(matches!(outcome, StepRunOutcome::Skipped));
    }

    #[tokio::test]
    async fn sequential_collects_in_order() {
        let ctx = run_ctx(Arc::new(Echo));
        let step = foreach_step(false);
        let mut context = context_with_items(vec!["a", "b", "c"]);
        let mut recursion = RecursionState::new("r", RecursionConfig::default());
        run_foreach(&ctx, &step, &mut context, &mut recursion, None).await.unwrap();
        let results = context.resolve_path("results").unwrap().as_list().unwrap();
        assert_eq!(
            results,
            &vec![
                Value::String("a".to_string()),
                Value::String("b".to_string()),
                Value::String("c".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn sequential_fails_fast_and_names_the_iteration() {
        let ctx = run_ctx(Arc::new(FailOnThird(AtomicUsize::new(0))));
        let step = foreach_step(false);
        let mut context = context_with_items(vec!["a", "b", "c", "d"]);
        let mut recursion = RecursionState::new("r", RecursionConfig::default());
        let err = run_foreach(&ctx, &step, &mut context, &mut recursion, None)
            .await
            .unwrap_err();
        match err {
            EngineError::IterationFailed { index, .. } => assert_eq!(index, 2),
            other => panic!("expected IterationFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn parallel_preserves_input_order() {
        let ctx = run_ctx(Arc::new(Echo));
        let mut step = foreach_step(true);
        step.parallel = true;
        let mut context = context_with_items(vec!["a", "b", "c"]);
        let mut recursion = RecursionState::new("r", RecursionConfig::default());
        run_foreach(&ctx, &step, &mut context, &mut recursion, None).await.unwrap();
        let results = context.resolve_path("results").unwrap().as_list().unwrap();
        assert_eq!(
            results,
            &vec![
                Value::String("a".to_string()),
                Value::String("b".to_string()),
                Value::String("c".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn too_many_iterations_is_an_error() {
        let ctx = run_ctx(Arc::new(Echo));
        let mut step = foreach_step(false);
        step.max_iterations = 2;
        let mut context = context_with_items(vec!["a", "b", "c"]);
        let mut recursion = RecursionState::new("r", RecursionConfig::default());
        let err = run_foreach(&ctx, &step, &mut context, &mut recursion, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::TooManyIterations { .. }));
    }
}
