//! The flat and staged recipe drivers (spec.md §4.9 "C9"): step sequencing,
//! checkpointing, sub-recipe composition, and the staged approval-gate
//! lifecycle. `run_one_step`/`execute_direct_step` are shared by three
//! callers: the top-level drivers (which checkpoint), the loop executor
//! (one call per iteration), and sub-recipe bodies (which don't checkpoint
//! at all — spec.md §4.9.4: "their progress is not separately checkpointed").

use crate::context::{append_skipped, inject_recipe_ns, inject_session_ns, inject_step_ns, set_context_key, RunCtx};
use crate::error::{ApprovalGatePaused, EngineError, EngineResult};
use crate::loop_exec;
use crate::recursion::RecursionState;
use crate::step::{execute_with_retry, OnErrorOutcome};
use recipe_core::{OnError, Recipe, Step, StepType, Value};
use recipe_eval::{evaluate_condition, substitute};
use recipe_session::{ApprovalStatus, SessionState};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Outcome of one step's condition check plus foreach/direct dispatch.
pub(crate) enum StepRunOutcome {
    Skipped,
    Completed,
    SkipRemaining,
}

/// Evaluate `step.condition` (if any), then dispatch to the loop executor
/// or straight to `execute_direct_step`, writing `step.output`/`collect`
/// into `context` as appropriate.
pub(crate) async fn run_one_step(
    ctx: &RunCtx,
    step: &Step,
    context: &mut Value,
    recursion: &mut RecursionState,
    recipe_dir: Option<&Path>,
) -> EngineResult<StepRunOutcome> {
    if let Some(condition) = &step.condition {
        if !evaluate_condition(condition, context)? {
            append_skipped(context, &step.id);
            return Ok(StepRunOutcome::Skipped);
        }
    }

    if step.foreach.is_some() {
        return loop_exec::run_foreach(ctx, step, context, recursion, recipe_dir).await;
    }

    match execute_direct_step(ctx, step, context, recursion, recipe_dir).await? {
        OnErrorOutcome::SkipRemaining => Ok(StepRunOutcome::SkipRemaining),
        OnErrorOutcome::Value(result) => {
            if let Some(output) = &step.output {
                set_context_key(context, output, result);
            }
            Ok(StepRunOutcome::Completed)
        }
    }
}

/// Dispatch a single non-loop step: agent steps go through C7's
/// retry/backoff; recipe steps recurse into a fresh sub-context and have
/// `step.on_error` applied directly around the call (no retry — spec.md
/// §4.9.1 only names retry for the agent-type branch).
pub(crate) async fn execute_direct_step(
    ctx: &RunCtx,
    step: &Step,
    context: &mut Value,
    recursion: &mut RecursionState,
    recipe_dir: Option<&Path>,
) -> EngineResult<OnErrorOutcome> {
    match step.step_type {
        StepType::Agent => {
            recursion.increment_steps(1)?;
            execute_with_retry(&ctx.spawner, step, context, &ctx.session_id).await
        }
        StepType::Recipe => match run_sub_recipe(ctx, step, context, recursion, recipe_dir).await {
            Ok(value) => Ok(OnErrorOutcome::Value(value)),
            Err(e) => match step.on_error {
                OnError::Fail => Err(e),
                OnError::Continue => Ok(OnErrorOutcome::Value(Value::Null)),
                OnError::SkipRemaining => Ok(OnErrorOutcome::SkipRemaining),
            },
        },
    }
}

/// Load, isolate, and run a sub-recipe for a `recipe`-type step. The child
/// context is built only from `step.context` (template-substituted against
/// the parent), never inherited wholesale — spec.md §4.9.4's isolation
/// rule. The sub-recipe's final context becomes the step's result.
pub(crate) async fn run_sub_recipe(
    ctx: &RunCtx,
    step: &Step,
    context: &Value,
    recursion: &mut RecursionState,
    recipe_dir: Option<&Path>,
) -> EngineResult<Value> {
    let path_template = step
        .recipe
        .as_ref()
        .expect("recipe step requires recipe (enforced by Step::validate)");
    let resolved_path = substitute(path_template, context)?;
    let base_dir = recipe_dir.unwrap_or(&ctx.project_path);
    let full_path = base_dir.join(&resolved_path);

    let sub_recipe = recipe_core::load_from_path(&full_path)?;
    sub_recipe.validate()?;

    let mut sub_map = BTreeMap::new();
    if let Some(step_context) = &step.step_context {
        for (key, value) in step_context {
            let resolved_value = match value {
                Value::String(s) => Value::String(substitute(s, context)?),
                other => other.clone(),
            };
            sub_map.insert(key.clone(), resolved_value);
        }
    }
    let mut sub_context = Value::Map(sub_map);
    inject_recipe_ns(&mut sub_context, &sub_recipe);
    inject_session_ns(
        &mut sub_context,
        &ctx.session_id,
        ctx.started,
        &ctx.project_path.to_string_lossy(),
    );

    let mut child_recursion = recursion.enter(&sub_recipe.name, step.recursion)?;
    let sub_dir = full_path.parent().map(Path::to_path_buf);

    let result = Box::pin(run_recipe_body(
        ctx,
        &sub_recipe,
        &mut sub_context,
        &mut child_recursion,
        sub_dir.as_deref(),
    ))
    .await;

    recursion.absorb_child(&child_recursion)?;
    result?;
    Ok(sub_context)
}

/// Drive a sub-recipe's own steps/stages to completion, mutating `context`
/// in place. No session, no checkpointing, no approval gates: a staged
/// sub-recipe whose stage requires approval fails outright, since there is
/// nothing durable for it to pause into.
pub(crate) async fn run_recipe_body(
    ctx: &RunCtx,
    recipe: &Recipe,
    context: &mut Value,
    recursion: &mut RecursionState,
    recipe_dir: Option<&Path>,
) -> EngineResult<()> {
    if recipe.is_staged() {
        for stage in &recipe.stages {
            if let Some(approval) = &stage.approval {
                if approval.required {
                    return Err(EngineError::NestedApprovalUnsupported {
                        recipe: recipe.name.clone(),
                        stage: stage.name.clone(),
                    });
                }
            }
            for (index, step) in stage.steps.iter().enumerate() {
                inject_step_ns(context, &step.id, index, Some(&stage.name));
                if let StepRunOutcome::SkipRemaining =
                    run_one_step(ctx, step, context, recursion, recipe_dir).await?
                {
                    return Ok(());
                }
            }
        }
    } else {
        for (index, step) in recipe.steps.iter().enumerate() {
            inject_step_ns(context, &step.id, index, None);
            if let StepRunOutcome::SkipRemaining = run_one_step(ctx, step, context, recursion, recipe_dir).await? {
                return Ok(());
            }
        }
    }
    Ok(())
}

/// Top-level flat driver: advance from `state.current_step_index`,
/// checkpointing after each completed step (spec.md §4.9.1).
pub(crate) async fn drive_flat(
    ctx: &RunCtx,
    recipe: &Recipe,
    state: &mut SessionState,
    recursion: &mut RecursionState,
    session_store_base: &Path,
    recipe_dir: Option<&Path>,
) -> EngineResult<()> {
    let start = state.current_step_index.unwrap_or(0);
    for index in start..recipe.steps.len() {
        let step = &recipe.steps[index];
        inject_step_ns(&mut state.context, &step.id, index, None);

        match run_one_step(ctx, step, &mut state.context, recursion, recipe_dir).await {
            Ok(StepRunOutcome::Skipped) => {}
            Ok(StepRunOutcome::Completed) => {
                state.completed_steps.push(step.id.clone());
                state.current_step_index = Some(index + 1);
                recipe_session::save_state(session_store_base, project_path(state), state)?;
            }
            Ok(StepRunOutcome::SkipRemaining) => break,
            Err(e) => {
                let _ = recipe_session::save_state(session_store_base, project_path(state), state);
                return Err(e);
            }
        }
    }
    Ok(())
}

/// Top-level staged driver (spec.md §4.9.2): resolves any pending approval
/// first, then advances stage by stage, parking at the first required
/// approval gate it reaches. Returns `Some` when the run is paused, `None`
/// once every stage has completed.
pub(crate) async fn drive_staged(
    ctx: &RunCtx,
    recipe: &Recipe,
    state: &mut SessionState,
    recursion: &mut RecursionState,
    session_store_base: &Path,
    recipe_dir: Option<&Path>,
) -> EngineResult<Option<ApprovalGatePaused>> {
    if let Some(paused) = handle_pending_approval_on_resume(state)? {
        return Ok(Some(paused));
    }

    let stage_start = state.current_stage_index.unwrap_or(0);

    for stage_index in stage_start..recipe.stages.len() {
        let stage = &recipe.stages[stage_index];
        let step_start = if stage_index == stage_start {
            state.current_step_in_stage.unwrap_or(0)
        } else {
            0
        };

        for step_index in step_start..stage.steps.len() {
            let step = &stage.steps[step_index];
            inject_step_ns(&mut state.context, &step.id, step_index, Some(&stage.name));

            match run_one_step(ctx, step, &mut state.context, recursion, recipe_dir).await {
                Ok(StepRunOutcome::Skipped) => {}
                Ok(StepRunOutcome::Completed) => {
                    state.completed_steps.push(step.id.clone());
                    state.current_stage_index = Some(stage_index);
                    state.current_step_in_stage = Some(step_index + 1);
                    recipe_session::save_state(session_store_base, project_path(state), state)?;
                }
                Ok(StepRunOutcome::SkipRemaining) => return Ok(None),
                Err(e) => {
                    let _ = recipe_session::save_state(session_store_base, project_path(state), state);
                    return Err(e);
                }
            }
        }

        state.completed_stages.push(stage.name.clone());

        match &stage.approval {
            Some(approval) if approval.required => {
                state.current_stage_index = Some(stage_index + 1);
                state.current_step_in_stage = Some(0);
                recipe_session::save_state(session_store_base, project_path(state), state)?;

                let prompt = if approval.prompt.is_empty() {
                    format!("Approve stage '{}'?", stage.name)
                } else {
                    approval.prompt.clone()
                };
                recipe_session::set_pending_approval(state, &stage.name, prompt.clone(), approval.timeout, approval.default);
                recipe_session::save_state(session_store_base, project_path(state), state)?;

                return Ok(Some(ApprovalGatePaused {
                    session_id: state.session_id.clone(),
                    stage_name: stage.name.clone(),
                    prompt,
                }));
            }
            _ => {
                recipe_session::set_stage_approval_status(state, &stage.name, ApprovalStatus::NotRequired);
            }
        }
    }

    Ok(None)
}

fn handle_pending_approval_on_resume(state: &mut SessionState) -> EngineResult<Option<ApprovalGatePaused>> {
    let Some(pending) = state.pending_approval.clone() else {
        return Ok(None);
    };

    match recipe_session::check_approval_timeout(state, chrono::Utc::now()) {
        recipe_session::TimeoutOutcome::TimedOutDenied => {
            return Err(EngineError::ApprovalTimedOutDenied { stage: pending.stage });
        }
        recipe_session::TimeoutOutcome::TimedOutApproved => {
            recipe_session::clear_pending_approval(state);
            return Ok(None);
        }
        recipe_session::TimeoutOutcome::Waiting => {}
    }

    match recipe_session::get_stage_approval_status(state, &pending.stage) {
        ApprovalStatus::Pending => Ok(Some(ApprovalGatePaused {
            session_id: state.session_id.clone(),
            stage_name: pending.stage.clone(),
            prompt: pending.prompt.clone(),
        })),
        ApprovalStatus::Denied => {
            let reason = state
                .approval_history
                .iter()
                .rev()
                .find(|h| h.stage == pending.stage)
                .and_then(|h| h.reason.clone())
                .unwrap_or_else(|| "no reason given".to_string());
            Err(EngineError::ApprovalDenied { stage: pending.stage, reason })
        }
        ApprovalStatus::Approved => {
            recipe_session::clear_pending_approval(state);
            Ok(None)
        }
        ApprovalStatus::NotRequired | ApprovalStatus::Timeout => Ok(None),
    }
}

fn project_path(state: &SessionState) -> &Path {
    Path::new(&state.project_path)
}

// Re-exported for the loop executor, which needs a `PathBuf` version of
// `recipe_dir` to hand back into recursive calls it spawns as owned tasks.
pub(crate) fn owned(path: Option<&Path>) -> Option<PathBuf> {
    path.map(Path::to_path_buf)
}
