//! Agent-step execution: template substitution, the spawner call, and the
//! retry/backoff/`on_error` wrapper around it (spec.md §4.7 "C7").

use crate::error::{EngineError, EngineResult};
use crate::spawner::DynSpawner;
use recipe_core::{BackoffKind, OnError, RetryConfig, Step, Value};
use std::time::Duration;

/// What the retry wrapper produced once it stopped retrying: a value to
/// store, or the `on_error: skip_remaining` signal for the driver to catch.
pub enum OnErrorOutcome {
    Value(Value),
    SkipRemaining,
}

fn default_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 1,
        backoff: BackoffKind::Exponential,
        initial_delay: 5,
        max_delay: 300,
    }
}

/// Substitute `step.prompt` against `context`, prefix `MODE: {mode}` if set,
/// and hand the instruction to the spawner.
pub async fn execute(spawner: &DynSpawner, step: &Step, context: &Value, parent_session: &str) -> EngineResult<Value> {
    let prompt = step
        .prompt
        .as_deref()
        .expect("agent step requires prompt (enforced by Step::validate)");
    let mut instruction = recipe_eval::substitute(prompt, context)?;
    if let Some(mode) = &step.mode {
        instruction = format!("MODE: {mode}\n\n{instruction}");
    }
    let agent = step
        .agent
        .as_deref()
        .expect("agent step requires agent (enforced by Step::validate)");
    let configs = step.agent_config.as_ref().map(|m| Value::Map(m.clone()));

    spawner
        .spawn(agent, &instruction, parent_session, configs.as_ref(), None)
        .await
        .map_err(|e| EngineError::Spawn {
            step_id: step.id.clone(),
            message: e.0,
        })
}

/// Retry `execute` per `step.retry` (default: one attempt, no retry), then
/// apply `step.on_error` to the final failure (spec.md §4.7/§4.8). The first
/// retry waits `initial_delay` before the second attempt — the source's
/// ambiguity over whether the first wait is skipped is resolved here in
/// favor of always waiting the configured delay.
pub async fn execute_with_retry(
    spawner: &DynSpawner,
    step: &Step,
    context: &Value,
    parent_session: &str,
) -> EngineResult<OnErrorOutcome> {
    let retry = step.retry.clone().unwrap_or_else(default_retry);
    let mut delay = retry.initial_delay;
    let mut last_err = None;

    for attempt in 0..retry.max_attempts {
        match execute(spawner, step, context, parent_session).await {
            Ok(value) => return Ok(OnErrorOutcome::Value(value)),
            Err(err) => {
                last_err = Some(err);
                if attempt + 1 < retry.max_attempts {
                    let wait = delay.min(retry.max_delay).max(0) as u64;
                    if wait > 0 {
                        tokio::time::sleep(Duration::from_secs(wait)).await;
                    }
                    if matches!(retry.backoff, BackoffKind::Exponential) {
                        delay *= 2;
                    }
                }
            }
        }
    }

    let err = last_err.expect("max_attempts >= 1 guarantees at least one attempt ran");
    match step.on_error {
        OnError::Fail => Err(err),
        OnError::Continue => Ok(OnErrorOutcome::Value(Value::Null)),
        OnError::SkipRemaining => Ok(OnErrorOutcome::SkipRemaining),
    }
}
