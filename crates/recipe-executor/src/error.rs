//! Runtime failures for a recipe *run*, as opposed to load-time
//! (`recipe_core::RecipeError`) or template-evaluation (`recipe_eval::EvalError`)
//! failures, which this enum wraps rather than re-states.

use recipe_core::RecipeError;
use recipe_eval::EvalError;
use recipe_session::SessionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Load(#[from] RecipeError),

    #[error(transparent)]
    Template(#[from] EvalError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("recipe failed validation: {0:?}")]
    Validation(Vec<String>),

    #[error("agent spawner failed for step '{step_id}': {message}")]
    Spawn { step_id: String, message: String },

    #[error("recursion depth exceeded (max {max_depth}): {stack}")]
    DepthExceeded { max_depth: i64, stack: String },

    #[error("total step budget exceeded (max {max_total_steps})")]
    StepsExceeded { max_total_steps: i64 },

    #[error("foreach value for step '{step_id}' is not a sequence")]
    ForeachNotASequence { step_id: String },

    #[error("step '{step_id}': {count} iterations exceeds max_iterations ({max})")]
    TooManyIterations { step_id: String, count: usize, max: i64 },

    #[error("step '{step_id}' iteration {index} failed: {source}")]
    IterationFailed {
        step_id: String,
        index: usize,
        #[source]
        source: Box<EngineError>,
    },

    #[error("approval for stage '{stage}' was denied: {reason}")]
    ApprovalDenied { stage: String, reason: String },

    #[error("approval for stage '{stage}' timed out and was denied by default")]
    ApprovalTimedOutDenied { stage: String },

    #[error("sub-recipes cannot pause for approval (stage '{stage}' in recipe '{recipe}'); their progress is not separately checkpointed")]
    NestedApprovalUnsupported { recipe: String, stage: String },

    #[error("session '{0}' has no pending approval to resume from")]
    NotPaused(String),
}

/// Non-error control outcome: a staged driver run paused at an approval gate
/// (spec.md §9 — modeled as a result, not the source's raised exception).
#[derive(Debug, Clone)]
pub struct ApprovalGatePaused {
    pub session_id: String,
    pub stage_name: String,
    pub prompt: String,
}

pub type EngineResult<T> = Result<T, EngineError>;
