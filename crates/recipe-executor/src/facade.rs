//! The public `Engine` (spec.md §6): the six tool operations a caller
//! (CLI, MCP server, whatever embeds this crate) actually needs — execute,
//! resume, list, validate, approvals, approve, deny.

use crate::context::{inject_recipe_ns, inject_session_ns, RunCtx};
use crate::driver;
use crate::error::{EngineError, EngineResult};
use crate::recursion::RecursionState;
use crate::spawner::DynSpawner;
use chrono::{DateTime, Utc};
use recipe_core::{Recipe, Value};
use recipe_validate::ValidationReport;
use std::path::{Path, PathBuf};

/// Where sessions live and how long a completed one sticks around before
/// `execute`/`resume` sweep it up (spec.md §4.5).
pub struct EngineConfig {
    pub base_dir: PathBuf,
    pub auto_cleanup_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let base_dir = dirs::home_dir()
            .map(|home| home.join(".amplifier").join("projects"))
            .unwrap_or_else(|| PathBuf::from(".amplifier/projects"));
        Self {
            base_dir,
            auto_cleanup_days: 7,
        }
    }
}

/// Either a finished run's final context, or a parked run waiting on a
/// human's `approve`/`deny` call.
#[derive(Debug)]
pub enum EngineOutcome {
    Completed { session_id: String, context: Value },
    PausedForApproval { session_id: String, stage_name: String, prompt: String },
}

#[derive(Debug, Clone)]
pub struct ApprovalSummary {
    pub session_id: String,
    pub stage_name: String,
    pub prompt: String,
    pub requested_at: DateTime<Utc>,
}

pub struct Engine {
    config: EngineConfig,
    spawner: DynSpawner,
}

impl Engine {
    pub fn new(config: EngineConfig, spawner: DynSpawner) -> Self {
        Self { config, spawner }
    }

    /// Load, validate, and run a recipe from the start (spec.md §6 "execute").
    pub async fn execute(&self, recipe_path: &Path, project_path: &Path, caller_vars: Option<Value>) -> EngineResult<EngineOutcome> {
        let recipe = recipe_core::load_from_path(recipe_path)?;
        let report = recipe_validate::validate_recipe(&recipe, None);
        if !report.is_valid() {
            return Err(EngineError::Validation(report.errors));
        }

        let mut initial_context = recipe.context.clone();
        if let Some(Value::Map(vars)) = caller_vars {
            initial_context.extend(vars);
        }

        let mut state = recipe_session::create_session(
            &self.config.base_dir,
            project_path,
            &recipe,
            Some(recipe_path),
            Value::Map(initial_context),
        )?;

        let mut context = state.context.clone();
        inject_recipe_ns(&mut context, &recipe);
        inject_session_ns(&mut context, &state.session_id, state.started, &project_path.to_string_lossy());
        state.context = context;
        recipe_session::save_state(&self.config.base_dir, project_path, &state)?;

        let recursion_config = recipe.recursion.unwrap_or_default();
        let mut recursion = RecursionState::new(&recipe.name, recursion_config);

        let ctx = RunCtx {
            spawner: self.spawner.clone(),
            project_path: project_path.to_path_buf(),
            session_id: state.session_id.clone(),
            started: state.started,
        };
        let recipe_dir = recipe_path.parent().map(Path::to_path_buf);

        self.run_to_completion_or_pause(&ctx, &recipe, &mut state, &mut recursion, recipe_dir.as_deref(), project_path)
            .await
    }

    /// Resume a parked or interrupted session from its last checkpoint
    /// (spec.md §6 "resume").
    pub async fn resume(&self, session_id: &str, project_path: &Path) -> EngineResult<EngineOutcome> {
        let mut state = recipe_session::load_state(&self.config.base_dir, project_path, session_id)?;
        let recipe_path = recipe_session::session_recipe_path(&self.config.base_dir, project_path, session_id);
        let recipe = recipe_core::load_from_path(&recipe_path)?;

        let recursion_config = recipe.recursion.unwrap_or_default();
        let mut recursion = RecursionState::new(&recipe.name, recursion_config);

        let ctx = RunCtx {
            spawner: self.spawner.clone(),
            project_path: project_path.to_path_buf(),
            session_id: state.session_id.clone(),
            started: state.started,
        };
        let recipe_dir = recipe_path.parent().map(Path::to_path_buf);

        self.run_to_completion_or_pause(&ctx, &recipe, &mut state, &mut recursion, recipe_dir.as_deref(), project_path)
            .await
    }

    async fn run_to_completion_or_pause(
        &self,
        ctx: &RunCtx,
        recipe: &Recipe,
        state: &mut recipe_session::SessionState,
        recursion: &mut RecursionState,
        recipe_dir: Option<&Path>,
        project_path: &Path,
    ) -> EngineResult<EngineOutcome> {
        let paused = if recipe.is_staged() {
            driver::drive_staged(ctx, recipe, state, recursion, &self.config.base_dir, recipe_dir).await?
        } else {
            driver::drive_flat(ctx, recipe, state, recursion, &self.config.base_dir, recipe_dir).await?;
            None
        };

        match paused {
            Some(gate) => Ok(EngineOutcome::PausedForApproval {
                session_id: gate.session_id,
                stage_name: gate.stage_name,
                prompt: gate.prompt,
            }),
            None => {
                recipe_session::cleanup_old_sessions(&self.config.base_dir, project_path, self.config.auto_cleanup_days)?;
                Ok(EngineOutcome::Completed {
                    session_id: state.session_id.clone(),
                    context: state.context.clone(),
                })
            }
        }
    }

    /// Enumerate sessions recorded for a project (spec.md §6 "list").
    pub fn list(&self, project_path: &Path) -> EngineResult<Vec<recipe_session::SessionSummary>> {
        Ok(recipe_session::list_sessions(&self.config.base_dir, project_path)?)
    }

    /// Static validation only — no session, no execution (spec.md §6 "validate").
    pub fn validate(&self, recipe_path: &Path) -> EngineResult<ValidationReport> {
        let recipe = recipe_core::load_from_path(recipe_path)?;
        Ok(recipe_validate::validate_recipe(&recipe, None))
    }

    /// Every session in a project currently parked at an approval gate
    /// (spec.md §6 "approvals").
    pub fn approvals(&self, project_path: &Path) -> EngineResult<Vec<ApprovalSummary>> {
        let pending = recipe_session::list_pending_approvals(&self.config.base_dir, project_path)?;
        Ok(pending
            .into_iter()
            .map(|(state, approval)| ApprovalSummary {
                session_id: state.session_id,
                stage_name: approval.stage,
                prompt: approval.prompt,
                requested_at: approval.requested_at,
            })
            .collect())
    }

    /// Approve a pending stage gate out of band. Does not resume the run —
    /// the caller still needs to call `resume` to continue it (spec.md §6
    /// "approve").
    pub fn approve(&self, project_path: &Path, session_id: &str, stage_name: &str) -> EngineResult<()> {
        recipe_session::approve(&self.config.base_dir, project_path, session_id, stage_name)?;
        Ok(())
    }

    /// Deny a pending stage gate out of band (spec.md §6 "deny").
    pub fn deny(&self, project_path: &Path, session_id: &str, stage_name: &str, reason: Option<&str>) -> EngineResult<()> {
        recipe_session::deny(&self.config.base_dir, project_path, session_id, stage_name, reason)?;
        Ok(())
    }
}
