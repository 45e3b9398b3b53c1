//! Recursion depth and total-step budget tracking (spec.md §4.6 "C6").
//!
//! `RecursionState` is per-invocation accounting only — it is never part of
//! `SessionState` and never touches disk (spec.md §3: "not persisted"). A
//! resumed run starts a fresh one; the budget only bounds the work a single
//! `execute`/`resume` call does, not a recipe's lifetime.

use crate::error::{EngineError, EngineResult};
use recipe_core::RecursionConfig;

#[derive(Debug, Clone)]
pub struct RecursionState {
    pub current_depth: i64,
    pub total_steps: i64,
    pub max_depth: i64,
    pub max_total_steps: i64,
    pub recipe_stack: Vec<String>,
}

impl RecursionState {
    pub fn new(recipe_name: &str, config: RecursionConfig) -> Self {
        Self {
            current_depth: 0,
            total_steps: 0,
            max_depth: config.max_depth,
            max_total_steps: config.max_total_steps,
            recipe_stack: vec![recipe_name.to_string()],
        }
    }

    pub fn check_depth(&self) -> EngineResult<()> {
        if self.current_depth >= self.max_depth {
            return Err(EngineError::DepthExceeded {
                max_depth: self.max_depth,
                stack: self.recipe_stack.join(" -> "),
            });
        }
        Ok(())
    }

    /// Charge `n` steps against the total-step budget, failing rather than
    /// overrunning it (spec.md: "the entire step fails if the budget would
    /// be exceeded").
    pub fn increment_steps(&mut self, n: i64) -> EngineResult<()> {
        if self.total_steps + n > self.max_total_steps {
            return Err(EngineError::StepsExceeded {
                max_total_steps: self.max_total_steps,
            });
        }
        self.total_steps += n;
        Ok(())
    }

    /// Produce the child tracker for a sub-recipe call: depth+1, a fresh
    /// step counter, and the stack annotated with the child's name. `override_config`
    /// is the step-level `recursion:` block, if the calling step set one;
    /// absent, the child inherits the parent's limits.
    pub fn enter(&self, child_name: &str, override_config: Option<RecursionConfig>) -> EngineResult<RecursionState> {
        self.check_depth()?;
        let (max_depth, max_total_steps) = match override_config {
            Some(c) => (c.max_depth, c.max_total_steps),
            None => (self.max_depth, self.max_total_steps),
        };
        let mut recipe_stack = self.recipe_stack.clone();
        recipe_stack.push(child_name.to_string());
        Ok(RecursionState {
            current_depth: self.current_depth + 1,
            total_steps: 0,
            max_depth,
            max_total_steps,
            recipe_stack,
        })
    }

    /// Fold a returned child's step usage back into this tracker, after the
    /// sub-recipe call it came from has finished.
    pub fn absorb_child(&mut self, child: &RecursionState) -> EngineResult<()> {
        self.increment_steps(child.total_steps)
    }
}
