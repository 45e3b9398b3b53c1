//! The seam between a recipe step and whatever actually runs an agent.
//!
//! The engine never spawns a process or calls an LLM itself — it hands the
//! substituted instruction to an `AgentSpawner` and trusts back whatever
//! `Value` comes out. Tests and the binary crate that embeds this engine
//! supply their own implementation.

use async_trait::async_trait;
use recipe_core::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct SpawnError(pub String);

#[async_trait]
pub trait AgentSpawner: Send + Sync {
    /// Run one agent invocation. `sub_session_id` is `None` for every call
    /// this engine makes today — steps don't yet request a dedicated child
    /// agent session — but the parameter is part of the contract a caller's
    /// spawner implementation may already expect (spec.md §4.7).
    async fn spawn(
        &self,
        agent_name: &str,
        instruction: &str,
        parent_session: &str,
        agent_configs: Option<&Value>,
        sub_session_id: Option<&str>,
    ) -> Result<Value, SpawnError>;
}

pub type DynSpawner = Arc<dyn AgentSpawner>;
