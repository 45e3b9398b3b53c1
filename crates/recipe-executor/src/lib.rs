//! Recursion/budget tracking, retry-governed step execution, `foreach`
//! fan-out, and the flat/staged recipe drivers behind the public `Engine`
//! facade (spec.md §4.6 - §4.9, §6).

mod context;
mod driver;
mod error;
mod facade;
mod loop_exec;
mod recursion;
mod spawner;
mod step;

pub use error::{ApprovalGatePaused, EngineError, EngineResult};
pub use facade::{ApprovalSummary, Engine, EngineConfig, EngineOutcome};
pub use spawner::{AgentSpawner, DynSpawner, SpawnError};
