//! Recipe data model, YAML loader, and the dynamic `Value` type shared by
//! the recipe execution engine's other crates.

pub mod error;
pub mod loader;
pub mod model;
pub mod value;

pub use error::{RecipeError, RecipeResult};
pub use loader::{load_from_path, load_from_str};
pub use model::{
    ApprovalConfig, ApprovalDefault, BackoffKind, OnError, Recipe, RecursionConfig, RetryConfig,
    Stage, Step, StepType,
};
pub use value::Value;

/// Reserved top-level context keys the engine injects; never settable as a
/// step's `output` name.
pub const RESERVED_CONTEXT_KEYS: [&str; 3] = ["recipe", "session", "step"];
