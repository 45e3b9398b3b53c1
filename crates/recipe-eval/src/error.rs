use thiserror::Error;

/// Runtime template/condition failures. Distinct from `recipe_core::RecipeError`
/// because these surface while a recipe is *running*, not while it's being
/// loaded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvalError {
    #[error("undefined variable '{path}' (available: {})", available.join(", "))]
    UndefinedVariable { path: String, available: Vec<String> },

    #[error("invalid condition syntax: {0}")]
    InvalidSyntax(String),
}

pub type EvalResult<T> = Result<T, EvalError>;
