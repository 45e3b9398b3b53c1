//! Side-effect-free condition evaluation and `{{variable}}` substitution
//! over recipe context.

pub mod condition;
pub mod error;
pub mod substitute;

pub use condition::evaluate as evaluate_condition;
pub use error::{EvalError, EvalResult};
pub use substitute::{extract_variable_paths, has_variable_reference, substitute};
