use thiserror::Error;

/// Load-time and structural-validation failures for a single recipe document.
///
/// Runtime errors (template resolution, recursion, approval, step execution)
/// live in `recipe-eval`, `recipe-session`, and `recipe-executor` respectively;
/// this enum only covers what can go wrong turning YAML bytes into a valid
/// `Recipe`.
#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("failed to read recipe file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML in {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("recipe document root must be a mapping")]
    NotAMapping,

    #[error("'steps' must be a list")]
    StepsNotAList,

    #[error("'stages' must be a list")]
    StagesNotAList,

    #[error("a recipe may not declare both 'steps' and 'stages'")]
    BothStepsAndStages,

    #[error("a recipe must declare either 'steps' or 'stages'")]
    NeitherStepsNorStages,

    #[error("step or stage entry must be a mapping")]
    EntryNotAMapping,

    #[error("recursion.max_depth must be in 1..=20, got {0}")]
    MaxDepthOutOfRange(i64),

    #[error("recursion.max_total_steps must be in 1..=1000, got {0}")]
    MaxTotalStepsOutOfRange(i64),

    #[error("recipe field '{field}' is required")]
    MissingField { field: String },

    #[error("recipe 'name' must contain only alphanumerics, '-', and '_'")]
    InvalidName,

    #[error("recipe 'version' must be strict MAJOR.MINOR.PATCH (all numeric, no prefix/suffix), got '{0}'")]
    InvalidVersion(String),

    #[error("stage 'name' must contain only alphanumerics, '-', '_', and spaces")]
    InvalidStageName,

    #[error("stage '{0}' has no steps")]
    EmptyStage(String),

    #[error("step '{id}': {reason}")]
    InvalidStep { id: String, reason: String },

    #[error("approval config: {0}")]
    InvalidApproval(String),
}

pub type RecipeResult<T> = Result<T, RecipeError>;
