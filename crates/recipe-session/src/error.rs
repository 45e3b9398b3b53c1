use thiserror::Error;

/// Failures from the session store: missing/corrupt state, I/O, and
/// approval-gate misuse. Distinct from `recipe_core::RecipeError` (load-time)
/// and `recipe_eval::EvalError` (template runtime).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to create session directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write state file {path}: {source}")]
    WriteState {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read state file {path}: {source}")]
    ReadState {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize session state: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to parse session state {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to copy recipe file from {from} to {to}: {source}")]
    CopyRecipe {
        from: String,
        to: String,
        #[source]
        source: std::io::Error,
    },

    #[error("session '{0}' not found")]
    NotFound(String),

    #[error("no pending approval for session '{session_id}'")]
    NoPendingApproval { session_id: String },

    #[error("pending approval for session '{session_id}' is for stage '{pending}', not '{requested}'")]
    StageMismatch {
        session_id: String,
        pending: String,
        requested: String,
    },

    #[error("failed to list sessions under {path}: {source}")]
    ListDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type SessionResult<T> = Result<T, SessionError>;
