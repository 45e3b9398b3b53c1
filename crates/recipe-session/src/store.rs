//! On-disk session store (spec.md §4.5, §6 "Session directory").
//!
//! Layout: `<base>/<project-slug>/recipe-sessions/<session_id>/{state.json,
//! recipe.yaml}`. `save_state` writes to a sibling temp file and renames it
//! into place so a reader never observes a half-written `state.json` (spec.md
//! §9 "State durability" permits, without mandating, this discipline — the
//! same one the nearby session-locking crate in this workspace's teacher
//! applies to its own on-disk writes).

use crate::error::{SessionError, SessionResult};
use crate::id::new_session_id;
use crate::state::{SessionState, SessionSummary};
use chrono::Utc;
use recipe_core::{Recipe, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// `<base>/<project-slug>` — absolute project path with path separators
/// replaced by `-`, leading `-` trimmed.
pub fn project_slug(project_path: &Path) -> String {
    let raw = project_path.to_string_lossy().replace(['/', '\\'], "-");
    raw.trim_start_matches('-').to_string()
}

fn sessions_root(base_dir: &Path, project_path: &Path) -> PathBuf {
    base_dir.join(project_slug(project_path)).join("recipe-sessions")
}

fn session_dir(base_dir: &Path, project_path: &Path, session_id: &str) -> PathBuf {
    sessions_root(base_dir, project_path).join(session_id)
}

fn state_path(base_dir: &Path, project_path: &Path, session_id: &str) -> PathBuf {
    session_dir(base_dir, project_path, session_id).join("state.json")
}

/// Where `create_session` copies the recipe source to, if given one. A
/// resuming caller needs this to re-load the recipe a session was started
/// from (spec.md §6 "resume").
pub fn session_recipe_path(base_dir: &Path, project_path: &Path, session_id: &str) -> PathBuf {
    session_dir(base_dir, project_path, session_id).join("recipe.yaml")
}

/// Create a new session directory, optionally copying the recipe source
/// file alongside, and write the initial state. The caller supplies the
/// already-merged initial context (recipe.context ⊕ caller_vars, plus the
/// reserved `recipe`/`session` sub-mappings) — the store itself knows
/// nothing about variable merging.
pub fn create_session(
    base_dir: &Path,
    project_path: &Path,
    recipe: &Recipe,
    recipe_source_path: Option<&Path>,
    initial_context: Value,
) -> SessionResult<SessionState> {
    let session_id = new_session_id(Utc::now());
    let dir = session_dir(base_dir, project_path, &session_id);

    fs::create_dir_all(&dir).map_err(|source| SessionError::CreateDir {
        path: dir.display().to_string(),
        source,
    })?;

    if let Some(src) = recipe_source_path {
        let dest = dir.join("recipe.yaml");
        fs::copy(src, &dest).map_err(|source| SessionError::CopyRecipe {
            from: src.display().to_string(),
            to: dest.display().to_string(),
            source,
        })?;
    }

    let state = if recipe.is_staged() {
        SessionState::new_staged(
            session_id,
            recipe.name.clone(),
            recipe.version.clone(),
            project_path.to_string_lossy().to_string(),
            Utc::now(),
            initial_context,
        )
    } else {
        SessionState::new_flat(
            session_id,
            recipe.name.clone(),
            recipe.version.clone(),
            project_path.to_string_lossy().to_string(),
            Utc::now(),
            initial_context,
        )
    };

    save_state(base_dir, project_path, &state)?;
    tracing::info!(session_id = %state.session_id, recipe = %recipe.name, "session created");
    Ok(state)
}

/// Full rewrite of `state.json`: temp-file-in-same-directory + rename.
pub fn save_state(base_dir: &Path, project_path: &Path, state: &SessionState) -> SessionResult<()> {
    let dir = session_dir(base_dir, project_path, &state.session_id);
    fs::create_dir_all(&dir).map_err(|source| SessionError::CreateDir {
        path: dir.display().to_string(),
        source,
    })?;

    let path = state_path(base_dir, project_path, &state.session_id);
    let tmp_path = dir.join(format!("state.json.tmp-{}", std::process::id()));

    let json = serde_json::to_string_pretty(state).map_err(SessionError::Serialize)?;
    fs::write(&tmp_path, json).map_err(|source| SessionError::WriteState {
        path: tmp_path.display().to_string(),
        source,
    })?;
    fs::rename(&tmp_path, &path).map_err(|source| SessionError::WriteState {
        path: path.display().to_string(),
        source,
    })?;

    tracing::debug!(session_id = %state.session_id, "checkpoint written");
    Ok(())
}

/// Load and parse a session's state. Fails with `NotFound` if the state
/// file is absent.
pub fn load_state(base_dir: &Path, project_path: &Path, session_id: &str) -> SessionResult<SessionState> {
    let path = state_path(base_dir, project_path, session_id);
    if !path.exists() {
        return Err(SessionError::NotFound(session_id.to_string()));
    }
    let contents = fs::read_to_string(&path).map_err(|source| SessionError::ReadState {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| SessionError::Parse {
        path: path.display().to_string(),
        source,
    })
}

pub fn session_exists(base_dir: &Path, project_path: &Path, session_id: &str) -> bool {
    state_path(base_dir, project_path, session_id).exists()
}

/// Enumerate sessions for a project, newest `started` first. Entries whose
/// state can't be read are skipped silently (spec.md §4.5).
pub fn list_sessions(base_dir: &Path, project_path: &Path) -> SessionResult<Vec<SessionSummary>> {
    let root = sessions_root(base_dir, project_path);
    if !root.exists() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(&root).map_err(|source| SessionError::ListDir {
        path: root.display().to_string(),
        source,
    })?;

    let mut summaries = Vec::new();
    for entry in entries {
        let Ok(entry) = entry else { continue };
        let Ok(file_type) = entry.file_type() else { continue };
        if !file_type.is_dir() {
            continue;
        }
        let session_id = entry.file_name().to_string_lossy().to_string();
        match load_state(base_dir, project_path, &session_id) {
            Ok(state) => summaries.push(SessionSummary::from(&state)),
            Err(e) => tracing::debug!(session_id = %session_id, error = %e, "skipping unreadable session"),
        }
    }

    summaries.sort_by(|a, b| b.started.cmp(&a.started));
    Ok(summaries)
}

/// Delete session directories whose `started` predates `now - auto_cleanup_days`.
/// Returns the number removed. Called after every successful top-level
/// execution (spec.md §4.5).
pub fn cleanup_old_sessions(
    base_dir: &Path,
    project_path: &Path,
    auto_cleanup_days: i64,
) -> SessionResult<usize> {
    let root = sessions_root(base_dir, project_path);
    if !root.exists() {
        return Ok(0);
    }

    let cutoff = Utc::now() - chrono::Duration::days(auto_cleanup_days);
    let entries = fs::read_dir(&root).map_err(|source| SessionError::ListDir {
        path: root.display().to_string(),
        source,
    })?;

    let mut removed = 0;
    for entry in entries {
        let Ok(entry) = entry else { continue };
        let Ok(file_type) = entry.file_type() else { continue };
        if !file_type.is_dir() {
            continue;
        }
        let session_id = entry.file_name().to_string_lossy().to_string();
        let state = match load_state(base_dir, project_path, &session_id) {
            Ok(s) => s,
            Err(_) => continue,
        };
        if state.started < cutoff {
            if fs::remove_dir_all(entry.path()).is_ok() {
                tracing::info!(session_id = %session_id, "cleaned up expired session");
                removed += 1;
            }
        }
    }
    Ok(removed)
}
