//! The checkpoint record (spec.md §3 "SessionState") and the small value
//! types that hang off it: approval status, pending-approval fields, and
//! the approval history log.

use chrono::{DateTime, Utc};
use recipe_core::{ApprovalDefault, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `ApprovalStatus ∈ {NOT_REQUIRED, PENDING, APPROVED, DENIED, TIMEOUT}`
/// (spec.md §4.9.3's state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    NotRequired,
    Pending,
    Approved,
    Denied,
    Timeout,
}

/// An entry in a session's durable approval audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalHistoryEntry {
    pub stage: String,
    pub status: ApprovalStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The fields recorded while a stage is parked at its approval gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    pub stage: String,
    pub prompt: String,
    /// Seconds; `0` means "never times out" (spec.md §9 consolidation of the
    /// source's ambiguous "0 means never / 0 means missing" split).
    pub timeout: i64,
    pub default: ApprovalDefault,
    pub requested_at: DateTime<Utc>,
}

/// Durable per-session checkpoint record (spec.md §3). Both the flat-mode
/// and staged-mode cursor fields live on the same struct — only the ones
/// matching `is_staged` are meaningful, but keeping them as plain `Option`
/// fields (rather than an enum) lets the JSON shape match spec.md §6
/// exactly and keeps `serde_json` round-trips trivial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub recipe_name: String,
    pub recipe_version: String,
    pub started: DateTime<Utc>,
    pub project_path: String,
    pub context: Value,
    #[serde(default)]
    pub completed_steps: Vec<String>,

    pub is_staged: bool,

    // Flat mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step_index: Option<usize>,

    // Staged mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stage_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step_in_stage: Option<usize>,
    #[serde(default)]
    pub completed_stages: Vec<String>,

    // Approval bookkeeping (staged mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_approval: Option<PendingApproval>,
    #[serde(default)]
    pub stage_approvals: BTreeMap<String, ApprovalStatus>,
    #[serde(default)]
    pub approval_history: Vec<ApprovalHistoryEntry>,
}

impl SessionState {
    /// New flat-mode state with an empty context and cursor at step 0.
    pub fn new_flat(
        session_id: String,
        recipe_name: String,
        recipe_version: String,
        project_path: String,
        started: DateTime<Utc>,
        context: Value,
    ) -> Self {
        Self {
            session_id,
            recipe_name,
            recipe_version,
            started,
            project_path,
            context,
            completed_steps: Vec::new(),
            is_staged: false,
            current_step_index: Some(0),
            current_stage_index: None,
            current_step_in_stage: None,
            completed_stages: Vec::new(),
            pending_approval: None,
            stage_approvals: BTreeMap::new(),
            approval_history: Vec::new(),
        }
    }

    /// New staged-mode state with an empty context and cursor at stage 0,
    /// step 0.
    pub fn new_staged(
        session_id: String,
        recipe_name: String,
        recipe_version: String,
        project_path: String,
        started: DateTime<Utc>,
        context: Value,
    ) -> Self {
        Self {
            session_id,
            recipe_name,
            recipe_version,
            started,
            project_path,
            context,
            completed_steps: Vec::new(),
            is_staged: true,
            current_step_index: None,
            current_stage_index: Some(0),
            current_step_in_stage: Some(0),
            completed_stages: Vec::new(),
            pending_approval: None,
            stage_approvals: BTreeMap::new(),
            approval_history: Vec::new(),
        }
    }
}

/// Lightweight summary returned by `list_sessions` (spec.md §4.5) — the full
/// state is available via `load_state` when a caller needs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub recipe_name: String,
    pub recipe_version: String,
    pub started: DateTime<Utc>,
    pub is_staged: bool,
    pub completed_step_count: usize,
    pub has_pending_approval: bool,
}

impl From<&SessionState> for SessionSummary {
    fn from(state: &SessionState) -> Self {
        Self {
            session_id: state.session_id.clone(),
            recipe_name: state.recipe_name.clone(),
            recipe_version: state.recipe_version.clone(),
            started: state.started,
            is_staged: state.is_staged,
            completed_step_count: state.completed_steps.len(),
            has_pending_approval: state.pending_approval.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_state_round_trips_through_json() {
        let state = SessionState::new_flat(
            "s1".into(),
            "r".into(),
            "1.0.0".into(),
            "/proj".into(),
            Utc::now(),
            Value::map(),
        );
        let json = serde_json::to_string_pretty(&state).unwrap();
        let back: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.session_id, state.session_id);
        assert_eq!(back.current_step_index, Some(0));
        assert!(!back.is_staged);
    }

    #[test]
    fn staged_state_omits_flat_cursor() {
        let state = SessionState::new_staged(
            "s1".into(),
            "r".into(),
            "1.0.0".into(),
            "/proj".into(),
            Utc::now(),
            Value::map(),
        );
        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("current_step_index").is_none());
        assert_eq!(json.get("current_stage_index").unwrap(), 0);
    }
}
