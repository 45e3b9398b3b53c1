//! Approval-gate persistence (spec.md §4.9.3): the out-of-band `approve`/
//! `deny` mutations, pending-approval bookkeeping, and the timeout check the
//! staged driver consults on resume.

use crate::error::{SessionError, SessionResult};
use crate::state::{ApprovalHistoryEntry, ApprovalStatus, PendingApproval, SessionState};
use crate::store::{list_sessions, load_state, save_state};
use chrono::Utc;
use recipe_core::ApprovalDefault;
use std::path::Path;

/// Outcome of checking a pending approval's timeout against the current
/// time. `timeout == 0` means "never" (spec.md §9 consolidation), so it
/// always resolves to `Waiting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutOutcome {
    Waiting,
    TimedOutApproved,
    TimedOutDenied,
}

/// Set a stage's recorded approval status directly (used by the staged
/// driver when a stage has no approval gate, to mark it `NotRequired`).
pub fn set_stage_approval_status(state: &mut SessionState, stage: &str, status: ApprovalStatus) {
    state.stage_approvals.insert(stage.to_string(), status);
}

pub fn get_stage_approval_status(state: &SessionState, stage: &str) -> ApprovalStatus {
    state
        .stage_approvals
        .get(stage)
        .copied()
        .unwrap_or(ApprovalStatus::NotRequired)
}

/// Park a session at an approval gate: records `pending_approval` and marks
/// the stage `PENDING`. Does not write to disk — callers checkpoint
/// alongside their own cursor update, matching spec.md §4.9.2 step 1-2.
pub fn set_pending_approval(
    state: &mut SessionState,
    stage: &str,
    prompt: String,
    timeout: i64,
    default: ApprovalDefault,
) {
    state.pending_approval = Some(PendingApproval {
        stage: stage.to_string(),
        prompt,
        timeout,
        default,
        requested_at: Utc::now(),
    });
    set_stage_approval_status(state, stage, ApprovalStatus::Pending);
}

pub fn get_pending_approval(state: &SessionState) -> Option<&PendingApproval> {
    state.pending_approval.as_ref()
}

pub fn clear_pending_approval(state: &mut SessionState) {
    state.pending_approval = None;
}

/// Has the pending approval (if any) exceeded its timeout? `Waiting` when
/// there's no pending approval, the timeout is `0`, or not enough time has
/// elapsed.
pub fn check_approval_timeout(state: &SessionState, now: chrono::DateTime<Utc>) -> TimeoutOutcome {
    let Some(pending) = &state.pending_approval else {
        return TimeoutOutcome::Waiting;
    };
    if pending.timeout == 0 {
        return TimeoutOutcome::Waiting;
    }
    let elapsed = (now - pending.requested_at).num_seconds();
    if elapsed < pending.timeout {
        return TimeoutOutcome::Waiting;
    }
    match pending.default {
        ApprovalDefault::Approve => TimeoutOutcome::TimedOutApproved,
        ApprovalDefault::Deny => TimeoutOutcome::TimedOutDenied,
    }
}

/// Enumerate sessions in a project whose state carries a pending approval.
pub fn list_pending_approvals(
    base_dir: &Path,
    project_path: &Path,
) -> SessionResult<Vec<(SessionState, PendingApproval)>> {
    let summaries = list_sessions(base_dir, project_path)?;
    let mut out = Vec::new();
    for summary in summaries {
        if !summary.has_pending_approval {
            continue;
        }
        let state = load_state(base_dir, project_path, &summary.session_id)?;
        if let Some(pending) = state.pending_approval.clone() {
            out.push((state, pending));
        }
    }
    Ok(out)
}

/// Approve a pending stage gate: verifies the pending approval matches
/// `stage_name`, records `APPROVED` + history, and writes the state. Does
/// **not** clear `pending_approval` — per spec.md §4.9.3 the resuming
/// driver clears it once it re-enters the gate check.
pub fn approve(
    base_dir: &Path,
    project_path: &Path,
    session_id: &str,
    stage_name: &str,
) -> SessionResult<SessionState> {
    let mut state = load_state(base_dir, project_path, session_id)?;
    verify_pending_stage(&state, session_id, stage_name)?;

    set_stage_approval_status(&mut state, stage_name, ApprovalStatus::Approved);
    state.approval_history.push(ApprovalHistoryEntry {
        stage: stage_name.to_string(),
        status: ApprovalStatus::Approved,
        timestamp: Utc::now(),
        reason: None,
    });
    save_state(base_dir, project_path, &state)?;
    tracing::info!(session_id, stage = stage_name, "approval granted");
    Ok(state)
}

/// Deny a pending stage gate: records `DENIED` + history, clears
/// `pending_approval`, and writes the state.
pub fn deny(
    base_dir: &Path,
    project_path: &Path,
    session_id: &str,
    stage_name: &str,
    reason: Option<&str>,
) -> SessionResult<SessionState> {
    let mut state = load_state(base_dir, project_path, session_id)?;
    verify_pending_stage(&state, session_id, stage_name)?;

    set_stage_approval_status(&mut state, stage_name, ApprovalStatus::Denied);
    state.approval_history.push(ApprovalHistoryEntry {
        stage: stage_name.to_string(),
        status: ApprovalStatus::Denied,
        timestamp: Utc::now(),
        reason: reason.map(str::to_string),
    });
    clear_pending_approval(&mut state);
    save_state(base_dir, project_path, &state)?;
    tracing::info!(session_id, stage = stage_name, reason, "approval denied");
    Ok(state)
}

fn verify_pending_stage(state: &SessionState, session_id: &str, stage_name: &str) -> SessionResult<()> {
    match &state.pending_approval {
        None => Err(SessionError::NoPendingApproval {
            session_id: session_id.to_string(),
        }),
        Some(pending) if pending.stage != stage_name => Err(SessionError::StageMismatch {
            session_id: session_id.to_string(),
            pending: pending.stage.clone(),
            requested: stage_name.to_string(),
        }),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::create_session;
    use recipe_core::{load_from_str, Value};
    use tempfile::tempdir;

    const STAGED_YAML: &str = r#"
name: r
description: d
version: 1.0.0
stages:
  - name: plan
    steps:
      - id: a
        agent: x
        prompt: hi
    approval:
      required: true
      prompt: "ok?"
      timeout: 0
      default: deny
"#;

    fn setup() -> (tempfile::TempDir, SessionState) {
        let td = tempdir().unwrap();
        let recipe = load_from_str(STAGED_YAML, "r.yaml").unwrap();
        let state = create_session(td.path(), Path::new("/proj"), &recipe, None, Value::map()).unwrap();
        (td, state)
    }

    #[test]
    fn timeout_zero_never_expires() {
        let (_td, mut state) = setup();
        set_pending_approval(&mut state, "plan", "ok?".into(), 0, ApprovalDefault::Deny);
        let far_future = state.pending_approval.as_ref().unwrap().requested_at + chrono::Duration::days(9999);
        assert_eq!(check_approval_timeout(&state, far_future), TimeoutOutcome::Waiting);
    }

    #[test]
    fn timeout_elapsed_resolves_to_default() {
        let (_td, mut state) = setup();
        set_pending_approval(&mut state, "plan", "ok?".into(), 5, ApprovalDefault::Approve);
        let later = state.pending_approval.as_ref().unwrap().requested_at + chrono::Duration::seconds(10);
        assert_eq!(check_approval_timeout(&state, later), TimeoutOutcome::TimedOutApproved);
    }

    #[test]
    fn approve_requires_matching_pending_stage() {
        let (td, mut state) = setup();
        set_pending_approval(&mut state, "plan", "ok?".into(), 0, ApprovalDefault::Deny);
        save_state(td.path(), Path::new("/proj"), &state).unwrap();

        let err = approve(td.path(), Path::new("/proj"), &state.session_id, "build").unwrap_err();
        assert!(matches!(err, SessionError::StageMismatch { .. }));
    }

    #[test]
    fn approve_does_not_clear_pending() {
        let (td, mut state) = setup();
        set_pending_approval(&mut state, "plan", "ok?".into(), 0, ApprovalDefault::Deny);
        save_state(td.path(), Path::new("/proj"), &state).unwrap();

        let approved = approve(td.path(), Path::new("/proj"), &state.session_id, "plan").unwrap();
        assert!(approved.pending_approval.is_some());
        assert_eq!(
            get_stage_approval_status(&approved, "plan"),
            ApprovalStatus::Approved
        );
    }

    #[test]
    fn deny_clears_pending_and_records_reason() {
        let (td, mut state) = setup();
        set_pending_approval(&mut state, "plan", "ok?".into(), 0, ApprovalDefault::Deny);
        save_state(td.path(), Path::new("/proj"), &state).unwrap();

        let denied = deny(td.path(), Path::new("/proj"), &state.session_id, "plan", Some("nope")).unwrap();
        assert!(denied.pending_approval.is_none());
        assert_eq!(denied.approval_history.last().unwrap().reason.as_deref(), Some("nope"));
    }

    #[test]
    fn list_pending_approvals_finds_parked_sessions() {
        let (td, mut state) = setup();
        set_pending_approval(&mut state, "plan", "ok?".into(), 0, ApprovalDefault::Deny);
        save_state(td.path(), Path::new("/proj"), &state).unwrap();

        let pending = list_pending_approvals(td.path(), Path::new("/proj")).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].1.stage, "plan");
    }
}
