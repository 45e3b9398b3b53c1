//! Durable session store (spec.md §4.5/§4.9.3 "C5"): on-disk checkpoint
//! records, CRUD over them, and the approval-gate persistence the staged
//! driver and the out-of-band `approve`/`deny` operations share.

pub mod approval;
pub mod error;
pub mod id;
pub mod state;
pub mod store;

pub use approval::{
    approve, check_approval_timeout, clear_pending_approval, deny, get_pending_approval,
    get_stage_approval_status, list_pending_approvals, set_pending_approval,
    set_stage_approval_status, TimeoutOutcome,
};
pub use error::{SessionError, SessionResult};
pub use id::new_session_id;
pub use state::{ApprovalHistoryEntry, ApprovalStatus, PendingApproval, SessionState, SessionSummary};
pub use store::{
    cleanup_old_sessions, create_session, list_sessions, load_state, project_slug, save_state,
    session_exists, session_recipe_path,
};
