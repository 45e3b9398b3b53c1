//! Session ID generation: `{16-hex-span}-{YYYYMMDD-HHMMSS}_recipe`, per
//! spec.md §3. The hex span comes from a v4 UUID's hex digits (collision-safe
//! enough for a per-call id; the timestamp suffix makes the whole thing sort
//! chronologically within a project's `recipe-sessions/` directory).

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub fn new_session_id(now: DateTime<Utc>) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    let span = &hex[..16];
    format!("{span}-{}_recipe", now.format("%Y%m%d-%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_matches_spec() {
        let now = DateTime::parse_from_rfc3339("2026-07-28T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let id = new_session_id(now);
        assert!(id.ends_with("-20260728-100000_recipe"));
        let span = id.split('-').next().unwrap();
        assert_eq!(span.len(), 16);
        assert!(span.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn ids_are_unique() {
        let now = Utc::now();
        assert_ne!(new_session_id(now), new_session_id(now));
    }
}
