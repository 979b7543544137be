//! Session model.
//!
//! A session is a single working window against a project: opened at
//! `session_start`, closed at `session_end`, possibly force-closed by
//! crash recovery on a later `session_start`.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Open,
    Closed,
}

impl SessionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "closed" => Self::Closed,
            _ => Self::Open,
        }
    }
}

/// A single working session against a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// `sess_` + 12 hex chars.
    pub id: String,
    pub project_id: String,
    pub project_path: String,
    pub status: String,

    /// TTY/terminal key this session is bound to, for status-cache lookup.
    pub terminal_key: Option<String>,

    /// Recovery checkpoint text, written during the session or synthesized
    /// at `session_end` if the session never wrote one.
    pub bridge_text: Option<String>,

    /// Set when this session was force-closed by crash recovery rather
    /// than an explicit `session_end`.
    pub crashed: bool,

    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub last_heartbeat_at: i64,
}

impl Session {
    #[must_use]
    pub fn new(project_id: String, project_path: String, terminal_key: Option<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: format!("sess_{}", &uuid::Uuid::new_v4().to_string()[..12]),
            project_id,
            project_path,
            status: SessionStatus::Open.as_str().to_string(),
            terminal_key,
            bridge_text: None,
            crashed: false,
            started_at: now,
            ended_at: None,
            last_heartbeat_at: now,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open.as_str()
    }
}

/// Counts attached to a session at `session_end`, for the `facts_count`
/// / `changes_count` invariant in the data model.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionCounts {
    pub facts_count: i64,
    pub changes_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_open() {
        let s = Session::new("proj_a".into(), "/tmp/a".into(), None);
        assert!(s.is_open());
        assert!(s.id.starts_with("sess_"));
        assert!(s.ended_at.is_none());
    }

    #[test]
    fn test_session_status_roundtrip() {
        assert_eq!(SessionStatus::parse("open"), SessionStatus::Open);
        assert_eq!(SessionStatus::parse("closed"), SessionStatus::Closed);
        assert_eq!(SessionStatus::parse("garbage"), SessionStatus::Open);
    }
}
