//! Decision and Change models.
//!
//! Both are append-only logs: `Decision` records *what we decided and
//! why*, `Change` records *what files moved* during a session.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub project_id: String,
    pub session_id: Option<String>,
    pub summary: String,
    pub rationale: Option<String>,
    pub created_at: i64,
}

impl Decision {
    #[must_use]
    pub fn new(
        project_id: String,
        session_id: Option<String>,
        summary: String,
        rationale: Option<String>,
    ) -> Self {
        Self {
            id: format!("dec_{}", &uuid::Uuid::new_v4().to_string()[..12]),
            project_id,
            session_id,
            summary,
            rationale,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// What kind of edit produced a [`Change`] row.
///
/// The hook path never records `Delete` — see `session::record_file_change`
/// doc comment for why this is intentional, not an omission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Edit,
    Delete,
}

impl ChangeAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Edit => "edit",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub id: i64,
    pub project_id: String,
    pub session_id: String,
    pub rel_path: String,
    pub action: String,
    pub changed_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_new_has_prefix_id() {
        let d = Decision::new("proj".into(), None, "use sqlite".into(), None);
        assert!(d.id.starts_with("dec_"));
    }

    #[test]
    fn test_change_action_strings() {
        assert_eq!(ChangeAction::Create.as_str(), "create");
        assert_eq!(ChangeAction::Edit.as_str(), "edit");
        assert_eq!(ChangeAction::Delete.as_str(), "delete");
    }
}
