//! Project model.
//!
//! A project is a registered codebase directory. It anchors sessions,
//! facts, chunks, decisions, and the identity card.

use serde::{Deserialize, Serialize};

/// A registered project (codebase root).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier (`proj_` + 12 hex chars).
    pub id: String,

    /// Absolute path to the project directory. Unique.
    pub project_path: String,

    /// Display name, derived from the directory's basename unless overridden.
    pub name: String,

    /// Cached "DNA" briefing text — a short architecture/stack summary
    /// generated once and reused across sessions until invalidated.
    pub dna_content: Option<String>,

    /// Timestamp the DNA content was (re)generated, Unix milliseconds.
    pub dna_generated_at: Option<i64>,

    /// ID of the most recent session for this project, if any.
    pub last_session_id: Option<String>,

    /// Creation timestamp (Unix milliseconds).
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds).
    pub updated_at: i64,
}

impl Project {
    /// Create a new project row for `project_path`.
    ///
    /// `name` defaults to the final path component when not provided.
    #[must_use]
    pub fn new(project_path: String, name: Option<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let id = format!("proj_{}", &uuid::Uuid::new_v4().to_string()[..12]);

        let name = name.unwrap_or_else(|| {
            std::path::Path::new(&project_path)
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| project_path.clone())
        });

        Self {
            id,
            project_path,
            name,
            dna_content: None,
            dna_generated_at: None,
            last_session_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_project_default_name() {
        let project = Project::new("/home/user/myproject".to_string(), None);

        assert!(project.id.starts_with("proj_"));
        assert_eq!(project.project_path, "/home/user/myproject");
        assert_eq!(project.name, "myproject");
        assert!(project.dna_content.is_none());
    }

    #[test]
    fn test_new_project_explicit_name() {
        let project = Project::new("/test".to_string(), Some("Test Project".to_string()));
        assert_eq!(project.name, "Test Project");
    }
}
