//! Configuration: path discovery, session resolution, and actor identity.
//!
//! # Architecture
//!
//! The memory store uses a **global database** at `~/.coderecall/data/memory.db`,
//! shared across every project on the machine. Projects are distinguished
//! by their `project_path` column, not by separate database files — this
//! lets `memory_search` and `file_search` work the same way whether the
//! agent is in project A or project B, and lets a session span directories.

mod status_cache;

pub use status_cache::{
    bind_session_to_terminal, clear_status_cache, current_session_id, read_status_cache,
    StatusCacheEntry,
};

use crate::error::{Error, Result};

use std::path::{Path, PathBuf};

/// Get the git repository root directory for the current working directory.
#[must_use]
pub fn git_toplevel() -> Option<PathBuf> {
    std::process::Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| PathBuf::from(String::from_utf8_lossy(&o.stdout).trim().to_string()))
}

/// Resolve the current project's root directory.
///
/// Priority: git root, then the current working directory itself.
/// Never walks up looking for a marker file — any directory can be a
/// project root, so there is nothing to search for.
#[must_use]
pub fn current_project_path() -> Option<PathBuf> {
    git_toplevel().or_else(|| std::env::current_dir().ok())
}

/// Get the global memory-store home directory: `~/.coderecall`.
#[must_use]
pub fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".coderecall"))
}

/// Check if test mode is enabled via `MEM_TEST_DB`.
#[must_use]
pub fn is_test_mode() -> bool {
    std::env::var("MEM_TEST_DB")
        .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
        .unwrap_or(false)
}

/// Get the isolated test database path: `~/.coderecall/test/memory.db`.
#[must_use]
pub fn test_db_path() -> Option<PathBuf> {
    home_dir().map(|dir| dir.join("test").join("memory.db"))
}

/// Resolve the database path.
///
/// Priority:
/// 1. `explicit_path`, if given (e.g. `--db` flag)
/// 2. `MEM_TEST_DB` set → isolated test database
/// 3. `MEM_DB` environment variable
/// 4. Global location: `~/.coderecall/data/memory.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if is_test_mode() {
        return test_db_path();
    }

    if let Ok(db_path) = std::env::var("MEM_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    home_dir().map(|dir| dir.join("data").join("memory.db"))
}

/// Resolve the session ID for any CLI command.
///
/// Single source of truth for session resolution:
/// 1. Explicit `--session` flag
/// 2. `MEM_SESSION` environment variable
/// 3. TTY-keyed status cache (written by `mem hook session-start`)
/// 4. Error — no fallback, no guessing
pub fn resolve_session_id(explicit_session: Option<&str>) -> Result<String> {
    if let Some(id) = explicit_session {
        return Ok(id.to_string());
    }

    if let Ok(id) = std::env::var("MEM_SESSION") {
        if !id.is_empty() {
            return Ok(id);
        }
    }

    if let Some(id) = current_session_id() {
        return Ok(id);
    }

    Err(Error::NoActiveSession)
}

/// Resolve session ID with rich hints on failure.
///
/// Like [`resolve_session_id`], but on `NoActiveSession` queries the
/// store for recent resumable sessions and enriches the error.
pub fn resolve_session_or_suggest(
    explicit_session: Option<&str>,
    storage: &crate::storage::SqliteStorage,
) -> Result<String> {
    resolve_session_id(explicit_session).map_err(|e| {
        if !matches!(e, Error::NoActiveSession) {
            return e;
        }

        let project_path = current_project_path().map(|p| p.to_string_lossy().to_string());

        let recent = project_path
            .as_deref()
            .and_then(|p| storage.find_project_by_path(p).ok().flatten())
            .map(|project| {
                storage
                    .list_sessions(&project.id, Some(3))
                    .unwrap_or_default()
                    .into_iter()
                    .map(|s| (s.id.clone(), project.name.clone(), s.status.clone()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        if recent.is_empty() {
            e
        } else {
            Error::NoActiveSessionWithRecent { recent }
        }
    })
}

/// Get the current git branch name, if any.
#[must_use]
pub fn current_git_branch() -> Option<String> {
    std::process::Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Get the default actor name.
///
/// Priority: `MEM_ACTOR` env var, git user name, `$USER`, `"unknown"`.
#[must_use]
pub fn default_actor() -> String {
    if let Ok(actor) = std::env::var("MEM_ACTOR") {
        if !actor.is_empty() {
            return actor;
        }
    }

    if let Ok(output) = std::process::Command::new("git")
        .args(["config", "user.name"])
        .output()
    {
        if output.status.success() {
            let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !name.is_empty() {
                return name;
            }
        }
    }

    if let Ok(user) = std::env::var("USER") {
        return user;
    }

    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_actor() {
        assert!(!default_actor().is_empty());
    }

    #[test]
    fn test_resolve_db_path_with_explicit() {
        let explicit = PathBuf::from("/custom/path/db.sqlite");
        let result = resolve_db_path(Some(&explicit));
        assert_eq!(result, Some(explicit));
    }

    #[test]
    fn test_resolve_db_path_uses_global() {
        let result = resolve_db_path(None);
        assert!(result.is_some());
        assert!(result.unwrap().ends_with("memory.db"));
    }

    #[test]
    fn test_test_db_path_is_separate() {
        let global = home_dir().unwrap();
        let test = test_db_path().unwrap();

        assert!(test.to_string_lossy().contains("/test/"));
        assert!(test.ends_with("memory.db"));
        assert_ne!(global.join("data").join("memory.db"), test);
    }
}
