//! Shared plumbing for command handlers: opening the store and
//! resolving "which project" from the CLI's `--db`/`scope` conventions.

use crate::config;
use crate::error::{Error, Result};
use crate::model::Project;
use crate::storage::SqliteStorage;
use std::path::Path;

/// Open the store at the resolved database path.
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] if no path resolves, or an error
/// if the database can't be opened.
pub fn open_storage(db: Option<&Path>) -> Result<SqliteStorage> {
    let path = config::resolve_db_path(db).ok_or(Error::NotInitialized)?;
    SqliteStorage::open(&path)
}

/// Register-or-touch the project for the current working directory.
///
/// # Errors
///
/// Returns an error if a storage operation fails.
pub fn current_project(storage: &mut SqliteStorage, actor: &str) -> Result<Project> {
    let path = config::current_project_path().ok_or(Error::NoActiveProject)?;
    storage.get_or_create_project(&path.to_string_lossy(), None, actor)
}

/// Resolve a tool's `scope` argument to an optional project id:
/// `"project"` (default) resolves the current directory's project,
/// `"all"` means no restriction, anything else is a named project.
///
/// # Errors
///
/// Returns [`Error::ProjectNotFound`] for an unknown named scope, or an
/// error if a storage operation fails.
pub fn resolve_scope(storage: &SqliteStorage, scope: &str, actor: &str) -> Result<Option<String>> {
    match scope {
        "all" => Ok(None),
        "project" => {
            let path = config::current_project_path().ok_or(Error::NoActiveProject)?;
            match storage.find_project_by_path(&path.to_string_lossy())? {
                Some(project) => Ok(Some(project.id)),
                None => {
                    let _ = actor;
                    Ok(None)
                }
            }
        }
        name => storage
            .list_projects(1000)?
            .into_iter()
            .find(|p| p.name == name)
            .map(|p| Some(p.id))
            .ok_or_else(|| Error::ProjectNotFound { name: name.to_string() }),
    }
}
