//! Lifecycle hook commands: `session_start` / `session_end` / `file_change` (§4.5, §6).

use crate::cli::commands::common::open_storage;
use crate::config::{self, default_actor};
use crate::error::Result;
use crate::session;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct SessionStartOutput {
    session_id: String,
    project: String,
    dna: String,
    previous_bridge: Option<String>,
    recovered_session_id: Option<String>,
    reindexed_files: Option<usize>,
}

/// `mem hook session-start` — runs the full §4.5 `session_start` sequence
/// for the current working directory's project.
///
/// # Errors
///
/// Returns an error if the store can't be opened or a storage operation
/// fails. A failed instruction-file write or reindex pass does not abort
/// session creation.
pub fn execute_session_start(db: Option<&Path>, actor: Option<&str>, json: bool) -> Result<()> {
    let mut storage = open_storage(db)?;
    let actor = actor.map(ToString::to_string).unwrap_or_else(default_actor);
    let project_root = config::current_project_path().ok_or(crate::error::Error::NoActiveProject)?;

    let outcome = session::session_start(&mut storage, &project_root, None, &actor)?;

    if json {
        let out = SessionStartOutput {
            session_id: outcome.session.id,
            project: outcome.project.name,
            dna: outcome.dna,
            previous_bridge: outcome.previous_bridge,
            recovered_session_id: outcome.recovered_session_id,
            reindexed_files: outcome.reindex.map(|r| r.reindexed),
        };
        println!("{}", serde_json::to_string(&out)?);
        return Ok(());
    }

    println!("Session {} started for '{}'", outcome.session.id, outcome.project.name);
    if let Some(recovered) = &outcome.recovered_session_id {
        println!("Recovered crashed session: {recovered}");
    }
    println!("{}", outcome.dna);
    if let Some(bridge) = &outcome.previous_bridge {
        println!("\nLast session's bridge:\n{bridge}");
    }

    Ok(())
}

#[derive(Serialize)]
struct SessionEndOutput {
    session_id: String,
    facts_count: i64,
    changes_count: i64,
    bridge: Option<String>,
}

/// `mem hook session-end` — closes the resolved session (§4.5 `session_end`).
///
/// # Errors
///
/// Returns [`crate::error::Error::NoActiveSession`] if no session can be
/// resolved, or an error if a storage operation fails.
pub fn execute_session_end(db: Option<&Path>, actor: Option<&str>, session: Option<&str>, json: bool) -> Result<()> {
    let mut storage = open_storage(db)?;
    let actor = actor.map(ToString::to_string).unwrap_or_else(default_actor);
    let session_id = config::resolve_session_or_suggest(session, &storage)?;

    let outcome = session::session_end(&mut storage, &session_id, &actor)?;

    if json {
        let out = SessionEndOutput {
            session_id: outcome.session_id,
            facts_count: outcome.facts_count,
            changes_count: outcome.changes_count,
            bridge: outcome.bridge,
        };
        println!("{}", serde_json::to_string(&out)?);
        return Ok(());
    }

    println!(
        "Session {} closed ({} fact(s), {} change(s))",
        outcome.session_id, outcome.facts_count, outcome.changes_count
    );

    Ok(())
}

/// `mem hook file-change --tool-name <name> [--file-path | --notebook-path]`.
///
/// Mirrors the host's post-write payload (§6): the action is derived
/// from `tool_name` (`write` → create, anything else → edit); deletions
/// are never recorded here, only reconciled by the next reindex. Any
/// failure is swallowed — this hot path must never block the host
/// (§4.5, §5).
///
/// # Errors
///
/// This function does not return an error for missing session/project
/// context or storage failures; it silently no-ops instead, per the
/// hook's error-handling contract.
pub fn execute_file_change(
    tool_name: &str,
    file_path: Option<&str>,
    notebook_path: Option<&str>,
    db: Option<&Path>,
    actor: Option<&str>,
    session: Option<&str>,
    json: bool,
) -> Result<()> {
    let actor = actor.map(ToString::to_string).unwrap_or_else(default_actor);
    let recorded = try_record_file_change(tool_name, file_path, notebook_path, db, &actor, session);

    if json {
        #[derive(Serialize)]
        struct Out {
            recorded: bool,
        }
        println!("{}", serde_json::to_string(&Out { recorded })?);
    }

    Ok(())
}

fn try_record_file_change(tool_name: &str, file_path: Option<&str>, notebook_path: Option<&str>, db: Option<&Path>, actor: &str, session: Option<&str>) -> bool {
    let Some(mut storage) = open_storage(db).ok() else {
        return false;
    };
    let Ok(session_id) = config::resolve_session_id(session) else {
        return false;
    };
    let Some(project_root) = config::current_project_path() else {
        return false;
    };
    let Ok(Some(project)) = storage.find_project_by_path(&project_root.to_string_lossy()) else {
        return false;
    };

    let Some(abs_path) = file_path.or(notebook_path) else {
        return false;
    };
    let rel_path = Path::new(abs_path)
        .strip_prefix(&project_root)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| abs_path.to_string());

    let is_new = tool_name.eq_ignore_ascii_case("write");
    session::record_file_change(&mut storage, &project.id, &session_id, &rel_path, is_new, actor);
    true
}
