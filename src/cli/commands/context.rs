//! `project_context` command implementation (§6).

use crate::cli::commands::common::{current_project, open_storage};
use crate::config::default_actor;
use crate::dispatch;
use crate::error::Result;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct ContextOutput {
    project: String,
    dna: Option<String>,
    last_bridge: Option<String>,
    fact_count: usize,
    last_session_id: Option<String>,
}

/// `mem context` — the active project's briefing, last bridge, and stats.
///
/// # Errors
///
/// Returns [`crate::error::Error::ProjectNotFound`] if the current
/// directory has never registered a project, or an error if a storage
/// operation fails.
pub fn execute(db: Option<&Path>, actor: Option<&str>, json: bool) -> Result<()> {
    let mut storage = open_storage(db)?;
    let actor = actor.map(ToString::to_string).unwrap_or_else(default_actor);
    let project = current_project(&mut storage, &actor)?;

    let context = dispatch::project_context(&storage, &project.id, &project.name)?;

    if json {
        let out = ContextOutput {
            project: project.name,
            dna: context.dna,
            last_bridge: context.last_bridge,
            fact_count: context.fact_count,
            last_session_id: context.last_session_id,
        };
        println!("{}", serde_json::to_string(&out)?);
        return Ok(());
    }

    println!("Project: {}", project.name);
    if let Some(dna) = &context.dna {
        println!("\n{dna}");
    }
    if let Some(bridge) = &context.last_bridge {
        println!("\nLast bridge:\n{bridge}");
    }
    println!("\n{} fact(s) recorded.", context.fact_count);

    Ok(())
}
