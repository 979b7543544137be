//! `decision_log` command implementation (§6).

use crate::cli::commands::common::{current_project, open_storage};
use crate::config::default_actor;
use crate::dispatch;
use crate::error::{Error, Result};
use crate::model::Decision;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct DecisionOutput {
    id: String,
    summary: String,
    rationale: Option<String>,
    created_at: i64,
}

fn decision_output(d: &Decision) -> DecisionOutput {
    DecisionOutput {
        id: d.id.clone(),
        summary: d.summary.clone(),
        rationale: d.rationale.clone(),
        created_at: d.created_at,
    }
}

/// `mem decisions [--query] [--project] [--limit]`.
///
/// # Errors
///
/// Returns [`Error::ProjectNotFound`] if `--project` names an unknown
/// project, or an error if a storage operation fails.
pub fn execute(query: Option<&str>, project: Option<&str>, limit: Option<usize>, db: Option<&Path>, actor: Option<&str>, json: bool) -> Result<()> {
    let mut storage = open_storage(db)?;
    let actor = actor.map(ToString::to_string).unwrap_or_else(default_actor);

    let project_id = match project {
        Some(name) => storage
            .list_projects(1000)?
            .into_iter()
            .find(|p| p.name == name)
            .map(|p| p.id)
            .ok_or_else(|| Error::ProjectNotFound { name: name.to_string() })?,
        None => current_project(&mut storage, &actor)?.id,
    };

    let decisions = dispatch::decision_log(&storage, &project_id, query, limit)?;

    if json {
        let out: Vec<DecisionOutput> = decisions.iter().map(decision_output).collect();
        println!("{}", serde_json::to_string(&out)?);
        return Ok(());
    }

    if decisions.is_empty() {
        println!("No decisions recorded.");
        return Ok(());
    }

    for d in &decisions {
        match &d.rationale {
            Some(reason) => println!("{}  {}\n  because: {}", d.id, d.summary, reason),
            None => println!("{}  {}", d.id, d.summary),
        }
    }

    Ok(())
}
