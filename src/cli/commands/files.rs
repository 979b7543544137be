//! `file_search` command implementation (§6).

use crate::cli::commands::common::{open_storage, resolve_scope};
use crate::config::default_actor;
use crate::dispatch;
use crate::error::Result;
use crate::search::ChunkHit;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct ChunkHitOutput {
    id: String,
    rel_path: String,
    heading: Option<String>,
    text: String,
    score: f64,
}

fn hit_output(hit: &ChunkHit) -> ChunkHitOutput {
    ChunkHitOutput {
        id: hit.chunk.id.clone(),
        rel_path: hit.chunk.rel_path.clone(),
        heading: hit.chunk.heading.clone(),
        text: hit.chunk.text.clone(),
        score: hit.score,
    }
}

/// `mem files <query> [--scope] [--file-filter] [--limit]`.
///
/// # Errors
///
/// Returns an error if the store can't be opened or a query fails.
pub fn execute(
    query: &str,
    scope: &str,
    file_filter: Option<&str>,
    limit: Option<usize>,
    db: Option<&Path>,
    actor: Option<&str>,
    json: bool,
) -> Result<()> {
    let storage = open_storage(db)?;
    let actor = actor.map(ToString::to_string).unwrap_or_else(default_actor);
    let project_id = resolve_scope(&storage, scope, &actor)?;

    let hits = dispatch::file_search(&storage, query, project_id.as_deref(), file_filter, limit)?;

    if json {
        let out: Vec<ChunkHitOutput> = hits.iter().map(hit_output).collect();
        println!("{}", serde_json::to_string(&out)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No matching chunks.");
        return Ok(());
    }

    for hit in &hits {
        let heading = hit.chunk.heading.as_deref().unwrap_or("");
        println!("{}  {} {} (score {:.2})\n  {}", hit.chunk.id, hit.chunk.rel_path, heading, hit.score, hit.chunk.text);
    }

    Ok(())
}
