//! `memory_search` / `memory_write` / `memory_delete` command implementations (§6).

use crate::cli::commands::common::{current_project, open_storage, resolve_scope};
use crate::config::default_actor;
use crate::dispatch::{self, WriteReceipt};
use crate::error::Result;
use crate::model::Staleness;
use crate::search::FactHit;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct FactHitOutput {
    id: String,
    kind: String,
    title: String,
    body: String,
    heat: f64,
    score: f64,
    staleness: &'static str,
    source_file: Option<String>,
}

fn staleness_str(s: Staleness) -> &'static str {
    match s {
        Staleness::Deleted => "DELETED",
        Staleness::Stale => "STALE",
        Staleness::Fresh => "",
    }
}

fn hit_output(hit: &FactHit) -> FactHitOutput {
    FactHitOutput {
        id: hit.fact.id.clone(),
        kind: hit.fact.kind.clone(),
        title: hit.fact.title.clone(),
        body: hit.fact.body.clone(),
        heat: hit.fact.heat,
        score: hit.score,
        staleness: staleness_str(hit.staleness),
        source_file: hit.fact.source_file.clone(),
    }
}

/// `mem search <query> [--scope] [--kind] [--limit]`.
///
/// # Errors
///
/// Returns an error if the store can't be opened or a query fails.
pub fn execute_search(
    query: &str,
    scope: &str,
    kind: Option<&str>,
    limit: Option<usize>,
    db: Option<&Path>,
    actor: Option<&str>,
    json: bool,
) -> Result<()> {
    let mut storage = open_storage(db)?;
    let actor = actor.map(ToString::to_string).unwrap_or_else(default_actor);
    let project_id = resolve_scope(&storage, scope, &actor)?;

    let hits = dispatch::memory_search(&mut storage, query, project_id.as_deref(), kind, limit, &actor)?;

    if json {
        let out: Vec<FactHitOutput> = hits.iter().map(hit_output).collect();
        println!("{}", serde_json::to_string(&out)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No matching facts.");
        return Ok(());
    }

    for hit in &hits {
        let stale = match hit.staleness {
            Staleness::Fresh => String::new(),
            other => format!(" [{}]", staleness_str(other)),
        };
        println!(
            "{}  ({}, heat {:.2}, score {:.2}){}\n  {}",
            hit.fact.id, hit.fact.kind, hit.fact.heat, hit.score, stale, hit.fact.body
        );
    }

    Ok(())
}

/// `mem write <content> [--kind] [--tags] [--domain] [--source-file]`.
///
/// # Errors
///
/// Returns an error if the kind is invalid or a storage operation fails.
#[allow(clippy::too_many_arguments)]
pub fn execute_write(
    content: &str,
    kind: &str,
    tags: Option<&str>,
    domain: Option<&str>,
    source_file: Option<&str>,
    db: Option<&Path>,
    actor: Option<&str>,
    session: Option<&str>,
    json: bool,
) -> Result<()> {
    let mut storage = open_storage(db)?;
    let actor = actor.map(ToString::to_string).unwrap_or_else(default_actor);
    let project = current_project(&mut storage, &actor)?;

    let _ = session;

    let source_mtime = source_file.and_then(|p| std::fs::metadata(p).ok()).and_then(|m| m.modified().ok()).and_then(|t| {
        t.duration_since(std::time::UNIX_EPOCH).ok().map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
    });

    let (fact, receipt) =
        dispatch::memory_write(&mut storage, &project.id, None, content, kind, tags, domain, source_file, source_mtime, &actor)?;

    if crate::is_silent() {
        println!("{}", fact.id);
        return Ok(());
    }

    if json {
        #[derive(Serialize)]
        struct Out {
            id: String,
            receipt: &'static str,
        }
        println!("{}", serde_json::to_string(&Out { id: fact.id, receipt: receipt_str(receipt) })?);
        return Ok(());
    }

    println!("{} {}", receipt_str(receipt), fact.id);
    Ok(())
}

const fn receipt_str(receipt: WriteReceipt) -> &'static str {
    match receipt {
        WriteReceipt::Saved => "saved",
        WriteReceipt::Updated => "updated",
        WriteReceipt::Unchanged => "unchanged",
    }
}

/// `mem delete <ids...>`.
///
/// # Errors
///
/// Returns an error if a storage operation fails.
pub fn execute_delete(ids: &[String], db: Option<&Path>, actor: Option<&str>, json: bool) -> Result<()> {
    let mut storage = open_storage(db)?;
    let actor = actor.map(ToString::to_string).unwrap_or_else(default_actor);

    let count = dispatch::memory_delete(&mut storage, ids, &actor)?;

    if json {
        #[derive(Serialize)]
        struct Out {
            deleted: usize,
        }
        println!("{}", serde_json::to_string(&Out { deleted: count })?);
    } else {
        println!("Deleted {count} fact(s)");
    }

    Ok(())
}
