//! `recommend_tech` command implementation (§6).

use crate::cli::commands::common::{current_project, open_storage};
use crate::config::default_actor;
use crate::dispatch;
use crate::error::Result;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct RecommendOutput {
    recommendation: String,
}

/// `mem recommend [--description] [--similar-to] [--category]`.
///
/// # Errors
///
/// Returns an error if a storage operation fails.
pub fn execute(description: Option<&str>, similar_to: Option<&str>, category: Option<&str>, db: Option<&Path>, actor: Option<&str>, json: bool) -> Result<()> {
    let mut storage = open_storage(db)?;
    let actor = actor.map(ToString::to_string).unwrap_or_else(default_actor);
    let project = current_project(&mut storage, &actor)?;

    let recommendation = dispatch::recommend_tech(&mut storage, &project.id, description, similar_to, category, &actor)?;

    if json {
        println!("{}", serde_json::to_string(&RecommendOutput { recommendation })?);
        return Ok(());
    }

    println!("{recommendation}");
    Ok(())
}
