//! `session_bridge` command implementation (§6, §4.5).

use crate::cli::commands::common::{current_project, open_storage};
use crate::cli::BridgeAction as CliBridgeAction;
use crate::config::{self, default_actor};
use crate::dispatch::{self, BridgeAction};
use crate::error::{Error, Result};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct BridgeOutput {
    bridge: Option<String>,
}

/// `mem bridge load|save [--content]`.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if `save` is requested without
/// `--content`, or an error if a storage operation fails.
pub fn execute(action: &CliBridgeAction, content: Option<&str>, db: Option<&Path>, actor: Option<&str>, session: Option<&str>, json: bool) -> Result<()> {
    let mut storage = open_storage(db)?;
    let actor = actor.map(ToString::to_string).unwrap_or_else(default_actor);
    let project = current_project(&mut storage, &actor)?;

    let bridge = match action {
        CliBridgeAction::Load => dispatch::session_bridge(&mut storage, &project.id, "", BridgeAction::Load, &actor)?,
        CliBridgeAction::Save => {
            let content = content.ok_or_else(|| Error::InvalidArgument("--content is required for `mem bridge save`".to_string()))?;
            let session_id = config::resolve_session_or_suggest(session, &storage)?;
            dispatch::session_bridge(&mut storage, &project.id, &session_id, BridgeAction::Save(content), &actor)?
        }
    };

    if json {
        println!("{}", serde_json::to_string(&BridgeOutput { bridge })?);
        return Ok(());
    }

    match bridge {
        Some(text) => println!("{text}"),
        None => println!("No bridge recorded yet."),
    }

    Ok(())
}
