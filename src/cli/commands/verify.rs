//! `verify_identity` command implementation (§6, §4.6).

use crate::cli::commands::common::{current_project, open_storage};
use crate::config::default_actor;
use crate::dispatch;
use crate::error::Result;
use crate::identity_gate::VerifyOutcome;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct VerifyOutput {
    status: &'static str,
    fields: Vec<(String, String)>,
}

/// `mem verify <action_type>`.
///
/// Missing-field and tamper conditions surface as `Err` (BLOCKED), not a
/// status variant — see [`crate::identity_gate::verify_identity`].
///
/// # Errors
///
/// Returns [`crate::error::Error::InvalidAction`],
/// [`crate::error::Error::NoIdentityRow`],
/// [`crate::error::Error::MissingSafetyFields`], or
/// [`crate::error::Error::TamperDetected`] per the gating order, or an
/// error if a storage operation fails.
pub fn execute(action_type: &str, db: Option<&Path>, actor: Option<&str>, json: bool) -> Result<()> {
    let mut storage = open_storage(db)?;
    let actor = actor.map(ToString::to_string).unwrap_or_else(default_actor);
    let project = current_project(&mut storage, &actor)?;

    let outcome = dispatch::verify_identity(&storage, &project.id, &project.name, action_type)?;

    let (status, fields) = match outcome {
        VerifyOutcome::Verified { summary } => ("VERIFIED", summary),
        VerifyOutcome::Warning { summary } => ("WARNING", summary),
    };

    if json {
        println!("{}", serde_json::to_string(&VerifyOutput { status, fields })?);
        return Ok(());
    }

    println!("{status} — {action_type} for '{}'", project.name);
    for (field, value) in &fields {
        println!("  {field}: {value}");
    }
    if status == "WARNING" {
        println!("\nValues are unlocked; confirm with the user, then lock with `mem identity --lock-safety`.");
    } else {
        println!("\nConfirm these values with the user before executing the action.");
    }

    Ok(())
}
