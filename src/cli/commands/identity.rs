//! `identity_set` command implementation (§6, §4.6).

use crate::cli::commands::common::{current_project, open_storage};
use crate::config::default_actor;
use crate::dispatch;
use crate::error::{Error, Result};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct IdentityOutput {
    locked: bool,
    fields_set: usize,
}

fn parse_field(raw: &str) -> Result<(String, String)> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| Error::InvalidArgument(format!("expected KEY=VALUE, got '{raw}'")))
}

/// `mem identity --field KEY=VALUE [--field ...] [--lock-safety]`.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for a malformed `KEY=VALUE` pair,
/// [`Error::InvalidField`] for an unknown field name,
/// [`Error::SafetyLocked`] if a locked safety field is changed without
/// re-locking, or an error if a storage operation fails.
pub fn execute(fields: &[String], lock_safety: bool, db: Option<&Path>, actor: Option<&str>, json: bool) -> Result<()> {
    let mut storage = open_storage(db)?;
    let actor = actor.map(ToString::to_string).unwrap_or_else(default_actor);
    let project = current_project(&mut storage, &actor)?;

    let parsed: Vec<(String, String)> = fields.iter().map(|f| parse_field(f)).collect::<Result<Vec<_>>>()?;

    let identity = dispatch::identity_set(&mut storage, &project.id, &project.name, &parsed, lock_safety, &actor)?;

    if json {
        let out = IdentityOutput { locked: identity.safety_locked, fields_set: parsed.len() };
        println!("{}", serde_json::to_string(&out)?);
        return Ok(());
    }

    let verb = if identity.safety_locked { "updated and locked" } else { "updated" };
    println!("Identity {verb} ({} field(s) set)", parsed.len());

    Ok(())
}
