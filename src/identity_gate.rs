//! Identity Gate: per-project safety/tech metadata and action gating (§4.6).
//!
//! Wraps [`crate::model::identity::Identity`] with the two operations the
//! rest of the crate calls through: `identity_set` (write fields, maybe
//! lock) and `verify_identity` (check an action class is safe to perform).

use crate::error::{Error, Result};
use crate::model::identity::{is_known_field, is_safety_field, required_fields_for, SAFETY_FIELDS};
use crate::model::Identity;
use crate::storage::SqliteStorage;
use crate::validate::find_similar_ids;

/// Outcome of [`verify_identity`] when the action is not blocked.
///
/// Missing-field and tamper conditions short-circuit as `Err` instead
/// (`Error::MissingSafetyFields` / `Error::TamperDetected`) since both are
/// BLOCKED states the caller must not proceed past.
#[derive(Debug, Clone)]
pub enum VerifyOutcome {
    /// Every required field is present and the card is safety-locked.
    Verified { summary: Vec<(String, String)> },
    /// Every required field is present but the card was never locked.
    Warning { summary: Vec<(String, String)> },
}

/// Set one or more identity fields, optionally locking the safety set.
///
/// Rejects unknown field names outright (closed-set validation, with a
/// "did you mean" suggestion). Refuses to change a *safety* field while
/// the card is locked unless the caller is re-locking in the same call
/// (`lock_safety=true`) — tech fields are never gated.
///
/// # Errors
///
/// Returns [`Error::InvalidField`] for an unknown field name, or
/// [`Error::SafetyLocked`] if a safety field would change on a locked
/// card without `lock_safety=true`.
pub fn identity_set(
    storage: &mut SqliteStorage,
    project_id: &str,
    project_name: &str,
    fields: &[(String, String)],
    lock_safety: bool,
    actor: &str,
) -> Result<Identity> {
    for (name, _) in fields {
        if !is_known_field(name) {
            let allowed: Vec<String> = crate::model::identity::SAFETY_FIELDS
                .iter()
                .chain(crate::model::identity::TECH_FIELDS.iter())
                .map(|f| (*f).to_string())
                .collect();
            let suggestions = find_similar_ids(name, &allowed, 1);
            let mut allowed_str = allowed.join(", ");
            if let Some(s) = suggestions.first() {
                allowed_str = format!("did you mean '{s}'? {allowed_str}");
            }
            return Err(Error::InvalidField {
                fields: name.clone(),
                allowed: allowed_str,
            });
        }
    }

    let mut identity = storage.get_identity(project_id)?.unwrap_or_default();

    let changing_safety = fields.iter().any(|(name, _)| is_safety_field(name));
    if identity.safety_locked && changing_safety && !lock_safety {
        let changed: Vec<&str> = fields
            .iter()
            .filter(|(name, _)| is_safety_field(name))
            .map(|(name, _)| name.as_str())
            .collect();
        return Err(Error::SafetyLocked {
            project: project_name.to_string(),
            fields: changed.join(", "),
        });
    }

    for (name, value) in fields {
        identity.set(name, value);
    }

    if lock_safety {
        identity.safety_locked = true;
        identity.lock_hash = Some(identity.safety_lock_hash());
        identity.locked_at = Some(chrono::Utc::now().timestamp_millis());
        identity.locked_by = Some(actor.to_string());
    }

    storage.upsert_identity(project_id, &identity, actor)?;
    Ok(identity)
}

/// Check whether `action_type` is safe to perform for `project_id`.
///
/// # Errors
///
/// Returns [`Error::InvalidAction`] for an unknown action type, or
/// [`Error::NoIdentityRow`] if the project has never had an identity
/// card written.
pub fn verify_identity(
    storage: &SqliteStorage,
    project_id: &str,
    project_name: &str,
    action_type: &str,
) -> Result<VerifyOutcome> {
    let all_actions: Vec<String> = crate::model::identity::all_action_types()
        .iter()
        .map(|a| (*a).to_string())
        .collect();
    let Some(required) = required_fields_for(action_type) else {
        let suggestions = find_similar_ids(action_type, &all_actions, 1);
        let mut allowed = all_actions.join(", ");
        if let Some(s) = suggestions.first() {
            allowed = format!("did you mean '{s}'? {allowed}");
        }
        return Err(Error::InvalidAction {
            action: action_type.to_string(),
            allowed,
        });
    };

    let Some(identity) = storage.get_identity(project_id)? else {
        return Err(Error::NoIdentityRow {
            project: project_name.to_string(),
        });
    };

    let missing: Vec<String> = required
        .iter()
        .filter(|f| identity.get(f).is_none_or(str::is_empty))
        .map(|f| (*f).to_string())
        .collect();

    if !missing.is_empty() {
        return Err(Error::MissingSafetyFields {
            action: action_type.to_string(),
            missing: missing.join(", "),
        });
    }

    if identity.safety_locked {
        if let Some(expected) = &identity.lock_hash {
            let actual = identity.safety_lock_hash();
            if expected != &actual {
                return Err(Error::TamperDetected {
                    project: project_name.to_string(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        let summary = safety_summary(&identity);
        return Ok(VerifyOutcome::Verified { summary });
    }

    let summary = safety_summary(&identity);
    Ok(VerifyOutcome::Warning { summary })
}

fn safety_summary(identity: &Identity) -> Vec<(String, String)> {
    SAFETY_FIELDS
        .iter()
        .filter_map(|field| identity.get(field).map(|v| ((*field).to_string(), v.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_set_rejects_unknown_field() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = storage.get_or_create_project("/tmp/p", None, "tester").unwrap();

        let err = identity_set(
            &mut storage,
            &project.id,
            &project.name,
            &[("not_a_field".to_string(), "x".to_string())],
            false,
            "tester",
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidField { .. }));
    }

    #[test]
    fn test_identity_set_then_locked_blocks_safety_change() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = storage.get_or_create_project("/tmp/p", None, "tester").unwrap();

        identity_set(
            &mut storage,
            &project.id,
            &project.name,
            &[("deploy_ssh_host".to_string(), "10.0.0.1".to_string())],
            true,
            "tester",
        )
        .unwrap();

        let err = identity_set(
            &mut storage,
            &project.id,
            &project.name,
            &[("deploy_ssh_host".to_string(), "10.0.0.2".to_string())],
            false,
            "tester",
        )
        .unwrap_err();
        assert!(matches!(err, Error::SafetyLocked { .. }));
    }

    #[test]
    fn test_verify_identity_blocked_on_missing_fields() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = storage.get_or_create_project("/tmp/p", None, "tester").unwrap();

        identity_set(
            &mut storage,
            &project.id,
            &project.name,
            &[("deploy_ssh_alias".to_string(), "prod".to_string())],
            false,
            "tester",
        )
        .unwrap();

        let err = verify_identity(&storage, &project.id, &project.name, "deploy").unwrap_err();
        assert!(matches!(err, Error::MissingSafetyFields { .. }));
    }

    #[test]
    fn test_verify_identity_verified_when_locked_and_complete() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = storage.get_or_create_project("/tmp/p", None, "tester").unwrap();

        identity_set(
            &mut storage,
            &project.id,
            &project.name,
            &[
                ("deploy_ssh_alias".to_string(), "prod".to_string()),
                ("deploy_ssh_host".to_string(), "10.0.0.1".to_string()),
            ],
            true,
            "tester",
        )
        .unwrap();

        let outcome = verify_identity(&storage, &project.id, &project.name, "ssh").unwrap();
        assert!(matches!(outcome, VerifyOutcome::Verified { .. }));
    }

    #[test]
    fn test_verify_identity_unknown_action_rejected() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = storage.get_or_create_project("/tmp/p", None, "tester").unwrap();
        let err = verify_identity(&storage, &project.id, &project.name, "nuke-prod").unwrap_err();
        assert!(matches!(err, Error::InvalidAction { .. }));
    }

    #[test]
    fn test_verify_identity_no_identity_row() {
        let storage = SqliteStorage::open_memory().unwrap();
        let err = verify_identity(&storage, "proj_missing", "demo", "ssh").unwrap_err();
        assert!(matches!(err, Error::NoIdentityRow { .. }));
    }
}
