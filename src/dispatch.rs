//! Tool Dispatcher: the ten agent-facing operations (§6).
//!
//! A thin façade. Nothing here owns state — every function takes the
//! storage handle it needs and routes straight into
//! [`crate::search`], [`crate::identity_gate`], [`crate::session`], or
//! [`crate::storage::SqliteStorage`] directly. Argument validation
//! (closed-set kinds, field names, action types) is delegated to
//! [`crate::validate`] and [`crate::identity_gate`] rather than
//! duplicated here.

use crate::error::{Error, Result};
use crate::identity_gate::{self, VerifyOutcome};
use crate::model::{Decision, Fact};
use crate::search::{self, ChunkHit, FactHit};
use crate::session;
use crate::storage::SqliteStorage;
use crate::validate;

/// Clamp a caller-supplied limit to the tool surface's ceiling (§6,
/// §8 boundary behavior: "Limit > 10 is clamped").
const MAX_LIMIT: usize = 10;
const DEFAULT_LIMIT: usize = 5;

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Outcome of [`memory_write`] — which of the three receipt paths ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteReceipt {
    Saved,
    Updated,
    Unchanged,
}

impl WriteReceipt {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Saved => "saved",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

/// `memory_search(query, scope, kind?, limit?)` — hybrid ranked facts.
///
/// `project_id` is `None` when `scope` is "all"; callers resolve the
/// named-project case to a concrete id before calling this.
///
/// # Errors
///
/// Returns an error if a storage operation fails.
pub fn memory_search(
    storage: &mut SqliteStorage,
    query: &str,
    project_id: Option<&str>,
    kind: Option<&str>,
    limit: Option<usize>,
    actor: &str,
) -> Result<Vec<FactHit>> {
    let now_ms = chrono::Utc::now().timestamp_millis();
    search::search_facts(storage, query, project_id, kind, clamp_limit(limit), now_ms, actor)
}

/// `memory_write(content, kind?, tags?, domain?, source_file?)`.
///
/// Dedups on `(project_id, source_file, kind)` when `source_file` is
/// given: an identical body returns `Unchanged`, a changed body returns
/// `Updated`, and a fresh triple returns `Saved` (§3, §8 round-trip).
/// Embedding failure is swallowed — the fact row is the durable part,
/// the vector is best-effort (§5 suspension points).
///
/// # Errors
///
/// Returns [`Error::InvalidFactKind`] for an unknown kind, or an error
/// if a storage operation fails.
#[allow(clippy::too_many_arguments)]
pub fn memory_write(
    storage: &mut SqliteStorage,
    project_id: &str,
    session_id: Option<&str>,
    content: &str,
    kind: &str,
    tags: Option<&str>,
    domain: Option<&str>,
    source_file: Option<&str>,
    source_mtime: Option<i64>,
    actor: &str,
) -> Result<(Fact, WriteReceipt)> {
    let normalized_kind = validate::normalize_fact_kind(kind).map_err(|(input, suggestion)| {
        let allowed: Vec<String> = validate::FACT_KINDS.iter().map(|k| (*k).to_string()).collect();
        let mut allowed_str = allowed.join(", ");
        if let Some(s) = suggestion {
            allowed_str = format!("did you mean '{s}'? {allowed_str}");
        }
        Error::InvalidFactKind { kind: input, allowed: allowed_str }
    })?;

    let title = content.lines().next().unwrap_or(content).chars().take(80).collect::<String>();

    if let Some(source) = source_file {
        if let Some(existing) = storage.find_fact_by_source(project_id, source, &normalized_kind)? {
            if existing.body == content {
                return Ok((existing, WriteReceipt::Unchanged));
            }
            storage.update_fact_body(&existing.id, &title, content, source_mtime, tags, domain, actor)?;
            if let Ok(Some(embedding)) = crate::embedder::embed(content) {
                let _ = storage.store_fact_vector(&existing.id, &embedding, actor);
            }
            let updated = storage.get_fact(&existing.id)?.ok_or(Error::Other("fact vanished after update".to_string()))?;
            return Ok((updated, WriteReceipt::Updated));
        }
    }

    let fact = Fact::new(
        project_id.to_string(),
        session_id.map(str::to_string),
        normalized_kind,
        title,
        content.to_string(),
        source_file.map(str::to_string),
        source_mtime,
        tags.map(str::to_string),
        domain.map(str::to_string),
    );
    storage.insert_fact(&fact, actor)?;
    if let Ok(Some(embedding)) = crate::embedder::embed(content) {
        let _ = storage.store_fact_vector(&fact.id, &embedding, actor);
    }
    Ok((fact, WriteReceipt::Saved))
}

/// `memory_delete(ids[])` — soft-delete, returning the number removed.
///
/// # Errors
///
/// Returns an error if a storage operation fails.
pub fn memory_delete(storage: &mut SqliteStorage, ids: &[String], actor: &str) -> Result<usize> {
    storage.delete_facts(ids, actor)
}

/// `file_search(query, scope?, file_filter?, limit?)` — hybrid ranked
/// chunks. `file_filter` glob matching is handled inside the storage
/// layer's substring translation; this façade only clamps the limit.
///
/// # Errors
///
/// Returns an error if a storage operation fails.
pub fn file_search(
    storage: &SqliteStorage,
    query: &str,
    project_id: Option<&str>,
    file_filter: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<ChunkHit>> {
    search::search_chunks(storage, query, project_id, file_filter, clamp_limit(limit))
}

/// `project_context()` — briefing, last bridge, and session stats for
/// the active project.
///
/// # Errors
///
/// Returns [`Error::ProjectNotFound`] if `project_id` has no row, or an
/// error if a storage operation fails.
pub struct ProjectContext {
    pub dna: Option<String>,
    pub last_bridge: Option<String>,
    pub fact_count: usize,
    pub last_session_id: Option<String>,
}

pub fn project_context(storage: &SqliteStorage, project_id: &str, project_name: &str) -> Result<ProjectContext> {
    let project = storage
        .get_project(project_id)?
        .ok_or_else(|| Error::ProjectNotFound { name: project_name.to_string() })?;
    let last_bridge = session::session_bridge_load(storage, project_id)?;
    let fact_count = storage.list_facts_for_project(project_id)?.len();

    Ok(ProjectContext {
        dna: project.dna_content,
        last_bridge,
        fact_count,
        last_session_id: project.last_session_id,
    })
}

/// `session_bridge(action, content?)`.
pub enum BridgeAction<'a> {
    Load,
    Save(&'a str),
}

/// `session_bridge` tool entry point.
///
/// # Errors
///
/// Returns an error if a storage operation fails.
pub fn session_bridge(storage: &mut SqliteStorage, project_id: &str, session_id: &str, action: BridgeAction<'_>, actor: &str) -> Result<Option<String>> {
    match action {
        BridgeAction::Load => session::session_bridge_load(storage, project_id),
        BridgeAction::Save(content) => {
            session::session_bridge_save(storage, session_id, content, actor)?;
            Ok(Some(content.to_string()))
        }
    }
}

/// `decision_log(query?, project?, limit?)` — most recent or matching
/// decisions for a project, append-only history.
///
/// # Errors
///
/// Returns an error if a storage operation fails.
pub fn decision_log(storage: &SqliteStorage, project_id: &str, query: Option<&str>, limit: Option<usize>) -> Result<Vec<Decision>> {
    let limit = clamp_limit(limit);
    match query {
        Some(needle) if !needle.trim().is_empty() => storage.search_decisions(project_id, needle, limit),
        _ => storage.list_decisions(project_id, limit),
    }
}

/// Record a decision via `decision_log`'s write path (not part of the
/// ten-tool read surface in §6's table, but the append-only log needs a
/// writer; grouped here since it shares the same entity).
///
/// # Errors
///
/// Returns an error if a storage operation fails.
pub fn log_decision(storage: &mut SqliteStorage, project_id: &str, session_id: Option<&str>, summary: &str, rationale: Option<&str>, actor: &str) -> Result<Decision> {
    let decision = Decision::new(project_id.to_string(), session_id.map(str::to_string), summary.to_string(), rationale.map(str::to_string));
    storage.create_decision(&decision, actor)?;
    Ok(decision)
}

/// `verify_identity(action_type)`.
///
/// # Errors
///
/// Returns [`Error::InvalidAction`], [`Error::NoIdentityRow`],
/// [`Error::MissingSafetyFields`], or [`Error::TamperDetected`] per
/// §4.6 gating order, or an error if a storage operation fails.
pub fn verify_identity(storage: &SqliteStorage, project_id: &str, project_name: &str, action_type: &str) -> Result<VerifyOutcome> {
    identity_gate::verify_identity(storage, project_id, project_name, action_type)
}

/// `identity_set(fields{}, lock_safety?)`.
///
/// # Errors
///
/// Returns [`Error::InvalidField`] or [`Error::SafetyLocked`] per §4.6
/// mutation rules, or an error if a storage operation fails.
pub fn identity_set(
    storage: &mut SqliteStorage,
    project_id: &str,
    project_name: &str,
    fields: &[(String, String)],
    lock_safety: bool,
    actor: &str,
) -> Result<crate::model::Identity> {
    identity_gate::identity_set(storage, project_id, project_name, fields, lock_safety, actor)
}

/// `recommend_tech(description?, similar_to?, category?)`.
///
/// Heuristic, not generative: ranks the project's own recorded facts of
/// kind `dependency`/`pattern` by relevance to the query terms, falling
/// back to the project's Identity tech fields when there's nothing to
/// rank against. There is no external catalog — recommendations are
/// grounded entirely in what this project has already recorded about
/// itself.
///
/// # Errors
///
/// Returns an error if a storage operation fails.
pub fn recommend_tech(
    storage: &mut SqliteStorage,
    project_id: &str,
    description: Option<&str>,
    similar_to: Option<&str>,
    category: Option<&str>,
    actor: &str,
) -> Result<String> {
    let query = [description, similar_to, category]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");

    if !query.trim().is_empty() {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let hits = search::search_facts(storage, &query, Some(project_id), Some("dependency"), 3, now_ms, actor)?;
        if !hits.is_empty() {
            let lines: Vec<String> = hits.iter().map(|h| format!("- {}: {}", h.fact.title, h.fact.body)).collect();
            return Ok(format!("Based on recorded dependency facts:\n{}", lines.join("\n")));
        }
    }

    let identity = storage.get_identity(project_id)?;
    match identity.and_then(|i| i.framework.or(i.language)) {
        Some(stack) => Ok(format!("No matching recorded facts; project stack is {stack} — recommend tools compatible with it.")),
        None => Ok("No recorded facts or identity fields to ground a recommendation; run a few sessions first.".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_write_rejects_unknown_kind() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = storage.get_or_create_project("/tmp/p", None, "tester").unwrap();

        let err = memory_write(&mut storage, &project.id, None, "body", "not_a_kind", None, None, None, None, "tester").unwrap_err();
        assert!(matches!(err, Error::InvalidFactKind { .. }));
    }

    #[test]
    fn test_memory_write_saved_then_unchanged_then_updated() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = storage.get_or_create_project("/tmp/p", None, "tester").unwrap();

        let (fact, receipt) = memory_write(&mut storage, &project.id, None, "Use pnpm", "command", None, None, Some("README.md"), Some(1000), "tester").unwrap();
        assert_eq!(receipt, WriteReceipt::Saved);

        let (same, receipt) = memory_write(&mut storage, &project.id, None, "Use pnpm", "command", None, None, Some("README.md"), Some(1000), "tester").unwrap();
        assert_eq!(receipt, WriteReceipt::Unchanged);
        assert_eq!(same.id, fact.id);

        let (updated, receipt) = memory_write(&mut storage, &project.id, None, "Use pnpm for installs", "command", None, None, Some("README.md"), Some(2000), "tester").unwrap();
        assert_eq!(receipt, WriteReceipt::Updated);
        assert_eq!(updated.id, fact.id);
        assert_eq!(updated.body, "Use pnpm for installs");
    }

    #[test]
    fn test_memory_delete_counts_removed() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = storage.get_or_create_project("/tmp/p", None, "tester").unwrap();
        let (fact, _) = memory_write(&mut storage, &project.id, None, "body", "fact", None, None, None, None, "tester").unwrap();

        let count = memory_delete(&mut storage, &[fact.id], "tester").unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_project_context_requires_known_project() {
        let storage = SqliteStorage::open_memory().unwrap();
        let err = project_context(&storage, "proj_missing", "demo").unwrap_err();
        assert!(matches!(err, Error::ProjectNotFound { .. }));
    }

    #[test]
    fn test_decision_log_returns_recent_first() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = storage.get_or_create_project("/tmp/p", None, "tester").unwrap();
        log_decision(&mut storage, &project.id, None, "Chose pnpm", Some("faster installs"), "tester").unwrap();

        let decisions = decision_log(&storage, &project.id, None, None).unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].summary, "Chose pnpm");
    }

    #[test]
    fn test_recommend_tech_falls_back_to_identity() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = storage.get_or_create_project("/tmp/p", None, "tester").unwrap();
        identity_set(&mut storage, &project.id, &project.name, &[("framework".to_string(), "Next.js".to_string())], false, "tester").unwrap();

        let recommendation = recommend_tech(&mut storage, &project.id, None, None, None, "tester").unwrap();
        assert!(recommendation.contains("Next.js"));
    }

    #[test]
    fn test_clamp_limit_enforces_ceiling() {
        assert_eq!(clamp_limit(Some(100)), MAX_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(None), DEFAULT_LIMIT);
    }
}
