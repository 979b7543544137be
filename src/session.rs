//! Session lifecycle: `session_start` / `file_change` / `session_end` /
//! `session_bridge` (§4.5).
//!
//! This is the only module that touches the active-session descriptor
//! file and the project's instruction-file briefing block; everything
//! else about a session lives in the `sessions` table and is reached
//! through [`crate::storage::SqliteStorage`].

use crate::config;
use crate::error::{Error, Result};
use crate::identity_gate;
use crate::indexer::{self, ReindexStats, TimeBudget};
use crate::model::{ChangeAction, Identity, Project, Session, SessionCounts};
use crate::storage::SqliteStorage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// An OPEN session older than this at the next `session_start` is
/// considered abandoned rather than merely slow to close (§4.5 step 3).
const CRASH_GRACE_MS: i64 = 60_000;

/// Soft budget session_start reserves for its own mandatory work before
/// handing the remainder to the Indexer (§4.5 step 10).
const SESSION_START_BUDGET_MS: i64 = 1_500;

const BLOCK_BEGIN: &str = "<!-- BEGIN CODERECALL:CONTEXT -->";
const BLOCK_END: &str = "<!-- END CODERECALL:CONTEXT -->";
/// Recognized on read so an older install's block is replaced rather
/// than duplicated alongside the current one.
const LEGACY_BLOCK_BEGIN: &str = "<!-- BEGIN SAVECONTEXT:CONTEXT -->";
const LEGACY_BLOCK_END: &str = "<!-- END SAVECONTEXT:CONTEXT -->";

const INSTRUCTION_FILENAME: &str = "CLAUDE.md";

/// Top-level directories never worth listing in a DNA briefing.
const DNA_IGNORED_DIRS: &[&str] = &[
    ".git", "node_modules", "target", "dist", "build", ".next", ".nuxt", "venv", ".venv",
    "__pycache__", ".cache", "vendor", ".coderecall", "coverage",
];

/// Everything `session_start` produced, for the hook caller to render
/// into whatever format the host expects.
#[derive(Debug)]
pub struct SessionStartOutcome {
    pub session: Session,
    pub project: Project,
    pub dna: String,
    pub previous_bridge: Option<String>,
    pub recovered_session_id: Option<String>,
    pub reindex: Option<ReindexStats>,
}

/// Everything `session_end` produced.
#[derive(Debug)]
pub struct SessionEndOutcome {
    pub session_id: String,
    pub facts_count: i64,
    pub changes_count: i64,
    pub bridge: Option<String>,
    pub crashed_recovered: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ActiveSessionDescriptor {
    session_id: String,
    project: String,
    project_path: String,
    start_time: i64,
}

fn active_session_path() -> Option<PathBuf> {
    config::home_dir().map(|dir| dir.join("active_session.json"))
}

/// Write the active-session descriptor atomically (§3 ownership note,
/// §4.5 step 8): temp file + rename so a concurrent reader never sees
/// a half-written file.
fn write_active_session_descriptor(project: &Project, session: &Session) -> Result<()> {
    let Some(path) = active_session_path() else {
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let descriptor = ActiveSessionDescriptor {
        session_id: session.id.clone(),
        project: project.name.clone(),
        project_path: session.project_path.clone(),
        start_time: session.started_at,
    };
    let json = serde_json::to_string_pretty(&descriptor)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

/// Delete the active-session descriptor; absence simply means "no
/// session" (§5 crash model), so a missing file is not an error.
fn clear_active_session_descriptor() {
    if let Some(path) = active_session_path() {
        let _ = std::fs::remove_file(path);
    }
}

/// Read back the active-session descriptor, if one is present.
#[must_use]
pub fn read_active_session() -> Option<(String, String)> {
    let path = active_session_path()?;
    let raw = std::fs::read_to_string(path).ok()?;
    let descriptor: ActiveSessionDescriptor = serde_json::from_str(&raw).ok()?;
    Some((descriptor.session_id, descriptor.project_path))
}

/// Detected stack signals from on-disk manifests, used to both seed the
/// Identity row and render the DNA briefing (§4.5 steps 4-5).
#[derive(Debug, Default, Clone)]
struct StackSignals {
    framework: Option<String>,
    framework_version: Option<String>,
    language: Option<String>,
    css_approach: Option<String>,
    db_technology: Option<String>,
    package_manager: Option<String>,
    containerization: Option<String>,
    hosting_pattern: Option<String>,
    github_repo_url: Option<String>,
    project_category: Option<String>,
}

impl StackSignals {
    fn as_fields(&self) -> Vec<(String, String)> {
        let mut fields = Vec::new();
        let mut push = |name: &str, value: &Option<String>| {
            if let Some(v) = value {
                fields.push((name.to_string(), v.clone()));
            }
        };
        push("framework", &self.framework);
        push("framework_version", &self.framework_version);
        push("language", &self.language);
        push("css_approach", &self.css_approach);
        push("db_technology", &self.db_technology);
        push("package_manager", &self.package_manager);
        push("containerization", &self.containerization);
        push("hosting_pattern", &self.hosting_pattern);
        push("github_repo_url", &self.github_repo_url);
        push("project_category", &self.project_category);
        fields
    }
}

fn merged_node_deps(pkg: &serde_json::Value) -> std::collections::HashMap<String, String> {
    let mut out = std::collections::HashMap::new();
    for key in ["dependencies", "devDependencies"] {
        if let Some(obj) = pkg.get(key).and_then(serde_json::Value::as_object) {
            for (name, version) in obj {
                out.insert(name.clone(), version.as_str().unwrap_or_default().to_string());
            }
        }
    }
    out
}

fn detect_node_package_manager(root: &Path) -> Option<String> {
    if root.join("pnpm-lock.yaml").exists() {
        Some("pnpm".to_string())
    } else if root.join("yarn.lock").exists() {
        Some("yarn".to_string())
    } else if root.join("bun.lockb").exists() {
        Some("bun".to_string())
    } else if root.join("package-lock.json").exists() {
        Some("npm".to_string())
    } else {
        None
    }
}

fn detect_node_db(deps: &std::collections::HashMap<String, String>) -> Option<String> {
    if deps.contains_key("pg") || deps.contains_key("postgres") {
        Some("PostgreSQL".to_string())
    } else if deps.contains_key("mongoose") || deps.contains_key("mongodb") {
        Some("MongoDB".to_string())
    } else if deps.contains_key("mysql2") || deps.contains_key("mysql") {
        Some("MySQL".to_string())
    } else if deps.contains_key("better-sqlite3") || deps.contains_key("sqlite3") {
        Some("SQLite".to_string())
    } else {
        None
    }
}

fn has_php_files(root: &Path) -> bool {
    std::fs::read_dir(root)
        .map(|entries| {
            entries.flatten().any(|e| {
                e.path()
                    .extension()
                    .and_then(std::ffi::OsStr::to_str)
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("php"))
            })
        })
        .unwrap_or(false)
}

fn git_remote_url(root: &Path) -> Option<String> {
    std::process::Command::new("git")
        .args(["-C"])
        .arg(root)
        .args(["config", "--get", "remote.origin.url"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Inspect `package.json`, `pyproject.toml`, loose PHP files, and
/// `docker-compose.yml` to populate stack signals deterministically
/// from what's on disk (§4.5 step 4 auto-seed, step 5 DNA generation).
fn detect_stack_signals(root: &Path) -> StackSignals {
    let mut signals = StackSignals::default();

    if let Ok(raw) = std::fs::read_to_string(root.join("package.json")) {
        if let Ok(pkg) = serde_json::from_str::<serde_json::Value>(&raw) {
            let deps = merged_node_deps(&pkg);
            if deps.contains_key("next") {
                signals.framework = Some("Next.js".to_string());
                signals.framework_version = deps.get("next").cloned();
            } else if deps.contains_key("react") {
                signals.framework = Some("React".to_string());
                signals.framework_version = deps.get("react").cloned();
            } else if deps.contains_key("vue") {
                signals.framework = Some("Vue".to_string());
            } else if deps.contains_key("svelte") {
                signals.framework = Some("Svelte".to_string());
            }
            signals.language = Some(if deps.contains_key("typescript") {
                "TypeScript".to_string()
            } else {
                "JavaScript".to_string()
            });
            if deps.contains_key("tailwindcss") {
                signals.css_approach = Some("Tailwind CSS".to_string());
            }
            signals.db_technology = detect_node_db(&deps);
            signals.package_manager = detect_node_package_manager(root);
            signals.project_category = Some("web".to_string());
        }
    } else if let Ok(raw) = std::fs::read_to_string(root.join("pyproject.toml")) {
        let lower = raw.to_lowercase();
        signals.framework = if lower.contains("fastapi") {
            Some("FastAPI".to_string())
        } else if lower.contains("django") {
            Some("Django".to_string())
        } else if lower.contains("flask") {
            Some("Flask".to_string())
        } else {
            None
        };
        signals.language = Some("Python".to_string());
        signals.package_manager = Some("pip".to_string());
        signals.project_category = Some("backend".to_string());
    } else if has_php_files(root) {
        signals.language = Some("PHP".to_string());
        signals.project_category = Some("web".to_string());
    }

    if root.join("docker-compose.yml").exists() || root.join("docker-compose.yaml").exists() {
        signals.containerization = Some("docker-compose".to_string());
        signals.hosting_pattern = Some("containerized".to_string());
    }

    signals.github_repo_url = git_remote_url(root);

    signals
}

fn top_level_dirs(root: &Path, max: usize) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    let mut dirs: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|name| !name.starts_with('.') && !DNA_IGNORED_DIRS.contains(&name.as_str()))
        .collect();
    dirs.sort();
    dirs.truncate(max);
    dirs
}

/// Render the project DNA: stack summary, top-level layout, deploy hint
/// from Identity (§4.5 step 5). Deterministic given the same disk state.
fn generate_dna(project_name: &str, root: &Path, signals: &StackSignals, identity: &Identity) -> String {
    let mut lines = vec![format!("Project: {project_name}")];

    match (&signals.framework, &signals.language) {
        (Some(framework), Some(language)) => lines.push(format!("Stack: {framework} ({language})")),
        (Some(framework), None) => lines.push(format!("Stack: {framework}")),
        (None, Some(language)) => lines.push(format!("Language: {language}")),
        (None, None) => {}
    }
    if let Some(css) = &signals.css_approach {
        lines.push(format!("Styling: {css}"));
    }
    let db = signals.db_technology.clone().or_else(|| identity.db_technology.clone());
    if let Some(db) = db {
        lines.push(format!("Database: {db}"));
    }
    if let Some(containerization) = &signals.containerization {
        lines.push(format!("Containerization: {containerization}"));
    }
    if let Some(host) = &identity.deploy_ssh_host {
        lines.push(format!("Deploy host: {host}"));
    }

    let dirs = top_level_dirs(root, 6);
    if !dirs.is_empty() {
        lines.push(format!("Top-level: {}", dirs.join(", ")));
    }

    lines.join("\n")
}

/// Render a `path (action)` list entry for an emergency bridge's file
/// section, matching the original `build_emergency_bridge`'s
/// `f"{f[0]} ({f[1]})"` formatting.
fn render_file_entry(rel_path: &str, action: &str) -> String {
    format!("{rel_path} ({action})")
}

/// Render a `[kind] preview` list entry for an emergency bridge's fact
/// section, matching the original `build_emergency_bridge`'s
/// `f"[{f[0]}] {f[1]}"` formatting, truncated to an 80-char preview.
fn render_fact_entry(fact: &crate::model::Fact) -> String {
    let preview: String = fact.body.chars().take(80).collect();
    format!("[{}] {}", fact.kind, preview)
}

/// Emergency briefing synthesized from a crashed session's own Changes
/// and Facts, used only when that session never wrote a bridge itself
/// (§4.5 step 3).
fn synthesize_crash_bridge(storage: &SqliteStorage, session_id: &str) -> String {
    let files = storage.distinct_changed_files_for_session(session_id, 10).unwrap_or_default();
    let facts = storage.list_facts_for_session(session_id, 5).unwrap_or_default();

    if files.is_empty() && facts.is_empty() {
        return "Session ended unexpectedly; no file changes or facts were recorded.".to_string();
    }

    let mut parts = vec!["Session ended unexpectedly.".to_string()];
    if !files.is_empty() {
        let file_list: Vec<String> = files.iter().map(|(path, action)| render_file_entry(path, action)).collect();
        parts.push(format!("Files: {}", file_list.join(", ")));
    }
    if !facts.is_empty() {
        let fact_list: Vec<String> = facts.iter().map(render_fact_entry).collect();
        parts.push(format!("Facts: {}", fact_list.join("; ")));
    }
    parts.join(" ")
}

/// Emergency briefing synthesized at an ordinary `session_end` when the
/// session never wrote its own bridge: up to 10 distinct changed files
/// with action, and up to 5 recent fact previews (§4.5 `session_end`).
fn synthesize_session_end_bridge(storage: &SqliteStorage, session_id: &str, counts: &SessionCounts) -> String {
    let files = storage.distinct_changed_files_for_session(session_id, 10).unwrap_or_default();
    let facts = storage.list_facts_for_session(session_id, 5).unwrap_or_default();

    let mut parts = vec![format!("{} fact(s) recorded, {} file(s) changed.", counts.facts_count, counts.changes_count)];
    if !files.is_empty() {
        let file_list: Vec<String> = files.iter().map(|(path, action)| render_file_entry(path, action)).collect();
        parts.push(format!("Files: {}", file_list.join(", ")));
    }
    if !facts.is_empty() {
        let fact_list: Vec<String> = facts.iter().map(render_fact_entry).collect();
        parts.push(format!("Facts: {}", fact_list.join("; ")));
    }
    parts.join(" ")
}

fn recover_crashed_session(
    storage: &mut SqliteStorage,
    project_id: &str,
    now_ms: i64,
    actor: &str,
) -> Result<Option<String>> {
    let Some(stale) = storage.find_recoverable_open_session(project_id, now_ms, CRASH_GRACE_MS)? else {
        return Ok(None);
    };
    let emergency_bridge = if stale.bridge_text.is_none() {
        Some(synthesize_crash_bridge(storage, &stale.id))
    } else {
        None
    };
    storage.crash_close_session(&stale.id, stale.started_at, emergency_bridge.as_deref(), actor)?;
    Ok(Some(stale.id))
}

fn auto_seed_identity(
    storage: &mut SqliteStorage,
    project: &Project,
    signals: &StackSignals,
    actor: &str,
) -> Result<Identity> {
    let fields = signals.as_fields();
    if fields.is_empty() {
        return Ok(Identity::default());
    }
    identity_gate::identity_set(storage, &project.id, &project.name, &fields, false, actor)
}

fn replace_delimited_block(text: &str, begin: &str, end: &str, replacement: &str) -> Option<String> {
    let start = text.find(begin)?;
    let end_pos = start + text[start..].find(end)? + end.len();
    Some(format!("{}{}{}", &text[..start], replacement, &text[end_pos..]))
}

/// Inject the briefing block into the project's instruction file,
/// replacing any existing block (current or legacy marker) and
/// creating the file if it's missing (§4.5 step 9, §6 project-facing
/// output). Newlines are normalized to `\n`.
fn inject_briefing_block(
    project_root: &Path,
    dna: &str,
    previous_bridge: Option<&str>,
    crash_notice: Option<&str>,
) -> Result<()> {
    let path = project_root.join(INSTRUCTION_FILENAME);
    let existing = std::fs::read_to_string(&path).unwrap_or_default().replace("\r\n", "\n");

    let mut body = vec![
        "The following is auto-generated project context. Do not edit by hand.".to_string(),
        String::new(),
        dna.to_string(),
    ];
    if let Some(bridge) = previous_bridge {
        body.push(String::new());
        body.push("Last session's bridge:".to_string());
        body.push(bridge.to_string());
    }
    if let Some(notice) = crash_notice {
        body.push(String::new());
        body.push(notice.to_string());
    }
    let block = format!("{BLOCK_BEGIN}\n{}\n{BLOCK_END}", body.join("\n"));

    let replaced = replace_delimited_block(&existing, BLOCK_BEGIN, BLOCK_END, &block)
        .or_else(|| replace_delimited_block(&existing, LEGACY_BLOCK_BEGIN, LEGACY_BLOCK_END, &block));

    let next = match replaced {
        Some(text) => text,
        None if existing.trim().is_empty() => format!("{block}\n"),
        None => format!("{}\n\n{block}\n", existing.trim_end()),
    };

    if next != existing {
        std::fs::write(&path, next)?;
    }
    Ok(())
}

/// Run the full `session_start` sequence (§4.5 steps 1-10).
///
/// # Errors
///
/// Returns an error if a storage operation fails. A failed instruction-file
/// write or reindex pass does not abort session creation — the session
/// itself is the important side effect.
pub fn session_start(
    storage: &mut SqliteStorage,
    project_root: &Path,
    terminal_key: Option<&str>,
    actor: &str,
) -> Result<SessionStartOutcome> {
    let start = std::time::Instant::now();
    let now = chrono::Utc::now().timestamp_millis();
    let project_path = project_root.to_string_lossy().to_string();

    // Steps 1-2: resolve/register the project from its manifests (the
    // display name already falls back to the directory's basename).
    let mut project = storage.get_or_create_project(&project_path, None, actor)?;

    // Step 3: crash recovery.
    let recovered_session_id = recover_crashed_session(storage, &project.id, now, actor)?;

    // Step 4: auto-seed identity, and step 5's stack signals share the
    // same manifest scan.
    let signals = detect_stack_signals(project_root);
    let identity = match storage.get_identity(&project.id)? {
        Some(identity) => identity,
        None => auto_seed_identity(storage, &project, &signals, actor)?,
    };

    // Step 5: read or (re)generate the DNA briefing.
    let dna = match &project.dna_content {
        Some(cached) => cached.clone(),
        None => {
            let generated = generate_dna(&project.name, project_root, &signals, &identity);
            storage.update_project_dna(&project.id, &generated, actor)?;
            project.dna_content = Some(generated.clone());
            project.dna_generated_at = Some(now);
            generated
        }
    };

    // Step 6: fetch the previous session's bridge.
    let previous_bridge = storage.get_last_closed_session(&project.id)?.and_then(|s| s.bridge_text);

    // Step 7: create the new open session.
    let session = Session::new(project.id.clone(), project_path.clone(), terminal_key.map(str::to_string));
    storage.create_session(&session, actor)?;
    storage.set_last_session(&project.id, &session.id, actor)?;

    // Step 8: write the active-session descriptor and bind the terminal.
    write_active_session_descriptor(&project, &session)?;
    config::bind_session_to_terminal(&session.id, &project_path, "open");

    // Step 9: inject the briefing block.
    let crash_notice = recovered_session_id
        .as_ref()
        .map(|id| format!("A previous session ({id}) was recovered after an apparent crash."));
    let _ = inject_briefing_block(project_root, &dna, previous_bridge.as_deref(), crash_notice.as_deref());

    // Step 10: budget-permitting, hand the remainder to the Indexer.
    let elapsed_ms = i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);
    let reindex = if elapsed_ms <= SESSION_START_BUDGET_MS {
        let budget = TimeBudget::default_budget();
        indexer::reindex_project(storage, &project.id, project_root, &budget, actor).ok()
    } else {
        None
    };

    Ok(SessionStartOutcome {
        session,
        project,
        dna,
        previous_bridge,
        recovered_session_id,
        reindex,
    })
}

/// Record a file change for the active session. Completes in one
/// insert + commit and never fails the caller — any storage error is
/// swallowed so the hot path never blocks the host (§4.5 `file_change`,
/// §5 cancellation & timeouts). Deletions are never recorded here; they
/// are reconciled the next time the Indexer runs.
pub fn record_file_change(storage: &mut SqliteStorage, project_id: &str, session_id: &str, rel_path: &str, is_new: bool, actor: &str) {
    let action = if is_new { ChangeAction::Create } else { ChangeAction::Edit };
    let _ = storage.append_change(project_id, session_id, rel_path, action, actor);
}

/// Close a session, synthesizing an emergency bridge if it never wrote
/// its own, then clear the active-session descriptor (§4.5 `session_end`).
///
/// Idempotent: calling this again on an already-closed session refreshes
/// `ended_at` and counts but never overwrites a non-null bridge.
///
/// # Errors
///
/// Returns [`Error::SessionNotFound`] if `session_id` doesn't exist, or
/// an error if a storage operation fails.
pub fn session_end(storage: &mut SqliteStorage, session_id: &str, actor: &str) -> Result<SessionEndOutcome> {
    let now = chrono::Utc::now().timestamp_millis();
    let session = storage
        .get_session(session_id)?
        .ok_or_else(|| Error::SessionNotFound { id: session_id.to_string() })?;

    let counts = storage.session_counts(session_id)?;
    let bridge_if_absent = session
        .bridge_text
        .is_none()
        .then(|| synthesize_session_end_bridge(storage, session_id, &counts));

    storage.close_session(session_id, now, bridge_if_absent.as_deref(), actor)?;
    clear_active_session_descriptor();
    config::clear_status_cache();

    let bridge = storage.get_session(session_id)?.and_then(|s| s.bridge_text);

    Ok(SessionEndOutcome {
        session_id: session_id.to_string(),
        facts_count: counts.facts_count,
        changes_count: counts.changes_count,
        bridge,
        crashed_recovered: session.crashed,
    })
}

/// `session_bridge(action="load")`: the most recent closed session's
/// bridge text, if any.
///
/// # Errors
///
/// Returns an error if a storage operation fails.
pub fn session_bridge_load(storage: &SqliteStorage, project_id: &str) -> Result<Option<String>> {
    Ok(storage.get_last_closed_session(project_id)?.and_then(|s| s.bridge_text))
}

/// `session_bridge(action="save")`: overwrite the open session's bridge
/// with supplied content — a running session's own recovery checkpoint.
///
/// # Errors
///
/// Returns an error if a storage operation fails.
pub fn session_bridge_save(storage: &mut SqliteStorage, session_id: &str, content: &str, actor: &str) -> Result<()> {
    storage.update_session_bridge(session_id, content, actor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn tempdir() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("coderecall-session-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path).unwrap();
        path
    }

    #[test]
    fn test_session_start_creates_project_and_session() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let root = tempdir();

        let outcome = session_start(&mut storage, &root, None, "tester").unwrap();

        assert!(outcome.session.is_open());
        assert_eq!(outcome.project.project_path, root.to_string_lossy());
        assert!(outcome.recovered_session_id.is_none());
        assert!(outcome.dna.contains("Project:"));

        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn test_session_start_injects_instruction_block() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let root = tempdir();

        session_start(&mut storage, &root, None, "tester").unwrap();

        let contents = std::fs::read_to_string(root.join(INSTRUCTION_FILENAME)).unwrap();
        assert!(contents.contains(BLOCK_BEGIN));
        assert!(contents.contains(BLOCK_END));

        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn test_session_start_recognizes_legacy_marker() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let root = tempdir();

        let mut file = std::fs::File::create(root.join(INSTRUCTION_FILENAME)).unwrap();
        writeln!(file, "Existing notes.\n{LEGACY_BLOCK_BEGIN}\nstale\n{LEGACY_BLOCK_END}\nmore notes").unwrap();
        drop(file);

        session_start(&mut storage, &root, None, "tester").unwrap();

        let contents = std::fs::read_to_string(root.join(INSTRUCTION_FILENAME)).unwrap();
        assert!(!contents.contains(LEGACY_BLOCK_BEGIN));
        assert!(contents.contains(BLOCK_BEGIN));
        assert!(contents.contains("Existing notes."));
        assert!(contents.contains("more notes"));

        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn test_session_start_recovers_crashed_session() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let root = tempdir();

        let first = session_start(&mut storage, &root, None, "tester").unwrap();
        let old_start = chrono::Utc::now().timestamp_millis() - CRASH_GRACE_MS - 1000;
        storage
            .conn()
            .execute(
                "UPDATE sessions SET started_at = ?1 WHERE id = ?2",
                rusqlite::params![old_start, first.session.id],
            )
            .unwrap();

        let second = session_start(&mut storage, &root, None, "tester").unwrap();
        assert_eq!(second.recovered_session_id, Some(first.session.id.clone()));

        let recovered = storage.get_session(&first.session.id).unwrap().unwrap();
        assert!(!recovered.is_open());
        assert!(recovered.crashed);

        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn test_session_start_leaves_young_open_session_alone() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let root = tempdir();

        let first = session_start(&mut storage, &root, None, "tester").unwrap();
        let second = session_start(&mut storage, &root, None, "tester").unwrap();

        assert!(second.recovered_session_id.is_none());
        let still_open = storage.get_session(&first.session.id).unwrap().unwrap();
        assert!(still_open.is_open());

        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn test_record_file_change_swallows_errors_silently() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        record_file_change(&mut storage, "proj_missing", "sess_missing", "a.rs", true, "tester");
    }

    #[test]
    fn test_session_end_synthesizes_bridge_when_absent() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = storage.get_or_create_project("/tmp/p", None, "tester").unwrap();
        let session = Session::new(project.id.clone(), "/tmp/p".to_string(), None);
        storage.create_session(&session, "tester").unwrap();
        storage.append_change(&project.id, &session.id, "a.rs", ChangeAction::Edit, "tester").unwrap();

        let outcome = session_end(&mut storage, &session.id, "tester").unwrap();
        assert!(outcome.bridge.is_some());
        assert_eq!(outcome.changes_count, 1);
    }

    #[test]
    fn test_session_end_is_idempotent_on_bridge() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = storage.get_or_create_project("/tmp/p", None, "tester").unwrap();
        let session = Session::new(project.id.clone(), "/tmp/p".to_string(), None);
        storage.create_session(&session, "tester").unwrap();
        storage.update_session_bridge(&session.id, "hand-written bridge", "tester").unwrap();

        let first = session_end(&mut storage, &session.id, "tester").unwrap();
        let second = session_end(&mut storage, &session.id, "tester").unwrap();

        assert_eq!(first.bridge.as_deref(), Some("hand-written bridge"));
        assert_eq!(second.bridge.as_deref(), Some("hand-written bridge"));
    }

    #[test]
    fn test_session_bridge_load_and_save() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = storage.get_or_create_project("/tmp/p", None, "tester").unwrap();
        let session = Session::new(project.id.clone(), "/tmp/p".to_string(), None);
        storage.create_session(&session, "tester").unwrap();

        assert!(session_bridge_load(&storage, &project.id).unwrap().is_none());

        session_bridge_save(&mut storage, &session.id, "checkpoint text", "tester").unwrap();
        storage.close_session(&session.id, chrono::Utc::now().timestamp_millis(), None, "tester").unwrap();

        let loaded = session_bridge_load(&storage, &project.id).unwrap();
        assert_eq!(loaded.as_deref(), Some("checkpoint text"));
    }

    #[test]
    fn test_detect_stack_signals_from_package_json() {
        let root = tempdir();
        std::fs::write(
            root.join("package.json"),
            r#"{"dependencies":{"next":"14.0.0","react":"18.2.0"},"devDependencies":{"typescript":"5.0.0","tailwindcss":"3.4.0"}}"#,
        )
        .unwrap();

        let signals = detect_stack_signals(&root);
        assert_eq!(signals.framework.as_deref(), Some("Next.js"));
        assert_eq!(signals.language.as_deref(), Some("TypeScript"));
        assert_eq!(signals.css_approach.as_deref(), Some("Tailwind CSS"));

        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn test_detect_stack_signals_from_pyproject() {
        let root = tempdir();
        std::fs::write(root.join("pyproject.toml"), "[tool.poetry.dependencies]\nfastapi = \"^0.100\"\n").unwrap();

        let signals = detect_stack_signals(&root);
        assert_eq!(signals.framework.as_deref(), Some("FastAPI"));
        assert_eq!(signals.language.as_deref(), Some("Python"));

        std::fs::remove_dir_all(root).ok();
    }
}
