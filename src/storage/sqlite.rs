//! SQLite storage backend for the memory engine.
//!
//! Every mutation goes through [`SqliteStorage::mutate`], which opens an
//! `IMMEDIATE` transaction, runs the closure, writes any audit events the
//! closure recorded, and commits — one transaction per tool invocation,
//! matching the concurrency model in the spec (writers serialize through
//! the WAL, readers never block).

use crate::error::{Error, Result};
use crate::model::{
    Change, ChangeAction, Chunk, Decision, Fact, Identity, IndexedFile, Project, Session,
    SessionCounts, SessionStatus,
};
use crate::storage::events::{insert_event, Event, EventType};
use crate::storage::schema::apply_schema;
use crate::vector::{pack, unpack};
use rusqlite::{Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::time::Duration;

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Context threaded through a [`SqliteStorage::mutate`] closure.
///
/// Tracks the operation name and actor for the audit trail, and
/// accumulates [`Event`] rows to be written atomically with the rest of
/// the transaction.
pub struct MutationContext {
    pub op_name: String,
    pub actor: String,
    pub events: Vec<Event>,
}

impl MutationContext {
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            events: Vec::new(),
        }
    }

    pub fn record_event(&mut self, entity_type: &str, entity_id: &str, event_type: EventType) {
        self.events
            .push(Event::new(entity_type, entity_id, event_type, &self.actor));
    }

    pub fn record_change(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        event_type: EventType,
        old_value: Option<String>,
        new_value: Option<String>,
    ) {
        self.events.push(
            Event::new(entity_type, entity_id, event_type, &self.actor)
                .with_values(old_value, new_value),
        );
    }
}

/// A fact candidate surfaced by the lexical engine, with its rank
/// position preserved for the hybrid-score formula (§4.4 step 5).
#[derive(Debug, Clone)]
pub struct RankedFact {
    pub fact: Fact,
    pub position: usize,
}

#[derive(Debug, Clone)]
pub struct RankedChunk {
    pub chunk: Chunk,
    pub position: usize,
}

/// A fact plus its decoded embedding, for vector-side candidate scoring.
#[derive(Debug, Clone)]
pub struct FactWithVector {
    pub fact: Fact,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct ChunkWithVector {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

impl SqliteStorage {
    /// Open (creating if absent) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or the
    /// schema fails to apply.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open with an explicit busy-timeout override (milliseconds).
    ///
    /// Defaults to the spec's 5-second busy-timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or the
    /// schema fails to apply.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(timeout_ms.unwrap_or(5_000)))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database — used by tests and by any caller
    /// that wants an ephemeral store.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside one `IMMEDIATE` transaction, writing every event
    /// `f` recorded on the [`MutationContext`] before committing.
    ///
    /// # Errors
    ///
    /// Propagates any error from `f`, or from the commit itself; the
    /// transaction rolls back on drop if it never commits.
    pub fn mutate<F, R>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let mut ctx = MutationContext::new(op, actor);

        let result = f(&tx, &mut ctx)?;

        for event in &ctx.events {
            insert_event(&tx, event)?;
        }

        tx.commit()?;
        Ok(result)
    }

    // ================= Projects =================

    pub fn create_project(&mut self, project: &Project, actor: &str) -> Result<()> {
        self.mutate("create_project", actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO projects (id, project_path, name, dna_content, dna_generated_at, last_session_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    project.id, project.project_path, project.name, project.dna_content,
                    project.dna_generated_at, project.last_session_id, project.created_at, project.updated_at
                ],
            )?;
            ctx.record_event("project", &project.id, EventType::ProjectCreated);
            Ok(())
        })
    }

    pub fn find_project_by_path(&self, project_path: &str) -> Result<Option<Project>> {
        self.conn
            .query_row(
                "SELECT id, project_path, name, dna_content, dna_generated_at, last_session_id, created_at, updated_at
                 FROM projects WHERE project_path = ?1",
                [project_path],
                row_to_project,
            )
            .optional()
            .map_err(Error::from)
    }

    pub fn get_project(&self, id: &str) -> Result<Option<Project>> {
        self.conn
            .query_row(
                "SELECT id, project_path, name, dna_content, dna_generated_at, last_session_id, created_at, updated_at
                 FROM projects WHERE id = ?1",
                [id],
                row_to_project,
            )
            .optional()
            .map_err(Error::from)
    }

    /// Register a project if it isn't already known, else return the
    /// existing row untouched. The `session_start` entry point for
    /// "register or touch the Project row" (§4.5 step 2).
    pub fn get_or_create_project(
        &mut self,
        project_path: &str,
        name: Option<&str>,
        actor: &str,
    ) -> Result<Project> {
        if let Some(existing) = self.find_project_by_path(project_path)? {
            return Ok(existing);
        }
        let project = Project::new(project_path.to_string(), name.map(str::to_string));
        self.create_project(&project, actor)?;
        Ok(project)
    }

    pub fn update_project_dna(&mut self, id: &str, dna: &str, actor: &str) -> Result<()> {
        self.mutate("update_project_dna", actor, |tx, _ctx| {
            tx.execute(
                "UPDATE projects SET dna_content = ?1, dna_generated_at = ?2, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![dna, chrono::Utc::now().timestamp_millis(), id],
            )?;
            Ok(())
        })
    }

    pub fn set_last_session(&mut self, project_id: &str, session_id: &str, actor: &str) -> Result<()> {
        self.mutate("set_last_session", actor, |tx, _ctx| {
            tx.execute(
                "UPDATE projects SET last_session_id = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![session_id, chrono::Utc::now().timestamp_millis(), project_id],
            )?;
            Ok(())
        })
    }

    pub fn list_projects(&self, limit: usize) -> Result<Vec<Project>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_path, name, dna_content, dna_generated_at, last_session_id, created_at, updated_at
             FROM projects ORDER BY updated_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], row_to_project)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    // ================= Sessions =================

    pub fn create_session(&mut self, session: &Session, actor: &str) -> Result<()> {
        self.mutate("create_session", actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO sessions (id, project_id, project_path, status, terminal_key, bridge_text, crashed, started_at, ended_at, last_heartbeat_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    session.id, session.project_id, session.project_path, session.status,
                    session.terminal_key, session.bridge_text, session.crashed,
                    session.started_at, session.ended_at, session.last_heartbeat_at
                ],
            )?;
            ctx.record_event("session", &session.id, EventType::SessionStarted);
            Ok(())
        })
    }

    pub fn get_session(&self, id: &str) -> Result<Option<Session>> {
        self.conn
            .query_row(
                "SELECT id, project_id, project_path, status, terminal_key, bridge_text, crashed, started_at, ended_at, last_heartbeat_at
                 FROM sessions WHERE id = ?1",
                [id],
                row_to_session,
            )
            .optional()
            .map_err(Error::from)
    }

    pub fn list_sessions(&self, project_id: &str, limit: Option<u32>) -> Result<Vec<Session>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, project_path, status, terminal_key, bridge_text, crashed, started_at, ended_at, last_heartbeat_at
             FROM sessions WHERE project_id = ?1 ORDER BY started_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![project_id, limit.unwrap_or(20)],
            row_to_session,
        )?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Find the most recent OPEN session for `project_id` whose
    /// `started_at` is older than `now_ms - grace_ms` — the crash
    /// recovery query from §4.5 step 3. The grace window is applied
    /// here, not by the caller, so "younger than grace" sessions are
    /// never even returned.
    pub fn find_recoverable_open_session(
        &self,
        project_id: &str,
        now_ms: i64,
        grace_ms: i64,
    ) -> Result<Option<Session>> {
        self.conn
            .query_row(
                "SELECT id, project_id, project_path, status, terminal_key, bridge_text, crashed, started_at, ended_at, last_heartbeat_at
                 FROM sessions
                 WHERE project_id = ?1 AND status = 'open' AND started_at <= ?2
                 ORDER BY started_at DESC LIMIT 1",
                rusqlite::params![project_id, now_ms - grace_ms],
                row_to_session,
            )
            .optional()
            .map_err(Error::from)
    }

    pub fn get_last_closed_session(&self, project_id: &str) -> Result<Option<Session>> {
        self.conn
            .query_row(
                "SELECT id, project_id, project_path, status, terminal_key, bridge_text, crashed, started_at, ended_at, last_heartbeat_at
                 FROM sessions
                 WHERE project_id = ?1 AND status = 'closed'
                 ORDER BY ended_at DESC LIMIT 1",
                [project_id],
                row_to_session,
            )
            .optional()
            .map_err(Error::from)
    }

    /// Force-close a session as part of crash recovery.
    pub fn crash_close_session(
        &mut self,
        id: &str,
        end_time: i64,
        bridge_if_absent: Option<&str>,
        actor: &str,
    ) -> Result<()> {
        self.mutate("crash_close_session", actor, |tx, ctx| {
            tx.execute(
                "UPDATE sessions SET status = 'closed', ended_at = ?1, crashed = 1,
                 bridge_text = COALESCE(bridge_text, ?2) WHERE id = ?3",
                rusqlite::params![end_time, bridge_if_absent, id],
            )?;
            ctx.record_event("session", id, EventType::SessionCrashRecovered);
            Ok(())
        })
    }

    /// Ordinary `session_end`: idempotent w.r.t. bridge text (never
    /// overwrites a non-null bridge), always refreshes `ended_at`.
    pub fn close_session(
        &mut self,
        id: &str,
        end_time: i64,
        bridge_if_absent: Option<&str>,
        actor: &str,
    ) -> Result<()> {
        self.mutate("close_session", actor, |tx, ctx| {
            tx.execute(
                "UPDATE sessions SET status = 'closed', ended_at = ?1,
                 bridge_text = COALESCE(bridge_text, ?2) WHERE id = ?3",
                rusqlite::params![end_time, bridge_if_absent, id],
            )?;
            ctx.record_event("session", id, EventType::SessionEnded);
            Ok(())
        })
    }

    pub fn update_session_bridge(&mut self, id: &str, bridge: &str, actor: &str) -> Result<()> {
        self.mutate("update_session_bridge", actor, |tx, _ctx| {
            tx.execute(
                "UPDATE sessions SET bridge_text = ?1 WHERE id = ?2",
                rusqlite::params![bridge, id],
            )?;
            Ok(())
        })
    }

    pub fn touch_session_heartbeat(&mut self, id: &str, actor: &str) -> Result<()> {
        self.mutate("touch_session_heartbeat", actor, |tx, _ctx| {
            tx.execute(
                "UPDATE sessions SET last_heartbeat_at = ?1 WHERE id = ?2",
                rusqlite::params![chrono::Utc::now().timestamp_millis(), id],
            )?;
            Ok(())
        })
    }

    pub fn bind_session_terminal(&mut self, id: &str, terminal_key: &str, actor: &str) -> Result<()> {
        self.mutate("bind_session_terminal", actor, |tx, _ctx| {
            tx.execute(
                "UPDATE sessions SET terminal_key = ?1 WHERE id = ?2",
                rusqlite::params![terminal_key, id],
            )?;
            Ok(())
        })
    }

    pub fn session_counts(&self, session_id: &str) -> Result<SessionCounts> {
        let facts_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM facts WHERE session_id = ?1 AND deleted_at IS NULL",
            [session_id],
            |r| r.get(0),
        )?;
        let changes_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM changed_files WHERE session_id = ?1",
            [session_id],
            |r| r.get(0),
        )?;
        Ok(SessionCounts {
            facts_count,
            changes_count,
        })
    }

    // ================= Facts =================

    /// Look up a fact by the dedup key `(project_id, source_file, kind)`.
    /// Only meaningful when `source_file` is `Some` — the unique-fact
    /// invariant is scoped to facts with a source file (§3).
    pub fn find_fact_by_source(
        &self,
        project_id: &str,
        source_file: &str,
        kind: &str,
    ) -> Result<Option<Fact>> {
        self.conn
            .query_row(
                "SELECT id, project_id, session_id, kind, title, body, source_file, source_mtime, tags, domain,
                        heat, last_accessed_at, access_count, created_at, updated_at, deleted_at
                 FROM facts
                 WHERE project_id = ?1 AND source_file = ?2 AND kind = ?3 AND deleted_at IS NULL",
                rusqlite::params![project_id, source_file, kind],
                row_to_fact,
            )
            .optional()
            .map_err(Error::from)
    }

    pub fn insert_fact(&mut self, fact: &Fact, actor: &str) -> Result<()> {
        self.mutate("insert_fact", actor, |tx, ctx| {
            insert_fact_tx(tx, fact)?;
            ctx.record_event("fact", &fact.id, EventType::FactWritten);
            Ok(())
        })
    }

    /// Update an existing fact's content in place (the dedup path of
    /// `memory_write`): body/title/tags change, `updated_at` bumps, but
    /// identity, heat, and access bookkeeping are untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn update_fact_body(
        &mut self,
        id: &str,
        title: &str,
        body: &str,
        source_mtime: Option<i64>,
        tags: Option<&str>,
        domain: Option<&str>,
        actor: &str,
    ) -> Result<()> {
        self.mutate("update_fact_body", actor, |tx, ctx| {
            tx.execute(
                "UPDATE facts SET title = ?1, body = ?2, source_mtime = ?3, tags = ?4, domain = ?5, updated_at = ?6 WHERE id = ?7",
                rusqlite::params![title, body, source_mtime, tags, domain, chrono::Utc::now().timestamp_millis(), id],
            )?;
            ctx.record_event("fact", id, EventType::FactWritten);
            Ok(())
        })
    }

    pub fn get_fact(&self, id: &str) -> Result<Option<Fact>> {
        self.conn
            .query_row(
                "SELECT id, project_id, session_id, kind, title, body, source_file, source_mtime, tags, domain,
                        heat, last_accessed_at, access_count, created_at, updated_at, deleted_at
                 FROM facts WHERE id = ?1 AND deleted_at IS NULL",
                [id],
                row_to_fact,
            )
            .optional()
            .map_err(Error::from)
    }

    pub fn delete_facts(&mut self, ids: &[String], actor: &str) -> Result<usize> {
        self.mutate("delete_facts", actor, |tx, ctx| {
            let mut count = 0usize;
            for id in ids {
                let affected = tx.execute(
                    "UPDATE facts SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
                    rusqlite::params![chrono::Utc::now().timestamp_millis(), id],
                )?;
                if affected > 0 {
                    tx.execute("DELETE FROM fact_vectors WHERE fact_id = ?1", [id])?;
                    ctx.record_event("fact", id, EventType::FactDeleted);
                    count += 1;
                }
            }
            Ok(count)
        })
    }

    /// All non-deleted facts for a project, for the project-wide heat
    /// decay pass and the trivial-query short-circuit.
    pub fn list_facts_for_project(&self, project_id: &str) -> Result<Vec<Fact>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, session_id, kind, title, body, source_file, source_mtime, tags, domain,
                    heat, last_accessed_at, access_count, created_at, updated_at, deleted_at
             FROM facts WHERE project_id = ?1 AND deleted_at IS NULL",
        )?;
        let rows = stmt.query_map([project_id], row_to_fact)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Most recent non-deleted facts recorded during a session, for the
    /// emergency-bridge fact previews (§4.5 `session_end`: "up to 5
    /// recent fact previews").
    pub fn list_facts_for_session(&self, session_id: &str, limit: usize) -> Result<Vec<Fact>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, session_id, kind, title, body, source_file, source_mtime, tags, domain,
                    heat, last_accessed_at, access_count, created_at, updated_at, deleted_at
             FROM facts WHERE session_id = ?1 AND deleted_at IS NULL
             ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![session_id, limit as i64], row_to_fact)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    pub fn list_all_facts(&self) -> Result<Vec<Fact>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, session_id, kind, title, body, source_file, source_mtime, tags, domain,
                    heat, last_accessed_at, access_count, created_at, updated_at, deleted_at
             FROM facts WHERE deleted_at IS NULL",
        )?;
        let rows = stmt.query_map([], row_to_fact)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Apply one decay pass to every fact in `facts`, skipping writes
    /// whose delta is below the 0.001 threshold (§4.4). Returns the
    /// number of rows actually updated.
    pub fn apply_heat_decay(&mut self, facts: &[Fact], now_ms: i64, actor: &str) -> Result<usize> {
        self.mutate("apply_heat_decay", actor, |tx, _ctx| {
            let mut updated = 0usize;
            for fact in facts {
                let reference = fact.last_accessed_at.unwrap_or(fact.created_at);
                let age_ms = (now_ms - reference).max(0);
                let factor = crate::model::fact::decay_factor(age_ms);
                let decayed = crate::model::fact::clamp_heat(fact.heat * factor);
                if (fact.heat - decayed).abs() < 0.001 {
                    continue;
                }
                tx.execute(
                    "UPDATE facts SET heat = ?1 WHERE id = ?2",
                    rusqlite::params![decayed, fact.id],
                )?;
                updated += 1;
            }
            Ok(updated)
        })
    }

    /// Boost heat by the access amount (clamped) and stamp
    /// `last_accessed_at`, in the same transaction as the search that
    /// triggered it (§5 ordering guarantee).
    pub fn bump_heat_on_access(&mut self, ids: &[String], boost: f64, now_ms: i64, actor: &str) -> Result<()> {
        self.mutate("bump_heat_on_access", actor, |tx, ctx| {
            for id in ids {
                tx.execute(
                    "UPDATE facts SET heat = MIN(1.0, heat + ?1), last_accessed_at = ?2,
                     access_count = access_count + 1 WHERE id = ?3",
                    rusqlite::params![boost, now_ms, id],
                )?;
                ctx.record_event("fact", id, EventType::FactAccessed);
            }
            Ok(())
        })
    }

    pub fn store_fact_vector(&mut self, fact_id: &str, embedding: &[f32], actor: &str) -> Result<()> {
        self.mutate("store_fact_vector", actor, |tx, _ctx| {
            tx.execute(
                "INSERT OR REPLACE INTO fact_vectors (fact_id, embedding, dimensions, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![fact_id, pack(embedding), embedding.len() as i64, chrono::Utc::now().timestamp_millis()],
            )?;
            Ok(())
        })
    }

    /// Lexical fact search via FTS5 `MATCH`, rank-ordered, with scope
    /// and optional kind filter applied in SQL. `project_id = None`
    /// means "all projects."
    pub fn search_facts_fts(
        &self,
        fts_query: &str,
        project_id: Option<&str>,
        kind: Option<&str>,
        limit: usize,
    ) -> rusqlite::Result<Vec<RankedFact>> {
        let sql = match (project_id, kind) {
            (Some(_), Some(_)) => {
                "SELECT f.id, f.project_id, f.session_id, f.kind, f.title, f.body, f.source_file, f.source_mtime, f.tags, f.domain,
                        f.heat, f.last_accessed_at, f.access_count, f.created_at, f.updated_at, f.deleted_at
                 FROM facts_fts JOIN facts f ON f.rowid = facts_fts.rowid
                 WHERE facts_fts MATCH ?1 AND f.project_id = ?2 AND f.kind = ?3 AND f.deleted_at IS NULL
                 ORDER BY rank LIMIT ?4"
            }
            (Some(_), None) => {
                "SELECT f.id, f.project_id, f.session_id, f.kind, f.title, f.body, f.source_file, f.source_mtime, f.tags, f.domain,
                        f.heat, f.last_accessed_at, f.access_count, f.created_at, f.updated_at, f.deleted_at
                 FROM facts_fts JOIN facts f ON f.rowid = facts_fts.rowid
                 WHERE facts_fts MATCH ?1 AND f.project_id = ?2 AND f.deleted_at IS NULL
                 ORDER BY rank LIMIT ?3"
            }
            (None, Some(_)) => {
                "SELECT f.id, f.project_id, f.session_id, f.kind, f.title, f.body, f.source_file, f.source_mtime, f.tags, f.domain,
                        f.heat, f.last_accessed_at, f.access_count, f.created_at, f.updated_at, f.deleted_at
                 FROM facts_fts JOIN facts f ON f.rowid = facts_fts.rowid
                 WHERE facts_fts MATCH ?1 AND f.kind = ?2 AND f.deleted_at IS NULL
                 ORDER BY rank LIMIT ?3"
            }
            (None, None) => {
                "SELECT f.id, f.project_id, f.session_id, f.kind, f.title, f.body, f.source_file, f.source_mtime, f.tags, f.domain,
                        f.heat, f.last_accessed_at, f.access_count, f.created_at, f.updated_at, f.deleted_at
                 FROM facts_fts JOIN facts f ON f.rowid = facts_fts.rowid
                 WHERE facts_fts MATCH ?1 AND f.deleted_at IS NULL
                 ORDER BY rank LIMIT ?2"
            }
        };

        let mut stmt = self.conn.prepare(sql)?;
        let rows = match (project_id, kind) {
            (Some(p), Some(k)) => stmt.query_map(rusqlite::params![fts_query, p, k, limit as i64], row_to_fact)?,
            (Some(p), None) => stmt.query_map(rusqlite::params![fts_query, p, limit as i64], row_to_fact)?,
            (None, Some(k)) => stmt.query_map(rusqlite::params![fts_query, k, limit as i64], row_to_fact)?,
            (None, None) => stmt.query_map(rusqlite::params![fts_query, limit as i64], row_to_fact)?,
        };

        let facts = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(facts
            .into_iter()
            .enumerate()
            .map(|(position, fact)| RankedFact { fact, position })
            .collect())
    }

    /// Substring fallback when the FTS5 query syntax is rejected
    /// (§4.4 step 3): ordered by heat desc, then timestamp desc.
    pub fn search_facts_substring(
        &self,
        needle: &str,
        project_id: Option<&str>,
        kind: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Fact>> {
        let like = format!("%{}%", needle.replace('%', "").replace('_', ""));
        let sql = match (project_id, kind) {
            (Some(_), Some(_)) => {
                "SELECT id, project_id, session_id, kind, title, body, source_file, source_mtime, tags, domain,
                        heat, last_accessed_at, access_count, created_at, updated_at, deleted_at
                 FROM facts WHERE (title LIKE ?1 OR body LIKE ?1) AND project_id = ?2 AND kind = ?3 AND deleted_at IS NULL
                 ORDER BY heat DESC, created_at DESC LIMIT ?4"
            }
            (Some(_), None) => {
                "SELECT id, project_id, session_id, kind, title, body, source_file, source_mtime, tags, domain,
                        heat, last_accessed_at, access_count, created_at, updated_at, deleted_at
                 FROM facts WHERE (title LIKE ?1 OR body LIKE ?1) AND project_id = ?2 AND deleted_at IS NULL
                 ORDER BY heat DESC, created_at DESC LIMIT ?3"
            }
            (None, Some(_)) => {
                "SELECT id, project_id, session_id, kind, title, body, source_file, source_mtime, tags, domain,
                        heat, last_accessed_at, access_count, created_at, updated_at, deleted_at
                 FROM facts WHERE (title LIKE ?1 OR body LIKE ?1) AND kind = ?2 AND deleted_at IS NULL
                 ORDER BY heat DESC, created_at DESC LIMIT ?3"
            }
            (None, None) => {
                "SELECT id, project_id, session_id, kind, title, body, source_file, source_mtime, tags, domain,
                        heat, last_accessed_at, access_count, created_at, updated_at, deleted_at
                 FROM facts WHERE (title LIKE ?1 OR body LIKE ?1) AND deleted_at IS NULL
                 ORDER BY heat DESC, created_at DESC LIMIT ?2"
            }
        };

        let mut stmt = self.conn.prepare(sql)?;
        let rows = match (project_id, kind) {
            (Some(p), Some(k)) => stmt.query_map(rusqlite::params![like, p, k, limit as i64], row_to_fact)?,
            (Some(p), None) => stmt.query_map(rusqlite::params![like, p, limit as i64], row_to_fact)?,
            (None, Some(k)) => stmt.query_map(rusqlite::params![like, k, limit as i64], row_to_fact)?,
            (None, None) => stmt.query_map(rusqlite::params![like, limit as i64], row_to_fact)?,
        };
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Top-`limit` facts ordered by heat desc, timestamp desc — the
    /// trivial-query short-circuit path (§4.4 step 1).
    pub fn top_facts_by_heat(&self, project_id: Option<&str>, kind: Option<&str>, limit: usize) -> Result<Vec<Fact>> {
        let sql = match (project_id, kind) {
            (Some(_), Some(_)) => {
                "SELECT id, project_id, session_id, kind, title, body, source_file, source_mtime, tags, domain,
                        heat, last_accessed_at, access_count, created_at, updated_at, deleted_at
                 FROM facts WHERE project_id = ?1 AND kind = ?2 AND deleted_at IS NULL
                 ORDER BY heat DESC, created_at DESC LIMIT ?3"
            }
            (Some(_), None) => {
                "SELECT id, project_id, session_id, kind, title, body, source_file, source_mtime, tags, domain,
                        heat, last_accessed_at, access_count, created_at, updated_at, deleted_at
                 FROM facts WHERE project_id = ?1 AND deleted_at IS NULL
                 ORDER BY heat DESC, created_at DESC LIMIT ?2"
            }
            (None, Some(_)) => {
                "SELECT id, project_id, session_id, kind, title, body, source_file, source_mtime, tags, domain,
                        heat, last_accessed_at, access_count, created_at, updated_at, deleted_at
                 FROM facts WHERE kind = ?1 AND deleted_at IS NULL
                 ORDER BY heat DESC, created_at DESC LIMIT ?2"
            }
            (None, None) => {
                "SELECT id, project_id, session_id, kind, title, body, source_file, source_mtime, tags, domain,
                        heat, last_accessed_at, access_count, created_at, updated_at, deleted_at
                 FROM facts WHERE deleted_at IS NULL
                 ORDER BY heat DESC, created_at DESC LIMIT ?1"
            }
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = match (project_id, kind) {
            (Some(p), Some(k)) => stmt.query_map(rusqlite::params![p, k, limit as i64], row_to_fact)?,
            (Some(p), None) => stmt.query_map(rusqlite::params![p, limit as i64], row_to_fact)?,
            (None, Some(k)) => stmt.query_map(rusqlite::params![k, limit as i64], row_to_fact)?,
            (None, None) => stmt.query_map(rusqlite::params![limit as i64], row_to_fact)?,
        };
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// All fact vectors in scope, decoded, for brute-force nearest
    /// neighbor search (§4.4 step 4).
    pub fn facts_with_vectors(&self, project_id: Option<&str>, kind: Option<&str>) -> Result<Vec<FactWithVector>> {
        let sql = match (project_id, kind) {
            (Some(_), Some(_)) => {
                "SELECT f.id, f.project_id, f.session_id, f.kind, f.title, f.body, f.source_file, f.source_mtime, f.tags, f.domain,
                        f.heat, f.last_accessed_at, f.access_count, f.created_at, f.updated_at, f.deleted_at, v.embedding
                 FROM fact_vectors v JOIN facts f ON f.id = v.fact_id
                 WHERE f.project_id = ?1 AND f.kind = ?2 AND f.deleted_at IS NULL"
            }
            (Some(_), None) => {
                "SELECT f.id, f.project_id, f.session_id, f.kind, f.title, f.body, f.source_file, f.source_mtime, f.tags, f.domain,
                        f.heat, f.last_accessed_at, f.access_count, f.created_at, f.updated_at, f.deleted_at, v.embedding
                 FROM fact_vectors v JOIN facts f ON f.id = v.fact_id
                 WHERE f.project_id = ?1 AND f.deleted_at IS NULL"
            }
            (None, Some(_)) => {
                "SELECT f.id, f.project_id, f.session_id, f.kind, f.title, f.body, f.source_file, f.source_mtime, f.tags, f.domain,
                        f.heat, f.last_accessed_at, f.access_count, f.created_at, f.updated_at, f.deleted_at, v.embedding
                 FROM fact_vectors v JOIN facts f ON f.id = v.fact_id
                 WHERE f.kind = ?1 AND f.deleted_at IS NULL"
            }
            (None, None) => {
                "SELECT f.id, f.project_id, f.session_id, f.kind, f.title, f.body, f.source_file, f.source_mtime, f.tags, f.domain,
                        f.heat, f.last_accessed_at, f.access_count, f.created_at, f.updated_at, f.deleted_at, v.embedding
                 FROM fact_vectors v JOIN facts f ON f.id = v.fact_id
                 WHERE f.deleted_at IS NULL"
            }
        };
        let mut stmt = self.conn.prepare(sql)?;
        let map = |row: &rusqlite::Row| -> rusqlite::Result<FactWithVector> {
            let fact = row_to_fact(row)?;
            let blob: Vec<u8> = row.get(16)?;
            Ok(FactWithVector {
                fact,
                embedding: unpack(&blob),
            })
        };
        let rows = match (project_id, kind) {
            (Some(p), Some(k)) => stmt.query_map(rusqlite::params![p, k], map)?,
            (Some(p), None) => stmt.query_map(rusqlite::params![p], map)?,
            (None, Some(k)) => stmt.query_map(rusqlite::params![k], map)?,
            (None, None) => stmt.query_map([], map)?,
        };
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    // ================= Indexed files / chunks =================

    pub fn indexed_file_mtimes(&self, project_id: &str) -> Result<Vec<(String, i64, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT rel_path, mtime, id FROM indexed_files WHERE project_id = ?1",
        )?;
        let rows = stmt.query_map([project_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?, r.get::<_, String>(2)?))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Replace the chunk set for one `(project, rel_path)` atomically:
    /// delete the old `IndexedFile` (cascades to `chunks`/`chunk_vectors`)
    /// and insert the new file row and chunks in the same transaction.
    pub fn replace_file_chunks(
        &mut self,
        file: &IndexedFile,
        chunks: &[Chunk],
        embeddings: &[Option<Vec<f32>>],
        actor: &str,
    ) -> Result<()> {
        self.mutate("replace_file_chunks", actor, |tx, ctx| {
            tx.execute(
                "DELETE FROM indexed_files WHERE project_id = ?1 AND rel_path = ?2",
                rusqlite::params![file.project_id, file.rel_path],
            )?;
            tx.execute(
                "INSERT INTO indexed_files (id, project_id, rel_path, mtime, size, chunk_count, indexed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![file.id, file.project_id, file.rel_path, file.mtime, file.size, chunks.len() as i64, file.indexed_at],
            )?;
            for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
                tx.execute(
                    "INSERT INTO chunks (id, project_id, file_id, rel_path, chunk_index, heading, text, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![chunk.id, chunk.project_id, chunk.file_id, chunk.rel_path, chunk.chunk_index, chunk.heading, chunk.text, chunk.created_at],
                )?;
                if let Some(vec) = embedding {
                    tx.execute(
                        "INSERT OR REPLACE INTO chunk_vectors (chunk_id, embedding, dimensions, created_at)
                         VALUES (?1, ?2, ?3, ?4)",
                        rusqlite::params![chunk.id, pack(vec), vec.len() as i64, chunk.created_at],
                    )?;
                }
            }
            ctx.record_event("indexed_file", &file.id, EventType::FileIndexed);
            Ok(())
        })
    }

    pub fn delete_indexed_file(&mut self, project_id: &str, rel_path: &str, actor: &str) -> Result<()> {
        self.mutate("delete_indexed_file", actor, |tx, ctx| {
            tx.execute(
                "DELETE FROM indexed_files WHERE project_id = ?1 AND rel_path = ?2",
                rusqlite::params![project_id, rel_path],
            )?;
            ctx.record_event("indexed_file", rel_path, EventType::FileDeindexed);
            Ok(())
        })
    }

    pub fn search_chunks_fts(
        &self,
        fts_query: &str,
        project_id: Option<&str>,
        limit: usize,
    ) -> rusqlite::Result<Vec<RankedChunk>> {
        let sql = if project_id.is_some() {
            "SELECT c.id, c.project_id, c.file_id, c.rel_path, c.chunk_index, c.heading, c.text, c.created_at
             FROM chunks_fts JOIN chunks c ON c.rowid = chunks_fts.rowid
             WHERE chunks_fts MATCH ?1 AND c.project_id = ?2
             ORDER BY rank LIMIT ?3"
        } else {
            "SELECT c.id, c.project_id, c.file_id, c.rel_path, c.chunk_index, c.heading, c.text, c.created_at
             FROM chunks_fts JOIN chunks c ON c.rowid = chunks_fts.rowid
             WHERE chunks_fts MATCH ?1
             ORDER BY rank LIMIT ?2"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = if let Some(p) = project_id {
            stmt.query_map(rusqlite::params![fts_query, p, limit as i64], row_to_chunk)?
        } else {
            stmt.query_map(rusqlite::params![fts_query, limit as i64], row_to_chunk)?
        };
        let chunks = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chunks
            .into_iter()
            .enumerate()
            .map(|(position, chunk)| RankedChunk { chunk, position })
            .collect())
    }

    pub fn search_chunks_substring(&self, needle: &str, project_id: Option<&str>, limit: usize) -> Result<Vec<Chunk>> {
        let like = format!("%{}%", needle.replace('%', "").replace('_', ""));
        let sql = if project_id.is_some() {
            "SELECT id, project_id, file_id, rel_path, chunk_index, heading, text, created_at
             FROM chunks WHERE (text LIKE ?1 OR heading LIKE ?1) AND project_id = ?2
             ORDER BY id DESC LIMIT ?3"
        } else {
            "SELECT id, project_id, file_id, rel_path, chunk_index, heading, text, created_at
             FROM chunks WHERE (text LIKE ?1 OR heading LIKE ?1)
             ORDER BY id DESC LIMIT ?2"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = if let Some(p) = project_id {
            stmt.query_map(rusqlite::params![like, p, limit as i64], row_to_chunk)?
        } else {
            stmt.query_map(rusqlite::params![like, limit as i64], row_to_chunk)?
        };
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    pub fn top_chunks_by_id(&self, project_id: Option<&str>, limit: usize) -> Result<Vec<Chunk>> {
        let sql = if project_id.is_some() {
            "SELECT id, project_id, file_id, rel_path, chunk_index, heading, text, created_at
             FROM chunks WHERE project_id = ?1 ORDER BY rowid DESC LIMIT ?2"
        } else {
            "SELECT id, project_id, file_id, rel_path, chunk_index, heading, text, created_at
             FROM chunks ORDER BY rowid DESC LIMIT ?1"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = if let Some(p) = project_id {
            stmt.query_map(rusqlite::params![p, limit as i64], row_to_chunk)?
        } else {
            stmt.query_map(rusqlite::params![limit as i64], row_to_chunk)?
        };
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    pub fn chunks_with_vectors(&self, project_id: Option<&str>) -> Result<Vec<ChunkWithVector>> {
        let sql = if project_id.is_some() {
            "SELECT c.id, c.project_id, c.file_id, c.rel_path, c.chunk_index, c.heading, c.text, c.created_at, v.embedding
             FROM chunk_vectors v JOIN chunks c ON c.id = v.chunk_id WHERE c.project_id = ?1"
        } else {
            "SELECT c.id, c.project_id, c.file_id, c.rel_path, c.chunk_index, c.heading, c.text, c.created_at, v.embedding
             FROM chunk_vectors v JOIN chunks c ON c.id = v.chunk_id"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let map = |row: &rusqlite::Row| -> rusqlite::Result<ChunkWithVector> {
            let chunk = row_to_chunk(row)?;
            let blob: Vec<u8> = row.get(8)?;
            Ok(ChunkWithVector {
                chunk,
                embedding: unpack(&blob),
            })
        };
        let rows = if let Some(p) = project_id {
            stmt.query_map([p], map)?
        } else {
            stmt.query_map([], map)?
        };
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    // ================= Decisions / changes =================

    pub fn create_decision(&mut self, decision: &Decision, actor: &str) -> Result<()> {
        self.mutate("create_decision", actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO decisions (id, project_id, session_id, summary, rationale, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![decision.id, decision.project_id, decision.session_id, decision.summary, decision.rationale, decision.created_at],
            )?;
            ctx.record_event("decision", &decision.id, EventType::DecisionLogged);
            Ok(())
        })
    }

    pub fn list_decisions(&self, project_id: &str, limit: usize) -> Result<Vec<Decision>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, session_id, summary, rationale, created_at
             FROM decisions WHERE project_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![project_id, limit as i64], row_to_decision)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    pub fn search_decisions(&self, project_id: &str, needle: &str, limit: usize) -> Result<Vec<Decision>> {
        let like = format!("%{}%", needle.replace('%', "").replace('_', ""));
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, session_id, summary, rationale, created_at
             FROM decisions WHERE project_id = ?1 AND (summary LIKE ?2 OR rationale LIKE ?2)
             ORDER BY created_at DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map(rusqlite::params![project_id, like, limit as i64], row_to_decision)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Append a `Change` row for the `file_change` hook. Bounded by a
    /// single insert+commit — callers are expected to swallow any
    /// error rather than retry (§4.5 `file_change`).
    pub fn append_change(
        &mut self,
        project_id: &str,
        session_id: &str,
        rel_path: &str,
        action: ChangeAction,
        actor: &str,
    ) -> Result<()> {
        self.mutate("append_change", actor, |tx, _ctx| {
            tx.execute(
                "INSERT INTO changed_files (project_id, session_id, rel_path, action, changed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![project_id, session_id, rel_path, action.as_str(), chrono::Utc::now().timestamp_millis()],
            )?;
            Ok(())
        })
    }

    pub fn list_changes_for_session(&self, session_id: &str, limit: usize) -> Result<Vec<Change>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, session_id, rel_path, action, changed_at
             FROM changed_files WHERE session_id = ?1 ORDER BY changed_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![session_id, limit as i64], row_to_change)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Distinct changed files for a session, most-recently-touched first,
    /// paired with the action of their most recent change (§4.5 `session_end`:
    /// "up to 10 distinct changed files with action").
    pub fn distinct_changed_files_for_session(&self, session_id: &str, limit: usize) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT cf.rel_path, cf.action FROM changed_files cf
             WHERE cf.session_id = ?1 AND cf.changed_at = (
                 SELECT MAX(changed_at) FROM changed_files
                 WHERE session_id = cf.session_id AND rel_path = cf.rel_path
             )
             GROUP BY cf.rel_path ORDER BY cf.changed_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![session_id, limit as i64], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    // ================= Identity =================

    pub fn get_identity(&self, project_id: &str) -> Result<Option<Identity>> {
        self.conn
            .query_row(
                "SELECT fields_json, safety_locked, lock_hash FROM identity WHERE project_id = ?1",
                [project_id],
                |row| {
                    let fields_json: String = row.get(0)?;
                    let safety_locked: bool = row.get(1)?;
                    let lock_hash: Option<String> = row.get(2)?;
                    Ok((fields_json, safety_locked, lock_hash))
                },
            )
            .optional()?
            .map(|(fields_json, safety_locked, lock_hash)| {
                let mut identity: Identity = serde_json::from_str(&fields_json)?;
                identity.safety_locked = safety_locked;
                identity.lock_hash = lock_hash;
                Ok(identity)
            })
            .transpose()
    }

    pub fn upsert_identity(&mut self, project_id: &str, identity: &Identity, actor: &str) -> Result<()> {
        let fields_json = serde_json::to_string(identity)?;
        let now = chrono::Utc::now().timestamp_millis();
        self.mutate("upsert_identity", actor, |tx, ctx| {
            let exists: bool = tx
                .query_row("SELECT 1 FROM identity WHERE project_id = ?1", [project_id], |_| Ok(true))
                .optional()?
                .unwrap_or(false);
            if exists {
                tx.execute(
                    "UPDATE identity SET fields_json = ?1, safety_locked = ?2, lock_hash = ?3, updated_at = ?4 WHERE project_id = ?5",
                    rusqlite::params![fields_json, identity.safety_locked, identity.lock_hash, now, project_id],
                )?;
            } else {
                tx.execute(
                    "INSERT INTO identity (project_id, fields_json, safety_locked, lock_hash, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                    rusqlite::params![project_id, fields_json, identity.safety_locked, identity.lock_hash, now],
                )?;
            }
            ctx.record_event("identity", project_id, EventType::IdentitySet);
            Ok(())
        })
    }
}

fn insert_fact_tx(tx: &Transaction, fact: &Fact) -> Result<()> {
    tx.execute(
        "INSERT INTO facts (id, project_id, session_id, kind, title, body, source_file, source_mtime, tags, domain, heat, last_accessed_at, access_count, created_at, updated_at, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        rusqlite::params![
            fact.id, fact.project_id, fact.session_id, fact.kind, fact.title, fact.body,
            fact.source_file, fact.source_mtime, fact.tags, fact.domain, fact.heat, fact.last_accessed_at,
            fact.access_count, fact.created_at, fact.updated_at, fact.deleted_at
        ],
    )?;
    Ok(())
}

fn row_to_project(row: &rusqlite::Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        project_path: row.get(1)?,
        name: row.get(2)?,
        dna_content: row.get(3)?,
        dna_generated_at: row.get(4)?,
        last_session_id: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        project_id: row.get(1)?,
        project_path: row.get(2)?,
        status: row.get(3)?,
        terminal_key: row.get(4)?,
        bridge_text: row.get(5)?,
        crashed: row.get(6)?,
        started_at: row.get(7)?,
        ended_at: row.get(8)?,
        last_heartbeat_at: row.get(9)?,
    })
}

fn row_to_fact(row: &rusqlite::Row) -> rusqlite::Result<Fact> {
    Ok(Fact {
        id: row.get(0)?,
        project_id: row.get(1)?,
        session_id: row.get(2)?,
        kind: row.get(3)?,
        title: row.get(4)?,
        body: row.get(5)?,
        source_file: row.get(6)?,
        source_mtime: row.get(7)?,
        tags: row.get(8)?,
        domain: row.get(9)?,
        heat: row.get(10)?,
        last_accessed_at: row.get(11)?,
        access_count: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
        deleted_at: row.get(15)?,
    })
}

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        id: row.get(0)?,
        project_id: row.get(1)?,
        file_id: row.get(2)?,
        rel_path: row.get(3)?,
        chunk_index: row.get(4)?,
        heading: row.get(5)?,
        text: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn row_to_decision(row: &rusqlite::Row) -> rusqlite::Result<Decision> {
    Ok(Decision {
        id: row.get(0)?,
        project_id: row.get(1)?,
        session_id: row.get(2)?,
        summary: row.get(3)?,
        rationale: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn row_to_change(row: &rusqlite::Row) -> rusqlite::Result<Change> {
    Ok(Change {
        id: row.get(0)?,
        project_id: row.get(1)?,
        session_id: row.get(2)?,
        rel_path: row.get(3)?,
        action: row.get(4)?,
        changed_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fact::HEAT_CEILING;

    fn setup() -> SqliteStorage {
        SqliteStorage::open_memory().unwrap()
    }

    #[test]
    fn test_get_or_create_project_is_idempotent() {
        let mut s = setup();
        let a = s.get_or_create_project("/tmp/proj", None, "tester").unwrap();
        let b = s.get_or_create_project("/tmp/proj", None, "tester").unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_fact_dedup_lookup_by_source() {
        let mut s = setup();
        let project = s.get_or_create_project("/tmp/proj", None, "tester").unwrap();
        let fact = Fact::new(project.id.clone(), None, "command".into(), "t".into(), "Use pnpm".into(), Some("README.md".into()), Some(100), None, None);
        s.insert_fact(&fact, "tester").unwrap();

        let found = s.find_fact_by_source(&project.id, "README.md", "command").unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().id, fact.id);
    }

    #[test]
    fn test_delete_facts_soft_deletes() {
        let mut s = setup();
        let project = s.get_or_create_project("/tmp/proj", None, "tester").unwrap();
        let fact = Fact::new(project.id.clone(), None, "fact".into(), "t".into(), "b".into(), None, None, None, None);
        s.insert_fact(&fact, "tester").unwrap();

        let deleted = s.delete_facts(&[fact.id.clone()], "tester").unwrap();
        assert_eq!(deleted, 1);
        assert!(s.get_fact(&fact.id).unwrap().is_none());
    }

    #[test]
    fn test_search_facts_fts_finds_match() {
        let mut s = setup();
        let project = s.get_or_create_project("/tmp/proj", None, "tester").unwrap();
        let fact = Fact::new(project.id.clone(), None, "command".into(), "pm".into(), "Use pnpm for this repo".into(), None, None, None, None);
        s.insert_fact(&fact, "tester").unwrap();

        let hits = s.search_facts_fts("pnpm", Some(&project.id), None, 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].fact.id, fact.id);
        assert_eq!(hits[0].position, 0);
    }

    #[test]
    fn test_crash_recovery_query_respects_grace_window() {
        let mut s = setup();
        let project = s.get_or_create_project("/tmp/proj", None, "tester").unwrap();
        let mut session = Session::new(project.id.clone(), "/tmp/proj".into(), None);
        session.started_at = 1_000_000;
        s.create_session(&session, "tester").unwrap();

        // younger than 60s grace from "now" => not recoverable
        let none = s.find_recoverable_open_session(&project.id, 1_000_000 + 30_000, 60_000).unwrap();
        assert!(none.is_none());

        // older than 60s grace => recoverable
        let found = s.find_recoverable_open_session(&project.id, 1_000_000 + 61_000, 60_000).unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().id, session.id);
    }

    #[test]
    fn test_heat_decay_skips_sub_threshold_delta() {
        let mut s = setup();
        let project = s.get_or_create_project("/tmp/proj", None, "tester").unwrap();
        let mut fact = Fact::new(project.id.clone(), None, "fact".into(), "t".into(), "b".into(), None, None, None, None);
        fact.heat = HEAT_CEILING;
        fact.last_accessed_at = Some(0);
        s.insert_fact(&fact, "tester").unwrap();

        // Age <= 1 day: factor 1.0, zero delta, must be skipped.
        let updated = s.apply_heat_decay(&[fact.clone()], 60_000, "tester").unwrap();
        assert_eq!(updated, 0);
    }

    #[test]
    fn test_identity_roundtrip() {
        let mut s = setup();
        let project = s.get_or_create_project("/tmp/proj", None, "tester").unwrap();
        let mut identity = Identity::default();
        identity.set("framework", "Next.js");
        s.upsert_identity(&project.id, &identity, "tester").unwrap();

        let fetched = s.get_identity(&project.id).unwrap().unwrap();
        assert_eq!(fetched.get("framework"), Some("Next.js"));
    }

    #[test]
    fn test_append_change_persists_action() {
        let mut s = setup();
        let project = s.get_or_create_project("/tmp/proj", None, "tester").unwrap();
        let session = crate::model::Session::new(project.id.clone(), "/tmp/proj".to_string(), None);
        s.create_session(&session, "tester").unwrap();

        s.append_change(&project.id, &session.id, "a.rs", ChangeAction::Create, "tester").unwrap();
        s.append_change(&project.id, &session.id, "b.rs", ChangeAction::Edit, "tester").unwrap();

        let changes = s.list_changes_for_session(&session.id, 10).unwrap();
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().any(|c| c.rel_path == "a.rs" && c.action == "create"));
        assert!(changes.iter().any(|c| c.rel_path == "b.rs" && c.action == "edit"));
    }

    #[test]
    fn test_distinct_changed_files_returns_latest_action_per_path() {
        let mut s = setup();
        let project = s.get_or_create_project("/tmp/proj", None, "tester").unwrap();
        let session = crate::model::Session::new(project.id.clone(), "/tmp/proj".to_string(), None);
        s.create_session(&session, "tester").unwrap();

        s.append_change(&project.id, &session.id, "a.rs", ChangeAction::Create, "tester").unwrap();
        s.conn()
            .execute("UPDATE changed_files SET changed_at = changed_at - 1000 WHERE rel_path = 'a.rs'", [])
            .unwrap();
        s.append_change(&project.id, &session.id, "a.rs", ChangeAction::Edit, "tester").unwrap();

        let files = s.distinct_changed_files_for_session(&session.id, 10).unwrap();
        assert_eq!(files, vec![("a.rs".to_string(), "edit".to_string())]);
    }
}
