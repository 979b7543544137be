//! Database schema for the memory store.
//!
//! One embedded SQL string, applied idempotently via `CREATE TABLE IF NOT
//! EXISTS` / `CREATE INDEX IF NOT EXISTS`, tracked in `schema_migrations`
//! so `apply_schema` is safe to call on every open.
//!
//! FTS5 external-content tables mirror `facts` and `chunks` for lexical
//! search; sync triggers keep them current. Vector columns are plain
//! BLOBs (packed little-endian f32) rather than a `vec0` virtual table —
//! `vec0` is not guaranteed to ship with the bundled SQLite build, so the
//! vector index is brute-force over these BLOBs, gated by a capability
//! probe (see `storage::sqlite::ensure_vector`).

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the memory store.
///
/// Timestamps are stored as INTEGER Unix milliseconds throughout.
pub const SCHEMA_SQL: &str = r#"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- Projects
-- ====================

CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    project_path TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    dna_content TEXT,
    dna_generated_at INTEGER,
    last_session_id TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_projects_path ON projects(project_path);

-- ====================
-- Sessions
-- ====================

-- status: 'open' | 'closed'
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    project_path TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'open',
    terminal_key TEXT,
    bridge_text TEXT,
    crashed INTEGER NOT NULL DEFAULT 0,
    started_at INTEGER NOT NULL,
    ended_at INTEGER,
    last_heartbeat_at INTEGER NOT NULL,
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project_id);
CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
CREATE INDEX IF NOT EXISTS idx_sessions_project_status ON sessions(project_id, status);
CREATE INDEX IF NOT EXISTS idx_sessions_terminal ON sessions(terminal_key);

-- ====================
-- Facts: the durable memory unit
-- ====================

-- kind is one of the 14 closed fact kinds enforced at the application
-- layer (see validate::FACT_KINDS); no CHECK constraint so the
-- rejection path can return a rich "did you mean" hint.
CREATE TABLE IF NOT EXISTS facts (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    session_id TEXT,
    kind TEXT NOT NULL,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    source_file TEXT,
    source_mtime INTEGER,
    tags TEXT,
    domain TEXT,
    heat REAL NOT NULL DEFAULT 1.0,
    last_accessed_at INTEGER,
    access_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    deleted_at INTEGER,
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_facts_project ON facts(project_id);
CREATE INDEX IF NOT EXISTS idx_facts_kind ON facts(kind);
CREATE INDEX IF NOT EXISTS idx_facts_project_kind ON facts(project_id, kind);
CREATE INDEX IF NOT EXISTS idx_facts_heat ON facts(project_id, heat DESC);
CREATE INDEX IF NOT EXISTS idx_facts_source_file ON facts(source_file);
CREATE INDEX IF NOT EXISTS idx_facts_deleted ON facts(deleted_at);

-- Vector embeddings for facts. Rowid-aligned 1:1 with `facts` via
-- fact_id; kept in its own table so a missing embedding (provider
-- unavailable) never blocks a fact write.
CREATE TABLE IF NOT EXISTS fact_vectors (
    fact_id TEXT PRIMARY KEY,
    embedding BLOB NOT NULL,
    dimensions INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (fact_id) REFERENCES facts(id) ON DELETE CASCADE
);

-- FTS5 external-content index over facts (title + body + tags + domain,
-- per the lexical index's coverage of "Fact content/tags/domain").
CREATE VIRTUAL TABLE IF NOT EXISTS facts_fts USING fts5(
    title,
    body,
    tags,
    domain,
    content='facts',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS facts_fts_insert AFTER INSERT ON facts BEGIN
    INSERT INTO facts_fts(rowid, title, body, tags, domain) VALUES (new.rowid, new.title, new.body, new.tags, new.domain);
END;

CREATE TRIGGER IF NOT EXISTS facts_fts_delete AFTER DELETE ON facts BEGIN
    INSERT INTO facts_fts(facts_fts, rowid, title, body, tags, domain) VALUES ('delete', old.rowid, old.title, old.body, old.tags, old.domain);
END;

CREATE TRIGGER IF NOT EXISTS facts_fts_update AFTER UPDATE ON facts BEGIN
    INSERT INTO facts_fts(facts_fts, rowid, title, body, tags, domain) VALUES ('delete', old.rowid, old.title, old.body, old.tags, old.domain);
    INSERT INTO facts_fts(rowid, title, body, tags, domain) VALUES (new.rowid, new.title, new.body, new.tags, new.domain);
END;

-- ====================
-- File index: scanned project files, chunked
-- ====================

CREATE TABLE IF NOT EXISTS indexed_files (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    rel_path TEXT NOT NULL,
    mtime INTEGER NOT NULL,
    size INTEGER NOT NULL,
    chunk_count INTEGER NOT NULL DEFAULT 0,
    indexed_at INTEGER NOT NULL,
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
    UNIQUE(project_id, rel_path)
);

CREATE INDEX IF NOT EXISTS idx_indexed_files_project ON indexed_files(project_id);

CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    file_id TEXT NOT NULL,
    rel_path TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    heading TEXT,
    text TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
    FOREIGN KEY (file_id) REFERENCES indexed_files(id) ON DELETE CASCADE,
    UNIQUE(file_id, chunk_index)
);

CREATE INDEX IF NOT EXISTS idx_chunks_project ON chunks(project_id);
CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file_id);

CREATE TABLE IF NOT EXISTS chunk_vectors (
    chunk_id TEXT PRIMARY KEY,
    embedding BLOB NOT NULL,
    dimensions INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (chunk_id) REFERENCES chunks(id) ON DELETE CASCADE
);

CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    heading,
    text,
    content='chunks',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS chunks_fts_insert AFTER INSERT ON chunks BEGIN
    INSERT INTO chunks_fts(rowid, heading, text) VALUES (new.rowid, new.heading, new.text);
END;

CREATE TRIGGER IF NOT EXISTS chunks_fts_delete AFTER DELETE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, heading, text) VALUES ('delete', old.rowid, old.heading, old.text);
END;

CREATE TRIGGER IF NOT EXISTS chunks_fts_update AFTER UPDATE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, heading, text) VALUES ('delete', old.rowid, old.heading, old.text);
    INSERT INTO chunks_fts(rowid, heading, text) VALUES (new.rowid, new.heading, new.text);
END;

-- ====================
-- Decisions and changes (session_bridge / decision_log material)
-- ====================

CREATE TABLE IF NOT EXISTS decisions (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    session_id TEXT,
    summary TEXT NOT NULL,
    rationale TEXT,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_decisions_project ON decisions(project_id, created_at DESC);

CREATE TABLE IF NOT EXISTS changed_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id TEXT NOT NULL,
    session_id TEXT NOT NULL,
    rel_path TEXT NOT NULL,
    action TEXT NOT NULL DEFAULT 'edit',
    changed_at INTEGER NOT NULL,
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_changed_files_session ON changed_files(session_id);

-- ====================
-- Identity: per-project safety + tech metadata card
-- ====================

CREATE TABLE IF NOT EXISTS identity (
    project_id TEXT PRIMARY KEY,
    fields_json TEXT NOT NULL DEFAULT '{}',
    safety_locked INTEGER NOT NULL DEFAULT 0,
    lock_hash TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
);

-- ====================
-- Audit log
-- ====================

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    actor TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT,
    comment TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS idx_events_created ON events(created_at DESC);
"#;

/// Apply the schema to `conn` and record it in `schema_migrations`.
///
/// Idempotent: safe to call on every database open.
///
/// # Errors
///
/// Returns an error if any DDL statement fails.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}_base_schema"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_schema_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("schema should apply to a fresh database");

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='facts'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_apply_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("first apply should succeed");
        apply_schema(&conn).expect("second apply should succeed");
    }

    #[test]
    fn test_fts5_triggers_stay_in_sync() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO projects (id, project_path, name, created_at, updated_at)
             VALUES ('proj_x', '/tmp/x', 'x', 0, 0)",
            [],
        )
        .unwrap();

        conn.execute(
            "INSERT INTO facts (id, project_id, kind, title, body, heat, created_at, updated_at)
             VALUES ('fact_1', 'proj_x', 'decision', 'use sqlite', 'because embedded is simpler', 1.0, 0, 0)",
            [],
        )
        .unwrap();

        let hits: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM facts_fts WHERE facts_fts MATCH 'sqlite'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);
    }
}
