//! Audit event storage and retrieval.
//!
//! Every mutation to a fact, session, identity field, or project goes
//! through here as an append-only row, independent of the mutated
//! table's own history.

use rusqlite::{Connection, Result};

/// Event types for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    ProjectCreated,
    ProjectUpdated,

    SessionStarted,
    SessionEnded,
    SessionCrashRecovered,

    FactWritten,
    FactDeleted,
    FactAccessed,

    FileIndexed,
    FileDeindexed,

    DecisionLogged,

    IdentitySet,
    IdentityVerified,
    IdentityBlocked,
}

impl EventType {
    /// String representation used for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectCreated => "project_created",
            Self::ProjectUpdated => "project_updated",
            Self::SessionStarted => "session_started",
            Self::SessionEnded => "session_ended",
            Self::SessionCrashRecovered => "session_crash_recovered",
            Self::FactWritten => "fact_written",
            Self::FactDeleted => "fact_deleted",
            Self::FactAccessed => "fact_accessed",
            Self::FileIndexed => "file_indexed",
            Self::FileDeindexed => "file_deindexed",
            Self::DecisionLogged => "decision_logged",
            Self::IdentitySet => "identity_set",
            Self::IdentityVerified => "identity_verified",
            Self::IdentityBlocked => "identity_blocked",
        }
    }
}

/// An audit event record.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub event_type: EventType,
    pub actor: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub comment: Option<String>,
    pub created_at: i64,
}

impl Event {
    /// Create a new event (id is assigned by the database on insert).
    #[must_use]
    pub fn new(entity_type: &str, entity_id: &str, event_type: EventType, actor: &str) -> Self {
        Self {
            id: 0,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            event_type,
            actor: actor.to_string(),
            old_value: None,
            new_value: None,
            comment: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    #[must_use]
    pub fn with_values(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_value = old;
        self.new_value = new;
        self
    }

    #[must_use]
    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }
}

/// Insert an event into the database.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_event(conn: &Connection, event: &Event) -> Result<i64> {
    conn.execute(
        "INSERT INTO events (entity_type, entity_id, event_type, actor, old_value, new_value, comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            event.entity_type,
            event.entity_id,
            event.event_type.as_str(),
            event.actor,
            event.old_value,
            event.new_value,
            event.comment,
            event.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Get events for an entity, newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_events(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
    limit: Option<u32>,
) -> Result<Vec<Event>> {
    let limit = limit.unwrap_or(100);
    let mut stmt = conn.prepare(
        "SELECT id, entity_type, entity_id, event_type, actor, old_value, new_value, comment, created_at
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY created_at DESC
         LIMIT ?3",
    )?;

    let rows = stmt.query_map(rusqlite::params![entity_type, entity_id, limit], |row| {
        Ok(Event {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            entity_id: row.get(2)?,
            event_type: parse_event_type(row.get::<_, String>(3)?.as_str()),
            actor: row.get(4)?,
            old_value: row.get(5)?,
            new_value: row.get(6)?,
            comment: row.get(7)?,
            created_at: row.get(8)?,
        })
    })?;

    rows.collect()
}

fn parse_event_type(s: &str) -> EventType {
    match s {
        "project_created" => EventType::ProjectCreated,
        "project_updated" => EventType::ProjectUpdated,
        "session_started" => EventType::SessionStarted,
        "session_ended" => EventType::SessionEnded,
        "session_crash_recovered" => EventType::SessionCrashRecovered,
        "fact_written" => EventType::FactWritten,
        "fact_deleted" => EventType::FactDeleted,
        "fact_accessed" => EventType::FactAccessed,
        "file_indexed" => EventType::FileIndexed,
        "file_deindexed" => EventType::FileDeindexed,
        "decision_logged" => EventType::DecisionLogged,
        "identity_set" => EventType::IdentitySet,
        "identity_verified" => EventType::IdentityVerified,
        "identity_blocked" => EventType::IdentityBlocked,
        _ => EventType::ProjectUpdated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::apply_schema;

    #[test]
    fn test_event_insert_and_get() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let event = Event::new("fact", "fact_123", EventType::FactWritten, "test-actor")
            .with_comment("initial write");

        let id = insert_event(&conn, &event).unwrap();
        assert!(id > 0);

        let events = get_events(&conn, "fact", "fact_123", Some(10)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].actor, "test-actor");
        assert_eq!(events[0].comment, Some("initial write".to_string()));
    }
}
