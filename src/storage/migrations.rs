//! Schema application entry point.
//!
//! The store carries a single embedded schema (see [`super::schema`])
//! rather than a migration chain — there is exactly one schema version
//! to reach. `run_migrations` exists as the stable call site so future
//! schema changes have somewhere to grow into without touching callers.

use rusqlite::{Connection, Result};
use tracing::info;

use super::schema::apply_schema;

/// Bring `conn`'s schema up to date. Safe to call on every database open.
///
/// # Errors
///
/// Returns an error if schema application fails.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    info!("applying schema");
    apply_schema(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).expect("first run should succeed");
        run_migrations(&conn).expect("second run should succeed (idempotent)");
    }
}
