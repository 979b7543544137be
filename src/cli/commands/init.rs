//! Initialize the global memory store.
//!
//! # Architecture
//!
//! The store is a single database shared across every project on the
//! machine: `~/.coderecall/data/memory.db` (or `~/.coderecall/test/memory.db`
//! under `MEM_TEST_DB`). Projects are distinguished by their `project_path`
//! column, not by separate database files, so there is no per-project
//! directory to create — `mem init` is a one-time, machine-wide step.

use crate::config::{home_dir, is_test_mode};
use crate::error::{Error, Result};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

#[derive(Serialize)]
struct InitOutput {
    database: PathBuf,
}

/// Create the global database file if it doesn't already exist.
///
/// Schema is applied lazily the first time the database is opened
/// through [`crate::storage::SqliteStorage::open`], not here — `init`
/// only needs to stake out the file and its containing directory.
///
/// # Errors
///
/// Returns [`Error::AlreadyInitialized`] if the database exists and
/// `force` is not set, or an error if the directory/file cannot be
/// created.
pub fn execute(force: bool, json: bool) -> Result<()> {
    let base_dir = home_dir().ok_or_else(|| Error::Config("could not determine home directory".to_string()))?;

    let data_dir = if is_test_mode() { base_dir.join("test") } else { base_dir.join("data") };
    let db_path = data_dir.join("memory.db");

    if db_path.exists() && !force {
        return Err(Error::AlreadyInitialized { path: db_path });
    }

    fs::create_dir_all(&data_dir)?;
    if !db_path.exists() || force {
        fs::File::create(&db_path)?;
    }

    let gitignore_path = base_dir.join(".gitignore");
    if !gitignore_path.exists() {
        fs::write(&gitignore_path, "# Everything under ~/.coderecall is local-only\n*\n")?;
    }

    if json {
        let output = InitOutput { database: db_path };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Initialized memory store");
        println!("  Database: {}", db_path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serializes tests that set MEM_TEST_DB / rely on a shared home dir.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_init_creates_database_file() {
        let _lock = ENV_LOCK.lock().unwrap();
        std::env::set_var("MEM_TEST_DB", "1");

        let base_dir = home_dir().unwrap();
        let db_path = base_dir.join("test").join("memory.db");
        let _ = std::fs::remove_file(&db_path);

        assert!(execute(false, false).is_ok());
        assert!(db_path.exists());

        std::env::remove_var("MEM_TEST_DB");
    }

    #[test]
    fn test_init_fails_if_already_initialized_without_force() {
        let _lock = ENV_LOCK.lock().unwrap();
        std::env::set_var("MEM_TEST_DB", "1");

        let base_dir = home_dir().unwrap();
        let db_path = base_dir.join("test").join("memory.db");
        let _ = std::fs::remove_file(&db_path);

        assert!(execute(false, false).is_ok());
        let result = execute(false, false);
        assert!(matches!(result, Err(Error::AlreadyInitialized { .. })));

        std::env::remove_var("MEM_TEST_DB");
    }

    #[test]
    fn test_init_force_overwrites() {
        let _lock = ENV_LOCK.lock().unwrap();
        std::env::set_var("MEM_TEST_DB", "1");

        let base_dir = home_dir().unwrap();
        let db_path = base_dir.join("test").join("memory.db");
        let _ = std::fs::remove_file(&db_path);

        assert!(execute(false, false).is_ok());
        assert!(execute(true, false).is_ok());

        std::env::remove_var("MEM_TEST_DB");
    }
}
