//! Status cache reader for session resolution.
//!
//! Binds a session ID to the calling terminal so the CLI, and any hook
//! invoked from inside that terminal, agree on "the current session"
//! without the caller having to pass `--session` every time.
//!
//! # TTY resolution strategy
//!
//! 1. `MEM_STATUS_KEY` env var (explicit override)
//! 2. Parent process TTY via `ps -o tty= -p $PPID`, walking ancestors
//! 3. `TERM_SESSION_ID` env var (macOS Terminal.app)
//! 4. `ITERM_SESSION_ID` env var (iTerm2)
//! 5. None if no key available

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Cache TTL: 2 hours.
const CACHE_TTL_MS: u64 = 2 * 60 * 60 * 1000;

/// Status cache entry bound to a terminal.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCacheEntry {
    pub session_id: String,
    pub project_path: String,
    pub timestamp: u64,
    pub session_status: Option<String>,
}

/// Status cache directory path.
fn cache_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".coderecall").join("status-cache"))
}

/// Sanitize a key for use as a filename.
fn sanitize_key(key: &str) -> Option<String> {
    let sanitized: String = key
        .trim()
        .chars()
        .map(|c| {
            if c == '/'
                || c == '\\'
                || c == ':'
                || c == '*'
                || c == '?'
                || c == '"'
                || c == '<'
                || c == '>'
                || c == '|'
                || c.is_whitespace()
            {
                '_'
            } else {
                c
            }
        })
        .take(100)
        .collect();

    if sanitized.is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

/// Walk the process tree to find the controlling terminal.
///
/// Agent-spawned processes (e.g. an AI coding agent → shell → `mem`)
/// often have no TTY ("??") on themselves or their immediate parent.
/// The real terminal is held by the agent process further up the tree.
/// Walk up to 5 ancestors to find it.
fn find_tty_from_ancestors() -> Option<String> {
    let mut current_pid = std::process::id().to_string();

    for _ in 0..5 {
        if let Ok(output) = Command::new("ps")
            .args(["-o", "tty=", "-p", &current_pid])
            .output()
        {
            if output.status.success() {
                let tty = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !tty.is_empty() && tty != "?" && tty != "??" {
                    return Some(tty);
                }
            }
        }

        let Ok(output) = Command::new("ps")
            .args(["-o", "ppid=", "-p", &current_pid])
            .output()
        else {
            break;
        };

        if !output.status.success() {
            break;
        }

        let ppid = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if ppid.is_empty() || ppid == "0" || ppid == "1" || ppid == current_pid {
            break;
        }
        current_pid = ppid;
    }

    None
}

/// Get the status key for this terminal.
#[must_use]
pub fn get_status_key() -> Option<String> {
    if let Ok(key) = std::env::var("MEM_STATUS_KEY") {
        if !key.is_empty() {
            return sanitize_key(&key);
        }
    }

    if let Some(tty) = find_tty_from_ancestors() {
        return sanitize_key(&format!("tty-{tty}"));
    }

    if let Ok(term_id) = std::env::var("TERM_SESSION_ID") {
        if !term_id.is_empty() {
            return sanitize_key(&format!("term-{term_id}"));
        }
    }

    if let Ok(iterm_id) = std::env::var("ITERM_SESSION_ID") {
        if !iterm_id.is_empty() {
            return sanitize_key(&format!("iterm-{iterm_id}"));
        }
    }

    None
}

/// Read the status cache entry for this terminal.
///
/// Returns `None` if no key can be determined, the cache file is
/// missing, stale (older than 2 hours), or corrupted.
#[must_use]
pub fn read_status_cache() -> Option<StatusCacheEntry> {
    let key = get_status_key()?;
    let cache_path = cache_dir()?.join(format!("{key}.json"));

    if !cache_path.exists() {
        return None;
    }

    let content = fs::read_to_string(&cache_path).ok()?;
    let entry: StatusCacheEntry = serde_json::from_str(&content).ok()?;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64;

    if now.saturating_sub(entry.timestamp) > CACHE_TTL_MS {
        let _ = fs::remove_file(&cache_path);
        return None;
    }

    Some(entry)
}

/// Get the current session ID bound to this terminal.
#[must_use]
pub fn current_session_id() -> Option<String> {
    read_status_cache().map(|e| e.session_id)
}

/// Write a status cache entry for this terminal.
///
/// Writes to a temp file then renames atomically, so a concurrent
/// reader never observes a partial write.
#[must_use]
pub fn write_status_cache(entry: &StatusCacheEntry) -> bool {
    let Some(key) = get_status_key() else {
        return false;
    };

    let Some(dir) = cache_dir() else {
        return false;
    };

    if fs::create_dir_all(&dir).is_err() {
        return false;
    }

    let file_path = dir.join(format!("{key}.json"));
    let temp_path = dir.join(format!("{key}.json.tmp"));

    let Ok(json) = serde_json::to_string_pretty(entry) else {
        return false;
    };

    let result = (|| -> std::io::Result<()> {
        {
            let mut opts = fs::OpenOptions::new();
            opts.write(true).create(true).truncate(true);
            #[cfg(unix)]
            opts.mode(0o600);
            let mut file = opts.open(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.flush()?;
        }
        fs::rename(&temp_path, &file_path)?;
        Ok(())
    })();

    result.is_ok()
}

/// Clear the status cache for this terminal.
///
/// Called on `session_end` to unbind the terminal from the session.
#[must_use]
pub fn clear_status_cache() -> bool {
    let Some(key) = get_status_key() else {
        return false;
    };

    let Some(dir) = cache_dir() else {
        return false;
    };

    let file_path = dir.join(format!("{key}.json"));

    if file_path.exists() {
        fs::remove_file(&file_path).is_ok()
    } else {
        true
    }
}

/// Build a `StatusCacheEntry` and write it to the cache in one step.
#[must_use]
pub fn bind_session_to_terminal(session_id: &str, project_path: &str, status: &str) -> bool {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64;

    let entry = StatusCacheEntry {
        session_id: session_id.to_string(),
        project_path: project_path.to_string(),
        timestamp: now,
        session_status: Some(status.to_string()),
    };

    write_status_cache(&entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("simple"), Some("simple".to_string()));
        assert_eq!(sanitize_key("with/slash"), Some("with_slash".to_string()));
        assert_eq!(sanitize_key("with spaces"), Some("with_spaces".to_string()));
        assert_eq!(sanitize_key(""), None);
        assert_eq!(sanitize_key("   "), None);
    }

    #[test]
    fn test_cache_dir() {
        let dir = cache_dir();
        assert!(dir.is_some());
        assert!(dir.unwrap().ends_with("status-cache"));
    }
}
