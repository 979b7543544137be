//! Chunk and indexed-file models — the Indexer's view of on-disk content.

use serde::{Deserialize, Serialize};

/// A tracked project file, one row per `(project, rel_path)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedFile {
    pub id: String,
    pub project_id: String,
    pub rel_path: String,
    pub mtime: i64,
    pub size: i64,
    pub chunk_count: i32,
    pub indexed_at: i64,
}

impl IndexedFile {
    #[must_use]
    pub fn new(project_id: String, rel_path: String, mtime: i64, size: i64) -> Self {
        Self {
            id: format!("file_{}", &uuid::Uuid::new_v4().to_string()[..12]),
            project_id,
            rel_path,
            mtime,
            size,
            chunk_count: 0,
            indexed_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// A chunk of a single file's content, ready for retrieval.
///
/// All chunks belonging to one `(project_id, rel_path)` share one
/// `file_mtime`; a reindex replaces the whole set atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub project_id: String,
    pub file_id: String,
    pub rel_path: String,
    pub chunk_index: i32,
    pub heading: Option<String>,
    pub text: String,
    pub created_at: i64,
}

/// Chunks are truncated to this many bytes after emission (§4.3).
pub const CHUNK_BYTE_CAP: usize = 2000;

impl Chunk {
    #[must_use]
    pub fn new(
        project_id: String,
        file_id: String,
        rel_path: String,
        chunk_index: i32,
        heading: Option<String>,
        text: String,
    ) -> Self {
        let mut text = text;
        if text.len() > CHUNK_BYTE_CAP {
            let mut end = CHUNK_BYTE_CAP;
            while end > 0 && !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
        }

        Self {
            id: format!("chunk_{}", &uuid::Uuid::new_v4().to_string()[..12]),
            project_id,
            file_id,
            rel_path,
            chunk_index,
            heading,
            text,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_truncated_to_cap() {
        let text = "x".repeat(5000);
        let c = Chunk::new("p".into(), "f".into(), "a.md".into(), 0, None, text);
        assert!(c.text.len() <= CHUNK_BYTE_CAP);
    }

    #[test]
    fn test_chunk_under_cap_unchanged() {
        let c = Chunk::new("p".into(), "f".into(), "a.md".into(), 0, None, "short".into());
        assert_eq!(c.text, "short");
    }
}
