//! Project file scanning and chunking.
//!
//! `scan_project_files` walks a project directory (skipping build
//! output, VCS metadata, and binary-ish files), and `reindex_project`
//! reconciles the scan against what's already in `indexed_files` /
//! `chunks`: new and changed files are re-chunked, vanished files are
//! removed, unchanged files (same mtime within 1s) are skipped.
//!
//! Chunking rules branch on file type:
//! - Markdown is split on H1/H2/H3 headings, each section further
//!   windowed if it's still too large.
//! - `package.json` is special-cased down to its identity fields
//!   (name, version, scripts, dependencies, devDependencies) — the
//!   rest of a lockfile-adjacent manifest is noise for retrieval.
//! - Other JSON/YAML/TOML is split on top-level keys.
//! - Everything else is windowed the same way oversized Markdown
//!   sections are.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::model::{Chunk, IndexedFile};

/// Files larger than this are skipped entirely rather than chunked.
pub const MAX_FILE_SIZE: u64 = 200_000;

/// Window size for splitting oversized sections, in bytes (2 KB).
const SPLIT_CHUNK_SIZE: usize = 2000;

/// Overlap between adjacent windows of an oversized section, in bytes.
const SPLIT_OVERLAP: usize = 200;

/// Default directory-recursion depth for a project scan, relative to
/// the project root (root itself is depth 0).
pub const DEFAULT_MAX_DEPTH: u32 = 3;

/// Soft time budget for a single `reindex_project` call: once exceeded,
/// the scan stops picking up new files but finishes the one in flight.
pub const REINDEX_TIME_BUDGET: Duration = Duration::from_millis(1500);

/// Hard cap on a `reindex_project` call: checked between files, never
/// mid-file, so a reindex can overrun the soft budget but never this.
pub const REINDEX_HARD_CAP: Duration = Duration::from_millis(2000);

/// A file discovered by a project scan, not yet chunked.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub mtime: i64,
    pub size: u64,
}

/// A chunk of a file's content, ready to embed and store.
#[derive(Debug, Clone)]
pub struct FileChunk {
    pub chunk_index: i32,
    pub heading: Option<String>,
    pub text: String,
}

fn ignore_dirs() -> &'static [&'static str] {
    &[
        ".git",
        "node_modules",
        "target",
        "dist",
        "build",
        ".next",
        ".nuxt",
        "venv",
        ".venv",
        "__pycache__",
        ".cache",
        "vendor",
        ".coderecall",
        "coverage",
    ]
}

fn ignore_files() -> &'static [&'static str] {
    &[
        "package-lock.json",
        "yarn.lock",
        "pnpm-lock.yaml",
        "Cargo.lock",
        "poetry.lock",
        ".DS_Store",
        ".env",
        ".env.local",
        ".env.development",
        ".env.production",
        ".env.test",
        ".npmrc",
        ".netrc",
        "id_rsa",
        "id_ed25519",
    ]
}

/// Filename prefixes/suffixes treated as credential- or environment-like
/// regardless of the exact name (`.env.*`, `*.pem`, `*.key`).
fn is_ignored_by_pattern(name: &str) -> bool {
    name.starts_with(".env") || name.ends_with(".pem") || name.ends_with(".key") || name.ends_with(".p12") || name.ends_with(".pfx")
}

fn never_index_extensions() -> &'static [&'static str] {
    &[
        "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "woff", "woff2", "ttf", "eot", "pdf",
        "zip", "tar", "gz", "bz2", "7z", "exe", "dll", "so", "dylib", "wasm", "bin", "db",
        "sqlite", "sqlite3", "mp4", "mp3", "mov",
    ]
}

/// Walk `root` to [`DEFAULT_MAX_DEPTH`], returning every file that
/// should be considered for indexing.
///
/// Skips ignored directories, ignored filenames, never-indexed binary
/// extensions, and files over [`MAX_FILE_SIZE`].
#[must_use]
pub fn scan_project_files(root: &Path) -> Vec<ScannedFile> {
    scan_project_files_to_depth(root, DEFAULT_MAX_DEPTH)
}

/// Like [`scan_project_files`] with an explicit depth bound, for callers
/// that want to widen or narrow the default.
#[must_use]
pub fn scan_project_files_to_depth(root: &Path, max_depth: u32) -> Vec<ScannedFile> {
    let mut out = Vec::new();
    walk(root, root, 0, max_depth, &mut out);
    out
}

fn walk(root: &Path, dir: &Path, depth: u32, max_depth: u32, out: &mut Vec<ScannedFile>) {
    if depth > max_depth {
        return;
    }

    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        if path.is_dir() {
            if name.starts_with('.') && name != ".github" {
                if name != ".coderecall" {
                    continue;
                }
            }
            if ignore_dirs().contains(&name.as_str()) {
                continue;
            }
            walk(root, &path, depth + 1, max_depth, out);
            continue;
        }

        if ignore_files().contains(&name.as_str()) || is_ignored_by_pattern(&name) {
            continue;
        }

        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if never_index_extensions().contains(&ext.as_str()) {
            continue;
        }

        let Ok(meta) = entry.metadata() else { continue };
        if meta.len() > MAX_FILE_SIZE {
            continue;
        }

        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        let rel_path = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");

        out.push(ScannedFile {
            rel_path,
            abs_path: path,
            mtime,
            size: meta.len(),
        });
    }
}

/// Chunk a file's contents according to its extension.
#[must_use]
pub fn chunk_file(rel_path: &str, contents: &str) -> Vec<FileChunk> {
    let ext = Path::new(rel_path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let file_name = Path::new(rel_path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    match ext.as_str() {
        "md" | "markdown" => chunk_markdown(contents),
        "json" if file_name == "package.json" => chunk_package_json(contents),
        "json" => chunk_top_level_keys(contents, top_level_keys_json),
        "yaml" | "yml" | "toml" => chunk_top_level_keys(contents, top_level_keys_indent),
        _ => split_large(contents, None),
    }
}

/// Split Markdown on H1/H2/H3 headings; each section is windowed further
/// if it's still too large after the split.
fn chunk_markdown(contents: &str) -> Vec<FileChunk> {
    let mut sections: Vec<(Option<String>, String)> = Vec::new();
    let mut current_heading: Option<String> = None;
    let mut current_body = String::new();

    for line in contents.lines() {
        let trimmed = line.trim_start();
        let is_heading = trimmed.starts_with("# ")
            || trimmed.starts_with("## ")
            || trimmed.starts_with("### ");

        if is_heading {
            if !current_body.trim().is_empty() || current_heading.is_some() {
                sections.push((current_heading.take(), std::mem::take(&mut current_body)));
            }
            current_heading = Some(trimmed.trim_start_matches('#').trim().to_string());
        } else {
            current_body.push_str(line);
            current_body.push('\n');
        }
    }
    sections.push((current_heading, current_body));

    let mut chunks = Vec::new();
    for (heading, body) in sections {
        if body.trim().is_empty() && heading.is_none() {
            continue;
        }
        for part in split_large(&body, heading.as_deref()) {
            chunks.push(part);
        }
    }

    renumber(chunks)
}

/// `package.json` is special-cased to its identity fields only.
fn chunk_package_json(contents: &str) -> Vec<FileChunk> {
    let Ok(parsed) = serde_json::from_str::<Value>(contents) else {
        return split_large(contents, None);
    };

    let mut reduced = serde_json::Map::new();
    for key in ["name", "version", "scripts", "dependencies", "devDependencies"] {
        if let Some(v) = parsed.get(key) {
            reduced.insert(key.to_string(), v.clone());
        }
    }

    let text = serde_json::to_string_pretty(&Value::Object(reduced)).unwrap_or_default();
    vec![FileChunk {
        chunk_index: 0,
        heading: Some("package.json".to_string()),
        text,
    }]
}

fn top_level_keys_json(contents: &str) -> Vec<(String, String)> {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(contents) else {
        return Vec::new();
    };

    map.into_iter()
        .map(|(k, v)| {
            let text = serde_json::to_string_pretty(&v).unwrap_or_default();
            (k, text)
        })
        .collect()
}

/// Split YAML/TOML on top-level (zero-indent) keys.
fn top_level_keys_indent(contents: &str) -> Vec<(String, String)> {
    let mut sections: Vec<(String, String)> = Vec::new();
    let mut current_key: Option<String> = None;
    let mut current_body = String::new();

    for line in contents.lines() {
        let is_top_level = !line.is_empty()
            && !line.starts_with(' ')
            && !line.starts_with('\t')
            && !line.starts_with('#')
            && (line.contains(':') || line.contains('='));

        if is_top_level {
            if let Some(key) = current_key.take() {
                sections.push((key, std::mem::take(&mut current_body)));
            }
            let key = line
                .split([':', '='])
                .next()
                .unwrap_or(line)
                .trim()
                .trim_matches('[')
                .trim_matches(']')
                .to_string();
            current_key = Some(key);
        }
        current_body.push_str(line);
        current_body.push('\n');
    }
    if let Some(key) = current_key {
        sections.push((key, current_body));
    }

    sections
}

fn chunk_top_level_keys(contents: &str, extract: fn(&str) -> Vec<(String, String)>) -> Vec<FileChunk> {
    let sections = extract(contents);
    if sections.is_empty() {
        return split_large(contents, None);
    }

    let mut chunks = Vec::new();
    for (key, body) in sections {
        for part in split_large(&body, Some(&key)) {
            chunks.push(part);
        }
    }
    renumber(chunks)
}

/// Window a piece of text into `SPLIT_CHUNK_SIZE`-byte chunks with
/// `SPLIT_OVERLAP` bytes of overlap between consecutive windows.
///
/// Windows beyond the first are suffixed "(part N)" on their heading
/// so a reader can tell a truncated section from a complete one.
fn split_large(text: &str, heading: Option<&str>) -> Vec<FileChunk> {
    let bytes = text.as_bytes();

    if bytes.len() <= SPLIT_CHUNK_SIZE {
        return vec![FileChunk {
            chunk_index: 0,
            heading: heading.map(str::to_string),
            text: text.to_string(),
        }];
    }

    let mut parts = Vec::new();
    let mut start = 0usize;
    let mut part_num = 1;

    while start < bytes.len() {
        let mut end = (start + SPLIT_CHUNK_SIZE).min(bytes.len());
        // Avoid splitting mid-UTF8-codepoint.
        while end < bytes.len() && !text.is_char_boundary(end) {
            end -= 1;
        }

        let slice = &text[start..end];
        let label = match heading {
            Some(h) => format!("{h} (part {part_num})"),
            None => format!("(part {part_num})"),
        };

        parts.push(FileChunk {
            chunk_index: 0,
            heading: Some(label),
            text: slice.to_string(),
        });

        if end >= bytes.len() {
            break;
        }
        start = end.saturating_sub(SPLIT_OVERLAP);
        part_num += 1;
    }

    parts
}

fn renumber(mut chunks: Vec<FileChunk>) -> Vec<FileChunk> {
    for (i, chunk) in chunks.iter_mut().enumerate() {
        chunk.chunk_index = i as i32;
    }
    chunks
}

/// A deadline-aware budget tracker for `reindex_project`.
///
/// Carries both the soft budget (stop picking up new files) and the
/// hard cap (abandon the reindex outright) so a caller only needs one
/// clock for both checks.
pub struct TimeBudget {
    soft_deadline: Instant,
    hard_deadline: Instant,
}

impl TimeBudget {
    #[must_use]
    pub fn new(soft_budget: Duration, hard_cap: Duration) -> Self {
        let now = Instant::now();
        Self {
            soft_deadline: now + soft_budget,
            hard_deadline: now + hard_cap,
        }
    }

    /// The default budget/cap pairing used by `session_start`'s indexer
    /// invocation (§4.5 step 10).
    #[must_use]
    pub fn default_budget() -> Self {
        Self::new(REINDEX_TIME_BUDGET, REINDEX_HARD_CAP)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.soft_deadline
    }

    #[must_use]
    pub fn is_hard_expired(&self) -> bool {
        Instant::now() >= self.hard_deadline
    }
}

/// Whether `stored_mtime` and `live_mtime` are close enough (within 1s)
/// to treat the file as unchanged.
#[must_use]
pub fn mtime_unchanged(stored_mtime: i64, live_mtime: i64) -> bool {
    (stored_mtime - live_mtime).abs() <= 1000
}

/// Outcome of a [`reindex_project`] pass.
#[derive(Debug, Clone, Default)]
pub struct ReindexStats {
    pub scanned: usize,
    pub reindexed: usize,
    pub unchanged: usize,
    pub removed: usize,
    /// Set if the hard cap cut the pass short before every changed file
    /// was processed.
    pub truncated: bool,
}

/// Reconcile `project_root` against what's already indexed for
/// `project_id`: new and changed files are re-chunked and embedded,
/// vanished files are dropped, unchanged files are skipped entirely.
///
/// Bounded by `budget`'s soft deadline (stop starting new files) and
/// hard cap (abandon the pass outright, returning what's done so far).
///
/// # Errors
///
/// Returns an error if a storage operation fails; a single file's read
/// or chunk failure is swallowed and that file is skipped, since an
/// unreadable file shouldn't fail the whole reindex.
pub fn reindex_project(
    storage: &mut crate::storage::SqliteStorage,
    project_id: &str,
    project_root: &Path,
    budget: &TimeBudget,
    actor: &str,
) -> crate::error::Result<ReindexStats> {
    let mut stats = ReindexStats::default();

    let known = storage.indexed_file_mtimes(project_id)?;
    let known_mtimes: std::collections::HashMap<String, i64> =
        known.iter().map(|(path, mtime, _)| (path.clone(), *mtime)).collect();
    let mut seen_paths: std::collections::HashSet<String> = std::collections::HashSet::new();

    let scanned = scan_project_files(project_root);
    stats.scanned = scanned.len();

    for file in scanned {
        if budget.is_hard_expired() {
            stats.truncated = true;
            break;
        }
        if budget.is_expired() {
            stats.truncated = true;
            break;
        }

        seen_paths.insert(file.rel_path.clone());

        if let Some(&stored_mtime) = known_mtimes.get(&file.rel_path) {
            if mtime_unchanged(stored_mtime, file.mtime) {
                stats.unchanged += 1;
                continue;
            }
        }

        let Ok(contents) = std::fs::read_to_string(&file.abs_path) else {
            continue;
        };

        let file_chunks = chunk_file(&file.rel_path, &contents);
        let indexed_file = IndexedFile::new(
            project_id.to_string(),
            file.rel_path.clone(),
            file.mtime,
            file.size as i64,
        );

        let chunks: Vec<Chunk> = file_chunks
            .iter()
            .map(|fc| {
                Chunk::new(
                    project_id.to_string(),
                    indexed_file.id.clone(),
                    file.rel_path.clone(),
                    fc.chunk_index,
                    fc.heading.clone(),
                    fc.text.clone(),
                )
            })
            .collect();

        let embeddings: Vec<Option<Vec<f32>>> = chunks
            .iter()
            .map(|c| crate::embedder::embed(&c.text).ok().flatten())
            .collect();

        storage.replace_file_chunks(&indexed_file, &chunks, &embeddings, actor)?;
        stats.reindexed += 1;
    }

    if !stats.truncated {
        for (path, _, _) in &known {
            if !seen_paths.contains(path) {
                storage.delete_indexed_file(project_id, path, actor)?;
                stats.removed += 1;
            }
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_markdown_splits_on_headings() {
        let text = "# Title\nintro\n## Section A\nbody a\n## Section B\nbody b\n";
        let chunks = chunk_markdown(text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].heading.as_deref(), Some("Title"));
        assert_eq!(chunks[1].heading.as_deref(), Some("Section A"));
    }

    #[test]
    fn test_chunk_markdown_no_headings_single_chunk() {
        let text = "just some plain text\nwith two lines\n";
        let chunks = chunk_markdown(text);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].heading.is_none());
    }

    #[test]
    fn test_split_large_windows_with_overlap() {
        let text = "x".repeat(4000);
        let parts = split_large(&text, Some("big"));
        assert!(parts.len() > 1);
        assert!(parts[1].heading.as_deref().unwrap().contains("part 2"));
    }

    #[test]
    fn test_chunk_package_json_reduces_fields() {
        let pkg = r#"{"name":"x","version":"1.0.0","private":true,"dependencies":{"serde":"1"}}"#;
        let chunks = chunk_package_json(pkg);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("\"name\""));
        assert!(!chunks[0].text.contains("\"private\""));
    }

    #[test]
    fn test_mtime_unchanged_within_tolerance() {
        assert!(mtime_unchanged(1_000_000, 1_000_800));
        assert!(!mtime_unchanged(1_000_000, 1_005_000));
    }

    #[test]
    fn test_scan_project_files_skips_ignored_dirs() {
        let dir = std::env::temp_dir().join(format!("mem_scan_test_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("node_modules")).unwrap();
        std::fs::write(dir.join("node_modules/lib.js"), "noise").unwrap();
        std::fs::write(dir.join("main.rs"), "fn main() {}").unwrap();

        let found = scan_project_files(&dir);
        assert!(found.iter().any(|f| f.rel_path == "main.rs"));
        assert!(!found.iter().any(|f| f.rel_path.contains("node_modules")));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_scan_project_files_skips_env_and_credential_files() {
        let dir = std::env::temp_dir().join(format!("mem_scan_env_test_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(".env"), "SECRET=1").unwrap();
        std::fs::write(dir.join(".env.local"), "SECRET=2").unwrap();
        std::fs::write(dir.join("server.pem"), "-----BEGIN-----").unwrap();
        std::fs::write(dir.join("main.rs"), "fn main() {}").unwrap();

        let found = scan_project_files(&dir);
        assert!(found.iter().any(|f| f.rel_path == "main.rs"));
        assert!(!found.iter().any(|f| f.rel_path.starts_with(".env")));
        assert!(!found.iter().any(|f| f.rel_path == "server.pem"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_scan_project_files_respects_depth_bound() {
        let dir = std::env::temp_dir().join(format!("mem_depth_test_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let deep = dir.join("a/b/c/d/e");
        std::fs::create_dir_all(&deep).unwrap();
        std::fs::write(deep.join("buried.rs"), "fn x() {}").unwrap();
        std::fs::write(dir.join("a/b/shallow.rs"), "fn y() {}").unwrap();

        let found = scan_project_files_to_depth(&dir, 2);
        assert!(found.iter().any(|f| f.rel_path.ends_with("shallow.rs")));
        assert!(!found.iter().any(|f| f.rel_path.ends_with("buried.rs")));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_reindex_project_tracks_new_unchanged_and_removed() {
        use crate::storage::SqliteStorage;

        let dir = std::env::temp_dir().join(format!("mem_reindex_test_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.md"), "# A\nhello").unwrap();

        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = storage.get_or_create_project(&dir.to_string_lossy(), None, "tester").unwrap();

        let budget = TimeBudget::new(Duration::from_secs(5), Duration::from_secs(10));
        let first = reindex_project(&mut storage, &project.id, &dir, &budget, "tester").unwrap();
        assert_eq!(first.reindexed, 1);
        assert_eq!(first.removed, 0);

        let second = reindex_project(&mut storage, &project.id, &dir, &budget, "tester").unwrap();
        assert_eq!(second.unchanged, 1);
        assert_eq!(second.reindexed, 0);

        std::fs::remove_file(dir.join("a.md")).unwrap();
        let third = reindex_project(&mut storage, &project.id, &dir, &budget, "tester").unwrap();
        assert_eq!(third.removed, 1);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
