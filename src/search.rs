//! Hybrid lexical + vector search over facts and chunks (§4.4).
//!
//! Both `search_facts` and `search_chunks` follow the same five-step
//! pipeline: trivial-query short-circuit, lexical fetch, lexical
//! fallback on FTS syntax rejection, vector expansion, and hybrid
//! ranking. Facts additionally get a heat bump and staleness tag on
//! the way out; chunks do not carry a heat model.

use crate::error::Result;
use crate::model::fact::HEAT_ACCESS_BOOST;
use crate::model::{Chunk, Fact, Staleness};
use crate::storage::SqliteStorage;
use crate::vector::cosine_distance;
use std::collections::HashMap;

/// Below this length (after trimming surrounding quotes/wildcards) a
/// query is too short to search meaningfully — callers fall back to
/// "most relevant by heat" instead of attempting FTS.
const TRIVIAL_QUERY_LEN: usize = 3;

/// How much wider than `limit` the lexical fetch and vector expansion
/// reach before the hybrid rank narrows back down.
const FUSION_FACTOR: usize = 3;

/// `score = 0.4 * lex_score + 0.6 * vec_score`.
const LEX_WEIGHT: f64 = 0.4;
const VEC_WEIGHT: f64 = 0.6;

/// Slack multiplier applied to the farthest candidate distance before
/// it's used to normalize every other vector score.
const VEC_DISTANCE_SLACK: f32 = 1.2;

#[derive(Debug, Clone)]
pub struct FactHit {
    pub fact: Fact,
    pub score: f64,
    pub staleness: Staleness,
}

#[derive(Debug, Clone)]
pub struct ChunkHit {
    pub chunk: Chunk,
    pub score: f64,
}

/// Strip the surrounding quote/wildcard characters a trivial-query
/// check should ignore, without touching interior content.
fn stripped_len(query: &str) -> usize {
    query
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '*' || c == '%')
        .len()
}

/// Escape a raw query for FTS5 `MATCH`: wrap it as one quoted phrase so
/// user-supplied punctuation can never be parsed as FTS operators.
fn fts_escape(query: &str) -> String {
    format!("\"{}\"", query.replace('"', "\"\""))
}

/// Run project-wide heat decay, then search facts, returning results in
/// score order (descending), highest-scoring first.
///
/// # Errors
///
/// Returns an error if a storage operation fails.
pub fn search_facts(
    storage: &mut SqliteStorage,
    query: &str,
    project_id: Option<&str>,
    kind: Option<&str>,
    limit: usize,
    now_ms: i64,
    actor: &str,
) -> Result<Vec<FactHit>> {
    if let Some(pid) = project_id {
        let facts = storage.list_facts_for_project(pid)?;
        storage.apply_heat_decay(&facts, now_ms, actor)?;
    }

    let vector_fusion = crate::embedder::is_available();
    let fetch_limit = if vector_fusion { limit * FUSION_FACTOR } else { limit };

    let mut by_id: HashMap<String, Fact> = HashMap::new();
    let mut lex_positions: HashMap<String, usize> = HashMap::new();
    let mut lex_count = 0usize;

    if stripped_len(query) >= TRIVIAL_QUERY_LEN {
        match storage.search_facts_fts(&fts_escape(query), project_id, kind, fetch_limit) {
            Ok(hits) => {
                lex_count = hits.len();
                for ranked in hits {
                    lex_positions.insert(ranked.fact.id.clone(), ranked.position);
                    by_id.insert(ranked.fact.id.clone(), ranked.fact);
                }
            }
            Err(_) => {
                let hits = storage.search_facts_substring(query, project_id, kind, fetch_limit)?;
                lex_count = hits.len();
                for (position, fact) in hits.into_iter().enumerate() {
                    lex_positions.insert(fact.id.clone(), position);
                    by_id.insert(fact.id.clone(), fact);
                }
            }
        }
    } else {
        let hits = storage.top_facts_by_heat(project_id, kind, fetch_limit)?;
        lex_count = hits.len();
        for (position, fact) in hits.into_iter().enumerate() {
            lex_positions.insert(fact.id.clone(), position);
            by_id.insert(fact.id.clone(), fact);
        }
    }

    let mut vec_distances: HashMap<String, f32> = HashMap::new();
    if vector_fusion {
        if let Ok(Some(query_vec)) = crate::embedder::embed(query) {
            let candidates = storage.facts_with_vectors(project_id, kind)?;
            let mut scored: Vec<(Fact, f32)> = candidates
                .into_iter()
                .map(|c| {
                    let distance = cosine_distance(&query_vec, &c.embedding);
                    (c.fact, distance)
                })
                .collect();
            scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(limit * FUSION_FACTOR);

            for (fact, distance) in scored {
                vec_distances.insert(fact.id.clone(), distance);
                by_id.entry(fact.id.clone()).or_insert(fact);
            }
        }
    }

    let max_distance = vec_distances.values().copied().fold(0.0f32, f32::max);

    let mut hits: Vec<FactHit> = by_id
        .into_values()
        .map(|fact| {
            let lex_score = lex_positions
                .get(&fact.id)
                .map(|pos| 1.0 - (*pos as f64) / (lex_count.max(1) as f64))
                .unwrap_or(0.0);
            let vec_score = vec_distances
                .get(&fact.id)
                .map(|distance| {
                    let denom = (VEC_DISTANCE_SLACK * max_distance).max(f32::EPSILON);
                    1.0 - f64::from(*distance) / f64::from(denom)
                })
                .unwrap_or(0.0);
            let score = LEX_WEIGHT * lex_score + VEC_WEIGHT * vec_score;
            let staleness = classify_staleness(&fact);
            FactHit { fact, score, staleness }
        })
        .collect();

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(limit);

    if !hits.is_empty() {
        let ids: Vec<String> = hits.iter().map(|h| h.fact.id.clone()).collect();
        storage.bump_heat_on_access(&ids, HEAT_ACCESS_BOOST, now_ms, actor)?;
    }

    Ok(hits)
}

/// Translate a caller-supplied glob into the substring match the store
/// actually runs against `rel_path` (§4.4 step 2): wildcards carry no
/// special meaning here, they're just stripped, since a glob's
/// non-wildcard segments are themselves a reasonable substring filter.
fn glob_to_substring(glob: &str) -> String {
    glob.replace(['*', '?'], "")
}

/// Same five-step pipeline as [`search_facts`], without heat/staleness
/// post-processing — chunks have no heat model.
///
/// # Errors
///
/// Returns an error if a storage operation fails.
pub fn search_chunks(
    storage: &SqliteStorage,
    query: &str,
    project_id: Option<&str>,
    file_filter: Option<&str>,
    limit: usize,
) -> Result<Vec<ChunkHit>> {
    let filter_substring = file_filter.map(glob_to_substring).filter(|s| !s.is_empty());
    let vector_fusion = crate::embedder::is_available();
    let fetch_limit = if vector_fusion { limit * FUSION_FACTOR } else { limit };

    let mut by_id: HashMap<String, Chunk> = HashMap::new();
    let mut lex_positions: HashMap<String, usize> = HashMap::new();
    let mut lex_count = 0usize;

    if stripped_len(query) >= TRIVIAL_QUERY_LEN {
        match storage.search_chunks_fts(&fts_escape(query), project_id, fetch_limit) {
            Ok(hits) => {
                lex_count = hits.len();
                for ranked in hits {
                    lex_positions.insert(ranked.chunk.id.clone(), ranked.position);
                    by_id.insert(ranked.chunk.id.clone(), ranked.chunk);
                }
            }
            Err(_) => {
                let hits = storage.search_chunks_substring(query, project_id, fetch_limit)?;
                lex_count = hits.len();
                for (position, chunk) in hits.into_iter().enumerate() {
                    lex_positions.insert(chunk.id.clone(), position);
                    by_id.insert(chunk.id.clone(), chunk);
                }
            }
        }
    } else {
        let hits = storage.top_chunks_by_id(project_id, fetch_limit)?;
        lex_count = hits.len();
        for (position, chunk) in hits.into_iter().enumerate() {
            lex_positions.insert(chunk.id.clone(), position);
            by_id.insert(chunk.id.clone(), chunk);
        }
    }

    if let Some(needle) = &filter_substring {
        by_id.retain(|_, chunk| chunk.rel_path.contains(needle.as_str()));
        lex_positions.retain(|id, _| by_id.contains_key(id));
    }

    let mut vec_distances: HashMap<String, f32> = HashMap::new();
    if vector_fusion {
        if let Ok(Some(query_vec)) = crate::embedder::embed(query) {
            let candidates = storage.chunks_with_vectors(project_id)?;
            let mut scored: Vec<(Chunk, f32)> = candidates
                .into_iter()
                .filter(|c| filter_substring.as_ref().is_none_or(|needle| c.chunk.rel_path.contains(needle.as_str())))
                .map(|c| {
                    let distance = cosine_distance(&query_vec, &c.embedding);
                    (c.chunk, distance)
                })
                .collect();
            scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(limit * FUSION_FACTOR);

            for (chunk, distance) in scored {
                vec_distances.insert(chunk.id.clone(), distance);
                by_id.entry(chunk.id.clone()).or_insert(chunk);
            }
        }
    }

    let max_distance = vec_distances.values().copied().fold(0.0f32, f32::max);

    let mut hits: Vec<ChunkHit> = by_id
        .into_values()
        .map(|chunk| {
            let lex_score = lex_positions
                .get(&chunk.id)
                .map(|pos| 1.0 - (*pos as f64) / (lex_count.max(1) as f64))
                .unwrap_or(0.0);
            let vec_score = vec_distances
                .get(&chunk.id)
                .map(|distance| {
                    let denom = (VEC_DISTANCE_SLACK * max_distance).max(f32::EPSILON);
                    1.0 - f64::from(*distance) / f64::from(denom)
                })
                .unwrap_or(0.0);
            let score = LEX_WEIGHT * lex_score + VEC_WEIGHT * vec_score;
            ChunkHit { chunk, score }
        })
        .collect();

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(limit);
    Ok(hits)
}

/// Advisory staleness check against the fact's `source_file` on disk.
/// Never rejects — just annotates.
#[must_use]
pub fn classify_staleness(fact: &Fact) -> Staleness {
    let Some(source_file) = &fact.source_file else {
        return Staleness::Fresh;
    };

    let Ok(meta) = std::fs::metadata(source_file) else {
        return Staleness::Deleted;
    };

    let live_mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    match fact.source_mtime {
        Some(stored) if live_mtime > stored => Staleness::Stale,
        _ => Staleness::Fresh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stripped_len_ignores_quotes_and_wildcards() {
        assert_eq!(stripped_len("\"ab\""), 2);
        assert_eq!(stripped_len("  *x*  "), 1);
    }

    #[test]
    fn test_fts_escape_wraps_as_phrase() {
        assert_eq!(fts_escape("hello world"), "\"hello world\"");
        assert_eq!(fts_escape("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_classify_staleness_no_source_is_fresh() {
        let fact = Fact::new("p".into(), None, "fact".into(), "t".into(), "b".into(), None, None, None, None);
        assert_eq!(classify_staleness(&fact), Staleness::Fresh);
    }

    #[test]
    fn test_classify_staleness_missing_file_is_deleted() {
        let fact = Fact::new(
            "p".into(),
            None,
            "fact".into(),
            "t".into(),
            "b".into(),
            Some("/nonexistent/path/zzz.md".into()),
            Some(0),
            None,
            None,
        );
        assert_eq!(classify_staleness(&fact), Staleness::Deleted);
    }

    #[test]
    fn test_search_facts_trivial_query_falls_back_to_heat_order() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = storage.get_or_create_project("/tmp/p", None, "tester").unwrap();
        let fact = Fact::new(project.id.clone(), None, "fact".into(), "t".into(), "Use pnpm".into(), None, None, None, None);
        storage.insert_fact(&fact, "tester").unwrap();

        let hits = search_facts(&mut storage, "ab", Some(&project.id), None, 5, 1_000_000, "tester").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].fact.id, fact.id);
    }

    #[test]
    fn test_search_chunks_file_filter_narrows_to_matching_paths() {
        use crate::model::IndexedFile;

        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = storage.get_or_create_project("/tmp/p", None, "tester").unwrap();

        let readme_file = IndexedFile::new(project.id.clone(), "README.md".to_string(), 1, 10);
        let readme_chunk = Chunk::new(project.id.clone(), readme_file.id.clone(), "README.md".to_string(), 0, None, "Use pnpm for installs".to_string());
        storage.replace_file_chunks(&readme_file, &[readme_chunk], &[None], "tester").unwrap();

        let other_file = IndexedFile::new(project.id.clone(), "docs/guide.md".to_string(), 1, 10);
        let other_chunk = Chunk::new(project.id.clone(), other_file.id.clone(), "docs/guide.md".to_string(), 0, None, "Use pnpm for installs".to_string());
        storage.replace_file_chunks(&other_file, &[other_chunk], &[None], "tester").unwrap();

        let hits = search_chunks(&storage, "pnpm", Some(&project.id), Some("README*"), 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.rel_path, "README.md");
    }

    #[test]
    fn test_search_facts_lexical_match_bumps_heat() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = storage.get_or_create_project("/tmp/p", None, "tester").unwrap();
        let mut fact = Fact::new(project.id.clone(), None, "fact".into(), "t".into(), "Use pnpm for installs".into(), None, None, None, None);
        fact.heat = 0.5;
        storage.insert_fact(&fact, "tester").unwrap();

        let hits = search_facts(&mut storage, "pnpm", Some(&project.id), None, 5, 1_000_000, "tester").unwrap();
        assert_eq!(hits.len(), 1);

        let refreshed = storage.get_fact(&fact.id).unwrap().unwrap();
        assert!(refreshed.heat > 0.5);
        assert_eq!(refreshed.last_accessed_at, Some(1_000_000));
    }
}
