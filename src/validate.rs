//! Closed-set validation for fact kinds and identity fields.
//!
//! Both sets are closed: unknown values are rejected with a Levenshtein-based
//! "did you mean" suggestion rather than silently accepted, so a typo'd
//! `kind` doesn't scatter facts across two different spellings forever.

use std::collections::HashSet;
use std::sync::LazyLock;

/// The 14 closed fact kinds a `memory_write` call may use.
pub static FACT_KINDS: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    [
        "decision",
        "fact",
        "pattern",
        "issue",
        "task",
        "skill",
        "gotcha",
        "procedure",
        "error_fix",
        "command",
        "performance",
        "api_contract",
        "dependency",
        "client_rule",
    ]
    .into_iter()
    .collect()
});

/// Normalize and validate a fact kind.
///
/// Accepts case-insensitively; returns the canonical lowercase kind on
/// success, or the original input plus an optional suggestion on failure.
pub fn normalize_fact_kind(input: &str) -> Result<String, (String, Option<String>)> {
    let lower = input.to_lowercase();

    if FACT_KINDS.contains(lower.as_str()) {
        return Ok(lower);
    }

    let suggestion = find_closest(&lower, &FACT_KINDS);
    Err((input.to_string(), suggestion))
}

/// Find the closest match in `valid` with edit distance <= 3.
fn find_closest(input: &str, valid: &HashSet<&str>) -> Option<String> {
    valid
        .iter()
        .map(|&v| (levenshtein_distance(input, v), v))
        .filter(|(dist, _)| *dist <= 3)
        .min_by_key(|(dist, _)| *dist)
        .map(|(_, v)| v.to_string())
}

/// Compute the Levenshtein edit distance between two strings.
#[must_use]
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let a_len = a.len();
    let b_len = b.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for i in 1..=a_len {
        curr[0] = i;
        for j in 1..=b_len {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Find existing IDs similar to the searched ID (edit distance <= 3).
#[must_use]
pub fn find_similar_ids(searched: &str, existing: &[String], max: usize) -> Vec<String> {
    let mut candidates: Vec<(usize, &str)> = existing
        .iter()
        .map(|id| (levenshtein_distance(searched, id), id.as_str()))
        .filter(|(dist, _)| *dist <= 3)
        .collect();

    candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    candidates
        .into_iter()
        .take(max)
        .map(|(_, id)| id.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_fact_kind_exact() {
        assert_eq!(normalize_fact_kind("decision"), Ok("decision".to_string()));
        assert_eq!(normalize_fact_kind("GOTCHA"), Ok("gotcha".to_string()));
    }

    #[test]
    fn test_normalize_fact_kind_typo_suggests() {
        let err = normalize_fact_kind("decisoin").unwrap_err();
        assert_eq!(err.1, Some("decision".to_string()));
    }

    #[test]
    fn test_normalize_fact_kind_unrelated_no_suggestion() {
        let err = normalize_fact_kind("xyzxyzxyz").unwrap_err();
        assert_eq!(err.1, None);
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", "abc"), 0);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_find_similar_ids() {
        let ids = vec!["fact_a1b2".to_string(), "fact_a1b3".to_string(), "fact_xxxx".to_string()];
        let result = find_similar_ids("fact_a1b1", &ids, 3);
        assert!(result.contains(&"fact_a1b2".to_string()));
    }
}
