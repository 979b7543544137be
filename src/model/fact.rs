//! Fact model — the durable memory unit.

use serde::{Deserialize, Serialize};

/// An atomic memory unit: a decision, gotcha, command, etc., optionally
/// tied to a file on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    /// `fact_` + 12 hex chars.
    pub id: String,
    pub project_id: String,
    pub session_id: Option<String>,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub source_file: Option<String>,
    pub source_mtime: Option<i64>,

    /// Comma-separated free-form tags, indexed alongside title/body.
    pub tags: Option<String>,
    /// Free-form domain/area label (e.g. "auth", "billing").
    pub domain: Option<String>,

    /// Relevance scalar, clamped to `[0.05, 1.0]`.
    pub heat: f64,
    pub last_accessed_at: Option<i64>,
    pub access_count: i64,

    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

/// Floor a fact's heat can never decay below — cold knowledge stays
/// recoverable rather than disappearing.
pub const HEAT_FLOOR: f64 = 0.05;
/// Ceiling a fact's heat is clamped to on access.
pub const HEAT_CEILING: f64 = 1.0;
/// Heat boost applied to every fact returned by a search.
pub const HEAT_ACCESS_BOOST: f64 = 0.2;

#[must_use]
pub fn clamp_heat(h: f64) -> f64 {
    h.clamp(HEAT_FLOOR, HEAT_CEILING)
}

/// Staleness annotation computed against the fact's `source_file` at
/// read time. Advisory only — never a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Staleness {
    /// `source_file` no longer exists on disk.
    Deleted,
    /// `source_file` exists but its mtime is newer than `source_mtime`.
    Stale,
    /// No `source_file`, or the file is unchanged.
    Fresh,
}

impl Fact {
    #[must_use]
    pub fn new(
        project_id: String,
        session_id: Option<String>,
        kind: String,
        title: String,
        body: String,
        source_file: Option<String>,
        source_mtime: Option<i64>,
        tags: Option<String>,
        domain: Option<String>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: format!("fact_{}", &uuid::Uuid::new_v4().to_string()[..12]),
            project_id,
            session_id,
            kind,
            title,
            body,
            source_file,
            source_mtime,
            tags,
            domain,
            heat: HEAT_CEILING,
            last_accessed_at: None,
            access_count: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// Classify a heat value into a human-readable band, used only for
/// display — never for ranking.
#[must_use]
pub fn heat_label(heat: f64) -> &'static str {
    if heat >= 0.7 {
        "hot"
    } else if heat >= 0.3 {
        "warm"
    } else {
        "cold"
    }
}

/// Age-bucketed multiplicative heat decay (§4.4). Applied once per fact
/// per decay pass, not per-day — the bucket boundary alone determines
/// the factor.
#[must_use]
pub fn decay_factor(age_ms: i64) -> f64 {
    const DAY_MS: i64 = 86_400_000;
    if age_ms <= DAY_MS {
        1.0
    } else if age_ms <= 7 * DAY_MS {
        0.95
    } else if age_ms <= 30 * DAY_MS {
        0.85
    } else {
        0.70
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_heat_floor_and_ceiling() {
        assert_eq!(clamp_heat(-1.0), HEAT_FLOOR);
        assert_eq!(clamp_heat(5.0), HEAT_CEILING);
        assert_eq!(clamp_heat(0.5), 0.5);
    }

    #[test]
    fn test_decay_factor_buckets() {
        assert_eq!(decay_factor(0), 1.0);
        assert_eq!(decay_factor(2 * 86_400_000), 0.95);
        assert_eq!(decay_factor(10 * 86_400_000), 0.85);
        assert_eq!(decay_factor(40 * 86_400_000), 0.70);
    }

    #[test]
    fn test_heat_label_bands() {
        assert_eq!(heat_label(0.9), "hot");
        assert_eq!(heat_label(0.5), "warm");
        assert_eq!(heat_label(0.1), "cold");
    }

    #[test]
    fn test_new_fact_defaults_to_full_heat() {
        let f = Fact::new(
            "proj_a".into(),
            None,
            "command".into(),
            "t".into(),
            "b".into(),
            None,
            None,
            None,
            None,
        );
        assert_eq!(f.heat, HEAT_CEILING);
        assert!(f.id.starts_with("fact_"));
    }
}
