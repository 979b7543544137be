//! Minimal i18n lookup with a fallback chain.
//!
//! Every user-facing string in this crate is expected to route through
//! [`translate`] rather than being written inline, even though only the
//! `"en"` dictionary ships today — the lookup function is already
//! locale-parametric so a second dictionary is a data addition, not a
//! call-site rewrite.

use std::collections::HashMap;
use std::sync::LazyLock;

const DEFAULT_LOCALE: &str = "en";

static EN: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("session.started", "Session started for {project}"),
        ("session.ended", "Session ended ({facts_count} facts, {changes_count} changes)"),
        ("session.recovered", "Recovered crashed session {session_id}"),
        ("identity.locked", "Safety fields locked for {project}"),
        ("identity.blocked_locked", "BLOCKED — safety fields are locked for {project}"),
        ("identity.verified", "VERIFIED — {project} is ready for {action}"),
        ("identity.warning_incomplete", "WARNING — {project} has no safety lock set"),
        ("fact.written", "Recorded {kind}: {title}"),
        ("fact.deleted", "Deleted {count} fact(s)"),
    ])
});

fn dictionary(locale: &str) -> &'static HashMap<&'static str, &'static str> {
    match locale {
        "en" => &EN,
        _ => &EN,
    }
}

/// Resolve `key` in `locale`, substituting `{name}` placeholders from
/// `params`. Falls back to the default locale, then to `key` itself, if
/// the lookup comes up empty at either stage.
#[must_use]
pub fn translate(locale: &str, key: &str, params: &[(&str, &str)]) -> String {
    let template = dictionary(locale)
        .get(key)
        .or_else(|| dictionary(DEFAULT_LOCALE).get(key))
        .copied()
        .unwrap_or(key);

    let mut out = template.to_string();
    for (name, value) in params {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_substitutes_params() {
        let s = translate("en", "fact.written", &[("kind", "command"), ("title", "use pnpm")]);
        assert_eq!(s, "Recorded command: use pnpm");
    }

    #[test]
    fn test_translate_unknown_key_falls_back_to_key() {
        assert_eq!(translate("en", "no.such.key", &[]), "no.such.key");
    }

    #[test]
    fn test_translate_unknown_locale_falls_back_to_default() {
        let s = translate("fr", "identity.locked", &[("project", "demo")]);
        assert_eq!(s, "Safety fields locked for demo");
    }
}
