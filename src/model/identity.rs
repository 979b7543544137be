//! Identity model — per-project operational metadata.
//!
//! Field names are taken verbatim from the original implementation's
//! `identity_set.py` / `verify_identity.py` (ground truth for the spec's
//! approximate "~40 fields" / "~19 safety" / "~8 action classes" counts).
//! Modeled as a closed struct rather than an open map: the field set is
//! fixed at compile time, and `Identity::set` is the single place that
//! validates a field name against it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Safety fields: prerequisites for destructive actions. Locking these
/// requires a hash re-verification on every future mutation attempt.
pub const SAFETY_FIELDS: &[&str] = &[
    "deploy_ssh_alias",
    "deploy_ssh_host",
    "deploy_ssh_port",
    "deploy_ssh_user",
    "deploy_app_port",
    "deploy_path",
    "deploy_method",
    "pm2_process_name",
    "pm2_process_id",
    "github_repo_url",
    "github_org",
    "git_production_branch",
    "domain_primary",
    "domain_aliases",
    "reverse_proxy",
    "reverse_proxy_config_path",
    "db_type",
    "db_connection_hint",
    "env_file_pattern",
    "env_secrets_note",
];

/// Tech fields: descriptive, never gated.
pub const TECH_FIELDS: &[&str] = &[
    "framework",
    "framework_version",
    "language",
    "css_approach",
    "ui_library",
    "db_technology",
    "hosting_pattern",
    "containerization",
    "design_system",
    "design_fonts",
    "design_notes",
    "build_tool",
    "package_manager",
    "project_category",
];

#[must_use]
pub fn is_known_field(name: &str) -> bool {
    SAFETY_FIELDS.contains(&name) || TECH_FIELDS.contains(&name)
}

#[must_use]
pub fn is_safety_field(name: &str) -> bool {
    SAFETY_FIELDS.contains(&name)
}

/// The eight action classes `verify_identity` gates, each with its own
/// required-field subset (taken verbatim from `REQUIRED_FIELDS` in the
/// original implementation).
#[must_use]
pub fn required_fields_for(action_type: &str) -> Option<&'static [&'static str]> {
    Some(match action_type {
        "deploy" => &[
            "deploy_ssh_alias",
            "deploy_ssh_host",
            "deploy_app_port",
            "deploy_path",
            "deploy_method",
            "domain_primary",
        ],
        "ssh" => &["deploy_ssh_alias", "deploy_ssh_host"],
        "push" => &["github_repo_url", "git_production_branch"],
        "pm2" => &["deploy_ssh_alias", "pm2_process_name"],
        "db-migrate" => &["db_type", "db_connection_hint", "deploy_ssh_alias"],
        "docker-remote" => &["deploy_ssh_alias", "deploy_ssh_host"],
        "proxy-reload" => &["deploy_ssh_alias", "reverse_proxy"],
        "service-mgmt" => &["deploy_ssh_alias", "deploy_ssh_host"],
        _ => return None,
    })
}

#[must_use]
pub fn all_action_types() -> &'static [&'static str] {
    &[
        "deploy",
        "ssh",
        "push",
        "pm2",
        "db-migrate",
        "docker-remote",
        "proxy-reload",
        "service-mgmt",
    ]
}

/// Per-project identity card: safety + tech metadata, plus lock state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Identity {
    pub deploy_ssh_alias: Option<String>,
    pub deploy_ssh_host: Option<String>,
    pub deploy_ssh_port: Option<String>,
    pub deploy_ssh_user: Option<String>,
    pub deploy_app_port: Option<String>,
    pub deploy_path: Option<String>,
    pub deploy_method: Option<String>,
    pub pm2_process_name: Option<String>,
    pub pm2_process_id: Option<String>,
    pub github_repo_url: Option<String>,
    pub github_org: Option<String>,
    pub git_production_branch: Option<String>,
    pub domain_primary: Option<String>,
    pub domain_aliases: Option<String>,
    pub reverse_proxy: Option<String>,
    pub reverse_proxy_config_path: Option<String>,
    pub db_type: Option<String>,
    pub db_connection_hint: Option<String>,
    pub env_file_pattern: Option<String>,
    pub env_secrets_note: Option<String>,

    pub framework: Option<String>,
    pub framework_version: Option<String>,
    pub language: Option<String>,
    pub css_approach: Option<String>,
    pub ui_library: Option<String>,
    pub db_technology: Option<String>,
    pub hosting_pattern: Option<String>,
    pub containerization: Option<String>,
    pub design_system: Option<String>,
    pub design_fonts: Option<String>,
    pub design_notes: Option<String>,
    pub build_tool: Option<String>,
    pub package_manager: Option<String>,
    pub project_category: Option<String>,

    #[serde(default)]
    pub safety_locked: bool,
    pub lock_hash: Option<String>,
    pub locked_at: Option<i64>,
    pub locked_by: Option<String>,
}

impl Identity {
    /// Read a field by name. Returns `None` for both "unset" and
    /// "unknown field" — callers that need to distinguish should check
    /// [`is_known_field`] first.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        macro_rules! m {
            ($($name:ident),* $(,)?) => {
                match field {
                    $(stringify!($name) => self.$name.as_deref(),)*
                    _ => None,
                }
            };
        }
        m!(
            deploy_ssh_alias,
            deploy_ssh_host,
            deploy_ssh_port,
            deploy_ssh_user,
            deploy_app_port,
            deploy_path,
            deploy_method,
            pm2_process_name,
            pm2_process_id,
            github_repo_url,
            github_org,
            git_production_branch,
            domain_primary,
            domain_aliases,
            reverse_proxy,
            reverse_proxy_config_path,
            db_type,
            db_connection_hint,
            env_file_pattern,
            env_secrets_note,
            framework,
            framework_version,
            language,
            css_approach,
            ui_library,
            db_technology,
            hosting_pattern,
            containerization,
            design_system,
            design_fonts,
            design_notes,
            build_tool,
            package_manager,
            project_category,
        )
    }

    /// Set a field by name. Returns `false` if `field` is not one of
    /// the closed set — callers must reject unknown fields before
    /// calling this, this is the defense in depth, not the only check.
    pub fn set(&mut self, field: &str, value: &str) -> bool {
        macro_rules! m {
            ($($name:ident),* $(,)?) => {
                match field {
                    $(stringify!($name) => { self.$name = Some(value.to_string()); true },)*
                    _ => false,
                }
            };
        }
        m!(
            deploy_ssh_alias,
            deploy_ssh_host,
            deploy_ssh_port,
            deploy_ssh_user,
            deploy_app_port,
            deploy_path,
            deploy_method,
            pm2_process_name,
            pm2_process_id,
            github_repo_url,
            github_org,
            git_production_branch,
            domain_primary,
            domain_aliases,
            reverse_proxy,
            reverse_proxy_config_path,
            db_type,
            db_connection_hint,
            env_file_pattern,
            env_secrets_note,
            framework,
            framework_version,
            language,
            css_approach,
            ui_library,
            db_technology,
            hosting_pattern,
            containerization,
            design_system,
            design_fonts,
            design_notes,
            build_tool,
            package_manager,
            project_category,
        )
    }

    /// `sha256("field=value|field=value|...")[..16]` over the safety
    /// fields taken in sorted-name order. Used both to seal a lock and
    /// to detect out-of-band tampering on every subsequent verify.
    #[must_use]
    pub fn safety_lock_hash(&self) -> String {
        let mut sorted: Vec<&str> = SAFETY_FIELDS.to_vec();
        sorted.sort_unstable();

        let joined = sorted
            .iter()
            .map(|f| format!("{f}={}", self.get(f).unwrap_or("")))
            .collect::<Vec<_>>()
            .join("|");

        let digest = Sha256::digest(joined.as_bytes());
        hex_prefix(&digest, 16)
    }
}

fn hex_prefix(bytes: &[u8], hex_chars: usize) -> String {
    let mut s = String::with_capacity(hex_chars);
    for b in bytes {
        if s.len() >= hex_chars {
            break;
        }
        s.push_str(&format!("{b:02x}"));
    }
    s.truncate(hex_chars);
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_unknown_field_rejected() {
        let mut id = Identity::default();
        assert!(!id.set("not_a_real_field", "x"));
    }

    #[test]
    fn test_set_get_roundtrip() {
        let mut id = Identity::default();
        assert!(id.set("deploy_ssh_host", "10.0.0.1"));
        assert_eq!(id.get("deploy_ssh_host"), Some("10.0.0.1"));
    }

    #[test]
    fn test_lock_hash_stable_and_sensitive() {
        let mut a = Identity::default();
        a.set("deploy_ssh_host", "10.0.0.1");
        let mut b = a.clone();
        assert_eq!(a.safety_lock_hash(), b.safety_lock_hash());

        b.set("deploy_ssh_host", "10.0.0.2");
        assert_ne!(a.safety_lock_hash(), b.safety_lock_hash());
    }

    #[test]
    fn test_lock_hash_is_16_hex_chars() {
        let id = Identity::default();
        let hash = id.safety_lock_hash();
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_required_fields_for_deploy() {
        let req = required_fields_for("deploy").unwrap();
        assert!(req.contains(&"domain_primary"));
        assert_eq!(req.len(), 6);
    }

    #[test]
    fn test_required_fields_unknown_action() {
        assert!(required_fields_for("nuke-prod").is_none());
    }

    #[test]
    fn test_field_classification() {
        assert!(is_safety_field("deploy_ssh_host"));
        assert!(!is_safety_field("framework"));
        assert!(is_known_field("framework"));
        assert!(!is_known_field("bogus"));
    }
}
