//! Error types for the memory engine.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, etc.)
//! - Retryability flags for agent self-correction
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for memory-engine operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Agents match on the string; shell scripts on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    AlreadyInitialized,
    DatabaseError,

    // Not Found (exit 3)
    SessionNotFound,
    ProjectNotFound,
    NoActiveSession,
    NoActiveProject,
    NoIdentityRow,

    // Validation (exit 4)
    InvalidFactKind,
    InvalidField,
    InvalidAction,
    InvalidArgument,
    RequiredField,

    // Blocked action (exit 5)
    SafetyLocked,
    MissingSafetyFields,
    TamperDetected,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Embedding (exit 9)
    EmbeddingError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::ProjectNotFound => "PROJECT_NOT_FOUND",
            Self::NoActiveSession => "NO_ACTIVE_SESSION",
            Self::NoActiveProject => "NO_ACTIVE_PROJECT",
            Self::NoIdentityRow => "NO_IDENTITY_ROW",
            Self::InvalidFactKind => "INVALID_FACT_KIND",
            Self::InvalidField => "INVALID_FIELD",
            Self::InvalidAction => "INVALID_ACTION",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::RequiredField => "REQUIRED_FIELD",
            Self::SafetyLocked => "SAFETY_LOCKED",
            Self::MissingSafetyFields => "MISSING_SAFETY_FIELDS",
            Self::TamperDetected => "TAMPER_DETECTED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::EmbeddingError => "EMBEDDING_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-9).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::AlreadyInitialized | Self::DatabaseError => 2,
            Self::SessionNotFound
            | Self::ProjectNotFound
            | Self::NoActiveSession
            | Self::NoActiveProject
            | Self::NoIdentityRow => 3,
            Self::InvalidFactKind
            | Self::InvalidField
            | Self::InvalidAction
            | Self::InvalidArgument
            | Self::RequiredField => 4,
            Self::SafetyLocked | Self::MissingSafetyFields | Self::TamperDetected => 5,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
            Self::EmbeddingError => 9,
        }
    }

    /// Whether an agent should retry with corrected input.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidFactKind
                | Self::InvalidField
                | Self::InvalidAction
                | Self::InvalidArgument
                | Self::RequiredField
                | Self::DatabaseError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in memory-engine operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `mem init` first")]
    NotInitialized,

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    #[error("No active session")]
    NoActiveSession,

    #[error("No active session (recent sessions available)")]
    NoActiveSessionWithRecent {
        /// (id, project, status) of recent resumable sessions.
        recent: Vec<(String, String, String)>,
    },

    #[error("No active project for current directory")]
    NoActiveProject,

    #[error("Project not found: {name}")]
    ProjectNotFound { name: String },

    #[error("No identity card set for project '{project}'")]
    NoIdentityRow { project: String },

    #[error("Unknown fact kind: '{kind}'. Allowed: {allowed}")]
    InvalidFactKind { kind: String, allowed: String },

    #[error("Unknown identity field(s): {fields}. Allowed: {allowed}")]
    InvalidField { fields: String, allowed: String },

    #[error("Unknown action type: '{action}'. Allowed: {allowed}")]
    InvalidAction { action: String, allowed: String },

    #[error(
        "BLOCKED — safety fields are locked for '{project}'. Attempted change: {fields}. \
         Re-lock with lock_safety=true to change locked fields."
    )]
    SafetyLocked { project: String, fields: String },

    #[error("BLOCKED — missing required fields for action '{action}': {missing}")]
    MissingSafetyFields { action: String, missing: String },

    #[error(
        "BLOCKED — tamper detected on identity card for '{project}': \
         stored hash {expected} does not match computed hash {actual}"
    )]
    TamperDetected {
        project: String,
        expected: String,
        actual: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::SessionNotFound { .. } => ErrorCode::SessionNotFound,
            Self::NoActiveSession | Self::NoActiveSessionWithRecent { .. } => {
                ErrorCode::NoActiveSession
            }
            Self::NoActiveProject => ErrorCode::NoActiveProject,
            Self::ProjectNotFound { .. } => ErrorCode::ProjectNotFound,
            Self::NoIdentityRow { .. } => ErrorCode::NoIdentityRow,
            Self::InvalidFactKind { .. } => ErrorCode::InvalidFactKind,
            Self::InvalidField { .. } => ErrorCode::InvalidField,
            Self::InvalidAction { .. } => ErrorCode::InvalidAction,
            Self::SafetyLocked { .. } => ErrorCode::SafetyLocked,
            Self::MissingSafetyFields { .. } => ErrorCode::MissingSafetyFields,
            Self::TamperDetected { .. } => ErrorCode::TamperDetected,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Embedding(_) => ErrorCode::EmbeddingError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint for agents and humans.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => {
                Some("Run `mem init` to initialize the memory store".to_string())
            }

            Self::AlreadyInitialized { path } => Some(format!(
                "Store already exists at {}. Use `--force` to reinitialize.",
                path.display()
            )),

            Self::NoActiveSession => Some(
                "No session bound to this terminal.\n  \
                 Start: mem hook session-start"
                    .to_string(),
            ),

            Self::NoActiveSessionWithRecent { recent } => {
                let mut hint = String::from("Recent sessions for this project:\n");
                for (id, project, status) in recent {
                    hint.push_str(&format!("    {id}  {project} ({status})\n"));
                }
                Some(hint)
            }

            Self::NoActiveProject => {
                Some("Run `mem hook session-start` from inside a project directory".to_string())
            }

            Self::SessionNotFound { id } => {
                Some(format!("No session with ID '{id}' in the store."))
            }

            Self::ProjectNotFound { name } => Some(format!(
                "No project named '{name}' has been registered yet."
            )),

            Self::NoIdentityRow { .. } => Some(
                "Run `mem identity --field key=value ...` to create an identity card first"
                    .to_string(),
            ),

            Self::InvalidFactKind { .. } => Some(
                "Valid kinds: decision, fact, pattern, issue, task, skill, gotcha, \
                 procedure, error_fix, command, performance, api_contract, dependency, \
                 client_rule"
                    .to_string(),
            ),

            Self::MissingSafetyFields { .. } => Some(
                "Set the missing fields with `mem identity --field name=value`, then retry."
                    .to_string(),
            ),

            Self::TamperDetected { .. } => Some(
                "The identity row was modified outside `identity_set`. Re-verify the values \
                 and re-run `identity_set` with `lock_safety=true` to re-lock."
                    .to_string(),
            ),

            Self::InvalidArgument(_)
            | Self::InvalidField { .. }
            | Self::InvalidAction { .. }
            | Self::SafetyLocked { .. }
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Config(_)
            | Self::Embedding(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint. Agents parse this instead of stderr text.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
