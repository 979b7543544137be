//! CLI definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for list/query commands.
#[derive(ValueEnum, Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table (default)
    #[default]
    Table,
    /// JSON (same as --json)
    Json,
    /// Comma-separated values
    Csv,
}

pub mod commands;

/// coderecall CLI - persistent per-project memory for AI coding agents
#[derive(Parser, Debug)]
#[command(name = "mem", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.coderecall/data/memory.db)
    #[arg(long, global = true, env = "MEM_DB")]
    pub db: Option<PathBuf>,

    /// Actor name for audit trail
    #[arg(long, global = true, env = "MEM_ACTOR")]
    pub actor: Option<String>,

    /// Active session ID (passed by the host, or resolved from the TTY cache)
    #[arg(long, global = true, env = "MEM_SESSION")]
    pub session: Option<String>,

    /// Output as JSON (for agent integration)
    #[arg(long, alias = "robot", global = true)]
    pub json: bool,

    /// Output format (table, json, csv)
    #[arg(long, value_enum, global = true, default_value_t)]
    pub format: OutputFormat,

    /// Output only the ID/key (for agent scripting)
    #[arg(long, global = true)]
    pub silent: bool,

    /// Preview changes without writing to the database
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search recorded facts (hybrid lexical + vector ranking)
    Search {
        /// Search text
        query: String,

        /// "project" (default), "all", or a named project
        #[arg(long, default_value = "project")]
        scope: String,

        /// Restrict to one of the 14 fact kinds
        #[arg(long)]
        kind: Option<String>,

        /// Max results, clamped to 10
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Record a fact, deduplicating on (project, source_file, kind)
    Write {
        /// Fact body
        content: String,

        /// One of the 14 closed fact kinds (default: fact)
        #[arg(long, default_value = "fact")]
        kind: String,

        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,

        /// Free-form domain label
        #[arg(long)]
        domain: Option<String>,

        /// Project-relative source file this fact ties to
        #[arg(long)]
        source_file: Option<String>,
    },

    /// Delete facts by id
    Delete {
        /// Fact ids to delete
        ids: Vec<String>,
    },

    /// Search indexed file chunks
    Files {
        /// Search text
        query: String,

        /// "project" (default) or "all"
        #[arg(long, default_value = "project")]
        scope: String,

        /// Glob to restrict matched file paths
        #[arg(long)]
        file_filter: Option<String>,

        /// Max results, clamped to 10
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show the active project's briefing, last bridge, and stats
    Context,

    /// Load or save the active session's recovery checkpoint
    Bridge {
        #[arg(value_enum)]
        action: BridgeAction,

        /// Checkpoint text (required for `save`)
        #[arg(long)]
        content: Option<String>,
    },

    /// Show recent or matching decisions
    Decisions {
        /// Filter text
        #[arg(long)]
        query: Option<String>,

        /// Named project (default: active project)
        #[arg(long)]
        project: Option<String>,

        /// Max results, clamped to 10
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Check whether a destructive action class is safe to perform
    Verify {
        /// One of: deploy, ssh, push, pm2, db-migrate, docker-remote, proxy-reload, service-mgmt
        action_type: String,
    },

    /// Set one or more identity fields, optionally locking the safety set
    Identity {
        /// key=value pairs, one per flag
        #[arg(long = "field", value_name = "KEY=VALUE")]
        fields: Vec<String>,

        /// Compute and store the safety lock hash after applying fields
        #[arg(long)]
        lock_safety: bool,
    },

    /// Suggest tooling grounded in this project's recorded facts and identity
    Recommend {
        /// Free-text description of the need
        #[arg(long)]
        description: Option<String>,

        /// A tool/library name to find alternatives or companions for
        #[arg(long)]
        similar_to: Option<String>,

        /// Narrow to a category (e.g. "testing", "css")
        #[arg(long)]
        category: Option<String>,
    },

    /// Lifecycle hooks invoked by the host
    Hook {
        #[command(subcommand)]
        command: HookCommands,
    },

    /// Initialize the global memory store
    Init {
        /// Overwrite an existing database
        #[arg(long)]
        force: bool,
    },

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// `session_bridge`'s two actions (§6).
#[derive(ValueEnum, Clone, Debug)]
pub enum BridgeAction {
    Load,
    Save,
}

#[derive(Subcommand, Debug)]
pub enum HookCommands {
    /// Run the `session_start` lifecycle sequence (§4.5)
    SessionStart,

    /// Run the `session_end` lifecycle sequence (§4.5)
    SessionEnd,

    /// Record a post-write file change (§4.5 `file_change`)
    FileChange {
        /// Tool name from the host's post-write payload (write → create, else edit)
        #[arg(long)]
        tool_name: String,

        /// Edited file path
        #[arg(long)]
        file_path: Option<String>,

        /// Edited notebook path (alternative to `file_path`)
        #[arg(long)]
        notebook_path: Option<String>,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}
