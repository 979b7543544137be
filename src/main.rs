//! coderecall CLI entry point.

use clap::Parser;
use coderecall::cli::commands;
use coderecall::cli::{Cli, Commands, HookCommands, OutputFormat};
use coderecall::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.silent {
        coderecall::SILENT.store(true, std::sync::atomic::Ordering::Relaxed);
    }
    if cli.dry_run {
        coderecall::DRY_RUN.store(true, std::sync::atomic::Ordering::Relaxed);
    }
    if cli.format == OutputFormat::Csv {
        coderecall::CSV_OUTPUT.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR --format json OR non-TTY stdout.
    // When --format csv is explicit, don't override with auto-JSON.
    let json = cli.json
        || cli.format == OutputFormat::Json
        || (cli.format != OutputFormat::Csv && !std::io::IsTerminal::is_terminal(&std::io::stdout()));

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use the verbosity flag.
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("coderecall=info"),
            2 => EnvFilter::new("coderecall=debug"),
            _ => EnvFilter::new("coderecall=trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    match &cli.command {
        Commands::Search { query, scope, kind, limit } => commands::memory::execute_search(
            query,
            scope,
            kind.as_deref(),
            *limit,
            cli.db.as_deref(),
            cli.actor.as_deref(),
            json,
        ),

        Commands::Write { content, kind, tags, domain, source_file } => commands::memory::execute_write(
            content,
            kind,
            tags.as_deref(),
            domain.as_deref(),
            source_file.as_deref(),
            cli.db.as_deref(),
            cli.actor.as_deref(),
            cli.session.as_deref(),
            json,
        ),

        Commands::Delete { ids } => commands::memory::execute_delete(ids, cli.db.as_deref(), cli.actor.as_deref(), json),

        Commands::Files { query, scope, file_filter, limit } => commands::files::execute(
            query,
            scope,
            file_filter.as_deref(),
            *limit,
            cli.db.as_deref(),
            cli.actor.as_deref(),
            json,
        ),

        Commands::Context => commands::context::execute(cli.db.as_deref(), cli.actor.as_deref(), json),

        Commands::Bridge { action, content } => {
            commands::bridge::execute(action, content.as_deref(), cli.db.as_deref(), cli.actor.as_deref(), cli.session.as_deref(), json)
        }

        Commands::Decisions { query, project, limit } => {
            commands::decisions::execute(query.as_deref(), project.as_deref(), *limit, cli.db.as_deref(), cli.actor.as_deref(), json)
        }

        Commands::Verify { action_type } => commands::verify::execute(action_type, cli.db.as_deref(), cli.actor.as_deref(), json),

        Commands::Identity { fields, lock_safety } => {
            commands::identity::execute(fields, *lock_safety, cli.db.as_deref(), cli.actor.as_deref(), json)
        }

        Commands::Recommend { description, similar_to, category } => commands::recommend::execute(
            description.as_deref(),
            similar_to.as_deref(),
            category.as_deref(),
            cli.db.as_deref(),
            cli.actor.as_deref(),
            json,
        ),

        Commands::Hook { command } => match command {
            HookCommands::SessionStart => commands::hook::execute_session_start(cli.db.as_deref(), cli.actor.as_deref(), json),
            HookCommands::SessionEnd => commands::hook::execute_session_end(cli.db.as_deref(), cli.actor.as_deref(), cli.session.as_deref(), json),
            HookCommands::FileChange { tool_name, file_path, notebook_path } => commands::hook::execute_file_change(
                tool_name,
                file_path.as_deref(),
                notebook_path.as_deref(),
                cli.db.as_deref(),
                cli.actor.as_deref(),
                cli.session.as_deref(),
                json,
            ),
        },

        Commands::Init { force } => commands::init::execute(*force, json),
        Commands::Version => commands::version::execute(json),
        Commands::Completions { shell } => commands::completions::execute(shell),
    }
}
