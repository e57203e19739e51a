use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use repomap::config::Config;
use repomap::index::SymbolKind;
use repomap::supervisor::worker::{run_worker, WORKER_SUBCOMMAND};

mod cli;

use cli::query::{parse_kind, Query};

/// Environment override for the project root of `serve`
const PROJECT_ROOT_ENV: &str = "REPOMAP_PROJECT_ROOT";

#[derive(Parser)]
#[command(name = "repomap")]
#[command(version)]
#[command(about = "Incremental symbol index for AI coding assistants, served over MCP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server on stdio (default command)
    Serve {
        /// Project directory, defaults to $REPOMAP_PROJECT_ROOT or "."
        #[arg(short, long)]
        project: Option<String>,

        /// Disable file watching
        #[arg(long)]
        no_watch: bool,
    },

    /// Index a project in the foreground
    Index {
        #[arg(short, long, default_value = ".")]
        project: String,

        /// Drop the cache and reindex even if fresh
        #[arg(short, long)]
        force: bool,

        /// No progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// Search symbols by name glob
    Search {
        pattern: String,

        #[arg(short, long, value_parser = parse_kind)]
        kind: Option<SymbolKind>,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// List the symbols of one file
    Symbols {
        file: String,

        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// Print the source of a symbol (`name` or `Parent.name`)
    Show {
        name: String,

        #[arg(short, long, value_parser = parse_kind)]
        kind: Option<SymbolKind>,

        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// List indexed files grouped by directory
    Files {
        /// Path glob, e.g. "src/**/*.rs"
        pattern: Option<String>,

        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// List likely duplicate classes and functions
    Similar {
        #[arg(short, long, value_parser = parse_kind)]
        kind: Option<SymbolKind>,

        #[arg(short, long, default_value_t = 50)]
        limit: usize,

        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// Show index status and staleness
    Status {
        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// List supported languages
    Languages,

    /// Run one indexing pass for the server (internal)
    #[command(name = WORKER_SUBCOMMAND, hide = true)]
    IndexWorker {
        #[arg(long)]
        project: PathBuf,

        #[arg(long)]
        run_id: i64,
    },
}

impl Commands {
    /// Project directory the command works on, before canonicalization
    fn project(&self) -> Option<String> {
        match self {
            Commands::Serve { project, .. } => Some(
                project
                    .clone()
                    .or_else(|| std::env::var(PROJECT_ROOT_ENV).ok())
                    .unwrap_or_else(|| ".".to_string()),
            ),
            Commands::Index { project, .. }
            | Commands::Search { project, .. }
            | Commands::Symbols { project, .. }
            | Commands::Show { project, .. }
            | Commands::Files { project, .. }
            | Commands::Similar { project, .. }
            | Commands::Status { project } => Some(project.clone()),
            Commands::IndexWorker { project, .. } => Some(project.to_string_lossy().into_owned()),
            Commands::Languages => None,
        }
    }
}

fn init_logging(debug: bool, verbose: bool, configured: &str) {
    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        configured
    };

    // stdout carries the MCP protocol
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn project_dir(raw: &str) -> Result<PathBuf> {
    std::fs::canonicalize(raw).with_context(|| format!("project directory {} not found", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Commands::Serve {
        project: None,
        no_watch: false,
    });

    let configured = command
        .project()
        .map(|p| Config::from_project_dir(p).logging.level)
        .unwrap_or_else(|| "warn".to_string());
    init_logging(cli.debug, cli.verbose, &configured);

    let serve_project = command.project();

    match command {
        Commands::Serve { no_watch, .. } => {
            let raw = serve_project.unwrap_or_else(|| ".".to_string());
            let root = project_dir(&raw)?;
            info!("Starting repomap for project: {}", root.display());
            cli::serve::serve_stdio(&root, !no_watch).await?;
        }

        Commands::Index { project, force, quiet } => {
            let root = project_dir(&project)?;
            tokio::task::spawn_blocking(move || cli::index::index_project(&root, force, quiet)).await??;
        }

        Commands::IndexWorker { project, run_id } => {
            tokio::task::spawn_blocking(move || run_worker(&project, run_id)).await??;
        }

        Commands::Search {
            pattern,
            kind,
            limit,
            project,
        } => {
            cli::query::run_query(&project_dir(&project)?, Query::Search { pattern, kind, limit })?;
        }

        Commands::Symbols { file, project } => {
            cli::query::run_query(&project_dir(&project)?, Query::Symbols { file })?;
        }

        Commands::Show { name, kind, project } => {
            if !cli::query::run_query(&project_dir(&project)?, Query::Show { name, kind })? {
                std::process::exit(1);
            }
        }

        Commands::Files { pattern, project } => {
            cli::query::run_query(&project_dir(&project)?, Query::Files { pattern })?;
        }

        Commands::Similar { kind, limit, project } => {
            cli::query::run_query(&project_dir(&project)?, Query::Similar { kind, limit })?;
        }

        Commands::Status { project } => {
            cli::query::run_query(&project_dir(&project)?, Query::Status)?;
        }

        Commands::Languages => {
            cli::languages::list_languages();
        }
    }

    Ok(())
}
