//! # repo-oracle CLI (`oracle`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `oracle config` | Write a template config file |
//! | `oracle init` | Create `.oracle/` in the current directory |
//! | `oracle add <path>` | Stage a file or directory |
//! | `oracle rm <path>` | Unstage a file |
//! | `oracle status` | List staged files |
//! | `oracle diff` | Show which staged files are new, modified or unchanged |
//! | `oracle commit` | Index staged files |
//! | `oracle reset [--hard]` | Clear staging, or rebuild the project state |
//! | `oracle ls` | List indexed documents |
//! | `oracle search "<query>"` | Similarity search over indexed chunks |
//! | `oracle tree` | Print the repository structure snapshot |
//! | `oracle ask [--save]` | Interactive question answering |

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use repo_oracle::commands;
use repo_oracle::config;
use repo_oracle::project::Project;

/// repo-oracle: ask questions about your repository.
#[derive(Parser)]
#[command(
    name = "oracle",
    about = "repo-oracle: a local-first assistant for questions about your code",
    version
)]
struct Cli {
    /// Path to the configuration file (TOML).
    ///
    /// Defaults to `$HOME/.oracle/config.toml`. A missing file means all
    /// network providers are disabled.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging to stderr and progress output.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a commented config template (never overwrites).
    Config,

    /// Initialize a project in the current directory.
    Init,

    /// Stage a file, or every file under a directory.
    Add { path: PathBuf },

    /// Unstage a file.
    Rm { path: PathBuf },

    /// List staged files.
    Status,

    /// Compare staged files with what is indexed.
    Diff,

    /// Index all staged files and refresh the repository snapshot.
    Commit,

    /// Clear the staging area.
    Reset {
        /// Delete all project state and re-initialize.
        #[arg(long)]
        hard: bool,
    },

    /// List indexed documents.
    Ls,

    /// Similarity search over indexed chunks.
    Search {
        query: String,

        /// Number of matches to print.
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Print the repository structure snapshot.
    Tree,

    /// Start an interactive question-answering session.
    Ask {
        /// Append the session transcript to `.oracle/transcripts/` on exit.
        #[arg(long)]
        save: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = std::env::var("ORACLE_LOG")
        .ok()
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    if let Commands::Config = cli.command {
        return commands::run_config(&config_path);
    }

    let cfg = config::load_config(&config_path)?;
    let cwd = std::env::current_dir()?;

    if let Commands::Init = cli.command {
        return commands::run_init(&cfg, &cwd).await;
    }

    let project = Project::discover(&cwd)?;
    match cli.command {
        Commands::Add { path } => commands::run_add(&project, &path)?,
        Commands::Rm { path } => commands::run_rm(&project, &path)?,
        Commands::Status => commands::run_status(&project)?,
        Commands::Diff => commands::run_diff(&cfg, &project).await?,
        Commands::Commit => commands::run_commit(&cfg, &project, cli.verbose).await?,
        Commands::Reset { hard } => commands::run_reset(&cfg, &project, hard).await?,
        Commands::Ls => commands::run_ls(&cfg, &project).await?,
        Commands::Search { query, k } => commands::run_search(&cfg, &project, &query, k).await?,
        Commands::Tree => commands::run_tree(&project)?,
        Commands::Ask { save } => commands::run_ask(&cfg, &project, save).await?,
        Commands::Config | Commands::Init => {}
    }
    Ok(())
}
