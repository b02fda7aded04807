//! Seer CLI - seer command

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

/// Seer - filesystem change notifications from the command line
#[derive(Parser)]
#[command(name = "seer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Watcher configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Quiet window for synthesized write completions, in milliseconds
    #[arg(long, global = true)]
    debounce_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch paths and print every event
    Watch {
        /// Files or directories to watch
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Watch files through their parent directories
    File {
        /// Files to watch (directories are rejected)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print one event per finished write
    FinishWrite {
        /// Files or directories to watch
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Debounce writes even if the platform reports completions itself
        #[arg(long)]
        force_debounce: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = cmd::load_config(cli.config.as_deref(), cli.debounce_ms)?;

    match cli.command {
        Commands::Watch { paths } => cmd::watch::run(config, &paths).await,
        Commands::File { files } => cmd::file::run(config, &files).await,
        Commands::FinishWrite { paths, force_debounce } => {
            cmd::finish_write::run(config, &paths, force_debounce).await
        }
    }
}
