use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chronicle")]
#[command(about = "Sync and serve AI coding assistant session transcripts", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Overrides the resolved data directory (env: CHRONICLE_PATH).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Path to a TOML config file; defaults to `<data_dir>/config.toml`.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// error, warn, info, debug, or trace. Overridden by RUST_LOG if set.
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the sync engine continuously: an initial full pass, a file
    /// watcher reacting to changes, and a periodic backstop sync.
    Serve {
        /// Disable the filesystem watcher; rely solely on the periodic
        /// sync timer.
        #[arg(long)]
        no_watch: bool,

        /// Run once and exit instead of entering the long-lived loop.
        #[arg(long)]
        once: bool,
    },

    /// Delete sessions matching a filter. Without `--yes`, lists what
    /// would be deleted and exits without touching the database.
    Prune {
        /// Only consider sessions in this project.
        #[arg(long)]
        project: Option<String>,

        /// Only consider sessions whose agent tag matches.
        #[arg(long)]
        agent: Option<String>,

        /// Only consider sessions that started before this RFC3339 timestamp.
        #[arg(long)]
        before: Option<String>,

        /// Actually delete; otherwise this is a dry run.
        #[arg(long)]
        yes: bool,
    },

    /// Force a destructive full rebuild of the database from source files,
    /// or report the data directory's current state.
    Update {
        /// Rebuild the database from scratch even if the schema is current.
        #[arg(long)]
        force: bool,
    },
}
