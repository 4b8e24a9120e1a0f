mod cli;
mod commands;
mod logging;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    #[cfg(unix)]
    reset_sigpipe();

    let cli = Cli::parse();
    if let Err(err) = try_main(cli) {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main(cli: Cli) -> anyhow::Result<()> {
    let home = dirs::home_dir().context("resolving home directory")?;

    let mut config = match &cli.config {
        Some(path) => chronicle_sync::Config::load_from(path)?,
        None => chronicle_sync::Config::load()?,
    };
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = Some(data_dir.clone());
    }

    let _log_guard = match &cli.command {
        Commands::Serve { .. } => {
            logging::init_file(&config.resolved_data_dir().join("logs"), &cli.log_level)?
        }
        _ => logging::init_stderr(&cli.log_level),
    };

    commands::run(cli.command, config, &home)
}

#[cfg(unix)]
fn reset_sigpipe() {
    // Without this, piping `chronicle prune | head` panics on a broken
    // pipe instead of exiting quietly.
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
}
