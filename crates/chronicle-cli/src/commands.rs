use crate::cli::Commands;
use anyhow::{Context, Result};
use chronicle_storage::{SessionFilter, Storage};
use chronicle_sync::{Config, SyncEngine, Watcher};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub fn run(command: Commands, config: Config, home: &Path) -> Result<()> {
    match command {
        Commands::Serve { no_watch, once } => serve(config, home, no_watch, once),
        Commands::Prune {
            project,
            agent,
            before,
            yes,
        } => prune(config, project, agent, before, yes),
        Commands::Update { force } => update(config, home, force),
    }
}

fn open_storage(config: &Config) -> Result<Storage> {
    Storage::open(config.db_path(), config.cursor_secret_path())
        .context("opening session store")
}

/// Opens storage, and if its schema predates a column the current code
/// expects, runs a full rebuild from source before returning — matching
/// §4.9's "any missing required column discards and recreates the file"
/// contract, which only completes once source files are re-ingested.
fn open_and_ensure_current(config: &Config, home: &Path) -> Result<(Arc<Storage>, Arc<SyncEngine>)> {
    let storage = Arc::new(open_storage(config)?);
    let engine = Arc::new(SyncEngine::new(storage.clone(), config.clone(), home.to_path_buf())?);

    if storage.needs_rebuild()? {
        info!("schema out of date, rebuilding database from source");
        let summary = engine.resync_all()?;
        info!(
            sessions_written = summary.sessions_written,
            files_parsed = summary.files_parsed,
            "rebuild complete"
        );
    }

    Ok((storage, engine))
}

fn serve(config: Config, home: &Path, no_watch: bool, once: bool) -> Result<()> {
    let (_storage, engine) = open_and_ensure_current(&config, home)?;

    info!("running initial sync");
    let summary = engine.sync_all()?;
    info!(
        files_scanned = summary.files_scanned,
        files_parsed = summary.files_parsed,
        sessions_written = summary.sessions_written,
        errors = summary.errors.len(),
        "initial sync complete"
    );

    if once {
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            info!("shutdown requested");
            shutdown.store(true, Ordering::SeqCst);
        })
        .context("installing signal handler")?;
    }

    let watcher = if no_watch {
        None
    } else {
        let roots = chronicle_sync::all_roots(home, &config);
        let watch_engine = engine.clone();
        let debounce = Duration::from_millis(config.debounce_ms);
        match Watcher::new(&roots, debounce, move |events| {
            match watch_engine.handle_change_events(&events) {
                Ok(summary) if summary.sessions_written > 0 || !summary.errors.is_empty() => {
                    info!(
                        sessions_written = summary.sessions_written,
                        errors = summary.errors.len(),
                        "watcher-triggered sync"
                    );
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "watcher-triggered sync failed"),
            }
        }) {
            Ok(w) => Some(w),
            Err(err) => {
                warn!(error = %err, "failed to start filesystem watcher, falling back to periodic sync only");
                None
            }
        }
    };

    let periodic_interval = Duration::from_secs(config.periodic_sync_minutes.max(1) * 60);
    info!(
        periodic_sync_minutes = config.periodic_sync_minutes,
        watching = watcher.is_some(),
        "serving"
    );

    let mut last_periodic = std::time::Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
        if last_periodic.elapsed() >= periodic_interval {
            last_periodic = std::time::Instant::now();
            match engine.sync_all() {
                Ok(summary) => info!(
                    sessions_written = summary.sessions_written,
                    "periodic sync complete"
                ),
                Err(err) => warn!(error = %err, "periodic sync failed"),
            }
        }
    }

    if let Some(watcher) = watcher {
        watcher.stop();
    }
    info!("shutdown complete");
    Ok(())
}

fn prune(
    config: Config,
    project: Option<String>,
    agent: Option<String>,
    before: Option<String>,
    yes: bool,
) -> Result<()> {
    let storage = open_storage(&config)?;

    let until = before
        .as_deref()
        .map(|s| {
            chrono::DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .with_context(|| format!("parsing --before {s} as RFC3339"))
        })
        .transpose()?;

    let filter = SessionFilter {
        project,
        agent,
        until,
        ..Default::default()
    };

    let mut ids = Vec::new();
    let mut cursor = None;
    loop {
        let page = storage.list_sessions(&filter, 500, cursor.as_deref())?;
        ids.extend(page.items.into_iter().map(|s| s.id));
        cursor = page.next_cursor;
        if cursor.is_none() {
            break;
        }
    }

    if ids.is_empty() {
        println!("no sessions match the given filter");
        return Ok(());
    }

    if !yes {
        println!("would delete {} session(s):", ids.len());
        for id in ids.iter().take(20) {
            println!("  {id}");
        }
        if ids.len() > 20 {
            println!("  ... and {} more", ids.len() - 20);
        }
        println!("re-run with --yes to delete");
        return Ok(());
    }

    let deleted = storage.delete_sessions(&ids)?;
    println!("deleted {deleted} session(s)");
    Ok(())
}

fn update(config: Config, home: &Path, force: bool) -> Result<()> {
    let storage = Arc::new(open_storage(&config)?);
    let engine = Arc::new(SyncEngine::new(storage.clone(), config.clone(), home.to_path_buf())?);

    let stale = storage.needs_rebuild()?;
    if !force && !stale {
        let stats = storage.stats()?;
        println!(
            "database is current ({} sessions, {} messages); pass --force to rebuild anyway",
            stats.total_sessions, stats.total_messages
        );
        return Ok(());
    }

    println!("rebuilding database from source...");
    let summary = engine.resync_all()?;
    println!(
        "rebuild complete: {} files parsed, {} sessions written",
        summary.files_parsed, summary.sessions_written
    );
    if !summary.errors.is_empty() {
        println!("{} file(s) failed to parse; see logs for details", summary.errors.len());
    }
    Ok(())
}
