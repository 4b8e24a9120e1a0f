use crate::config::Config;
use crate::discovery::{self, Discovered};
use crate::skip_cache::SkipCache;
use chronicle_storage::{SessionWrite, Storage};
use chronicle_types::{Error as ParseError, FileProvenance};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Counts from one sync pass, returned to the caller (CLI, watcher,
/// periodic timer) for logging and `serve`'s status line.
#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    pub files_scanned: usize,
    pub files_parsed: usize,
    pub files_unchanged: usize,
    pub files_skipped: usize,
    pub sessions_written: u64,
    pub errors: Vec<String>,
}

/// Discovers, parses and writes every session across every enabled agent.
/// Owns the skip cache and serializes full sync cycles against each other
/// (incremental syncs, the watcher's debounced reactor, and the periodic
/// timer all funnel through the same `sync_mu`), but does not serialize
/// against single-session reparses triggered by the live monitor — those
/// touch one file and one session row and can interleave safely.
pub struct SyncEngine {
    storage: Arc<Storage>,
    config: Config,
    home: PathBuf,
    skip_cache: Mutex<SkipCache>,
    sync_mu: Mutex<()>,
}

impl SyncEngine {
    pub fn new(storage: Arc<Storage>, config: Config, home: PathBuf) -> anyhow::Result<Self> {
        let skip_cache = SkipCache::load(&storage)?;
        Ok(Self {
            storage,
            config,
            home,
            skip_cache: Mutex::new(skip_cache),
            sync_mu: Mutex::new(()),
        })
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Reacts to a coalesced batch of watcher events: `deleted` paths drop
    /// their sessions outright, everything else is handed to `sync_paths`.
    /// Matches §4.7's contract that the engine removes the session whose
    /// `file_path` matches a deletion.
    pub fn handle_change_events(
        &self,
        events: &[crate::watcher::ChangeEvent],
    ) -> anyhow::Result<SyncSummary> {
        use crate::watcher::ChangeKind;

        let mut to_sync = Vec::new();
        let mut removed = 0usize;
        for event in events {
            if event.kind == ChangeKind::Deleted {
                removed += self.remove_source_file(&event.path)?;
            } else {
                to_sync.push(event.path.clone());
            }
        }
        let summary = if to_sync.is_empty() {
            SyncSummary::default()
        } else {
            self.sync_paths(&to_sync)?
        };
        if removed > 0 {
            debug!(removed, "dropped sessions for deleted source files");
        }
        Ok(summary)
    }

    /// One incremental sync cycle: discover every candidate file, skip the
    /// ones the skip cache or an unchanged fingerprint rule out, parse and
    /// write the rest in batches of `config.batch_size`.
    pub fn sync_all(&self) -> anyhow::Result<SyncSummary> {
        let _guard = self.sync_mu.lock().expect("sync mutex poisoned");
        let discovered = discovery::discover_all(&self.home, &self.config)?;
        self.run_pass(discovered, false, &self.storage)
    }

    /// The destructive full rebuild (§4.6): hands a fresh, empty, FTS-less
    /// `Storage` backed by a sibling temp file to a force-reparse of every
    /// discovered file, then lets `Storage::rebuild` swap it over the live
    /// database atomically once it's non-empty. The skip cache accumulated
    /// during the pass is persisted into that same fresh storage, so after
    /// the swap it's already the live cache too.
    pub fn resync_all(&self) -> anyhow::Result<SyncSummary> {
        let _guard = self.sync_mu.lock().expect("sync mutex poisoned");
        let discovered = discovery::discover_all(&self.home, &self.config)?;
        let mut summary = SyncSummary::default();
        self.storage
            .rebuild(|fresh| {
                summary = self
                    .run_pass(discovered, true, fresh)
                    .map_err(to_storage_error)?;
                Ok(summary.sessions_written)
            })
            .map_err(anyhow::Error::from)?;
        Ok(summary)
    }

    /// Syncs only the given source files (used by the file watcher, which
    /// already knows which paths changed and doesn't need a fresh
    /// discovery walk). Each path is matched back to its provider by
    /// extension/location via the registry.
    pub fn sync_paths(&self, paths: &[PathBuf]) -> anyhow::Result<SyncSummary> {
        let _guard = self.sync_mu.lock().expect("sync mutex poisoned");
        let mut discovered = Vec::new();
        for path in paths {
            if let Some((entry, candidate)) = match_provider(&self.home, &self.config, path) {
                discovered.push(Discovered { entry, candidate });
            }
        }
        self.run_pass(discovered, false, &self.storage)
    }

    /// Removes every session whose provenance points at `path` (used by the
    /// watcher on a `deleted` filesystem event — the source file is gone,
    /// so nothing would ever reparse it back into existence).
    pub fn remove_source_file(&self, path: &Path) -> anyhow::Result<usize> {
        let path_str = path.to_string_lossy().to_string();
        let ids = self.storage.find_session_ids_by_file_path(&path_str)?;
        if ids.is_empty() {
            return Ok(0);
        }
        Ok(self.storage.delete_sessions(&ids)?)
    }

    /// Reparses the single source file backing `session_id` (root, fork, or
    /// sub-agent session — all share their root's file provenance) and
    /// writes the result immediately, bypassing the batch threshold.
    pub fn sync_single_session(&self, session_id: &str) -> anyhow::Result<SyncSummary> {
        let Some(path) = self.find_source_file(session_id)? else {
            return Ok(SyncSummary::default());
        };
        self.sync_paths(std::slice::from_ref(&path))
    }

    pub fn find_source_file(&self, session_id: &str) -> anyhow::Result<Option<PathBuf>> {
        Ok(self
            .storage
            .get_session(session_id)?
            .and_then(|s| s.provenance)
            .map(|p| PathBuf::from(p.file_path)))
    }

    /// Discovery → parse → write for one cycle. Each batch of
    /// `config.batch_size` candidates is parsed across a bounded pool of
    /// `config.worker_pool_size` worker threads (§4.5 step 5) before being
    /// committed in a single write transaction; batches themselves run one
    /// at a time, so at most one transaction is ever open against `target`.
    fn run_pass(
        &self,
        discovered: Vec<Discovered>,
        force: bool,
        target: &Storage,
    ) -> anyhow::Result<SyncSummary> {
        let mut summary = SyncSummary::default();

        for chunk in discovered.chunks(self.config.batch_size.max(1)) {
            let outcomes = self.parse_batch(chunk, force, target);
            let mut batch = Vec::with_capacity(chunk.len());
            for outcome in outcomes {
                summary.files_scanned += 1;
                match outcome {
                    Ok(Some(writes)) => {
                        summary.files_parsed += 1;
                        batch.extend(writes);
                    }
                    Ok(None) => summary.files_unchanged += 1,
                    Err(ProcessOutcome::Skipped) => summary.files_skipped += 1,
                    Err(ProcessOutcome::Failed(message)) => {
                        warn!(error = %message, "file parse failed");
                        summary.errors.push(message);
                    }
                }
            }
            if !batch.is_empty() {
                summary.sessions_written += batch.len() as u64;
                target.write_batch(&batch)?;
            }
        }

        self.skip_cache
            .lock()
            .expect("skip cache mutex poisoned")
            .persist(target)?;
        Ok(summary)
    }

    /// Parses every candidate in `chunk` concurrently across
    /// `config.worker_pool_size` threads, preserving `chunk`'s order in the
    /// returned `Vec` (workers claim indices off a shared counter rather
    /// than splitting the slice, so a few slow files don't strand idle
    /// threads behind them).
    fn parse_batch(
        &self,
        chunk: &[Discovered],
        force: bool,
        target: &Storage,
    ) -> Vec<Result<Option<Vec<SessionWrite>>, ProcessOutcome>> {
        let next = AtomicUsize::new(0);
        let results: Vec<Mutex<Option<Result<Option<Vec<SessionWrite>>, ProcessOutcome>>>> =
            (0..chunk.len()).map(|_| Mutex::new(None)).collect();
        let workers = self.config.worker_pool_size.max(1).min(chunk.len().max(1));

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let i = next.fetch_add(1, Ordering::SeqCst);
                    let Some(item) = chunk.get(i) else { break };
                    let outcome = self.process_file(item, force, target);
                    *results[i].lock().expect("result slot poisoned") = Some(outcome);
                });
            }
        });

        results
            .into_iter()
            .map(|slot| slot.into_inner().expect("result slot poisoned").expect("every index visited"))
            .collect()
    }

    /// Returns `Ok(Some(writes))` if the file was (re)parsed and produced
    /// sessions to write, `Ok(None)` if it was unchanged and didn't need
    /// reparsing, or an `Err` explaining why it was skipped or failed.
    /// Safe to call concurrently: its only shared mutable state is the
    /// skip cache, locked for the duration of a single check or update.
    fn process_file(
        &self,
        item: &Discovered,
        force: bool,
        target: &Storage,
    ) -> Result<Option<Vec<SessionWrite>>, ProcessOutcome> {
        let path = &item.candidate.path;
        let path_str = path.to_string_lossy().to_string();

        let stat = chronicle_core::stat(path).map_err(|e| ProcessOutcome::Failed(e.to_string()))?;

        if !force {
            let skipped = self
                .skip_cache
                .lock()
                .expect("skip cache mutex poisoned")
                .should_skip(&path_str, stat.mtime_ns);
            if skipped {
                return Err(ProcessOutcome::Skipped);
            }
        }

        if !force {
            if let Ok(Some(existing)) = target.file_provenance(&path_str) {
                if existing.file_mtime_ns == stat.mtime_ns && existing.file_size == stat.size {
                    return Ok(None);
                }
            }
        }

        let fingerprint =
            chronicle_core::fingerprint(path).map_err(|e| ProcessOutcome::Failed(e.to_string()))?;

        match (item.entry.parse_fn)(path) {
            Ok(result) => {
                self.skip_cache
                    .lock()
                    .expect("skip cache mutex poisoned")
                    .clear_path(&path_str);
                if !result.diagnostics.notes.is_empty() {
                    debug!(path = %path_str, notes = ?result.diagnostics.notes, "parser diagnostics");
                }
                let provenance = FileProvenance {
                    file_path: path_str,
                    file_size: fingerprint.size,
                    file_mtime_ns: fingerprint.mtime_ns,
                    file_hash: fingerprint.hash,
                };
                let machine = chronicle_core::hostname();
                let writes = result
                    .sessions
                    .into_iter()
                    .map(|mut parsed| {
                        parsed.session.provenance = Some(provenance.clone());
                        parsed.session.machine = machine.clone();
                        SessionWrite {
                            session: parsed.session,
                            messages: parsed.messages,
                            tool_calls: parsed.tool_calls,
                        }
                    })
                    .collect();
                Ok(Some(writes))
            }
            Err(ParseError::EmptyParse(_)) | Err(ParseError::InputMalformed { .. }) => {
                self.skip_cache
                    .lock()
                    .expect("skip cache mutex poisoned")
                    .mark_skip(path_str, stat.mtime_ns);
                Err(ProcessOutcome::Skipped)
            }
            Err(other) => Err(ProcessOutcome::Failed(other.to_string())),
        }
    }
}

/// Wraps an `anyhow::Error` from inside a rebuild closure back into
/// `chronicle_storage::Error` so it can cross the `Storage::rebuild`
/// boundary, which (correctly) doesn't know about `anyhow`.
fn to_storage_error(err: anyhow::Error) -> chronicle_storage::Error {
    chronicle_storage::Error::Types(chronicle_types::Error::Other(err.to_string()))
}

enum ProcessOutcome {
    Skipped,
    Failed(String),
}

fn match_provider<'a>(
    home: &Path,
    config: &Config,
    path: &'a Path,
) -> Option<(&'static chronicle_providers::ProviderEntry, chronicle_providers::FileCandidate)> {
    for entry in chronicle_providers::registry() {
        if !config.is_enabled(entry) {
            continue;
        }
        for root in config.roots_for(entry, home) {
            if path.starts_with(&root) {
                let project = path
                    .parent()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "unknown".to_string());
                return Some((
                    entry,
                    chronicle_providers::FileCandidate {
                        path: path.to_path_buf(),
                        project,
                    },
                ));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_engine(dir: &std::path::Path) -> SyncEngine {
        let storage = Arc::new(
            Storage::open(dir.join("chronicle.db"), dir.join("cursor.secret")).unwrap(),
        );
        SyncEngine::new(storage, Config::default(), dir.to_path_buf()).unwrap()
    }

    #[test]
    fn sync_all_over_empty_home_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = new_engine(dir.path());
        let summary = engine.sync_all().unwrap();
        assert_eq!(summary.sessions_written, 0);
        assert_eq!(summary.files_scanned, 0);
    }

    #[test]
    fn sync_all_parses_a_claude_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let project_dir = dir.path().join(".claude/projects/demo");
        std::fs::create_dir_all(&project_dir).unwrap();
        let line = serde_json::json!({
            "uuid": "11111111-1111-1111-1111-111111111111",
            "parentUuid": null,
            "type": "user",
            "timestamp": "2024-01-01T00:00:00Z",
            "cwd": "/home/u/demo",
            "message": {"role": "user", "content": "hello"}
        });
        std::fs::write(project_dir.join("session.jsonl"), format!("{line}\n")).unwrap();

        let engine = new_engine(dir.path());
        let summary = engine.sync_all().unwrap();
        assert_eq!(summary.files_parsed, 1);
        assert!(summary.sessions_written >= 1);

        let second_pass = engine.sync_all().unwrap();
        assert_eq!(second_pass.files_parsed, 0);
        assert_eq!(second_pass.files_unchanged, 1);
    }
}
