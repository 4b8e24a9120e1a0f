//! Cross-platform file-event source (C7): watches every enabled provider's
//! configured roots, debounces per-path bursts into a single coalesced
//! notification, and hands the result to a caller-supplied callback. The
//! periodic full-discovery sync and the destructive rebuild path don't
//! touch this module at all; it exists purely to react to changes between
//! those scheduled passes.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Renamed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => Some(ChangeKind::Renamed),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        _ => None,
    }
}

/// Watches a fixed set of root directories and calls `on_change` with a
/// coalesced batch of events once per debounce window. Multiple raw events
/// for the same path inside the window collapse into the most recent kind
/// (a `created` immediately followed by several `modified`s reaches the
/// callback as one `modified`).
pub struct Watcher {
    _inner: RecommendedWatcher,
    stop_tx: Sender<()>,
    worker: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl Watcher {
    pub fn new(
        roots: &[PathBuf],
        debounce: Duration,
        on_change: impl Fn(Vec<ChangeEvent>) + Send + 'static,
    ) -> notify::Result<Self> {
        let (fs_tx, fs_rx) = channel::<Event>();
        let (stop_tx, stop_rx) = channel::<()>();

        let mut inner = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let _ = fs_tx.send(event);
            }
            Err(err) => warn!(error = %err, "watcher error"),
        })?;

        for root in roots {
            if root.exists() {
                inner.watch(root, RecursiveMode::Recursive)?;
            }
        }

        let half_window = debounce / 2;
        let worker = std::thread::Builder::new()
            .name("chronicle-watcher".into())
            .spawn(move || {
                // Flushing holds `pending` exclusively for the duration of
                // the drain below; `on_change` must not call back into the
                // watcher (e.g. Watcher::new on the same roots) or it will
                // deadlock waiting on this same thread to return.
                let mut pending: HashMap<PathBuf, (ChangeKind, Instant)> = HashMap::new();
                loop {
                    match fs_rx.recv_timeout(half_window.max(Duration::from_millis(10))) {
                        Ok(event) => {
                            if let Some(kind) = classify(&event.kind) {
                                for path in event.paths {
                                    pending.insert(path, (kind, Instant::now()));
                                }
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }

                    if stop_rx.try_recv().is_ok() {
                        break;
                    }

                    let now = Instant::now();
                    let ready: Vec<PathBuf> = pending
                        .iter()
                        .filter(|(_, (_, seen))| now.duration_since(*seen) >= debounce)
                        .map(|(path, _)| path.clone())
                        .collect();
                    if ready.is_empty() {
                        continue;
                    }
                    let batch: Vec<ChangeEvent> = ready
                        .into_iter()
                        .filter_map(|path| {
                            pending.remove(&path).map(|(kind, _)| ChangeEvent { path, kind })
                        })
                        .collect();
                    debug!(count = batch.len(), "watcher flushing coalesced events");
                    on_change(batch);
                }
            })
            .expect("spawning watcher thread");

        Ok(Self {
            _inner: inner,
            stop_tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Stops the watcher, blocking until the debounce thread (and any timer
    /// it was mid-flush on) has fully exited. Safe to call more than once.
    pub fn stop(&self) {
        let mut guard = self.worker.lock().expect("watcher mutex poisoned");
        if let Some(handle) = guard.take() {
            let _ = self.stop_tx.send(());
            let _ = handle.join();
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Convenience used by the engine/CLI: every root across every enabled
/// provider, for a single `Watcher` spanning the whole configured set.
pub fn all_roots(home: &std::path::Path, config: &crate::config::Config) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    for entry in chronicle_providers::registry() {
        if !config.is_enabled(entry) {
            continue;
        }
        roots.extend(config.roots_for(entry, home));
    }
    roots
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn classify_maps_notify_kinds() {
        assert_eq!(classify(&EventKind::Create(notify::event::CreateKind::File)), Some(ChangeKind::Created));
        assert_eq!(classify(&EventKind::Remove(notify::event::RemoveKind::File)), Some(ChangeKind::Deleted));
        assert_eq!(classify(&EventKind::Any), None);
    }

    #[test]
    fn watcher_coalesces_rapid_writes_into_one_event() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel();
        let watcher = Watcher::new(
            std::slice::from_ref(&dir.path().to_path_buf()),
            Duration::from_millis(100),
            move |batch| {
                let _ = tx.send(batch);
            },
        )
        .unwrap();

        let file = dir.path().join("a.jsonl");
        for i in 0..5 {
            std::fs::write(&file, format!("line {i}")).unwrap();
            std::thread::sleep(Duration::from_millis(10));
        }

        let batch = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(batch.iter().any(|e| e.path.ends_with("a.jsonl")));
        watcher.stop();
    }
}
