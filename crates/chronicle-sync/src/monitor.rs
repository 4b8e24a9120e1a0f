//! Session Monitor (C10): one polling loop per subscriber, watching a
//! single session's source file for changes and re-syncing just that
//! session when it moves. This is what the out-of-scope SSE transport
//! subscribes to for `WatchSession`; everything here is transport-agnostic,
//! a plain channel of [`MonitorEvent`].
//!
//! Independent monitors on the same session don't coordinate: each stats
//! the file on its own schedule. That's deliberate — a `stat` is cheap and
//! uncoordinated observers polling the same path don't interfere with one
//! another, so there's no shared cache to keep consistent.

use crate::engine::SyncEngine;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// The source file changed and the session was re-synced.
    Changed,
    /// The session's source file could not be resolved (e.g. the session
    /// was deleted from under the monitor); the loop exits after this.
    Gone,
}

/// A live poll loop for one `(session_id, subscriber)` pair. Dropping or
/// calling `stop` cancels the loop; it does not block waiting for the
/// thread's current poll cycle to finish, matching the "closes when the
/// subscriber context is cancelled" contract — the thread observes the
/// cancellation at its next `stat`, at most one `poll_interval` later.
pub struct SessionMonitor {
    cancelled: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl SessionMonitor {
    pub fn spawn(
        engine: Arc<SyncEngine>,
        session_id: String,
        poll_interval: Duration,
    ) -> (Self, Receiver<MonitorEvent>) {
        let (tx, rx) = channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancelled_for_thread = cancelled.clone();

        let handle = std::thread::Builder::new()
            .name(format!("chronicle-monitor-{session_id}"))
            .spawn(move || {
                let Ok(Some(path)) = engine.find_source_file(&session_id) else {
                    let _ = tx.send(MonitorEvent::Gone);
                    return;
                };
                let mut last = chronicle_core::stat(&path).ok();

                while !cancelled_for_thread.load(Ordering::Relaxed) {
                    std::thread::sleep(poll_interval);
                    if cancelled_for_thread.load(Ordering::Relaxed) {
                        break;
                    }

                    let current = match chronicle_core::stat(&path) {
                        Ok(stat) => stat,
                        Err(_) => {
                            let _ = tx.send(MonitorEvent::Gone);
                            return;
                        }
                    };

                    if Some(current) != last {
                        last = Some(current);
                        if engine.sync_single_session(&session_id).is_ok() {
                            debug!(%session_id, "monitor detected change, resynced");
                            if tx.send(MonitorEvent::Changed).is_err() {
                                return;
                            }
                        }
                    }
                }
            })
            .expect("spawning session monitor thread");

        (
            Self {
                cancelled,
                handle: Some(handle),
            },
            rx,
        )
    }

    pub fn stop(&mut self) {
        self.cancelled.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Source file path plus the monitor's configured poll interval, exposed so
/// callers (the HTTP/SSE collaborator) can decide whether a session is
/// watchable before spawning a monitor for it.
pub fn source_path_for(engine: &SyncEngine, session_id: &str) -> anyhow::Result<Option<PathBuf>> {
    engine.find_source_file(session_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use chronicle_storage::Storage;
    use std::time::Duration as StdDuration;

    fn new_engine(dir: &std::path::Path) -> Arc<SyncEngine> {
        let storage = Arc::new(
            Storage::open(dir.join("chronicle.db"), dir.join("cursor.secret")).unwrap(),
        );
        Arc::new(SyncEngine::new(storage, Config::default(), dir.to_path_buf()).unwrap())
    }

    #[test]
    fn monitor_reports_gone_for_unknown_session() {
        let dir = tempfile::tempdir().unwrap();
        let engine = new_engine(dir.path());
        let (mut monitor, rx) = SessionMonitor::spawn(
            engine,
            "claude:missing".to_string(),
            StdDuration::from_millis(20),
        );
        let event = rx.recv_timeout(StdDuration::from_secs(2)).unwrap();
        assert!(matches!(event, MonitorEvent::Gone));
        monitor.stop();
    }

    #[test]
    fn monitor_detects_file_change_and_resyncs() {
        let dir = tempfile::tempdir().unwrap();
        let project_dir = dir.path().join(".claude/projects/demo");
        std::fs::create_dir_all(&project_dir).unwrap();
        let path = project_dir.join("session.jsonl");
        let line = |uuid: &str, text: &str| {
            serde_json::json!({
                "uuid": uuid,
                "parentUuid": null,
                "type": "user",
                "timestamp": "2024-01-01T00:00:00Z",
                "cwd": "/home/u/demo",
                "message": {"role": "user", "content": text}
            })
            .to_string()
        };
        std::fs::write(&path, format!("{}\n", line("11111111-1111-1111-1111-111111111111", "hi"))).unwrap();

        let engine = new_engine(dir.path());
        engine.sync_all().unwrap();
        let session_id = "claude:11111111-1111-1111-1111-111111111111".to_string();
        assert!(engine.storage().get_session(&session_id).unwrap().is_some());

        let (mut monitor, rx) =
            SessionMonitor::spawn(engine.clone(), session_id.clone(), StdDuration::from_millis(20));

        std::thread::sleep(StdDuration::from_millis(30));
        std::fs::write(
            &path,
            format!(
                "{}\n{}\n",
                line("11111111-1111-1111-1111-111111111111", "hi"),
                line("22222222-2222-2222-2222-222222222222", "more")
            ),
        )
        .unwrap();

        let event = rx.recv_timeout(StdDuration::from_secs(2)).unwrap();
        assert!(matches!(event, MonitorEvent::Changed));
        monitor.stop();

        let session = engine.storage().get_session(&session_id).unwrap().unwrap();
        assert_eq!(session.message_count, 2);
    }
}
