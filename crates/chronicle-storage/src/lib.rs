//! Embedded relational storage for synced conversation history. One SQLite
//! file per machine, opened through separate read and write connection
//! pools so a long-running write transaction never blocks a page load.
//!
//! [`Storage`] is the façade every other crate talks to; the submodules
//! (`queries`, `fts`, `schema`, `pool`, ...) are private wiring only
//! reachable through it.

mod analytics;
mod chunk;
mod cursor;
mod error;
mod filter;
mod fts;
mod pool;
mod queries;
mod rebuild;
mod schema;
mod secret;
mod stats;

pub use analytics::{
    DayBucket, HourOfWeekBucket, ProjectBucket, ShapeBucket, Summary as AnalyticsSummary,
    ToolBucket, VelocityBucket,
};
pub use error::{Error, Result};
pub use filter::{pad_for_timezone, AnalyticsFilter, Page, SessionFilter};
pub use fts::SearchHit;
pub use queries::message::MinimapEntry;
pub use stats::Stats;

use chronicle_types::{Message, Session, SkipEntry, ToolCall};
use pool::PoolSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

/// One session's full write payload: the session row plus every message
/// and tool call belonging to it. `write_batch` commits a slice of these
/// in a single transaction, matching the sync engine's batch-of-100 commit
/// cadence.
pub struct SessionWrite {
    pub session: Session,
    pub messages: Vec<Message>,
    pub tool_calls: Vec<ToolCall>,
}

/// The embedded store. Cheap to clone-share: callers hand out `&Storage`
/// or wrap it in an `Arc` themselves, there's no internal `Arc<Self>`.
pub struct Storage {
    db_path: PathBuf,
    pools: RwLock<Arc<PoolSet>>,
    /// Pools retired by a rebuild's swap, kept alive until the process
    /// exits rather than closed: a reader that grabbed the old `Arc`
    /// moments before the swap keeps querying it to completion instead of
    /// being yanked mid-query.
    retired: Mutex<Vec<Arc<PoolSet>>>,
    cursor_secret: Vec<u8>,
}

impl Storage {
    /// Opens (creating if absent) the database at `db_path`, using
    /// `secret_path` to persist the HMAC key that signs pagination
    /// cursors. Does not check or act on schema currency — call
    /// [`Storage::needs_rebuild`] and drive [`Storage::rebuild`] yourself
    /// once at startup.
    pub fn open(db_path: impl Into<PathBuf>, secret_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let pool = PoolSet::open_default(&db_path)?;
        pool.with_write(|conn| schema::create_all(conn))?;
        let cursor_secret = secret::load_or_create(secret_path.as_ref())?;
        Ok(Self {
            db_path,
            pools: RwLock::new(Arc::new(pool)),
            retired: Mutex::new(Vec::new()),
            cursor_secret,
        })
    }

    fn current(&self) -> Arc<PoolSet> {
        self.pools.read().expect("pool lock poisoned").clone()
    }

    /// True if the schema predates a column the current code expects, in
    /// which case the database must be rebuilt rather than queried: old
    /// rows are missing data no migration can synthesize.
    pub fn needs_rebuild(&self) -> Result<bool> {
        self.current().with_read(|conn| schema::is_current(conn).map(|ok| !ok))
    }

    pub fn cursor_secret(&self) -> &[u8] {
        &self.cursor_secret
    }

    // ---- sessions ----------------------------------------------------

    pub fn upsert_session(&self, session: &Session) -> Result<()> {
        self.current()
            .with_write(|conn| queries::session::insert_or_update(conn, session))
    }

    pub fn get_session(&self, id: &str) -> Result<Option<Session>> {
        self.current().with_read(|conn| queries::session::get_by_id(conn, id))
    }

    /// The stored fingerprint for a source file, if any session was ever
    /// written with that `file_path`. Used by the sync engine to decide
    /// whether a discovered file needs to be reparsed.
    pub fn file_provenance(&self, file_path: &str) -> Result<Option<chronicle_types::FileProvenance>> {
        self.current()
            .with_read(|conn| queries::session::find_provenance_by_file_path(conn, file_path))
    }

    pub fn find_session_ids_by_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.current()
            .with_read(|conn| queries::session::find_by_prefix(conn, prefix))
    }

    /// Every session id whose provenance points at `file_path`: the watcher
    /// uses this to cascade a `deleted` filesystem event onto the sessions
    /// that file produced.
    pub fn find_session_ids_by_file_path(&self, file_path: &str) -> Result<Vec<String>> {
        self.current()
            .with_read(|conn| queries::session::find_ids_by_file_path(conn, file_path))
    }

    pub fn delete_sessions(&self, ids: &[String]) -> Result<usize> {
        self.current().with_write(|conn| queries::session::delete_many(conn, ids))
    }

    pub fn list_sessions(
        &self,
        filter: &SessionFilter,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page<Session>> {
        self.current()
            .with_read(|conn| queries::session::list(conn, filter, limit, cursor, &self.cursor_secret))
    }

    /// Writes a session and its full message/tool-call set in one
    /// transaction: the session row, its messages (delete-all then
    /// reinsert), and its tool calls (same), so a reader never observes a
    /// session whose messages haven't caught up yet.
    pub fn write_session(&self, write: &SessionWrite) -> Result<()> {
        self.current().with_write_tx(|tx| {
            queries::session::insert_or_update(tx, &write.session)?;
            queries::message::replace_session_messages(tx, &write.session.id, &write.messages)?;
            queries::tool_call::replace_session_tool_calls(tx, &write.session.id, &write.tool_calls)?;
            Ok(())
        })
    }

    /// Commits a batch of session writes in a single transaction. The
    /// sync engine calls this once per batch of (by default) 100 parsed
    /// sessions rather than once per session, so a crash mid-sync loses at
    /// most one batch's worth of work instead of corrupting partial state.
    pub fn write_batch(&self, batch: &[SessionWrite]) -> Result<()> {
        self.current().with_write_tx(|tx| {
            for write in batch {
                queries::session::insert_or_update(tx, &write.session)?;
                queries::message::replace_session_messages(tx, &write.session.id, &write.messages)?;
                queries::tool_call::replace_session_tool_calls(
                    tx,
                    &write.session.id,
                    &write.tool_calls,
                )?;
            }
            Ok(())
        })
    }

    // ---- messages / tool calls ----------------------------------------

    pub fn get_messages(
        &self,
        session_id: &str,
        from_ordinal: u32,
        limit: usize,
        ascending: bool,
    ) -> Result<Vec<Message>> {
        self.current().with_read(|conn| {
            queries::message::get_messages(conn, session_id, from_ordinal, limit, ascending)
        })
    }

    pub fn get_minimap(&self, session_id: &str, from_ordinal: u32) -> Result<Vec<MinimapEntry>> {
        self.current()
            .with_read(|conn| queries::message::get_minimap(conn, session_id, from_ordinal))
    }

    pub fn tool_calls_for_message(&self, session_id: &str, ordinal: u32) -> Result<Vec<ToolCall>> {
        self.current()
            .with_read(|conn| queries::tool_call::for_message(conn, session_id, ordinal))
    }

    pub fn tool_calls_for_session(&self, session_id: &str) -> Result<Vec<ToolCall>> {
        self.current()
            .with_read(|conn| queries::tool_call::for_session(conn, session_id))
    }

    // ---- skip cache -----------------------------------------------------

    pub fn replace_skip_cache(&self, entries: &[SkipEntry]) -> Result<()> {
        self.current()
            .with_write(|conn| queries::skip::replace_all(conn, entries))
    }

    pub fn load_skip_cache(&self) -> Result<Vec<SkipEntry>> {
        self.current().with_read(queries::skip::load_all)
    }

    // ---- search / stats / analytics -------------------------------------

    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        self.current().with_read(|conn| fts::search(conn, query, limit))
    }

    /// Runtime probe for whether full-text search is currently available
    /// (§4.9's `HasFTS()`). Callers that want to disable the search UI
    /// gracefully rather than handling `Error::FTSUnavailable` can check
    /// this first.
    pub fn has_fts(&self) -> Result<bool> {
        self.current().with_read(|conn| Ok(fts::has_fts(conn)))
    }

    pub fn stats(&self) -> Result<Stats> {
        self.current().with_read(stats::compute)
    }

    pub fn analytics_summary(&self, filter: &AnalyticsFilter) -> Result<AnalyticsSummary> {
        self.current().with_read(|conn| analytics::summary(conn, filter))
    }

    pub fn analytics_activity(&self, filter: &AnalyticsFilter) -> Result<Vec<DayBucket>> {
        self.current().with_read(|conn| analytics::activity(conn, filter))
    }

    pub fn analytics_heatmap(&self, filter: &AnalyticsFilter) -> Result<Vec<DayBucket>> {
        self.analytics_activity(filter)
    }

    pub fn analytics_hour_of_week(&self, filter: &AnalyticsFilter) -> Result<Vec<HourOfWeekBucket>> {
        self.current().with_read(|conn| analytics::hour_of_week(conn, filter))
    }

    pub fn analytics_projects(&self, filter: &AnalyticsFilter) -> Result<Vec<ProjectBucket>> {
        self.current().with_read(|conn| analytics::projects(conn, filter))
    }

    pub fn analytics_session_shape(&self, filter: &AnalyticsFilter) -> Result<Vec<ShapeBucket>> {
        self.current().with_read(|conn| analytics::session_shape(conn, filter))
    }

    pub fn analytics_velocity(&self, filter: &AnalyticsFilter) -> Result<Vec<VelocityBucket>> {
        self.current().with_read(|conn| analytics::velocity(conn, filter))
    }

    pub fn analytics_tools(&self, filter: &AnalyticsFilter) -> Result<Vec<ToolBucket>> {
        self.current().with_read(|conn| analytics::tools(conn, filter))
    }

    pub fn analytics_top_sessions(
        &self,
        filter: &AnalyticsFilter,
        limit: usize,
    ) -> Result<Vec<Session>> {
        self.current()
            .with_read(|conn| analytics::top_sessions(conn, filter, limit))
    }

    // ---- destructive rebuild --------------------------------------------

    /// Rebuilds the whole database from scratch. `run_sync` is handed a
    /// fresh `Storage` backed by a sibling temp file with an empty,
    /// current schema and the FTS index's maintenance triggers dropped (so
    /// bulk inserts don't pay the per-row trigger cost); it should walk
    /// every known source file and write every session into that `Storage`,
    /// returning the number of sessions it wrote.
    ///
    /// On success the temp file is renamed over the live one and `self`
    /// starts serving it; the old pool is kept alive in `retired` rather
    /// than dropped, so queries already in flight against it finish
    /// cleanly. On a rebuild that writes zero sessions, the live database
    /// is left untouched and an error is returned instead.
    pub fn rebuild(&self, run_sync: impl FnOnce(&Storage) -> Result<u64>) -> Result<()> {
        let temp_path = rebuild::temp_path(&self.db_path);
        rebuild::clear_stale_temp(&temp_path)?;

        let temp_pool = PoolSet::open_default(&temp_path)?;
        temp_pool.with_write(|conn| schema::create_all(conn))?;
        temp_pool.with_write(|conn| fts::drop_all(conn))?;

        let temp_storage = Storage {
            db_path: temp_path.clone(),
            pools: RwLock::new(Arc::new(temp_pool)),
            retired: Mutex::new(Vec::new()),
            cursor_secret: self.cursor_secret.clone(),
        };

        let outcome = run_sync(&temp_storage).and_then(|count| {
            rebuild::guard_nonempty(count)?;
            let new_pool = temp_storage.current();
            new_pool.with_write(|conn| fts::rebuild(conn))?;
            new_pool.with_write(|conn| rebuild::copy_side_tables(conn, &self.db_path))?;
            new_pool.with_write(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })?;
            Ok(new_pool)
        });

        let new_pool = match outcome {
            Ok(pool) => pool,
            Err(err) => {
                let _ = rebuild::clear_stale_temp(&temp_path);
                return Err(err);
            }
        };

        rebuild::swap_files(&self.db_path, &temp_path)?;

        let mut guard = self.pools.write().expect("pool lock poisoned");
        let old = std::mem::replace(&mut *guard, new_pool);
        drop(guard);
        self.retired.lock().expect("retired lock poisoned").push(old);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_types::Role;

    fn open_storage(dir: &std::path::Path) -> Storage {
        Storage::open(dir.join("chronicle.db"), dir.join("cursor.secret")).unwrap()
    }

    fn sample_session(id: &str) -> Session {
        Session {
            id: id.to_string(),
            project: "proj".into(),
            machine: "box".into(),
            agent: "claude".into(),
            first_message: Some("hi".into()),
            started_at: None,
            ended_at: None,
            message_count: 1,
            parent_session_id: None,
            relationship_type: None,
            provenance: None,
            created_at: chrono::DateTime::from_timestamp(0, 0).unwrap(),
        }
    }

    #[test]
    fn write_batch_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(dir.path());
        let session = sample_session("s1");
        let message = Message::new("s1", 0, Role::User, "hello".into());
        storage
            .write_batch(&[SessionWrite {
                session: session.clone(),
                messages: vec![message],
                tool_calls: vec![],
            }])
            .unwrap();

        let fetched = storage.get_session("s1").unwrap().unwrap();
        assert_eq!(fetched.project, "proj");
        let messages = storage.get_messages("s1", 0, 10, true).unwrap();
        assert_eq!(messages.len(), 1);

        let stats = storage.stats().unwrap();
        assert_eq!(stats.total_sessions, 1);
    }

    #[test]
    fn rebuild_swaps_to_freshly_synced_database() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(dir.path());
        storage
            .write_batch(&[SessionWrite {
                session: sample_session("old"),
                messages: vec![],
                tool_calls: vec![],
            }])
            .unwrap();

        storage
            .rebuild(|fresh| {
                fresh
                    .write_batch(&[SessionWrite {
                        session: sample_session("new"),
                        messages: vec![],
                        tool_calls: vec![],
                    }])
                    .unwrap();
                Ok(1)
            })
            .unwrap();

        assert!(storage.get_session("new").unwrap().is_some());
        assert!(storage.get_session("old").unwrap().is_none());
    }

    #[test]
    fn rebuild_aborts_and_keeps_live_db_on_empty_sync() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(dir.path());
        storage
            .write_batch(&[SessionWrite {
                session: sample_session("keep-me"),
                messages: vec![],
                tool_calls: vec![],
            }])
            .unwrap();

        let result = storage.rebuild(|_fresh| Ok(0));
        assert!(result.is_err());
        assert!(storage.get_session("keep-me").unwrap().is_some());
    }
}
