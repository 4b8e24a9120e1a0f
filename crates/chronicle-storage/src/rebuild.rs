//! The destructive rebuild path triggered when `schema::is_current` comes
//! back false: the live database is never migrated in place, it's replaced
//! wholesale by a freshly-synced sibling file. This module holds the parts
//! of that dance that are pure filesystem/SQL plumbing; the orchestration
//! (opening pools, invoking the caller's resync closure, swapping the live
//! `Arc<PoolSet>`) lives in `Storage::rebuild`.

use crate::{Error, Result};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

/// The sibling path a rebuild stages into before it's renamed over the live
/// file. Lives next to the live database rather than in a temp directory so
/// the final `rename` is guaranteed to be on the same filesystem.
pub(crate) fn temp_path(live: &Path) -> PathBuf {
    let mut name = live
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "chronicle.db".into());
    name.push(".rebuild.tmp");
    live.with_file_name(name)
}

fn wal_sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

/// Removes any leftover temp file (and its `-wal`/`-shm`) from a rebuild
/// that crashed or was interrupted before it could rename over the live
/// database, so the next attempt starts from a clean slate.
pub(crate) fn clear_stale_temp(temp: &Path) -> Result<()> {
    for path in [
        temp.to_path_buf(),
        wal_sibling(temp, "-wal"),
        wal_sibling(temp, "-shm"),
    ] {
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Copies rows from side tables that the resync pass doesn't necessarily
/// repopulate from source files (currently just `skip_cache`) out of the
/// live database and into the freshly built one, via `ATTACH`. Run before
/// the swap, while both files still exist side by side.
pub(crate) fn copy_side_tables(new_conn: &Connection, live_path: &Path) -> Result<()> {
    if !live_path.exists() {
        return Ok(());
    }
    new_conn.execute(
        "ATTACH DATABASE ?1 AS old_db",
        params![live_path.to_string_lossy().to_string()],
    )?;
    let result = new_conn.execute(
        "INSERT OR IGNORE INTO skip_cache SELECT * FROM old_db.skip_cache",
        [],
    );
    new_conn.execute("DETACH DATABASE old_db", [])?;
    result?;
    Ok(())
}

/// Renames `temp` over `live`, first clearing `live`'s own WAL siblings so a
/// reader opening the renamed file never finds mismatched leftovers. Not
/// atomic with the pool swap itself, but `rename` within one filesystem is
/// atomic, and the `Storage` caller has already stopped handing out the old
/// `Arc<PoolSet>` to new callers by the time this runs.
pub(crate) fn swap_files(live: &Path, temp: &Path) -> Result<()> {
    for suffix in ["-wal", "-shm"] {
        let sibling = wal_sibling(live, suffix);
        if sibling.exists() {
            std::fs::remove_file(&sibling)?;
        }
    }
    std::fs::rename(temp, live)?;
    Ok(())
}

/// Guard tripped when a rebuild's resync pass produced zero sessions: almost
/// always a sign that the source roots were unreachable (disk unmounted,
/// permissions changed) rather than a genuinely empty history, so the
/// rebuild aborts and leaves the live database untouched.
pub(crate) fn guard_nonempty(session_count: u64) -> Result<()> {
    if session_count == 0 {
        return Err(Error::SchemaIncompatible(
            "rebuild produced zero sessions, aborting to avoid replacing a populated database with an empty one".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_path_is_a_sibling_with_tmp_suffix() {
        let live = Path::new("/data/chronicle.db");
        let temp = temp_path(live);
        assert_eq!(temp, Path::new("/data/chronicle.db.rebuild.tmp"));
    }

    #[test]
    fn guard_rejects_empty_rebuild() {
        assert!(guard_nonempty(0).is_err());
        assert!(guard_nonempty(1).is_ok());
    }
}
