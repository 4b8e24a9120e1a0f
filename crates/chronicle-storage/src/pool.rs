use crate::Result;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

const DEFAULT_READ_POOL_SIZE: usize = 4;

/// A connected-and-configured set of pools for one database file. Swapping
/// databases (see `Storage::swap_in`) replaces this wholesale: readers
/// holding a clone of the old `Arc<PoolSet>` keep querying the retired file
/// until their query finishes and their clone drops, rather than being
/// yanked mid-query.
pub(crate) struct PoolSet {
    pub(crate) path: PathBuf,
    read: Vec<Mutex<Connection>>,
    read_cursor: AtomicUsize,
    write: Mutex<Connection>,
}

impl PoolSet {
    pub(crate) fn open(path: &Path, read_pool_size: usize) -> Result<Self> {
        let write = open_rw(path)?;
        let mut read = Vec::with_capacity(read_pool_size);
        for _ in 0..read_pool_size {
            read.push(Mutex::new(open_ro(path)?));
        }
        Ok(Self {
            path: path.to_path_buf(),
            read,
            read_cursor: AtomicUsize::new(0),
            write: Mutex::new(write),
        })
    }

    pub(crate) fn open_default(path: &Path) -> Result<Self> {
        Self::open(path, DEFAULT_READ_POOL_SIZE)
    }

    pub(crate) fn with_read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        if self.read.is_empty() {
            return self.with_write(f);
        }
        let idx = self.read_cursor.fetch_add(1, Ordering::Relaxed) % self.read.len();
        let conn = self.read[idx].lock().expect("read connection mutex poisoned");
        f(&conn)
    }

    pub(crate) fn with_write<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.write.lock().expect("write connection mutex poisoned");
        f(&conn)
    }

    pub(crate) fn with_write_tx<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.write.lock().expect("write connection mutex poisoned");
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        PRAGMA foreign_keys = ON;
        PRAGMA mmap_size = 268435456;
        PRAGMA cache_size = -64000;
        "#,
    )?;
    Ok(())
}

fn open_rw(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    apply_pragmas(&conn)?;
    Ok(conn)
}

fn open_ro(path: &Path) -> Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
        | OpenFlags::SQLITE_OPEN_URI;
    let conn = Connection::open_with_flags(path, flags)?;
    conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
    Ok(conn)
}
