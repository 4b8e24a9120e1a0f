use crate::Result;
use chronicle_types::SkipEntry;
use rusqlite::{params, Connection};

/// Replaces the entire skip-cache table in one transaction (delete-all then
/// reinsert), matching the spec's requirement that the persisted cache is
/// swapped atomically at the end of each sync cycle rather than patched
/// incrementally.
pub fn replace_all(conn: &Connection, entries: &[SkipEntry]) -> Result<()> {
    conn.execute("DELETE FROM skip_cache", [])?;
    let mut stmt =
        conn.prepare("INSERT INTO skip_cache (file_path, file_mtime_ns) VALUES (?1, ?2)")?;
    for entry in entries {
        stmt.execute(params![entry.file_path, entry.file_mtime_ns])?;
    }
    Ok(())
}

pub fn load_all(conn: &Connection) -> Result<Vec<SkipEntry>> {
    let mut stmt = conn.prepare("SELECT file_path, file_mtime_ns FROM skip_cache")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(SkipEntry {
                file_path: row.get(0)?,
                file_mtime_ns: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_all_is_atomic_swap() {
        let conn = Connection::open_in_memory().unwrap();
        crate::schema::create_all(&conn).unwrap();
        replace_all(
            &conn,
            &[SkipEntry {
                file_path: "/a.jsonl".into(),
                file_mtime_ns: 1,
            }],
        )
        .unwrap();
        replace_all(
            &conn,
            &[SkipEntry {
                file_path: "/b.jsonl".into(),
                file_mtime_ns: 2,
            }],
        )
        .unwrap();
        let loaded = load_all(&conn).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].file_path, "/b.jsonl");
    }
}
