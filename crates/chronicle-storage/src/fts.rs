use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension};

const CREATE_FTS: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
    content,
    content = 'messages',
    content_rowid = 'rowid'
);

CREATE TRIGGER IF NOT EXISTS messages_fts_ai AFTER INSERT ON messages BEGIN
    INSERT INTO messages_fts(rowid, content) VALUES (new.rowid, new.content);
END;

CREATE TRIGGER IF NOT EXISTS messages_fts_ad AFTER DELETE ON messages BEGIN
    INSERT INTO messages_fts(messages_fts, rowid, content) VALUES ('delete', old.rowid, old.content);
END;

CREATE TRIGGER IF NOT EXISTS messages_fts_au AFTER UPDATE ON messages BEGIN
    INSERT INTO messages_fts(messages_fts, rowid, content) VALUES ('delete', old.rowid, old.content);
    INSERT INTO messages_fts(rowid, content) VALUES (new.rowid, new.content);
END;
"#;

pub(crate) fn create(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_FTS)?;
    Ok(())
}

/// Drops the index and its maintenance triggers so a bulk resync can
/// repopulate `messages` without paying the per-row trigger cost, then
/// `rebuild` recreates it in one pass.
pub(crate) fn drop_all(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DROP TRIGGER IF EXISTS messages_fts_ai;
        DROP TRIGGER IF EXISTS messages_fts_ad;
        DROP TRIGGER IF EXISTS messages_fts_au;
        DROP TABLE IF EXISTS messages_fts;
        "#,
    )?;
    Ok(())
}

/// Recreates the index and repopulates it from the current contents of
/// `messages` in a single pass, then restores the maintenance triggers.
pub(crate) fn rebuild(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
            content,
            content = 'messages',
            content_rowid = 'rowid'
        );
        "#,
    )?;
    conn.execute("INSERT INTO messages_fts(messages_fts) VALUES ('rebuild')", [])?;
    conn.execute_batch(
        r#"
        CREATE TRIGGER IF NOT EXISTS messages_fts_ai AFTER INSERT ON messages BEGIN
            INSERT INTO messages_fts(rowid, content) VALUES (new.rowid, new.content);
        END;
        CREATE TRIGGER IF NOT EXISTS messages_fts_ad AFTER DELETE ON messages BEGIN
            INSERT INTO messages_fts(messages_fts, rowid, content) VALUES ('delete', old.rowid, old.content);
        END;
        CREATE TRIGGER IF NOT EXISTS messages_fts_au AFTER UPDATE ON messages BEGIN
            INSERT INTO messages_fts(messages_fts, rowid, content) VALUES ('delete', old.rowid, old.content);
            INSERT INTO messages_fts(rowid, content) VALUES (new.rowid, new.content);
        END;
        "#,
    )?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub session_id: String,
    pub ordinal: u32,
    pub snippet: String,
}

/// Runtime probe for whether the FTS index exists and is queryable: a
/// negative result (index dropped mid-rebuild, or never created) means
/// search should be disabled gracefully rather than surfacing a raw SQL
/// error (§4.9).
pub(crate) fn has_fts(conn: &Connection) -> bool {
    conn.query_row("SELECT 1 FROM messages_fts LIMIT 1", [], |_| Ok(()))
        .optional()
        .is_ok()
}

pub fn search(conn: &Connection, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
    if !has_fts(conn) {
        return Err(Error::FTSUnavailable);
    }
    let mut stmt = conn.prepare(
        r#"
        SELECT m.session_id, m.ordinal, snippet(messages_fts, 0, '[', ']', '...', 12)
        FROM messages_fts
        JOIN messages m ON m.rowid = messages_fts.rowid
        WHERE messages_fts MATCH ?1
        ORDER BY rank
        LIMIT ?2
        "#,
    )?;
    let hits = stmt
        .query_map(rusqlite::params![query, limit as i64], |row| {
            Ok(SearchHit {
                session_id: row.get(0)?,
                ordinal: row.get(1)?,
                snippet: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE messages (rowid INTEGER PRIMARY KEY, session_id TEXT, ordinal INTEGER, content TEXT);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn search_fails_gracefully_without_index() {
        let conn = open_conn();
        assert!(!has_fts(&conn));
        let err = search(&conn, "hello", 10).unwrap_err();
        assert!(matches!(err, Error::FTSUnavailable));
    }

    #[test]
    fn search_finds_matching_message_once_index_exists() {
        let conn = open_conn();
        create(&conn).unwrap();
        conn.execute(
            "INSERT INTO messages (session_id, ordinal, content) VALUES ('s1', 0, 'hello world')",
            [],
        )
        .unwrap();
        assert!(has_fts(&conn));
        let hits = search(&conn, "hello", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].session_id, "s1");
    }

    #[test]
    fn has_fts_false_after_drop() {
        let conn = open_conn();
        create(&conn).unwrap();
        assert!(has_fts(&conn));
        drop_all(&conn).unwrap();
        assert!(!has_fts(&conn));
    }
}
