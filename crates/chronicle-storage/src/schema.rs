use crate::Result;
use rusqlite::Connection;

/// Columns a healthy database must have. Checked on open; if any are
/// missing the database predates the current shape and is rebuilt from
/// scratch rather than migrated incrementally.
const REQUIRED_COLUMNS: &[(&str, &str)] = &[
    ("sessions", "relationship_type"),
    ("sessions", "parent_session_id"),
    ("sessions", "file_hash"),
    ("messages", "content_length"),
    ("tool_calls", "subagent_session_id"),
    ("skip_cache", "file_mtime_ns"),
];

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id                 TEXT PRIMARY KEY,
    project            TEXT NOT NULL,
    machine            TEXT NOT NULL,
    agent              TEXT NOT NULL,
    first_message      TEXT,
    started_at         TEXT,
    ended_at           TEXT,
    message_count      INTEGER NOT NULL DEFAULT 0,
    parent_session_id  TEXT REFERENCES sessions(id),
    relationship_type  TEXT,
    file_path          TEXT,
    file_size          INTEGER,
    file_mtime_ns      INTEGER,
    file_hash          TEXT,
    created_at         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project);
CREATE INDEX IF NOT EXISTS idx_sessions_started_at ON sessions(started_at DESC);
CREATE INDEX IF NOT EXISTS idx_sessions_parent ON sessions(parent_session_id);
CREATE INDEX IF NOT EXISTS idx_sessions_file_path ON sessions(file_path);

CREATE TABLE IF NOT EXISTS messages (
    session_id     TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    ordinal        INTEGER NOT NULL,
    role           TEXT NOT NULL,
    content        TEXT NOT NULL,
    timestamp      TEXT,
    has_thinking   INTEGER NOT NULL DEFAULT 0,
    has_tool_use   INTEGER NOT NULL DEFAULT 0,
    content_length INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (session_id, ordinal)
);
CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id);

CREATE TABLE IF NOT EXISTS tool_calls (
    session_id            TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    message_ordinal       INTEGER NOT NULL,
    tool_name             TEXT NOT NULL,
    category              TEXT NOT NULL,
    tool_use_id           TEXT,
    input_json            TEXT,
    skill_name            TEXT,
    result_content_length INTEGER,
    subagent_session_id   TEXT
);
CREATE INDEX IF NOT EXISTS idx_tool_calls_session ON tool_calls(session_id, message_ordinal);
CREATE INDEX IF NOT EXISTS idx_tool_calls_category ON tool_calls(category);
CREATE INDEX IF NOT EXISTS idx_tool_calls_tool_use_id ON tool_calls(tool_use_id);

CREATE TABLE IF NOT EXISTS skip_cache (
    file_path     TEXT PRIMARY KEY,
    file_mtime_ns INTEGER NOT NULL
);
"#;

pub(crate) fn create_all(conn: &Connection) -> Result<()> {
    conn.execute_batch(DDL)?;
    crate::fts::create(conn)?;
    Ok(())
}

/// True if every column the current code expects is present. A fresh
/// database and an up-to-date one both pass; anything older fails and
/// triggers a full rebuild rather than an in-place migration.
pub(crate) fn is_current(conn: &Connection) -> Result<bool> {
    for (table, column) in REQUIRED_COLUMNS {
        if !has_column(conn, table, column)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let found = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(std::result::Result::ok)
        .any(|name| name == column);
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_connection_is_current_after_create_all() {
        let conn = Connection::open_in_memory().unwrap();
        create_all(&conn).unwrap();
        assert!(is_current(&conn).unwrap());
    }

    #[test]
    fn missing_table_is_not_current() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(!is_current(&conn).unwrap());
    }
}
