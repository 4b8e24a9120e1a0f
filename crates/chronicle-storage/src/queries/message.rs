use crate::Result;
use chronicle_types::{Message, Role};
use rusqlite::{params, Connection, Row};

/// Deletes every message (and, via `ON DELETE CASCADE`, every tool call) for
/// `session_id`, then inserts `messages` in order. Called inside the same
/// write transaction as the owning session's upsert so a session's rows
/// never observe a half-written state.
pub fn replace_session_messages(
    conn: &Connection,
    session_id: &str,
    messages: &[Message],
) -> Result<()> {
    conn.execute("DELETE FROM messages WHERE session_id = ?1", params![session_id])?;
    let mut stmt = conn.prepare(
        r#"
        INSERT INTO messages (
            session_id, ordinal, role, content, timestamp,
            has_thinking, has_tool_use, content_length
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )?;
    for message in messages {
        stmt.execute(params![
            message.session_id,
            message.ordinal,
            role_to_str(message.role),
            message.content,
            message.timestamp.map(|t| t.to_rfc3339()),
            message.has_thinking,
            message.has_tool_use,
            message.content_length,
        ])?;
    }
    Ok(())
}

/// Ordered messages for `session_id` starting at `from_ordinal`, ascending
/// or descending, capped at `limit`.
pub fn get_messages(
    conn: &Connection,
    session_id: &str,
    from_ordinal: u32,
    limit: usize,
    ascending: bool,
) -> Result<Vec<Message>> {
    let (cmp, order) = if ascending {
        (">=", "ASC")
    } else {
        ("<=", "DESC")
    };
    let sql = format!(
        "SELECT * FROM messages WHERE session_id = ?1 AND ordinal {cmp} ?2 ORDER BY ordinal {order} LIMIT ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![session_id, from_ordinal, limit as i64], row_to_message)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Lightweight per-message summary used by the minimap view: just enough to
/// render a scrollbar-style overview without shipping full message bodies.
#[derive(Debug, Clone)]
pub struct MinimapEntry {
    pub ordinal: u32,
    pub role: Role,
    pub has_thinking: bool,
    pub has_tool_use: bool,
    pub content_length: u32,
}

pub fn get_minimap(conn: &Connection, session_id: &str, from_ordinal: u32) -> Result<Vec<MinimapEntry>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT ordinal, role, has_thinking, has_tool_use, content_length
        FROM messages
        WHERE session_id = ?1 AND ordinal >= ?2
        ORDER BY ordinal ASC
        "#,
    )?;
    let rows = stmt
        .query_map(params![session_id, from_ordinal], |row| {
            let role: String = row.get(1)?;
            Ok(MinimapEntry {
                ordinal: row.get(0)?,
                role: str_to_role(&role),
                has_thinking: row.get(2)?,
                has_tool_use: row.get(3)?,
                content_length: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_for_session(conn: &Connection, session_id: &str) -> Result<u32> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
        params![session_id],
        |row| row.get(0),
    )?;
    Ok(count as u32)
}

pub(crate) fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
        Role::Tool => "tool",
    }
}

fn str_to_role(raw: &str) -> Role {
    match raw {
        "user" => Role::User,
        "system" => Role::System,
        "tool" => Role::Tool,
        _ => Role::Assistant,
    }
}

fn row_to_message(row: &Row) -> rusqlite::Result<Message> {
    let role: String = row.get("role")?;
    let timestamp: Option<String> = row.get("timestamp")?;
    Ok(Message {
        session_id: row.get("session_id")?,
        ordinal: row.get("ordinal")?,
        role: str_to_role(&role),
        content: row.get("content")?,
        timestamp: timestamp.and_then(|s| {
            chrono::DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|d| d.with_timezone(&chrono::Utc))
        }),
        has_thinking: row.get("has_thinking")?,
        has_tool_use: row.get("has_tool_use")?,
        content_length: row.get("content_length")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_types::Message as M;

    fn conn_with_schema() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::schema::create_all(&conn).unwrap();
        conn
    }

    #[test]
    fn replace_then_fetch_round_trips_ordinals() {
        let conn = conn_with_schema();
        conn.execute(
            "INSERT INTO sessions (id, project, machine, agent, created_at) VALUES ('s1','p','m','claude','2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        let msgs = vec![
            M::new("s1", 0, Role::User, "hi".into()),
            M::new("s1", 1, Role::Assistant, "hello".into()),
        ];
        replace_session_messages(&conn, "s1", &msgs).unwrap();
        let fetched = get_messages(&conn, "s1", 0, 10, true).unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].ordinal, 0);
        assert_eq!(fetched[1].ordinal, 1);
    }

    #[test]
    fn replace_clears_previous_messages() {
        let conn = conn_with_schema();
        conn.execute(
            "INSERT INTO sessions (id, project, machine, agent, created_at) VALUES ('s1','p','m','claude','2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        replace_session_messages(&conn, "s1", &[M::new("s1", 0, Role::User, "a".into())]).unwrap();
        replace_session_messages(&conn, "s1", &[M::new("s1", 0, Role::User, "b".into())]).unwrap();
        let fetched = get_messages(&conn, "s1", 0, 10, true).unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].content, "b");
    }
}
