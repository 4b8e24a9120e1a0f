use crate::Result;
use chronicle_types::{ToolCall, ToolCategory};
use rusqlite::{params, Connection, Row};

/// Replaces the tool calls belonging to `session_id`. Called alongside
/// `message::replace_session_messages` inside the owning session's write
/// transaction; cascades automatically on session delete, but a re-parse
/// deletes+reinserts explicitly since the session row itself survives.
pub fn replace_session_tool_calls(
    conn: &Connection,
    session_id: &str,
    tool_calls: &[ToolCall],
) -> Result<()> {
    conn.execute("DELETE FROM tool_calls WHERE session_id = ?1", params![session_id])?;
    let mut stmt = conn.prepare(
        r#"
        INSERT INTO tool_calls (
            session_id, message_ordinal, tool_name, category, tool_use_id,
            input_json, skill_name, result_content_length, subagent_session_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )?;
    for tc in tool_calls {
        stmt.execute(params![
            tc.session_id,
            tc.message_ordinal,
            tc.tool_name,
            category_to_str(tc.category),
            tc.tool_use_id,
            tc.input_json,
            tc.skill_name,
            tc.result_content_length,
            tc.subagent_session_id,
        ])?;
    }
    Ok(())
}

pub fn for_message(conn: &Connection, session_id: &str, ordinal: u32) -> Result<Vec<ToolCall>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM tool_calls WHERE session_id = ?1 AND message_ordinal = ?2",
    )?;
    let rows = stmt
        .query_map(params![session_id, ordinal], row_to_tool_call)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// All tool calls for a session, keyed by the ordinal of their owning
/// message, so callers can attach them while walking `get_messages` output
/// without one query per message.
pub fn for_session(conn: &Connection, session_id: &str) -> Result<Vec<ToolCall>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM tool_calls WHERE session_id = ?1 ORDER BY message_ordinal ASC",
    )?;
    let rows = stmt
        .query_map(params![session_id], row_to_tool_call)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn category_to_str(category: ToolCategory) -> &'static str {
    match category {
        ToolCategory::Read => "read",
        ToolCategory::Edit => "edit",
        ToolCategory::Write => "write",
        ToolCategory::Bash => "bash",
        ToolCategory::Grep => "grep",
        ToolCategory::Glob => "glob",
        ToolCategory::Task => "task",
        ToolCategory::Skill => "skill",
        ToolCategory::Other => "other",
    }
}

fn str_to_category(raw: &str) -> ToolCategory {
    match raw {
        "read" => ToolCategory::Read,
        "edit" => ToolCategory::Edit,
        "write" => ToolCategory::Write,
        "bash" => ToolCategory::Bash,
        "grep" => ToolCategory::Grep,
        "glob" => ToolCategory::Glob,
        "task" => ToolCategory::Task,
        "skill" => ToolCategory::Skill,
        _ => ToolCategory::Other,
    }
}

fn row_to_tool_call(row: &Row) -> rusqlite::Result<ToolCall> {
    let category: String = row.get("category")?;
    Ok(ToolCall {
        session_id: row.get("session_id")?,
        message_ordinal: row.get("message_ordinal")?,
        tool_name: row.get("tool_name")?,
        category: str_to_category(&category),
        tool_use_id: row.get("tool_use_id")?,
        input_json: row.get("input_json")?,
        skill_name: row.get("skill_name")?,
        result_content_length: row.get("result_content_length")?,
        subagent_session_id: row.get("subagent_session_id")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn_with_schema() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::schema::create_all(&conn).unwrap();
        conn.execute(
            "INSERT INTO sessions (id, project, machine, agent, created_at) VALUES ('s1','p','m','claude','2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn
    }

    #[test]
    fn tool_call_session_id_matches_owning_message_session() {
        let conn = conn_with_schema();
        let tc = ToolCall {
            session_id: "s1".into(),
            message_ordinal: 0,
            tool_name: "Read".into(),
            category: ToolCategory::Read,
            tool_use_id: Some("tu1".into()),
            input_json: None,
            skill_name: None,
            result_content_length: None,
            subagent_session_id: None,
        };
        replace_session_tool_calls(&conn, "s1", std::slice::from_ref(&tc)).unwrap();
        let fetched = for_message(&conn, "s1", 0).unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].session_id, "s1");
    }
}
