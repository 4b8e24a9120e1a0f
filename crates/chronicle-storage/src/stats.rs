use crate::Result;
use rusqlite::Connection;

/// Top-level counts shown on the landing page. Root sessions only: forks
/// and sub-agent sessions are real rows (so joins and deletes work) but
/// aren't conversations a human started, so they're excluded here.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Stats {
    pub total_sessions: u64,
    pub total_messages: u64,
    pub total_projects: u64,
    pub total_machines: u64,
}

pub fn compute(conn: &Connection) -> Result<Stats> {
    let total_sessions: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sessions WHERE relationship_type IS NULL",
        [],
        |row| row.get(0),
    )?;
    let total_messages: i64 = conn.query_row(
        r#"
        SELECT COUNT(*) FROM messages m
        JOIN sessions s ON s.id = m.session_id
        WHERE s.relationship_type IS NULL
        "#,
        [],
        |row| row.get(0),
    )?;
    let total_projects: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT project) FROM sessions WHERE relationship_type IS NULL",
        [],
        |row| row.get(0),
    )?;
    let total_machines: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT machine) FROM sessions WHERE relationship_type IS NULL AND machine != ''",
        [],
        |row| row.get(0),
    )?;
    Ok(Stats {
        total_sessions: total_sessions as u64,
        total_messages: total_messages as u64,
        total_projects: total_projects as u64,
        total_machines: total_machines as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_forks_and_subagents_from_session_count() {
        let conn = Connection::open_in_memory().unwrap();
        crate::schema::create_all(&conn).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO sessions (id, project, machine, agent, created_at) VALUES
                ('root', 'p', 'm', 'claude', '2024-01-01T00:00:00Z'),
                ('root:fork:abc', 'p', 'm', 'claude', '2024-01-01T00:00:00Z');
            UPDATE sessions SET relationship_type = 'fork' WHERE id = 'root:fork:abc';
            "#,
        )
        .unwrap();
        let stats = compute(&conn).unwrap();
        assert_eq!(stats.total_sessions, 1);
    }
}
