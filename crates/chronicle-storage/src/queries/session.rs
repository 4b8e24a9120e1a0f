use crate::filter::{Page, SessionFilter};
use crate::{chunk, cursor, Result};
use chronicle_types::{CursorPayload, FileProvenance, RelationshipType, Session};
use rusqlite::{params, Connection, OptionalExtension, Row};

pub fn insert_or_update(conn: &Connection, session: &Session) -> Result<()> {
    let (file_path, file_size, file_mtime_ns, file_hash) = match &session.provenance {
        Some(p) => (
            Some(p.file_path.clone()),
            Some(p.file_size as i64),
            Some(p.file_mtime_ns),
            Some(p.file_hash.clone()),
        ),
        None => (None, None, None, None),
    };
    conn.execute(
        r#"
        INSERT INTO sessions (
            id, project, machine, agent, first_message, started_at, ended_at,
            message_count, parent_session_id, relationship_type,
            file_path, file_size, file_mtime_ns, file_hash, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        ON CONFLICT(id) DO UPDATE SET
            project = ?2,
            machine = ?3,
            agent = ?4,
            first_message = ?5,
            started_at = ?6,
            ended_at = ?7,
            message_count = ?8,
            parent_session_id = ?9,
            relationship_type = ?10,
            file_path = ?11,
            file_size = ?12,
            file_mtime_ns = ?13,
            file_hash = ?14
        "#,
        params![
            session.id,
            session.project,
            session.machine,
            session.agent,
            session.first_message,
            session.started_at.map(|t| t.to_rfc3339()),
            session.ended_at.map(|t| t.to_rfc3339()),
            session.message_count,
            session.parent_session_id,
            session.relationship_type.map(relationship_to_str),
            file_path,
            file_size,
            file_mtime_ns,
            file_hash,
            session.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_by_id(conn: &Connection, id: &str) -> Result<Option<Session>> {
    conn.query_row(
        "SELECT * FROM sessions WHERE id = ?1",
        params![id],
        row_to_session,
    )
    .optional()
    .map_err(Into::into)
}

/// Looks up the stored fingerprint for a source file by path, using
/// `idx_sessions_file_path`. The sync engine calls this before reparsing a
/// discovered file: if size and mtime match, the file is unchanged since it
/// was last parsed and can be skipped without touching its content.
pub fn find_provenance_by_file_path(
    conn: &Connection,
    file_path: &str,
) -> Result<Option<FileProvenance>> {
    conn.query_row(
        "SELECT file_path, file_size, file_mtime_ns, file_hash FROM sessions WHERE file_path = ?1 LIMIT 1",
        params![file_path],
        |row| {
            Ok(FileProvenance {
                file_path: row.get(0)?,
                file_size: row.get::<_, i64>(1)? as u64,
                file_mtime_ns: row.get(2)?,
                file_hash: row.get(3)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

/// Every session id (root, fork, or sub-agent) whose provenance points at
/// `file_path`, used by the watcher to cascade a file deletion onto the
/// sessions it produced.
pub fn find_ids_by_file_path(conn: &Connection, file_path: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id FROM sessions WHERE file_path = ?1")?;
    let ids = stmt
        .query_map(params![file_path], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

pub fn find_by_prefix(conn: &Connection, prefix: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id FROM sessions WHERE id LIKE ?1 ORDER BY id LIMIT 2")?;
    let pattern = format!("{prefix}%");
    let ids = stmt
        .query_map(params![pattern], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

pub fn delete_many(conn: &Connection, ids: &[String]) -> Result<usize> {
    let mut deleted = 0;
    for batch in chunk::chunks(ids) {
        let placeholders = chunk::placeholders(batch.len());
        let sql = format!("DELETE FROM sessions WHERE id IN ({placeholders})");
        let params: Vec<&dyn rusqlite::ToSql> =
            batch.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
        deleted += conn.execute(&sql, params.as_slice())?;
    }
    Ok(deleted)
}

/// §8 boundary: `limit = 0` falls back to this.
const DEFAULT_LIMIT: usize = 200;
/// §8 boundary: anything above this is clamped down.
const MAX_LIMIT: usize = 500;

fn clamp_limit(limit: usize) -> usize {
    if limit == 0 {
        DEFAULT_LIMIT
    } else {
        limit.min(MAX_LIMIT)
    }
}

/// Lists sessions matching `filter`, newest first, cursor-paginated by
/// `(COALESCE(ended_at, started_at, created_at), id)`. `cursor` is the
/// opaque value returned as `next_cursor` on a previous page; `None` starts
/// from the top. `limit` is clamped to `[1, 500]`, defaulting to 200 when
/// given as 0 (§8).
#[allow(clippy::too_many_arguments)]
pub fn list(
    conn: &Connection,
    filter: &SessionFilter,
    limit: usize,
    cursor_str: Option<&str>,
    cursor_secret: &[u8],
) -> Result<Page<Session>> {
    let mut where_clauses: Vec<String> = Vec::new();
    let mut bind: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(project) = &filter.project {
        where_clauses.push("project = ?".to_string());
        bind.push(Box::new(project.clone()));
    }
    if let Some(machine) = &filter.machine {
        where_clauses.push("machine = ?".to_string());
        bind.push(Box::new(machine.clone()));
    }
    if let Some(agent) = &filter.agent {
        where_clauses.push("agent = ?".to_string());
        bind.push(Box::new(agent.clone()));
    }
    if let Some(rel) = filter.relationship_type {
        where_clauses.push("relationship_type = ?".to_string());
        bind.push(Box::new(relationship_to_str(rel).to_string()));
    }
    if let Some(since) = filter.since {
        where_clauses.push("COALESCE(started_at, created_at) >= ?".to_string());
        bind.push(Box::new(since.to_rfc3339()));
    }
    if let Some(until) = filter.until {
        where_clauses.push("COALESCE(started_at, created_at) <= ?".to_string());
        bind.push(Box::new(until.to_rfc3339()));
    }
    if let Some(min_messages) = filter.min_messages {
        where_clauses.push("message_count >= ?".to_string());
        bind.push(Box::new(min_messages));
    }
    if let Some(max_messages) = filter.max_messages {
        where_clauses.push("message_count <= ?".to_string());
        bind.push(Box::new(max_messages));
    }
    if let Some(active_since) = filter.active_since {
        where_clauses.push("COALESCE(ended_at, started_at, created_at) >= ?".to_string());
        bind.push(Box::new(active_since.to_rfc3339()));
    }

    let decoded_cursor: Option<CursorPayload> = cursor_str
        .map(|c| cursor::decode(c, cursor_secret))
        .transpose()?;

    // `total` counts rows matching the filter alone, before the cursor
    // predicate narrows the page. Computed once on the first page and
    // carried forward inside the cursor on every subsequent page, so
    // later pages don't pay for a full recount (§4.9). A legacy unsigned
    // cursor has its `total` zeroed on decode, so it falls through to a
    // fresh count same as a first page would.
    let base_where = if where_clauses.is_empty() {
        "1=1".to_string()
    } else {
        where_clauses.join(" AND ")
    };
    let total: u64 = match decoded_cursor.as_ref().map(|p| p.total) {
        Some(carried) if carried > 0 => carried,
        _ => {
            let count_sql = format!("SELECT COUNT(*) FROM sessions WHERE {base_where}");
            let param_refs: Vec<&dyn rusqlite::ToSql> = bind.iter().map(|p| p.as_ref()).collect();
            conn.query_row(&count_sql, param_refs.as_slice(), |row| row.get(0))?
        }
    };
    const SORT_EXPR: &str = "COALESCE(ended_at, started_at, created_at)";
    if let Some(payload) = &decoded_cursor {
        where_clauses.push(format!("({SORT_EXPR} < ? OR ({SORT_EXPR} = ? AND id < ?))"));
        bind.push(Box::new(payload.sort_key.clone()));
        bind.push(Box::new(payload.sort_key.clone()));
        bind.push(Box::new(payload.id.clone()));
    }
    let where_clause = if where_clauses.is_empty() {
        "1=1".to_string()
    } else {
        where_clauses.join(" AND ")
    };

    let limit = clamp_limit(limit);
    let sql = format!(
        "SELECT * FROM sessions WHERE {where_clause} ORDER BY {SORT_EXPR} DESC, id DESC LIMIT ?"
    );
    bind.push(Box::new(limit as i64 + 1));
    let param_refs: Vec<&dyn rusqlite::ToSql> = bind.iter().map(|p| p.as_ref()).collect();

    let mut stmt = conn.prepare(&sql)?;
    let mut items = stmt
        .query_map(param_refs.as_slice(), row_to_session)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let next_cursor = if items.len() > limit {
        items.truncate(limit);
        items.last().map(|s| {
            let sort_key = s
                .ended_at
                .or(s.started_at)
                .unwrap_or(s.created_at)
                .to_rfc3339();
            let payload = CursorPayload {
                sort_key,
                id: s.id.clone(),
                total,
            };
            cursor::encode(&payload, cursor_secret)
        })
    } else {
        None
    }
    .transpose()?;

    Ok(Page {
        items,
        next_cursor,
        total,
    })
}

fn relationship_to_str(rel: RelationshipType) -> &'static str {
    match rel {
        RelationshipType::Fork => "fork",
        RelationshipType::Subagent => "subagent",
    }
}

pub(crate) fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
    let relationship_type: Option<String> = row.get("relationship_type")?;
    let file_path: Option<String> = row.get("file_path")?;
    let provenance = file_path.map(|file_path| FileProvenance {
        file_path,
        file_size: row.get::<_, Option<i64>>("file_size").ok().flatten().unwrap_or(0) as u64,
        file_mtime_ns: row.get::<_, Option<i64>>("file_mtime_ns").ok().flatten().unwrap_or(0),
        file_hash: row.get::<_, Option<String>>("file_hash").ok().flatten().unwrap_or_default(),
    });
    Ok(Session {
        id: row.get("id")?,
        project: row.get("project")?,
        machine: row.get("machine")?,
        agent: row.get("agent")?,
        first_message: row.get("first_message")?,
        started_at: parse_ts(row, "started_at")?,
        ended_at: parse_ts(row, "ended_at")?,
        message_count: row.get("message_count")?,
        parent_session_id: row.get("parent_session_id")?,
        relationship_type: relationship_type.and_then(|s| match s.as_str() {
            "fork" => Some(RelationshipType::Fork),
            "subagent" => Some(RelationshipType::Subagent),
            _ => None,
        }),
        provenance,
        created_at: parse_ts(row, "created_at")?
            .unwrap_or_else(|| chrono::DateTime::from_timestamp(0, 0).expect("unix epoch is representable")),
    })
}

fn parse_ts(row: &Row, col: &str) -> rusqlite::Result<Option<chrono::DateTime<chrono::Utc>>> {
    let raw: Option<String> = row.get(col)?;
    Ok(raw.and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok().map(|d| d.with_timezone(&chrono::Utc))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::SessionFilter;
    use crate::Storage;

    fn session(id: &str, started_at: chrono::DateTime<chrono::Utc>) -> Session {
        Session {
            id: id.to_string(),
            project: "proj".into(),
            machine: "box".into(),
            agent: "claude".into(),
            first_message: None,
            started_at: Some(started_at),
            ended_at: None,
            message_count: 0,
            parent_session_id: None,
            relationship_type: None,
            provenance: None,
            created_at: started_at,
        }
    }

    #[test]
    fn total_is_carried_across_pages_without_recounting() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("c.db"), dir.path().join("secret")).unwrap();
        let base = chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        for i in 0..5 {
            storage
                .upsert_session(&session(&format!("s{i}"), base + chrono::Duration::minutes(i)))
                .unwrap();
        }

        let filter = SessionFilter::default();
        let first = storage.list_sessions(&filter, 2, None).unwrap();
        assert_eq!(first.total, 5);
        assert_eq!(first.items.len(), 2);
        let cursor = first.next_cursor.expect("more pages remain");

        let second = storage.list_sessions(&filter, 2, Some(&cursor)).unwrap();
        assert_eq!(second.total, 5);
        assert_eq!(second.items.len(), 2);
    }

    #[test]
    fn limit_zero_defaults_and_oversized_limit_clamps() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("c.db"), dir.path().join("secret")).unwrap();
        let base = chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        for i in 0..3 {
            storage
                .upsert_session(&session(&format!("s{i}"), base + chrono::Duration::minutes(i)))
                .unwrap();
        }

        let filter = SessionFilter::default();
        assert_eq!(clamp_limit(0), DEFAULT_LIMIT);
        assert_eq!(clamp_limit(10_000), MAX_LIMIT);

        let page = storage.list_sessions(&filter, 0, None).unwrap();
        assert_eq!(page.items.len(), 3);
    }

    #[test]
    fn sessions_with_null_started_at_are_paged_via_coalesced_sort_key() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("c.db"), dir.path().join("secret")).unwrap();
        let base = chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);

        // Every session has a NULL `started_at`/`ended_at`; only `created_at`
        // distinguishes them. Before the COALESCE fix, the cursor predicate
        // `(started_at < ? OR ...)` was NULL on every row here, so page two
        // always came back empty no matter how many sessions existed.
        for i in 0..4 {
            let mut s = session(&format!("s{i}"), base + chrono::Duration::minutes(i));
            s.started_at = None;
            s.ended_at = None;
            storage.upsert_session(&s).unwrap();
        }

        let filter = SessionFilter::default();
        let first = storage.list_sessions(&filter, 2, None).unwrap();
        assert_eq!(first.items.len(), 2);
        let cursor = first.next_cursor.expect("more pages remain");

        let second = storage.list_sessions(&filter, 2, Some(&cursor)).unwrap();
        assert_eq!(second.items.len(), 2);
        assert_eq!(second.total, 4);
    }

    #[test]
    fn filters_by_machine_and_message_count_range() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("c.db"), dir.path().join("secret")).unwrap();
        let base = chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);

        let mut laptop_small = session("small", base);
        laptop_small.machine = "laptop".into();
        laptop_small.message_count = 2;
        storage.upsert_session(&laptop_small).unwrap();

        let mut laptop_big = session("big", base + chrono::Duration::minutes(1));
        laptop_big.machine = "laptop".into();
        laptop_big.message_count = 40;
        storage.upsert_session(&laptop_big).unwrap();

        let mut desktop = session("desktop-session", base + chrono::Duration::minutes(2));
        desktop.machine = "desktop".into();
        desktop.message_count = 40;
        storage.upsert_session(&desktop).unwrap();

        let filter = SessionFilter {
            machine: Some("laptop".into()),
            min_messages: Some(10),
            ..Default::default()
        };
        let page = storage.list_sessions(&filter, 50, None).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, "big");
    }
}
