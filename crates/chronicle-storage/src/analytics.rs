use crate::filter::{pad_for_timezone, AnalyticsFilter};
use crate::Result;
use chrono::{DateTime, Datelike, Timelike, Utc};
use rusqlite::{Connection, Row};
use std::collections::BTreeMap;

/// Builds the `WHERE` clause and bound values shared by every analytics
/// query: project/agent equality plus a UTC date range padded by
/// `pad_for_timezone` so no row that could fall in the caller's local day
/// is excluded before the per-row, timezone-aware bucketing in application
/// code narrows it precisely.
fn build_where(filter: &AnalyticsFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
    let mut clauses = vec!["1=1".to_string()];
    let mut bind: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(project) = &filter.project {
        clauses.push("project = ?".to_string());
        bind.push(Box::new(project.clone()));
    }
    if let Some(machine) = &filter.machine {
        clauses.push("machine = ?".to_string());
        bind.push(Box::new(machine.clone()));
    }
    if let Some(agent) = &filter.agent {
        clauses.push("agent = ?".to_string());
        bind.push(Box::new(agent.clone()));
    }
    if let Some(min_messages) = filter.min_messages {
        clauses.push("message_count >= ?".to_string());
        bind.push(Box::new(min_messages));
    }
    if let Some(max_messages) = filter.max_messages {
        clauses.push("message_count <= ?".to_string());
        bind.push(Box::new(max_messages));
    }
    if let Some(active_since) = filter.active_since {
        clauses.push("COALESCE(ended_at, started_at, created_at) >= ?".to_string());
        bind.push(Box::new(active_since.to_rfc3339()));
    }
    if let (Some(since), Some(until)) = (filter.since, filter.until) {
        let (padded_since, padded_until) = pad_for_timezone(since, until);
        clauses.push("COALESCE(started_at, created_at) BETWEEN ? AND ?".to_string());
        bind.push(Box::new(padded_since.to_rfc3339()));
        bind.push(Box::new(padded_until.to_rfc3339()));
    }
    (clauses.join(" AND "), bind)
}

fn refs(bind: &[Box<dyn rusqlite::ToSql>]) -> Vec<&dyn rusqlite::ToSql> {
    bind.iter().map(|b| b.as_ref()).collect()
}

/// `day_of_week`/`hour_of_day` can't be expressed against stored UTC
/// timestamps in SQL without the IANA zone SQLite doesn't have, so they're
/// applied here against an already-localized timestamp.
fn passes_day_hour_filter(local: &DateTime<chrono_tz::Tz>, filter: &AnalyticsFilter) -> bool {
    if let Some(days) = &filter.day_of_week
        && !days.contains(&local.weekday().num_days_from_monday())
    {
        return false;
    }
    if let Some(hours) = &filter.hour_of_day
        && !hours.contains(&local.hour())
    {
        return false;
    }
    true
}

/// Rows carrying just enough to bucket by local calendar day/hour in
/// application code, since SQLite has no IANA timezone database to do it
/// in SQL.
struct TimedRow {
    started_at: Option<DateTime<Utc>>,
    message_count: u32,
}

fn fetch_timed_rows(conn: &Connection, filter: &AnalyticsFilter) -> Result<Vec<TimedRow>> {
    let (where_clause, bind) = build_where(filter);
    let sql = format!(
        "SELECT started_at, created_at, message_count FROM sessions WHERE {where_clause}"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(refs(&bind).as_slice(), |row: &Row| {
            let started_at: Option<String> = row.get(0)?;
            let created_at: String = row.get(1)?;
            let ts = started_at
                .as_deref()
                .or(Some(created_at.as_str()))
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc));
            Ok(TimedRow {
                started_at: ts,
                message_count: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Summary {
    pub session_count: u64,
    pub message_count: u64,
    pub tool_call_count: u64,
    pub avg_messages_per_session: f64,
}

pub fn summary(conn: &Connection, filter: &AnalyticsFilter) -> Result<Summary> {
    let (where_clause, bind) = build_where(filter);
    let sql = format!(
        "SELECT COUNT(*), COALESCE(SUM(message_count), 0) FROM sessions WHERE {where_clause}"
    );
    let (session_count, message_count): (i64, i64) =
        conn.query_row(&sql, refs(&bind).as_slice(), |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;

    let tool_sql = format!(
        "SELECT COUNT(*) FROM tool_calls tc JOIN sessions s ON s.id = tc.session_id WHERE {where_clause}"
    );
    let tool_call_count: i64 = conn.query_row(&tool_sql, refs(&bind).as_slice(), |row| row.get(0))?;

    let avg = if session_count > 0 {
        message_count as f64 / session_count as f64
    } else {
        0.0
    };
    Ok(Summary {
        session_count: session_count as u64,
        message_count: message_count as u64,
        tool_call_count: tool_call_count as u64,
        avg_messages_per_session: avg,
    })
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DayBucket {
    pub date: String,
    pub session_count: u64,
    pub message_count: u64,
}

/// Sessions/messages bucketed by local calendar date in `filter.timezone`.
pub fn activity(conn: &Connection, filter: &AnalyticsFilter) -> Result<Vec<DayBucket>> {
    let rows = fetch_timed_rows(conn, filter)?;
    let mut buckets: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    for row in rows {
        let Some(ts) = row.started_at else { continue };
        let local = ts.with_timezone(&filter.timezone);
        if let (Some(since), Some(until)) = (filter.since, filter.until)
            && !(ts >= since && ts <= until)
        {
            continue;
        }
        if !passes_day_hour_filter(&local, filter) {
            continue;
        }
        let key = local.format("%Y-%m-%d").to_string();
        let entry = buckets.entry(key).or_default();
        entry.0 += 1;
        entry.1 += row.message_count as u64;
    }
    Ok(buckets
        .into_iter()
        .map(|(date, (session_count, message_count))| DayBucket {
            date,
            session_count,
            message_count,
        })
        .collect())
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HourOfWeekBucket {
    pub day_of_week: u32,
    pub hour: u32,
    pub session_count: u64,
}

/// Sessions aggregated into a 7x24 weekday/hour matrix in local time,
/// independent of calendar date — "when during a typical week does this
/// user work" rather than a day-by-day timeline (that's `activity`).
pub fn hour_of_week(conn: &Connection, filter: &AnalyticsFilter) -> Result<Vec<HourOfWeekBucket>> {
    let rows = fetch_timed_rows(conn, filter)?;
    let mut buckets: BTreeMap<(u32, u32), u64> = BTreeMap::new();
    for row in rows {
        let Some(ts) = row.started_at else { continue };
        if let (Some(since), Some(until)) = (filter.since, filter.until)
            && !(ts >= since && ts <= until)
        {
            continue;
        }
        let local = ts.with_timezone(&filter.timezone);
        if !passes_day_hour_filter(&local, filter) {
            continue;
        }
        let key = (local.weekday().num_days_from_monday(), local.hour());
        *buckets.entry(key).or_default() += 1;
    }
    Ok(buckets
        .into_iter()
        .map(|((day_of_week, hour), session_count)| HourOfWeekBucket {
            day_of_week,
            hour,
            session_count,
        })
        .collect())
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ProjectBucket {
    pub project: String,
    pub session_count: u64,
    pub message_count: u64,
    pub last_active: Option<String>,
}

pub fn projects(conn: &Connection, filter: &AnalyticsFilter) -> Result<Vec<ProjectBucket>> {
    let (where_clause, bind) = build_where(filter);
    let sql = format!(
        r#"
        SELECT project, COUNT(*), COALESCE(SUM(message_count), 0),
               MAX(COALESCE(ended_at, started_at, created_at))
        FROM sessions
        WHERE {where_clause}
        GROUP BY project
        ORDER BY COUNT(*) DESC
        "#
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(refs(&bind).as_slice(), |row| {
            Ok(ProjectBucket {
                project: row.get(0)?,
                session_count: row.get::<_, i64>(1)? as u64,
                message_count: row.get::<_, i64>(2)? as u64,
                last_active: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ShapeBucket {
    pub label: &'static str,
    pub count: u64,
}

/// Distribution of session length (message count), bucketed into coarse
/// bands. "Shape" in the sense of how a typical conversation grows, not
/// any structural graph property.
pub fn session_shape(conn: &Connection, filter: &AnalyticsFilter) -> Result<Vec<ShapeBucket>> {
    let (where_clause, bind) = build_where(filter);
    let sql = format!("SELECT message_count FROM sessions WHERE {where_clause}");
    let mut stmt = conn.prepare(&sql)?;
    let counts: Vec<u32> = stmt
        .query_map(refs(&bind).as_slice(), |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let bands: [(&'static str, u32, u32); 5] = [
        ("1-5", 1, 5),
        ("6-15", 6, 15),
        ("16-40", 16, 40),
        ("41-100", 41, 100),
        ("100+", 101, u32::MAX),
    ];
    let mut out = Vec::with_capacity(bands.len());
    for (label, lo, hi) in bands {
        let count = counts.iter().filter(|&&c| c >= lo && c <= hi).count() as u64;
        out.push(ShapeBucket { label, count });
    }
    Ok(out)
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct VelocityBucket {
    pub week_start: String,
    pub sessions_started: u64,
    pub messages_sent: u64,
}

/// Sessions-started and messages-sent per local-calendar week, oldest
/// first, useful for a "is this user's usage trending up" sparkline.
pub fn velocity(conn: &Connection, filter: &AnalyticsFilter) -> Result<Vec<VelocityBucket>> {
    let rows = fetch_timed_rows(conn, filter)?;
    let mut buckets: BTreeMap<chrono::NaiveDate, (u64, u64)> = BTreeMap::new();
    for row in rows {
        let Some(ts) = row.started_at else { continue };
        if let (Some(since), Some(until)) = (filter.since, filter.until)
            && !(ts >= since && ts <= until)
        {
            continue;
        }
        let local = ts.with_timezone(&filter.timezone);
        if !passes_day_hour_filter(&local, filter) {
            continue;
        }
        let week_start = local.date_naive() - chrono::Duration::days(local.weekday().num_days_from_monday() as i64);
        let entry = buckets.entry(week_start).or_default();
        entry.0 += 1;
        entry.1 += row.message_count as u64;
    }
    Ok(buckets
        .into_iter()
        .map(|(week_start, (sessions_started, messages_sent))| VelocityBucket {
            week_start: week_start.format("%Y-%m-%d").to_string(),
            sessions_started,
            messages_sent,
        })
        .collect())
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolBucket {
    pub tool_name: String,
    pub category: String,
    pub count: u64,
}

pub fn tools(conn: &Connection, filter: &AnalyticsFilter) -> Result<Vec<ToolBucket>> {
    let (where_clause, bind) = build_where(filter);
    let sql = format!(
        r#"
        SELECT tc.tool_name, tc.category, COUNT(*)
        FROM tool_calls tc
        JOIN sessions s ON s.id = tc.session_id
        WHERE {where_clause}
        GROUP BY tc.tool_name, tc.category
        ORDER BY COUNT(*) DESC
        "#
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(refs(&bind).as_slice(), |row| {
            Ok(ToolBucket {
                tool_name: row.get(0)?,
                category: row.get(1)?,
                count: row.get::<_, i64>(2)? as u64,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn top_sessions(
    conn: &Connection,
    filter: &AnalyticsFilter,
    limit: usize,
) -> Result<Vec<chronicle_types::Session>> {
    let (where_clause, bind) = build_where(filter);
    let sql = format!(
        "SELECT * FROM sessions WHERE {where_clause} ORDER BY message_count DESC LIMIT ?"
    );
    let mut all_bind = bind;
    all_bind.push(Box::new(limit as i64));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(refs(&all_bind).as_slice(), crate::queries::session::row_to_session)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn_with_schema() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::schema::create_all(&conn).unwrap();
        conn
    }

    #[test]
    fn session_shape_buckets_by_message_count() {
        let conn = conn_with_schema();
        conn.execute_batch(
            r#"
            INSERT INTO sessions (id, project, machine, agent, message_count, created_at) VALUES
                ('a', 'p', 'm', 'claude', 3, '2024-01-01T00:00:00Z'),
                ('b', 'p', 'm', 'claude', 50, '2024-01-01T00:00:00Z');
            "#,
        )
        .unwrap();
        let filter = AnalyticsFilter::default();
        let shape = session_shape(&conn, &filter).unwrap();
        assert_eq!(shape.iter().find(|b| b.label == "1-5").unwrap().count, 1);
        assert_eq!(shape.iter().find(|b| b.label == "41-100").unwrap().count, 1);
    }

    #[test]
    fn hour_of_week_respects_day_and_hour_filters() {
        let conn = conn_with_schema();
        conn.execute_batch(
            r#"
            INSERT INTO sessions (id, project, machine, agent, message_count, started_at, created_at) VALUES
                ('mon-9am', 'p', 'm', 'claude', 1, '2024-01-01T09:00:00Z', '2024-01-01T09:00:00Z'),
                ('tue-3pm', 'p', 'm', 'claude', 1, '2024-01-02T15:00:00Z', '2024-01-02T15:00:00Z');
            "#,
        )
        .unwrap();

        let filter = AnalyticsFilter {
            day_of_week: Some(vec![0]),
            ..AnalyticsFilter::default()
        };
        let buckets = hour_of_week(&conn, &filter).unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].day_of_week, 0);
        assert_eq!(buckets[0].hour, 9);

        let filter = AnalyticsFilter {
            hour_of_day: Some(vec![15]),
            ..AnalyticsFilter::default()
        };
        let buckets = hour_of_week(&conn, &filter).unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].hour, 15);
    }
}
