mod schema;

use crate::registry::FileCandidate;
use crate::util::walk_candidates;
use chronicle_types::{
    Diagnostics, Error, Message, ParseResult, ParsedSession, Result, Role, Session,
};
use chrono::Utc;
use schema::GeminiSession;
use std::path::Path;

const MAX_DEPTH: usize = 3;

pub(crate) fn discover(root: &Path) -> Result<Vec<FileCandidate>> {
    walk_candidates(root, MAX_DEPTH, "json", |path| {
        path.parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string())
    })
}

fn role_of(raw: &str) -> Role {
    match raw {
        "user" => Role::User,
        "model" | "assistant" => Role::Assistant,
        "system" => Role::System,
        _ => Role::Tool,
    }
}

/// A Gemini session file holds its messages inline rather than as a stream
/// of records, so there is no DAG to reconstruct: it maps straight onto one
/// session.
pub(crate) fn parse(path: &Path) -> Result<ParseResult> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::FileUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed: GeminiSession = serde_json::from_str(&raw)
        .map_err(|e| Error::InputMalformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let mut diagnostics = Diagnostics::default();
    let session_id = format!("gemini:{}", parsed.session_id);
    let project = parsed.project_hash.clone().unwrap_or_else(|| "unknown".to_string());

    let mut messages = Vec::new();
    let mut first_message = None;
    for (ordinal, raw_message) in parsed.messages.into_iter().enumerate() {
        let Some(content) = raw_message.content else {
            diagnostics.push("skipped message with no content");
            continue;
        };
        if first_message.is_none() && raw_message.role == "user" {
            first_message = Some(content.clone());
        }
        let mut message = Message::new(&session_id, ordinal as u32, role_of(&raw_message.role), content);
        message.timestamp = raw_message
            .timestamp
            .as_deref()
            .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
            .map(|dt| dt.with_timezone(&Utc));
        messages.push(message);
    }

    if messages.is_empty() {
        return Err(Error::EmptyParse(path.to_path_buf()));
    }

    let started_at = parsed
        .start_time
        .as_deref()
        .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
        .map(|dt| dt.with_timezone(&Utc));
    let ended_at = parsed
        .last_updated
        .as_deref()
        .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let session = Session {
        id: session_id,
        project,
        machine: String::new(),
        agent: "gemini".to_string(),
        first_message,
        started_at,
        ended_at,
        message_count: messages.len() as u32,
        parent_session_id: None,
        relationship_type: None,
        provenance: None,
        created_at: Utc::now(),
    };

    Ok(ParseResult {
        sessions: vec![ParsedSession {
            session,
            messages,
            tool_calls: Vec::new(),
        }],
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inline_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.json");
        std::fs::write(
            &path,
            r#"{
                "sessionId": "abc-123",
                "projectHash": "myproject",
                "startTime": "2026-07-28T09:00:00Z",
                "lastUpdated": "2026-07-28T09:05:00Z",
                "messages": [
                    {"role": "user", "content": "hello", "timestamp": "2026-07-28T09:00:00Z"},
                    {"role": "model", "content": "hi there", "timestamp": "2026-07-28T09:01:00Z"},
                    {"role": "user", "content": null}
                ]
            }"#,
        )
        .unwrap();

        let result = parse(&path).unwrap();
        assert_eq!(result.sessions.len(), 1);
        let parsed = &result.sessions[0];
        assert_eq!(parsed.session.id, "gemini:abc-123");
        assert_eq!(parsed.session.project, "myproject");
        assert_eq!(parsed.session.first_message.as_deref(), Some("hello"));
        assert_eq!(parsed.messages.len(), 2);
        assert_eq!(parsed.messages[1].role, Role::Assistant);
        assert_eq!(result.diagnostics.notes.len(), 1);
    }

    #[test]
    fn no_usable_messages_is_empty_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.json");
        std::fs::write(&path, r#"{"sessionId": "abc", "messages": []}"#).unwrap();
        let err = parse(&path).unwrap_err();
        assert!(matches!(err, Error::EmptyParse(_)));
    }
}
