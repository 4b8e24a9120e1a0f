mod schema;

use crate::registry::FileCandidate;
use crate::util::walk_candidates;
use chronicle_core::LineReader;
use chronicle_types::{
    Diagnostics, Error, Message, ParseResult, ParsedSession, Result, Role, Session, ToolCall,
    ToolCategory,
};
use chrono::Utc;
use schema::{MessageContent, ResponseItemRecord, SessionMetaRecord};
use std::collections::HashMap;
use std::path::Path;

const MAX_DEPTH: usize = 3;

pub(crate) fn discover(root: &Path) -> Result<Vec<FileCandidate>> {
    walk_candidates(root, MAX_DEPTH, "jsonl", |path| {
        path.parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string())
    })
}

fn role_of(raw: &str) -> Role {
    match raw {
        "user" => Role::User,
        "system" => Role::System,
        _ => Role::Assistant,
    }
}

/// Codex sessions are flat: one file, one session, no fork or sub-agent
/// splitting. Each line becomes at most one synthesised message.
pub(crate) fn parse(path: &Path) -> Result<ParseResult> {
    let mut reader = LineReader::open(path)?;
    let meta: SessionMetaRecord = reader
        .next()
        .transpose()?
        .and_then(|first| serde_json::from_str(&first).ok())
        .unwrap_or_default();

    let session_id = format!(
        "codex:{}",
        path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
    );
    let project = meta
        .cwd
        .as_deref()
        .map(crate::util::project_from_cwd)
        .unwrap_or_else(|| "unknown".to_string());

    let mut messages = Vec::new();
    let mut tool_calls = Vec::new();
    let mut tool_use_index: HashMap<String, usize> = HashMap::new();
    let mut ordinal: u32 = 0;
    let mut diagnostics = Diagnostics::default();
    let mut first_message: Option<String> = None;

    for line in reader {
        let line = line?;
        let record: ResponseItemRecord = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(_) => {
                diagnostics.push("skipped malformed json line");
                continue;
            }
        };
        match record {
            ResponseItemRecord::Message(payload) => {
                let text = payload
                    .content
                    .iter()
                    .filter_map(|c| match c {
                        MessageContent::InputText { text } | MessageContent::OutputText { text } => {
                            Some(text.as_str())
                        }
                        MessageContent::Unknown => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                if first_message.is_none() && payload.role == "user" {
                    first_message = Some(text.clone());
                }
                let mut message = Message::new(&session_id, ordinal, role_of(&payload.role), text);
                message.timestamp = payload
                    .timestamp
                    .as_deref()
                    .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
                    .map(|dt| dt.with_timezone(&Utc));
                ordinal += 1;
                messages.push(message);
            }
            ResponseItemRecord::Reasoning(payload) => {
                if payload.summary.is_empty() {
                    continue;
                }
                let mut message = Message::new(
                    &session_id,
                    ordinal,
                    Role::Assistant,
                    payload.summary.join("\n"),
                );
                message.has_thinking = true;
                ordinal += 1;
                messages.push(message);
            }
            ResponseItemRecord::FunctionCall(payload) | ResponseItemRecord::CustomToolCall(payload) => {
                let mut message = Message::new(
                    &session_id,
                    ordinal,
                    Role::Assistant,
                    format!("[tool call: {}]", payload.name),
                );
                message.has_tool_use = true;
                let message_ordinal = ordinal;
                ordinal += 1;
                messages.push(message);

                let category = ToolCategory::classify(&payload.name);
                let tool_call = ToolCall {
                    session_id: session_id.clone(),
                    message_ordinal,
                    tool_name: payload.name,
                    category,
                    tool_use_id: payload.call_id.clone(),
                    input_json: payload.arguments.map(|v| v.to_string()),
                    skill_name: None,
                    result_content_length: None,
                    subagent_session_id: None,
                };
                if let Some(call_id) = payload.call_id {
                    tool_use_index.insert(call_id, tool_calls.len());
                }
                tool_calls.push(tool_call);
            }
            ResponseItemRecord::FunctionCallOutput(payload)
            | ResponseItemRecord::CustomToolCallOutput(payload) => {
                let output_len = payload
                    .output
                    .as_ref()
                    .and_then(|v| v.as_str())
                    .map(|s| s.len() as u32)
                    .unwrap_or(0);
                if let Some(call_id) = &payload.call_id
                    && let Some(&idx) = tool_use_index.get(call_id)
                {
                    tool_calls[idx].result_content_length = Some(output_len);
                }
                let message = Message::new(
                    &session_id,
                    ordinal,
                    Role::Tool,
                    format!("[tool result, {output_len} bytes]"),
                );
                ordinal += 1;
                messages.push(message);
            }
            ResponseItemRecord::GhostSnapshot | ResponseItemRecord::Unknown => {}
        }
    }

    if messages.is_empty() {
        return Err(Error::EmptyParse(path.to_path_buf()));
    }

    let started_at = messages.first().and_then(|m| m.timestamp);
    let ended_at = messages.last().and_then(|m| m.timestamp);
    let session = Session {
        id: session_id,
        project,
        machine: String::new(),
        agent: "codex".to_string(),
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
            tool_calls,
        }],
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_fixture(dir: &Path, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.join("rollout-2026-07-28-abc123.jsonl");
        std::fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    #[test]
    fn parses_messages_and_correlates_tool_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(
            &dir.path(),
            &[
                r#"{"cwd":"/home/u/proj","originator":"codex_cli"}"#,
                r#"{"type":"message","role":"user","content":[{"type":"input_text","text":"fix the bug"}],"timestamp":"2026-07-28T10:00:00Z"}"#,
                r#"{"type":"reasoning","summary":["thinking about it"]}"#,
                r#"{"type":"function_call","name":"Bash","call_id":"call_1","arguments":{"command":"ls"}}"#,
                r#"{"type":"function_call_output","call_id":"call_1","output":"file1\nfile2"}"#,
                r#"{"type":"message","role":"assistant","content":[{"type":"output_text","text":"done"}],"timestamp":"2026-07-28T10:01:00Z"}"#,
            ],
        );

        let result = parse(&path).unwrap();
        assert_eq!(result.sessions.len(), 1);
        let parsed = &result.sessions[0];
        assert_eq!(parsed.session.project, "proj");
        assert_eq!(parsed.session.agent, "codex");
        assert_eq!(parsed.session.first_message.as_deref(), Some("fix the bug"));
        assert_eq!(parsed.messages.len(), 5);
        assert!(parsed.messages[1].has_thinking);
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].tool_name, "Bash");
        assert_eq!(parsed.tool_calls[0].result_content_length, Some(11));
        assert_eq!(parsed.session.started_at, parsed.messages[0].timestamp);
    }

    #[test]
    fn empty_transcript_is_empty_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir.path(), &[r#"{"cwd":"/home/u/proj"}"#]);
        let err = parse(&path).unwrap_err();
        assert!(matches!(err, Error::EmptyParse(_)));
    }
}
