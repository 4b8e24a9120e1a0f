use crate::{Message, Session, ToolCall};
use serde::{Deserialize, Serialize};

/// Non-fatal observations a parser made while processing a file: dropped
/// edges, duplicate uuids, discarded fork candidates below threshold. Never
/// affects whether the parse succeeded; purely informational.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub notes: Vec<String>,
}

impl Diagnostics {
    pub fn push(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }
}

/// One session produced by a parser, with its messages and tool calls
/// already associated. Kept together so the sync engine can write a single
/// session's rows inside one transaction without cross-referencing back into
/// a flat parser output.
#[derive(Debug, Clone)]
pub struct ParsedSession {
    pub session: Session,
    pub messages: Vec<Message>,
    pub tool_calls: Vec<ToolCall>,
}

/// The result of parsing one source file. A file may yield more than one
/// session (root conversation plus any emitted forks or sub-agent splits).
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub sessions: Vec<ParsedSession>,
    pub diagnostics: Diagnostics,
}

impl ParseResult {
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
