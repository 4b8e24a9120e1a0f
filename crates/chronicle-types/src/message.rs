use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// One turn in a session's linearised conversation.
///
/// `ordinal` is assigned by the parser and is unique per session, starting
/// at 0 and contiguous; it is the authoritative ordering, not `timestamp`
/// (which may be missing or out of order for synthesised tool-result rows).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub session_id: String,
    pub ordinal: u32,
    pub role: Role,
    pub content: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub has_thinking: bool,
    pub has_tool_use: bool,
    pub content_length: u32,
}

impl Message {
    pub fn new(session_id: impl Into<String>, ordinal: u32, role: Role, content: String) -> Self {
        let content_length = content.len() as u32;
        Self {
            session_id: session_id.into(),
            ordinal,
            role,
            content,
            timestamp: None,
            has_thinking: false,
            has_tool_use: false,
            content_length,
        }
    }
}
