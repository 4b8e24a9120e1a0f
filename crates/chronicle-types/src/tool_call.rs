use serde::{Deserialize, Serialize};

/// Coarse classification of a tool invocation, derived from `tool_name` by a
/// fixed mapping table (see `chronicle-providers::classify_tool`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Read,
    Edit,
    Write,
    Bash,
    Grep,
    Glob,
    Task,
    Skill,
    Other,
}

impl ToolCategory {
    /// Classify a raw tool name into the coarse taxonomy. Unknown names
    /// (including provider-specific ones we don't special-case) fall through
    /// to `Other`.
    pub fn classify(tool_name: &str) -> Self {
        match tool_name {
            "Read" | "NotebookRead" => Self::Read,
            "Edit" | "MultiEdit" | "NotebookEdit" => Self::Edit,
            "Write" => Self::Write,
            "Bash" | "BashOutput" | "KillShell" => Self::Bash,
            "Grep" => Self::Grep,
            "Glob" => Self::Glob,
            "Task" => Self::Task,
            "Skill" => Self::Skill,
            _ => Self::Other,
        }
    }
}

/// A tool invocation attached to an assistant message, and the result (if
/// any) correlated back onto it by `tool_use_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub session_id: String,
    /// Ordinal of the owning message within the session.
    pub message_ordinal: u32,
    pub tool_name: String,
    pub category: ToolCategory,
    pub tool_use_id: Option<String>,
    pub input_json: Option<String>,
    pub skill_name: Option<String>,
    pub result_content_length: Option<u32>,
    /// Set when this call spawned a sub-agent session; points at that
    /// session's id.
    pub subagent_session_id: Option<String>,
}
