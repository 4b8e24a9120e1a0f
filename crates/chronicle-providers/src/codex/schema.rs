use serde::Deserialize;
use serde_json::Value;

/// First line of a Codex session file: metadata about where the session ran.
#[derive(Debug, Deserialize, Clone, Default)]
pub(crate) struct SessionMetaRecord {
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub originator: Option<String>,
    #[serde(default)]
    pub source: Option<SessionSource>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub(crate) enum SessionSource {
    Subagent { subagent: String },
    Cli(String),
}

/// Every subsequent line: one step of the transcript, tagged by `type`.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub(crate) enum ResponseItemRecord {
    Message(MessagePayload),
    Reasoning(ReasoningPayload),
    FunctionCall(FunctionCallPayload),
    FunctionCallOutput(FunctionCallOutputPayload),
    CustomToolCall(FunctionCallPayload),
    CustomToolCallOutput(FunctionCallOutputPayload),
    GhostSnapshot,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct MessagePayload {
    pub role: String,
    #[serde(default)]
    pub content: Vec<MessageContent>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub(crate) enum MessageContent {
    InputText { text: String },
    OutputText { text: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct ReasoningPayload {
    #[serde(default)]
    pub summary: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct FunctionCallPayload {
    pub name: String,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct FunctionCallOutputPayload {
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub output: Option<Value>,
}
