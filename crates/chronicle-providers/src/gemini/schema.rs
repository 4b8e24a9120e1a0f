use serde::Deserialize;

/// Unlike Claude/Codex, a Gemini session is one JSON object per file rather
/// than line-delimited records.
#[derive(Debug, Deserialize, Clone)]
pub(crate) struct GeminiSession {
    pub session_id: String,
    #[serde(default)]
    pub project_hash: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub messages: Vec<GeminiMessage>,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct GeminiMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}
