use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a session relates to the session that produced it.
///
/// Root sessions (direct file ingests) carry `None`; sessions split out of a
/// parent file by fork detection or sub-agent extraction carry the variant
/// that explains the split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Fork,
    Subagent,
}

/// Where a session's data came from on disk, and the fingerprint used to
/// decide whether it needs to be re-parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileProvenance {
    pub file_path: String,
    pub file_size: u64,
    pub file_mtime_ns: i64,
    pub file_hash: String,
}

/// A single logical conversation, as reconstructed by a provider parser.
///
/// `id` carries an agent-prefix (`claude:...`, `codex:...`, ...) so ids are
/// unique across providers without needing a shared namespace. Fork and
/// sub-agent sessions extend their parent's id with a `:fork:<uuid>` or
/// `:subagent:<uuid>` suffix (see `chronicle-providers`' Claude DAG parser).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub project: String,
    pub machine: String,
    pub agent: String,
    pub first_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub message_count: u32,
    pub parent_session_id: Option<String>,
    pub relationship_type: Option<RelationshipType>,
    pub provenance: Option<FileProvenance>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// True if `ended_at`/`started_at` are consistent with the session
    /// invariant `ended_at >= started_at` (vacuously true if either is absent).
    pub fn has_valid_time_range(&self) -> bool {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => end >= start,
            _ => true,
        }
    }

    pub fn is_root(&self) -> bool {
        self.relationship_type.is_none()
    }
}
