use serde::{Deserialize, Serialize};

/// A `(path, mtime)` pair recorded for a file that failed to parse or
/// yielded no usable session, so later sync cycles skip it until it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipEntry {
    pub file_path: String,
    pub file_mtime_ns: i64,
}
