use crate::registry::FileCandidate;
use chronicle_types::Result;
use std::path::Path;
use walkdir::WalkDir;

/// Walk `root` up to `max_depth`, yielding files whose name ends with
/// `extension` and whose size is non-zero. `project_for` derives the
/// project label for a candidate path (agent-specific: some embed project
/// in the directory name, others require peeking at file content).
pub fn walk_candidates(
    root: &Path,
    max_depth: usize,
    extension: &str,
    project_for: impl Fn(&Path) -> String,
) -> Result<Vec<FileCandidate>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in WalkDir::new(root)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().is_none_or(|e| e != extension) {
            continue;
        }
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            continue;
        }
        out.push(FileCandidate {
            path: path.to_path_buf(),
            project: project_for(path),
        });
    }
    Ok(out)
}

/// Derive a project label from a working directory path: the last
/// non-empty path component, or the whole string if it has none.
pub fn project_from_cwd(cwd: &str) -> String {
    Path::new(cwd)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| cwd.to_string())
}

/// A short, stable suffix derived from a uuid-like string, used to build
/// fork/subagent session ids without dragging the full uuid through the id.
pub fn short_suffix(id: &str) -> &str {
    let bytes = id.as_bytes();
    if bytes.len() <= 8 {
        id
    } else {
        std::str::from_utf8(&bytes[..8]).unwrap_or(id)
    }
}
