mod dag;
mod schema;

use crate::registry::FileCandidate;
use crate::util::walk_candidates;
use chronicle_core::LineReader;
use chronicle_types::{Diagnostics, Error, ParseResult, Result};
use std::path::Path;

const MAX_DEPTH: usize = 2;

pub(crate) fn discover(root: &Path) -> Result<Vec<FileCandidate>> {
    walk_candidates(root, MAX_DEPTH, "jsonl", |path| {
        path.parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string())
    })
}

pub(crate) fn parse(path: &Path) -> Result<ParseResult> {
    let reader = LineReader::open(path)?;
    let mut lines = Vec::new();
    for line in reader {
        lines.push(line?);
    }

    let mut diagnostics = Diagnostics::default();
    let sessions = dag::build(lines, &mut diagnostics);
    if sessions.is_empty() {
        return Err(Error::EmptyParse(path.to_path_buf()));
    }
    Ok(ParseResult {
        sessions,
        diagnostics,
    })
}
