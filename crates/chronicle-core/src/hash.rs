use chronicle_types::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// A file's `(size, mtime)` tuple plus a content hash, used by the sync
/// engine to decide whether a file needs to be re-parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFingerprint {
    pub size: u64,
    pub mtime_ns: i64,
    pub hash: String,
}

/// Cheap stat-only fingerprint fields, without reading file content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub mtime_ns: i64,
}

pub fn stat(path: &Path) -> Result<FileStat> {
    let meta = fs::metadata(path).map_err(|source| Error::FileUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let mtime_ns = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    Ok(FileStat {
        size: meta.len(),
        mtime_ns,
    })
}

/// Full fingerprint: stats the file, then hashes its content. Callers should
/// only call this when `stat` alone indicates the file may have changed,
/// since hashing large logs is comparatively expensive.
pub fn fingerprint(path: &Path) -> Result<FileFingerprint> {
    let st = stat(path)?;
    let content = fs::read(path).map_err(|source| Error::FileUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    let hash = format!("{:x}", hasher.finalize());
    Ok(FileFingerprint {
        size: st.size,
        mtime_ns: st.mtime_ns,
        hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_for_unchanged_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jsonl");
        std::fs::write(&path, b"hello world").unwrap();
        let a = fingerprint(&path).unwrap();
        let b = fingerprint(&path).unwrap();
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.size, 11);
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jsonl");
        std::fs::write(&path, b"one").unwrap();
        let a = fingerprint(&path).unwrap();
        std::fs::write(&path, b"two-longer").unwrap();
        let b = fingerprint(&path).unwrap();
        assert_ne!(a.hash, b.hash);
        assert_ne!(a.size, b.size);
    }
}
