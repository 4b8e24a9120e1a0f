use chronicle_storage::Storage;
use chronicle_types::SkipEntry;
use std::collections::HashMap;

/// In-memory mirror of the persisted skip cache (files that previously
/// failed to parse or yielded no usable session). Kept in memory for the
/// lifetime of a sync engine so a cycle doesn't pay a database round trip
/// per discovered file; persisted back as one atomic swap at the end of
/// each cycle via [`SkipCache::persist`].
#[derive(Debug, Default)]
pub struct SkipCache {
    entries: HashMap<String, i64>,
    dirty: bool,
}

impl SkipCache {
    pub fn load(storage: &Storage) -> anyhow::Result<Self> {
        let entries = storage
            .load_skip_cache()?
            .into_iter()
            .map(|e| (e.file_path, e.file_mtime_ns))
            .collect();
        Ok(Self {
            entries,
            dirty: false,
        })
    }

    /// True if `path` is cached as a skip at exactly `mtime_ns`: the file
    /// hasn't changed since it last failed to parse.
    pub fn should_skip(&self, path: &str, mtime_ns: i64) -> bool {
        self.entries.get(path) == Some(&mtime_ns)
    }

    pub fn mark_skip(&mut self, path: String, mtime_ns: i64) {
        if self.entries.insert(path, mtime_ns) != Some(mtime_ns) {
            self.dirty = true;
        }
    }

    /// Drops a path from the cache, e.g. once it parses successfully after
    /// previously failing.
    pub fn clear_path(&mut self, path: &str) {
        if self.entries.remove(path).is_some() {
            self.dirty = true;
        }
    }

    pub fn persist(&mut self, storage: &Storage) -> anyhow::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let entries: Vec<SkipEntry> = self
            .entries
            .iter()
            .map(|(file_path, file_mtime_ns)| SkipEntry {
                file_path: file_path.clone(),
                file_mtime_ns: *file_mtime_ns,
            })
            .collect();
        storage.replace_skip_cache(&entries)?;
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_skip_only_matches_exact_mtime() {
        let mut cache = SkipCache::default();
        cache.mark_skip("/a.jsonl".into(), 100);
        assert!(cache.should_skip("/a.jsonl", 100));
        assert!(!cache.should_skip("/a.jsonl", 101));
        assert!(!cache.should_skip("/b.jsonl", 100));
    }

    #[test]
    fn clear_path_makes_it_dirty_again() {
        let mut cache = SkipCache::default();
        cache.mark_skip("/a.jsonl".into(), 100);
        cache.dirty = false;
        cache.clear_path("/a.jsonl");
        assert!(cache.dirty);
        assert!(!cache.should_skip("/a.jsonl", 100));
    }
}
