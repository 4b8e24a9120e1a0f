use crate::config::Config;
use chronicle_providers::{registry, FileCandidate, ProviderEntry};
use std::path::Path;

/// One discovered file tagged with the provider entry that found it, so the
/// engine knows which `parse_fn` to call without re-dispatching on
/// extension or content.
pub struct Discovered {
    pub entry: &'static ProviderEntry,
    pub candidate: FileCandidate,
}

/// Walks every enabled agent's root directories and returns every candidate
/// file found, still unparsed.
pub fn discover_all(home: &Path, config: &Config) -> anyhow::Result<Vec<Discovered>> {
    let mut out = Vec::new();
    for entry in registry() {
        if !config.is_enabled(entry) {
            continue;
        }
        for root in config.roots_for(entry, home) {
            let candidates = (entry.discover_fn)(&root)?;
            out.extend(candidates.into_iter().map(|candidate| Discovered { entry, candidate }));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_all_skips_disabled_providers() {
        let dir = tempfile::tempdir().unwrap();
        let claude_dir = dir.path().join(".claude/projects/demo");
        std::fs::create_dir_all(&claude_dir).unwrap();
        std::fs::write(claude_dir.join("a.jsonl"), b"{}").unwrap();

        let mut config = Config::default();
        config.providers.insert(
            "claude".into(),
            crate::config::ProviderOverride {
                enabled: false,
                roots: vec![],
            },
        );

        let found = discover_all(dir.path(), &config).unwrap();
        assert!(found.iter().all(|d| d.entry.agent_tag != "claude"));
    }
}
