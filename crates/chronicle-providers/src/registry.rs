use chronicle_types::{ParseResult, Result};
use std::path::{Path, PathBuf};

/// A file on disk that looks like it belongs to a given agent, discovered by
/// that agent's `discover_fn`, not yet parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    pub path: PathBuf,
    pub project: String,
}

/// One entry in the parser registry: everything the sync engine needs to
/// discover and parse files for a single agent, without the engine knowing
/// anything agent-specific. Adding a new agent means adding one entry plus
/// its two functions, nothing else.
pub struct ProviderEntry {
    pub agent_tag: &'static str,
    /// Directories to search relative to the home directory, in order, if
    /// no override applies.
    pub default_relative_dirs: &'static [&'static str],
    /// Environment variable that overrides the default roots (colon or
    /// semicolon separated, platform path-list convention).
    pub env_override_name: &'static str,
    /// Key this agent's root list is looked up under in the config file.
    pub config_key: &'static str,
    pub discover_fn: fn(&Path) -> Result<Vec<FileCandidate>>,
    pub parse_fn: fn(&Path) -> Result<ParseResult>,
}

pub fn registry() -> &'static [ProviderEntry] {
    &[
        ProviderEntry {
            agent_tag: "claude",
            default_relative_dirs: &[".claude/projects"],
            env_override_name: "CHRONICLE_CLAUDE_PATH",
            config_key: "claude",
            discover_fn: crate::claude::discover,
            parse_fn: crate::claude::parse,
        },
        ProviderEntry {
            agent_tag: "codex",
            default_relative_dirs: &[".codex/sessions"],
            env_override_name: "CHRONICLE_CODEX_PATH",
            config_key: "codex",
            discover_fn: crate::codex::discover,
            parse_fn: crate::codex::parse,
        },
        ProviderEntry {
            agent_tag: "gemini",
            default_relative_dirs: &[".gemini/tmp"],
            env_override_name: "CHRONICLE_GEMINI_PATH",
            config_key: "gemini",
            discover_fn: crate::gemini::discover,
            parse_fn: crate::gemini::parse,
        },
    ]
}

/// Resolve the root directories to scan for one registry entry: env override
/// wins outright, otherwise each default relative dir under `home`.
pub fn resolve_roots(entry: &ProviderEntry, home: &Path) -> Vec<PathBuf> {
    if let Ok(value) = std::env::var(entry.env_override_name) {
        return std::env::split_paths(&value).collect();
    }
    entry
        .default_relative_dirs
        .iter()
        .map(|rel| home.join(rel))
        .collect()
}

pub fn by_tag(tag: &str) -> Option<&'static ProviderEntry> {
    registry().iter().find(|e| e.agent_tag == tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_one_entry_per_agent_tag() {
        let tags: Vec<&str> = registry().iter().map(|e| e.agent_tag).collect();
        assert_eq!(tags, vec!["claude", "codex", "gemini"]);
    }

    #[test]
    fn resolve_roots_uses_default_when_no_env() {
        let entry = by_tag("claude").unwrap();
        unsafe {
            std::env::remove_var(entry.env_override_name);
        }
        let roots = resolve_roots(entry, Path::new("/home/u"));
        assert_eq!(roots, vec![PathBuf::from("/home/u/.claude/projects")]);
    }
}
