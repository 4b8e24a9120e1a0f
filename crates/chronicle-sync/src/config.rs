use chronicle_providers::ProviderEntry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Per-agent overrides layered on top of the registry defaults in
/// `chronicle-providers`: an agent can be disabled outright, or pointed at
/// roots other than its default `~/.agent/...` location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderOverride {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub roots: Vec<PathBuf>,
}

impl Default for ProviderOverride {
    fn default() -> Self {
        Self {
            enabled: true,
            roots: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_worker_pool_size() -> usize {
    8
}

fn default_batch_size() -> usize {
    100
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_periodic_sync_minutes() -> u64 {
    15
}

fn default_monitor_poll_ms() -> u64 {
    1500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Overrides `chronicle_core::resolve_data_dir`'s own search order when
    /// set; left `None` to use the default.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub providers: HashMap<String, ProviderOverride>,
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_periodic_sync_minutes")]
    pub periodic_sync_minutes: u64,
    #[serde(default = "default_monitor_poll_ms")]
    pub monitor_poll_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            providers: HashMap::new(),
            worker_pool_size: default_worker_pool_size(),
            batch_size: default_batch_size(),
            debounce_ms: default_debounce_ms(),
            periodic_sync_minutes: default_periodic_sync_minutes(),
            monitor_poll_ms: default_monitor_poll_ms(),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::default_path()?)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn default_path() -> anyhow::Result<PathBuf> {
        Ok(Self::resolved_data_dir_static(None).join("config.toml"))
    }

    fn resolved_data_dir_static(explicit: Option<&str>) -> PathBuf {
        chronicle_core::resolve_data_dir(explicit)
    }

    pub fn resolved_data_dir(&self) -> PathBuf {
        Self::resolved_data_dir_static(self.data_dir.as_ref().and_then(|p| p.to_str()))
    }

    pub fn db_path(&self) -> PathBuf {
        self.resolved_data_dir().join("chronicle.db")
    }

    pub fn cursor_secret_path(&self) -> PathBuf {
        self.resolved_data_dir().join("cursor.secret")
    }

    /// Whether `entry`'s provider is enabled: absent from `providers` means
    /// enabled by default.
    pub fn is_enabled(&self, entry: &ProviderEntry) -> bool {
        self.providers
            .get(entry.agent_tag)
            .map(|o| o.enabled)
            .unwrap_or(true)
    }

    /// Root directories to scan for `entry`: an explicit override in config
    /// wins, otherwise the registry's own default-or-env-var resolution.
    pub fn roots_for(&self, entry: &ProviderEntry, home: &Path) -> Vec<PathBuf> {
        if let Some(over) = self.providers.get(entry.agent_tag) {
            if !over.roots.is_empty() {
                return over.roots.clone();
            }
        }
        chronicle_providers::resolve_roots(entry, home)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let config = Config::default();
        assert_eq!(config.worker_pool_size, 8);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.debounce_ms, 500);
        assert_eq!(config.periodic_sync_minutes, 15);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.providers.insert(
            "claude".into(),
            ProviderOverride {
                enabled: false,
                roots: vec![PathBuf::from("/custom/claude")],
            },
        );
        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert!(!loaded.providers["claude"].enabled);
        assert_eq!(loaded.providers["claude"].roots, vec![PathBuf::from("/custom/claude")]);
    }

    #[test]
    fn load_nonexistent_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.worker_pool_size, 8);
    }
}
