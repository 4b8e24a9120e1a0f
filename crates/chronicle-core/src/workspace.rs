use std::path::PathBuf;

/// Resolve the data directory path based on priority:
/// 1. Explicit path (with tilde expansion)
/// 2. `CHRONICLE_PATH` environment variable (with tilde expansion)
/// 3. System data directory (recommended default)
/// 4. `~/.chronicle` (fallback for systems without a standard data directory)
pub fn resolve_data_dir(explicit_path: Option<&str>) -> PathBuf {
    if let Some(path) = explicit_path {
        return expand_tilde(path);
    }

    if let Ok(env_path) = std::env::var("CHRONICLE_PATH") {
        return expand_tilde(&env_path);
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("chronicle");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".chronicle");
    }

    PathBuf::from(".chronicle")
}

/// Expand a leading `~/` in `path` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return PathBuf::from(home).join(stripped);
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_tilde_with_home() {
        unsafe {
            std::env::set_var("HOME", "/home/tester");
        }
        assert_eq!(expand_tilde("~/data"), PathBuf::from("/home/tester/data"));
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
    }

    #[test]
    fn resolve_data_dir_explicit_wins() {
        let resolved = resolve_data_dir(Some("/tmp/explicit"));
        assert_eq!(resolved, PathBuf::from("/tmp/explicit"));
    }
}
