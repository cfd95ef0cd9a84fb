//! Path utilities for cross-platform support

use std::path::{Path, PathBuf};

/// File name of the client signing key inside the keystore directory
const KEYFILE_NAME: &str = "client.key";

/// Expand a path, replacing `~` with the user's home directory
///
/// # Examples
///
/// ```
/// use fetchcraft_keystore::expand_path;
/// use std::path::PathBuf;
///
/// let path = expand_path(&PathBuf::from("~/keys/client.key"));
/// assert!(!path.starts_with("~"));
/// ```
pub fn expand_path(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

/// Get the user's home directory
fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
}

/// Get the default keystore directory for the current platform
///
/// - macOS: `~/Library/Application Support/FetchCraft/keys`
/// - Linux: `$XDG_DATA_HOME/fetchcraft/keys` (or `~/.local/share/...`)
/// - Windows: `%APPDATA%\FetchCraft\keys`
pub fn default_keystore_dir() -> PathBuf {
    platform_dir("XDG_DATA_HOME", ".local/share").join("keys")
}

/// Default location of the client signing key
pub fn default_keyfile() -> PathBuf {
    default_keystore_dir().join(KEYFILE_NAME)
}

/// Get the default config directory for the current platform
///
/// - macOS: `~/Library/Application Support/FetchCraft`
/// - Linux: `$XDG_CONFIG_HOME/fetchcraft` (or `~/.config/...`)
/// - Windows: `%APPDATA%\FetchCraft`
pub fn default_config_dir() -> PathBuf {
    platform_dir("XDG_CONFIG_HOME", ".config")
}

/// Resolve the per-platform application directory. On Linux the XDG variable
/// wins, then `~/<linux_fallback>`.
#[allow(unused_variables)]
fn platform_dir(xdg_var: &str, linux_fallback: &str) -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        home_dir()
            .map(|h| h.join("Library/Application Support/FetchCraft"))
            .unwrap_or_else(|| PathBuf::from(".fetchcraft"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var(xdg_var)
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                home_dir()
                    .map(|h| h.join(linux_fallback))
                    .unwrap_or_else(|| PathBuf::from("."))
            })
            .join("fetchcraft")
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("FetchCraft")
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        home_dir()
            .map(|h| h.join(".fetchcraft"))
            .unwrap_or_else(|| PathBuf::from(".fetchcraft"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_path_no_tilde() {
        let path = PathBuf::from("/absolute/path");
        assert_eq!(expand_path(&path), path);
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/some/path");
        let expanded = expand_path(&path);
        assert!(!expanded.starts_with("~"));
        assert!(expanded.ends_with("some/path"));
    }

    #[test]
    fn test_default_keyfile() {
        let keyfile = default_keyfile();
        assert!(keyfile.ends_with("keys/client.key"));
    }

    #[test]
    fn test_default_config_dir() {
        let dir = default_config_dir();
        let dir_str = dir.to_string_lossy().to_lowercase();
        assert!(dir_str.contains("fetchcraft"));
    }
}
