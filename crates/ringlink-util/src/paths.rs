//! Default paths for ringlink components
//!
//! Paths are user-writable by default:
//! - Socket: `$XDG_RUNTIME_DIR/ringlink/ringlink.sock` or `/tmp/ringlink-$USER/ringlink.sock`
//! - Data: `$XDG_DATA_HOME/ringlink` or `~/.local/share/ringlink`
//! - Config: `$XDG_CONFIG_HOME/ringlink/config.toml` or `~/.config/ringlink/config.toml`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const RINGLINK_SOCKET_ENV: &str = "RINGLINK_SOCKET";

/// Environment variable for overriding the data directory
pub const RINGLINK_DATA_DIR_ENV: &str = "RINGLINK_DATA_DIR";

const SOCKET_FILENAME: &str = "ringlink.sock";
const CONFIG_FILENAME: &str = "config.toml";
const APP_DIR: &str = "ringlink";

/// Get the default socket path.
///
/// Order of precedence:
/// 1. `$RINGLINK_SOCKET` environment variable (if set)
/// 2. `$XDG_RUNTIME_DIR/ringlink/ringlink.sock` (if XDG_RUNTIME_DIR is set)
/// 3. `/tmp/ringlink-$USER/ringlink.sock` (fallback)
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(RINGLINK_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Get the socket path without checking RINGLINK_SOCKET.
/// Used for config defaults where the env var is checked separately.
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$RINGLINK_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/ringlink` (if XDG_DATA_HOME is set)
/// 3. `~/.local/share/ringlink` (fallback)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(RINGLINK_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking RINGLINK_DATA_DIR.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Get the default service config file path.
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_path_contains_ringlink() {
        let path = socket_path_without_env();
        assert!(path.to_string_lossy().contains("ringlink"));
        assert!(path.to_string_lossy().ends_with(".sock"));
    }

    #[test]
    fn data_dir_contains_ringlink() {
        let path = data_dir_without_env();
        assert!(path.to_string_lossy().contains("ringlink"));
    }

    #[test]
    fn config_path_is_toml() {
        let path = default_config_path();
        assert!(path.to_string_lossy().contains("ringlink"));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("toml"));
    }
}
