//! Default paths for underlampd components
//!
//! Paths are user-writable by default:
//! - Socket: `$XDG_RUNTIME_DIR/underlampd/underlampd.sock` or `/tmp/underlampd-$USER/underlampd.sock`
//! - Data: `$XDG_DATA_HOME/underlampd` or `~/.local/share/underlampd`
//! - Config: `$XDG_CONFIG_HOME/underlamp/config.toml` or `~/.config/underlamp/config.toml`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const UNDERLAMP_SOCKET_ENV: &str = "UNDERLAMP_SOCKET";

/// Environment variable for overriding the data directory
pub const UNDERLAMP_DATA_DIR_ENV: &str = "UNDERLAMP_DATA_DIR";

const SOCKET_FILENAME: &str = "underlampd.sock";
const APP_DIR: &str = "underlampd";
const CONFIG_DIR: &str = "underlamp";

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

/// Get the default socket path, honouring `$UNDERLAMP_SOCKET`.
pub fn default_socket_path() -> PathBuf {
    std::env::var(UNDERLAMP_SOCKET_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| socket_path_without_env())
}

/// Get the socket path without checking `$UNDERLAMP_SOCKET`.
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Get the default data directory, honouring `$UNDERLAMP_DATA_DIR`.
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(UNDERLAMP_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    home_dir()
        .map(|home| home.join(".local").join("share").join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("/tmp").join(APP_DIR).join("data"))
}

/// Get the default configuration file path.
pub fn default_config_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .ok()
        .or_else(|| home_dir().map(|home| home.join(".config")))
        .unwrap_or_else(|| PathBuf::from("/etc"));

    base.join(CONFIG_DIR).join("config.toml")
}
