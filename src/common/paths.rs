//! Configuration and log locations
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/bench-sequencer/`
//! - macOS: `~/Library/Application Support/bench-sequencer/`
//! - Windows: `%APPDATA%\bench-sequencer\`

use std::io;
use std::path::PathBuf;

/// Name of the application directories
const APP_NAME: &str = "bench-sequencer";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the path to the log directory
pub fn log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.data_dir().join("logs"))
}

/// Ensure the configuration directory exists
pub fn ensure_config_dir() -> io::Result<Option<PathBuf>> {
    if let Some(dir) = config_dir() {
        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(Some(dir))
    } else {
        Ok(None)
    }
}
