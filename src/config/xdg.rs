//! Platform directories for notestore data, state and configuration.

use crate::error::StorageError;
use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> Result<ProjectDirs, StorageError> {
    ProjectDirs::from("", "", "notestore").ok_or_else(|| {
        StorageError::Config("Could not determine home directory (HOME not set)".to_string())
    })
}

/// Config home
///
/// Returns `$XDG_CONFIG_HOME` if set, otherwise defaults to `$HOME/.config`
pub fn config_home() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir));
        }
    }
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config"))
}

/// `$XDG_CONFIG_HOME/notestore/config.toml`
pub fn global_config_path() -> Option<PathBuf> {
    config_home().map(|dir| dir.join("notestore").join("config.toml"))
}

/// App-private data directory (the sandbox lives below it)
pub fn data_dir() -> Result<PathBuf, StorageError> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

/// State directory (session file, logs); falls back to the local data dir
/// on platforms without one.
pub fn state_dir() -> Result<PathBuf, StorageError> {
    let dirs = project_dirs()?;
    Ok(dirs
        .state_dir()
        .unwrap_or_else(|| dirs.data_local_dir())
        .to_path_buf())
}
