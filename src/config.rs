//! Configuration
//!
//! `NotesConfig` is layered by [`ConfigLoader`]: built-in defaults, the global
//! `config.toml`, an optional explicit file, then `NOTESTORE__SECTION__KEY`
//! environment variables.

pub mod facade;
pub mod sources;
pub mod xdg;

pub use facade::ConfigLoader;

use crate::driver::cloud::http::{DRIVE_API_BASE, UPLOAD_API_BASE};
use crate::error::StorageError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotesConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub cloud: CloudConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub save: SaveConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Sandbox and local folder drivers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// App-private notes directory; `None` means the platform data dir
    #[serde(default)]
    pub sandbox_root: Option<PathBuf>,

    /// Extension stored notes carry on disk (without the dot)
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Use the filesystem's rename for rename and move
    #[serde(default = "default_true")]
    pub native_move: bool,

    /// List files without their content; it is read on first use
    #[serde(default)]
    pub lazy_content: bool,
}

fn default_extension() -> String {
    "md".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sandbox_root: None,
            extension: default_extension(),
            native_move: true,
            lazy_content: false,
        }
    }
}

impl StorageConfig {
    pub fn resolve_sandbox_root(&self) -> Result<PathBuf, StorageError> {
        match self.sandbox_root {
            Some(ref root) => Ok(root.clone()),
            None => Ok(xdg::data_dir()?.join("sandbox")),
        }
    }
}

/// Cloud driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Name of the top-level notes folder, matched case-insensitively
    #[serde(default = "default_root_folder_name")]
    pub root_folder_name: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_upload_base")]
    pub upload_base: String,

    /// Tokens this close to expiry are treated as expired
    #[serde(default = "default_token_expiry_skew_secs")]
    pub token_expiry_skew_secs: u64,

    /// Environment variable the bearer token is read from
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// List files without downloading them; each is fetched on first read
    #[serde(default)]
    pub lazy_content: bool,

    /// Downloads in flight during a full listing
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

fn default_root_folder_name() -> String {
    "Notes".to_string()
}

fn default_api_base() -> String {
    DRIVE_API_BASE.to_string()
}

fn default_upload_base() -> String {
    UPLOAD_API_BASE.to_string()
}

fn default_token_expiry_skew_secs() -> u64 {
    60
}

fn default_token_env() -> String {
    "NOTESTORE_DRIVE_TOKEN".to_string()
}

fn default_fetch_concurrency() -> usize {
    4
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            root_folder_name: default_root_folder_name(),
            api_base: default_api_base(),
            upload_base: default_upload_base(),
            token_expiry_skew_secs: default_token_expiry_skew_secs(),
            token_env: default_token_env(),
            lazy_content: false,
            fetch_concurrency: default_fetch_concurrency(),
        }
    }
}

impl CloudConfig {
    pub fn token_skew(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_expiry_skew_secs.min(i64::MAX as u64) as i64)
    }
}

/// Persisted session state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session file; `None` means `session.toml` in the platform state dir
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl SessionConfig {
    pub fn resolve_path(&self) -> Result<PathBuf, StorageError> {
        match self.path {
            Some(ref path) => Ok(path.clone()),
            None => Ok(xdg::state_dir()?.join("session.toml")),
        }
    }
}

/// Debounced saves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    750
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl SaveConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl NotesConfig {
    /// Reject settings no driver can work with.
    pub fn validate(&self) -> Result<(), StorageError> {
        let ext = &self.storage.extension;
        if ext.is_empty() || ext.contains('.') || ext.contains('/') || ext.contains('\\') {
            return Err(StorageError::Config(format!(
                "storage.extension must be a bare extension such as \"md\", got {:?}",
                ext
            )));
        }
        if self.cloud.root_folder_name.trim().is_empty() {
            return Err(StorageError::Config(
                "cloud.root_folder_name must not be empty".to_string(),
            ));
        }
        if self.cloud.fetch_concurrency == 0 {
            return Err(StorageError::Config(
                "cloud.fetch_concurrency must be at least 1".to_string(),
            ));
        }
        for (key, base) in [
            ("cloud.api_base", &self.cloud.api_base),
            ("cloud.upload_base", &self.cloud.upload_base),
        ] {
            if !(base.starts_with("https://") || base.starts_with("http://")) {
                return Err(StorageError::Config(format!(
                    "{} must be an http(s) URL, got {:?}",
                    key, base
                )));
            }
        }
        Ok(())
    }
}
