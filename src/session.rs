//! Session state
//!
//! Which backend is active, what gets persisted so the next process can resume
//! it, and the folder-picker collaborator used to (re)grant local access.

pub mod store;

pub use store::{FileSessionStore, MemorySessionStore, SessionStore};

use crate::driver::DriverKind;
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the router stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Active(DriverKind),
    /// The stored local folder grant lapsed; the user must pick the folder again.
    RequiresReauthorization(DriverKind),
}

impl SessionState {
    pub fn mode(&self) -> Option<DriverKind> {
        match self {
            SessionState::Uninitialized => None,
            SessionState::Active(mode) | SessionState::RequiresReauthorization(mode) => Some(*mode),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active(_))
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Uninitialized => f.write_str("not connected"),
            SessionState::Active(mode) => write!(f, "active ({})", mode),
            SessionState::RequiresReauthorization(mode) => {
                write!(f, "requires reauthorization ({})", mode)
            }
        }
    }
}

/// Persisted session entries
///
/// Cloud sessions store nothing beyond the mode; the notes root is looked up
/// by name again on resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub mode: DriverKind,

    /// Previously granted local folder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_root: Option<PathBuf>,

    pub saved_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(mode: DriverKind, local_root: Option<PathBuf>) -> Self {
        Self {
            mode,
            local_root: match mode {
                DriverKind::Local => local_root,
                _ => None,
            },
            saved_at: Utc::now(),
        }
    }
}

/// Interactive folder selection. Fails with `AuthCancelled` when the user backs out.
#[async_trait]
pub trait FolderPicker: Send + Sync {
    /// Ask for a folder, offering `previous` when re-granting.
    async fn request_access(&self, previous: Option<&Path>) -> Result<PathBuf, StorageError>;
}

/// Picker answering with a path chosen up front (command line argument).
#[derive(Debug, Clone, Default)]
pub struct PresetFolderPicker {
    path: Option<PathBuf>,
}

impl PresetFolderPicker {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

#[async_trait]
impl FolderPicker for PresetFolderPicker {
    async fn request_access(&self, previous: Option<&Path>) -> Result<PathBuf, StorageError> {
        self.path
            .clone()
            .or_else(|| previous.map(Path::to_path_buf))
            .ok_or_else(|| StorageError::AuthCancelled("no folder chosen".to_string()))
    }
}
