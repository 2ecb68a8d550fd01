use super::SessionRecord;
use crate::error::StorageError;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

/// Key-value persistence of the active session.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<SessionRecord>, StorageError>;
    fn save(&self, record: &SessionRecord) -> Result<(), StorageError>;
    /// Forget the session. Clearing an empty store is not an error.
    fn clear(&self) -> Result<(), StorageError>;
}

/// Session persisted as a TOML file
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<SessionRecord>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| StorageError::from_io(e, self.path.display()))?;
        match toml::from_str(&content) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                // Treated as no session; the user selects a backend again.
                tracing::warn!("Ignoring unreadable session file {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    fn save(&self, record: &SessionRecord) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Config(format!(
                    "Failed to create session directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        let toml_content = toml::to_string_pretty(record)
            .map_err(|e| StorageError::Config(format!("Failed to serialize session: {}", e)))?;
        std::fs::write(&self.path, toml_content).map_err(|e| {
            StorageError::Config(format!(
                "Failed to write session to {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn clear(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::from_io(e, self.path.display())),
        }
    }
}

/// In-process session store
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    record: Mutex<Option<SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<SessionRecord>, StorageError> {
        Ok(self.record.lock().clone())
    }

    fn save(&self, record: &SessionRecord) -> Result<(), StorageError> {
        *self.record.lock() = Some(record.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        *self.record.lock() = None;
        Ok(())
    }
}
