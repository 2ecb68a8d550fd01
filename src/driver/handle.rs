//! Directory handles
//!
//! Hierarchical handle API the sandbox and local drivers are written against: every
//! directory or file is reached by descending one segment at a time from a root
//! handle. [`FsDirectory`] implements it over `tokio::fs`.

use crate::error::StorageError;
use crate::types::Timestamp;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Kind of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry of a directory listing
#[derive(Debug, Clone)]
pub struct HandleEntry {
    pub name: String,
    pub kind: EntryKind,
    pub modified: Option<Timestamp>,
}

/// Access grant of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    /// The grant lapsed or the target vanished; the user has to pick or allow again.
    Prompt,
    Denied,
}

#[async_trait]
pub trait DirectoryHandle: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    async fn entries(&self) -> Result<Vec<HandleEntry>, StorageError>;

    async fn entry(&self, name: &str) -> Result<Option<HandleEntry>, StorageError>;

    /// Child directory `name`; with `create` a missing directory is made, otherwise
    /// it is `NotFound`.
    async fn directory(
        &self,
        name: &str,
        create: bool,
    ) -> Result<Arc<dyn DirectoryHandle>, StorageError>;

    async fn read_file(&self, name: &str) -> Result<String, StorageError>;

    /// Write `content` to file `name`, truncating. Without `create` a missing file
    /// is `NotFound`. Returns the modification time.
    async fn write_file(
        &self,
        name: &str,
        content: &str,
        create: bool,
    ) -> Result<Timestamp, StorageError>;

    async fn remove_entry(&self, name: &str, recursive: bool) -> Result<(), StorageError>;

    async fn query_permission(&self) -> PermissionState;

    /// Whether [`DirectoryHandle::move_entry`] is available.
    fn supports_move(&self) -> bool {
        false
    }

    /// Native move of entry `name` into `destination` as `new_name`.
    async fn move_entry(
        &self,
        name: &str,
        _destination: &dyn DirectoryHandle,
        _new_name: &str,
    ) -> Result<(), StorageError> {
        Err(StorageError::Unsupported(format!(
            "native move of {} in {}",
            name,
            self.name()
        )))
    }

    /// Filesystem location backing this handle, if any.
    fn native_path(&self) -> Option<&Path> {
        None
    }
}

/// Directory handle backed by a real directory
#[derive(Debug, Clone)]
pub struct FsDirectory {
    path: PathBuf,
    name: String,
    native_move: bool,
}

impl FsDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            path,
            name,
            native_move: true,
        }
    }

    /// Toggle the native move capability (off forces the copy-then-delete path).
    pub fn with_native_move(mut self, enabled: bool) -> Self {
        self.native_move = enabled;
        self
    }

    /// Open an existing directory as a root handle.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| StorageError::from_io(e, path.display()))?;
        if !meta.is_dir() {
            return Err(StorageError::NotFound(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        Ok(Self::new(path))
    }

    /// Open a directory, creating it (and its parents) when missing.
    pub async fn open_or_create(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| StorageError::from_io(e, path.display()))?;
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn child(&self, name: &str) -> Result<PathBuf, StorageError> {
        crate::node::path::validate_name(name)?;
        Ok(self.path.join(name))
    }

    fn child_handle(&self, name: &str) -> Self {
        Self {
            path: self.path.join(name),
            name: name.to_string(),
            native_move: self.native_move,
        }
    }
}

fn modified_millis(meta: &std::fs::Metadata) -> Option<Timestamp> {
    meta.modified()
        .ok()
        .map(|t| chrono::DateTime::<chrono::Utc>::from(t).timestamp_millis())
}

fn entry_kind(meta: &std::fs::Metadata) -> EntryKind {
    if meta.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::File
    }
}

#[async_trait]
impl DirectoryHandle for FsDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn entries(&self) -> Result<Vec<HandleEntry>, StorageError> {
        let mut reader = tokio::fs::read_dir(&self.path)
            .await
            .map_err(|e| StorageError::from_io(e, self.path.display()))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| StorageError::from_io(e, self.path.display()))?
        {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!("Skipping non UTF8 entry {:?} in {}", raw, self.path.display());
                    continue;
                }
            };
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(e) => {
                    warn!("Failed to stat {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            entries.push(HandleEntry {
                name,
                kind: entry_kind(&meta),
                modified: modified_millis(&meta),
            });
        }
        Ok(entries)
    }

    async fn entry(&self, name: &str) -> Result<Option<HandleEntry>, StorageError> {
        let path = self.child(name)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(Some(HandleEntry {
                name: name.to_string(),
                kind: entry_kind(&meta),
                modified: modified_millis(&meta),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::from_io(e, path.display())),
        }
    }

    async fn directory(
        &self,
        name: &str,
        create: bool,
    ) -> Result<Arc<dyn DirectoryHandle>, StorageError> {
        let path = self.child(name)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Ok(Arc::new(self.child_handle(name))),
            Ok(_) => Err(StorageError::NameConflict(format!(
                "{} exists and is not a directory",
                path.display()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && create => {
                tokio::fs::create_dir(&path)
                    .await
                    .map_err(|e| StorageError::from_io(e, path.display()))?;
                debug!(path = %path.display(), "Created directory");
                Ok(Arc::new(self.child_handle(name)))
            }
            Err(e) => Err(StorageError::from_io(e, path.display())),
        }
    }

    async fn read_file(&self, name: &str) -> Result<String, StorageError> {
        let path = self.child(name)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| StorageError::from_io(e, path.display()))?;
        match String::from_utf8(bytes) {
            Ok(text) => Ok(text),
            Err(e) => {
                warn!(path = %path.display(), "Note is not valid UTF-8, replacing invalid bytes");
                Ok(String::from_utf8_lossy(e.as_bytes()).into_owned())
            }
        }
    }

    async fn write_file(
        &self,
        name: &str,
        content: &str,
        create: bool,
    ) -> Result<Timestamp, StorageError> {
        let path = self.child(name)?;
        if !create {
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_dir() => {
                    return Err(StorageError::NotAFile(path.display().to_string()))
                }
                Ok(_) => {}
                Err(e) => return Err(StorageError::from_io(e, path.display())),
            }
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| StorageError::from_io(e, path.display()))?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| StorageError::from_io(e, path.display()))?;
        Ok(modified_millis(&meta).unwrap_or_else(crate::types::now_millis))
    }

    async fn remove_entry(&self, name: &str, recursive: bool) -> Result<(), StorageError> {
        let path = self.child(name)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| StorageError::from_io(e, path.display()))?;
        let result = if meta.is_dir() {
            if recursive {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_dir(&path).await
            }
        } else {
            tokio::fs::remove_file(&path).await
        };
        result.map_err(|e| StorageError::from_io(e, path.display()))
    }

    async fn query_permission(&self) -> PermissionState {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) if !meta.is_dir() => PermissionState::Denied,
            Ok(meta) if meta.permissions().readonly() => PermissionState::Denied,
            Ok(_) => PermissionState::Granted,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => PermissionState::Denied,
            Err(_) => PermissionState::Prompt,
        }
    }

    fn supports_move(&self) -> bool {
        self.native_move
    }

    async fn move_entry(
        &self,
        name: &str,
        destination: &dyn DirectoryHandle,
        new_name: &str,
    ) -> Result<(), StorageError> {
        if !self.native_move {
            return Err(StorageError::Unsupported(format!(
                "native move disabled for {}",
                self.path.display()
            )));
        }
        let dest_dir = destination.native_path().ok_or_else(|| {
            StorageError::Unsupported(format!(
                "cannot natively move into {}",
                destination.name()
            ))
        })?;
        let from = self.child(name)?;
        crate::node::path::validate_name(new_name)?;
        let to = dest_dir.join(new_name);
        if tokio::fs::symlink_metadata(&to).await.is_ok() {
            return Err(StorageError::NameConflict(to.display().to_string()));
        }
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| StorageError::from_io(e, from.display()))?;
        debug!(from = %from.display(), to = %to.display(), "Moved entry");
        Ok(())
    }

    fn native_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}
