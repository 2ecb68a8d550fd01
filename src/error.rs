//! Error taxonomy shared by every driver, the router and the tooling layer.

use thiserror::Error;

/// Storage layer errors
///
/// Drivers surface these kinds and the router lets them bubble to the caller
/// unchanged. Nothing in the storage layer retries on its own.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Name conflict: {0}")]
    NameConflict(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Authentication required: {0}")]
    AuthRequired(String),

    #[error("Authentication cancelled: {0}")]
    AuthCancelled(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("No storage backend selected")]
    NotConfigured,

    #[error("Storage session changed while the operation was in flight")]
    SessionChanged,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Map an I/O error onto the taxonomy, keeping `context` (usually a path) in the message.
    pub fn from_io(err: std::io::Error, context: impl std::fmt::Display) -> Self {
        let message = format!("{}: {}", context, err);
        match err.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(message),
            std::io::ErrorKind::AlreadyExists => StorageError::AlreadyExists(message),
            std::io::ErrorKind::PermissionDenied => StorageError::PermissionDenied(message),
            _ => StorageError::BackendUnavailable(message),
        }
    }

    /// Whether the caller should re-prompt for credentials or permission.
    pub fn needs_consent(&self) -> bool {
        matches!(
            self,
            StorageError::AuthRequired(_) | StorageError::PermissionDenied(_)
        )
    }

    /// Short machine-readable kind label, used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            StorageError::NotFound(_) => "not_found",
            StorageError::AlreadyExists(_) => "already_exists",
            StorageError::NameConflict(_) => "name_conflict",
            StorageError::NotAFile(_) => "not_a_file",
            StorageError::AuthRequired(_) => "auth_required",
            StorageError::AuthCancelled(_) => "auth_cancelled",
            StorageError::PermissionDenied(_) => "permission_denied",
            StorageError::BackendUnavailable(_) => "backend_unavailable",
            StorageError::Unsupported(_) => "unsupported",
            StorageError::InvalidName(_) => "invalid_name",
            StorageError::NotConfigured => "not_configured",
            StorageError::SessionChanged => "session_changed",
            StorageError::Config(_) => "config",
            StorageError::Serialization(_) => "serialization",
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::from_io(err, "I/O error")
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        match err.status().map(|s| s.as_u16()) {
            Some(401) => StorageError::AuthRequired(err.to_string()),
            Some(403) => StorageError::PermissionDenied(err.to_string()),
            Some(404) => StorageError::NotFound(err.to_string()),
            _ => StorageError::BackendUnavailable(err.to_string()),
        }
    }
}
