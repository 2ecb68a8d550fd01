//! Wire contract of the flat object store behind the cloud driver.

use crate::error::StorageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Mime type marking folder objects
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Mime type used for uploaded notes
pub const NOTE_MIME: &str = "text/markdown";

/// Pseudo object id of the store's top level
pub const TOP_LEVEL: &str = "root";

/// Object metadata as returned by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveObject {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub modified_time: Option<String>,
}

impl DriveObject {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }

    /// Modification time in epoch millis, when the store reported one.
    pub fn modified_millis(&self) -> Option<i64> {
        self.modified_time
            .as_deref()
            .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.timestamp_millis())
    }
}

/// Metadata-only patch; untouched fields stay as they are remotely.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataPatch {
    pub name: Option<String>,
    pub add_parent: Option<String>,
    pub remove_parent: Option<String>,
}

impl MetadataPatch {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn reparent(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            name: None,
            add_parent: Some(to.into()),
            remove_parent: Some(from.into()),
        }
    }
}

/// Calls the cloud driver issues against the store. Every call carries the
/// bearer token obtained from the token cache.
#[async_trait]
pub trait DriveApi: Send + Sync {
    /// Folder under `parent` whose name matches `name` case-insensitively.
    async fn find_folder(
        &self,
        token: &str,
        name: &str,
        parent: &str,
    ) -> Result<Option<DriveObject>, StorageError>;

    /// Non-trashed children of `parent`.
    async fn list_children(&self, token: &str, parent: &str)
        -> Result<Vec<DriveObject>, StorageError>;

    /// Raw content of a file object.
    async fn download(&self, token: &str, object_id: &str) -> Result<String, StorageError>;

    async fn create_folder(
        &self,
        token: &str,
        name: &str,
        parent: &str,
    ) -> Result<DriveObject, StorageError>;

    /// Two-part upload: JSON metadata plus the raw body.
    async fn create_file(
        &self,
        token: &str,
        name: &str,
        parent: &str,
        content: &str,
    ) -> Result<DriveObject, StorageError>;

    /// Media-only overwrite addressed by object id.
    async fn update_media(
        &self,
        token: &str,
        object_id: &str,
        content: &str,
    ) -> Result<DriveObject, StorageError>;

    async fn patch_metadata(
        &self,
        token: &str,
        object_id: &str,
        patch: &MetadataPatch,
    ) -> Result<DriveObject, StorageError>;

    /// Delete an object; folders go with their contents.
    async fn delete(&self, token: &str, object_id: &str) -> Result<(), StorageError>;
}
