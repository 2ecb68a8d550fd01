//! Node Model
//!
//! Files and folders addressed by slash-delimited logical ids. The id of a node is
//! always `parent_id + "/" + name` (or just `name` at the root); see [`path`].

pub mod path;

use crate::types::{now_millis, NodeId, Timestamp};
use serde::{Deserialize, Serialize};

/// Node type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Folder,
}

impl NodeKind {
    pub fn is_folder(self) -> bool {
        self == NodeKind::Folder
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Folder => "folder",
        }
    }
}

/// Backend-native handle carried on a node without being part of its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendRef {
    /// Opaque object id assigned by the cloud store
    Object(String),
}

impl BackendRef {
    pub fn object_id(&self) -> &str {
        match self {
            BackendRef::Object(id) => id,
        }
    }
}

/// A file or folder in the logical tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    /// `None` on a file means the content has not been loaded yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub updated_at: Timestamp,
    #[serde(skip)]
    pub backend: Option<BackendRef>,
}

impl PartialEq for Node {
    /// Equality ignores the backend handle, which is not part of the logical node.
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.kind == other.kind
            && self.parent_id == other.parent_id
            && self.content == other.content
            && self.updated_at == other.updated_at
    }
}

impl Node {
    /// Build a folder node under `parent_id`.
    pub fn folder(parent_id: Option<&str>, name: &str) -> Self {
        Self {
            id: path::join(parent_id, name),
            name: name.to_string(),
            kind: NodeKind::Folder,
            parent_id: parent_id.map(str::to_string),
            content: None,
            updated_at: now_millis(),
            backend: None,
        }
    }

    /// Build a file node under `parent_id` with the given content.
    pub fn file(parent_id: Option<&str>, name: &str, content: impl Into<String>) -> Self {
        Self {
            id: path::join(parent_id, name),
            name: name.to_string(),
            kind: NodeKind::File,
            parent_id: parent_id.map(str::to_string),
            content: Some(content.into()),
            updated_at: now_millis(),
            backend: None,
        }
    }

    /// Build a node from a full id, deriving `name` and `parent_id`.
    pub fn from_id(id: &str, kind: NodeKind, content: Option<String>) -> Self {
        let (parent_id, name) = path::split_parent(id);
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            parent_id: parent_id.map(str::to_string),
            content,
            updated_at: now_millis(),
            backend: None,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    /// Files whose content still has to be fetched through `get_content`.
    pub fn is_unloaded(&self) -> bool {
        self.is_file() && self.content.is_none()
    }

    pub fn with_backend(mut self, backend: BackendRef) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn object_id(&self) -> Option<&str> {
        self.backend.as_ref().map(BackendRef::object_id)
    }

    /// Check `id == join(parent_id, name)` and that the name and every parent segment are valid.
    pub fn validate(&self) -> Result<(), crate::error::StorageError> {
        path::validate_name(&self.name)?;
        if let Some(ref parent) = self.parent_id {
            path::validate_id(parent)?;
        }
        let expected = path::join(self.parent_id.as_deref(), &self.name);
        if expected != self.id {
            return Err(crate::error::StorageError::InvalidName(format!(
                "id {} does not match parent {:?} and name {}",
                self.id, self.parent_id, self.name
            )));
        }
        Ok(())
    }

    /// Copy of this node re-homed under `parent_id` with `name`, content untouched.
    pub fn relocated(&self, parent_id: Option<&str>, name: &str) -> Self {
        Self {
            id: path::join(parent_id, name),
            name: name.to_string(),
            kind: self.kind,
            parent_id: parent_id.map(str::to_string),
            content: self.content.clone(),
            updated_at: self.updated_at,
            backend: self.backend.clone(),
        }
    }
}
