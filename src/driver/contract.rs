use crate::error::StorageError;
use crate::node::{Node, NodeKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which backend a driver talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Sandbox,
    Local,
    Cloud,
}

impl DriverKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DriverKind::Sandbox => "sandbox",
            DriverKind::Local => "local",
            DriverKind::Cloud => "cloud",
        }
    }

    pub fn parse(value: &str) -> Result<Self, StorageError> {
        match value {
            "sandbox" => Ok(DriverKind::Sandbox),
            "local" => Ok(DriverKind::Local),
            "cloud" => Ok(DriverKind::Cloud),
            other => Err(StorageError::Config(format!(
                "Invalid storage mode: {}. Must be sandbox, local, or cloud",
                other
            ))),
        }
    }
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability contract every storage backend implements.
///
/// Ids at this boundary are always the logical, path-derived ids. A driver may
/// attach its own handle to returned nodes (`Node::backend`) and rely on it when
/// the caller passes the node back as `old`.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    fn kind(&self) -> DriverKind;

    /// Every node below the current root. Files may come back unloaded.
    async fn list_all(&self) -> Result<Vec<Node>, StorageError>;

    /// Content of a file node.
    async fn get_content(&self, id: &str) -> Result<String, StorageError>;

    /// Create the described node, creating missing intermediate folders.
    async fn create(&self, node: &Node) -> Result<Node, StorageError>;

    /// Change only the leaf name.
    async fn rename(&self, id: &str, new_name: &str, old: &Node) -> Result<Node, StorageError>;

    /// Change only the parent; `None` moves to the root.
    async fn move_node(
        &self,
        id: &str,
        new_parent_id: Option<&str>,
        old: &Node,
    ) -> Result<Node, StorageError>;

    /// Overwrite a file's content.
    async fn update_content(&self, id: &str, content: &str) -> Result<Node, StorageError>;

    /// Remove a node; folders are removed with their whole subtree.
    async fn delete(&self, id: &str, kind: NodeKind) -> Result<(), StorageError>;
}
