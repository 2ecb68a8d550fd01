//! Sandbox and local-folder driver
//!
//! Both modes walk a [`DirectoryHandle`] tree; they differ only in where the root
//! handle comes from (the app-private sandbox directory or a user-picked folder).
//! Files carry a fixed extension on disk that never appears in names or ids.

use crate::driver::contract::{DriverKind, StorageDriver};
use crate::driver::handle::{DirectoryHandle, EntryKind};
use crate::error::StorageError;
use crate::node::{path, Node, NodeKind};
use crate::types::{now_millis, NodeId};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Driver over a hierarchical directory handle
#[derive(Debug, Clone)]
pub struct HandleDriver {
    kind: DriverKind,
    root: Arc<dyn DirectoryHandle>,
    extension: String,
    lazy_content: bool,
}

impl HandleDriver {
    pub fn new(kind: DriverKind, root: Arc<dyn DirectoryHandle>, extension: &str) -> Self {
        Self {
            kind,
            root,
            extension: extension.trim_start_matches('.').to_string(),
            lazy_content: false,
        }
    }

    /// Leave file content unloaded in `list_all`; callers fetch it with `get_content`.
    pub fn with_lazy_content(mut self, lazy: bool) -> Self {
        self.lazy_content = lazy;
        self
    }

    pub fn root(&self) -> &Arc<dyn DirectoryHandle> {
        &self.root
    }

    fn file_name(&self, name: &str) -> String {
        format!("{}.{}", name, self.extension)
    }

    fn strip_extension<'a>(&self, entry_name: &'a str) -> Option<&'a str> {
        entry_name
            .strip_suffix(self.extension.as_str())
            .and_then(|stem| stem.strip_suffix('.'))
            .filter(|stem| !stem.is_empty())
    }

    fn entry_name(&self, name: &str, kind: NodeKind) -> String {
        match kind {
            NodeKind::File => self.file_name(name),
            NodeKind::Folder => name.to_string(),
        }
    }

    /// Whether `name` is taken in `dir` as either a folder or a file; both map to the same id.
    async fn occupied(&self, dir: &dyn DirectoryHandle, name: &str) -> Result<bool, StorageError> {
        Ok(dir.entry(name).await?.is_some() || dir.entry(&self.file_name(name)).await?.is_some())
    }

    /// Walk `id` segment by segment from the root.
    async fn resolve_dir(
        &self,
        id: Option<&str>,
        create: bool,
    ) -> Result<Arc<dyn DirectoryHandle>, StorageError> {
        let mut current = Arc::clone(&self.root);
        if let Some(id) = id {
            let mut walked: Option<String> = None;
            for segment in path::segments(id) {
                let segment_id = path::join(walked.as_deref(), segment);
                // A note `segment.md` already owns this id; a folder beside it would duplicate it.
                if create
                    && current.entry(segment).await?.is_none()
                    && current.entry(&self.file_name(segment)).await?.is_some()
                {
                    return Err(StorageError::NameConflict(format!("{} is a file", segment_id)));
                }
                walked = Some(segment_id);
                current = current.directory(segment, create).await.map_err(|e| match e {
                    StorageError::NotFound(_) => StorageError::NotFound(id.to_string()),
                    other => other,
                })?;
            }
        }
        Ok(current)
    }

    /// Copy-then-delete for backends without native move.
    ///
    /// A failed copy removes whatever reached the destination before the error is
    /// returned; a failed source delete rolls the copy back so no duplicate survives.
    async fn copy_then_delete(
        &self,
        source: &dyn DirectoryHandle,
        source_name: &str,
        destination: &dyn DirectoryHandle,
        destination_name: &str,
    ) -> Result<(), StorageError> {
        let content = source.read_file(source_name).await?;

        if let Err(copy_err) = destination
            .write_file(destination_name, &content, true)
            .await
        {
            warn!(
                destination = destination_name,
                error = %copy_err,
                "Copy failed, removing partial destination"
            );
            return match destination.remove_entry(destination_name, false).await {
                Ok(()) | Err(StorageError::NotFound(_)) => Err(copy_err),
                Err(cleanup_err) => Err(StorageError::BackendUnavailable(format!(
                    "copy to {} failed ({}) and the partial copy could not be removed ({})",
                    destination_name, copy_err, cleanup_err
                ))),
            };
        }

        if let Err(delete_err) = source.remove_entry(source_name, false).await {
            warn!(
                source = source_name,
                error = %delete_err,
                "Source delete failed, rolling back copy"
            );
            if let Err(rollback_err) = destination.remove_entry(destination_name, false).await {
                return Err(StorageError::BackendUnavailable(format!(
                    "removing {} failed ({}) and the copy {} could not be rolled back ({})",
                    source_name, delete_err, destination_name, rollback_err
                )));
            }
            return Err(delete_err);
        }
        Ok(())
    }

    /// Shared body of rename and move: relocate entry `old` to `new_parent/new_name`.
    async fn relocate(
        &self,
        old: &Node,
        new_parent_id: Option<&str>,
        new_name: &str,
    ) -> Result<Node, StorageError> {
        let old_parent = old.parent_id.as_deref();
        let source_dir = self.resolve_dir(old_parent, false).await?;
        let source_name = self.entry_name(&old.name, old.kind);

        match source_dir.entry(&source_name).await? {
            Some(entry) if (entry.kind == EntryKind::Directory) == old.is_folder() => {}
            Some(_) => {
                return Err(StorageError::NameConflict(format!(
                    "{} changed type on disk",
                    old.id
                )))
            }
            None => return Err(StorageError::NotFound(old.id.clone())),
        }

        if old.is_folder() && !source_dir.supports_move() {
            return Err(StorageError::Unsupported(format!(
                "folder {} cannot be relocated without native move support",
                old.id
            )));
        }

        let dest_name = self.entry_name(new_name, old.kind);
        let new_id = path::join(new_parent_id, new_name);

        // Conflicts are checked before any missing destination folder is created.
        let dest_dir = if old_parent == new_parent_id {
            Arc::clone(&source_dir)
        } else {
            match self.resolve_dir(new_parent_id, false).await {
                Ok(dir) => dir,
                Err(StorageError::NotFound(_)) => self.resolve_dir(new_parent_id, true).await?,
                Err(e) => return Err(e),
            }
        };
        if self.occupied(dest_dir.as_ref(), new_name).await? {
            return Err(StorageError::NameConflict(new_id));
        }

        if source_dir.supports_move() {
            source_dir
                .move_entry(&source_name, dest_dir.as_ref(), &dest_name)
                .await?;
        } else {
            self.copy_then_delete(
                source_dir.as_ref(),
                &source_name,
                dest_dir.as_ref(),
                &dest_name,
            )
            .await?;
        }

        info!(from = %old.id, to = %new_id, mode = %self.kind, "Relocated node");
        let mut node = old.relocated(new_parent_id, new_name);
        node.backend = None;
        Ok(node)
    }
}

#[async_trait]
impl StorageDriver for HandleDriver {
    fn kind(&self) -> DriverKind {
        self.kind
    }

    async fn list_all(&self) -> Result<Vec<Node>, StorageError> {
        let mut nodes = Vec::new();
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut pending: Vec<(Option<String>, Arc<dyn DirectoryHandle>)> =
            vec![(None, Arc::clone(&self.root))];

        while let Some((prefix, dir)) = pending.pop() {
            for entry in dir.entries().await? {
                if entry.name.starts_with('.') {
                    continue;
                }
                let id = match entry.kind {
                    EntryKind::Directory => path::join(prefix.as_deref(), &entry.name),
                    EntryKind::File => match self.strip_extension(&entry.name) {
                        Some(stem) => path::join(prefix.as_deref(), stem),
                        None => continue,
                    },
                };
                if !seen.insert(id.clone()) {
                    warn!(id = %id, entry = %entry.name, "Skipping entry with a duplicate id");
                    continue;
                }
                match entry.kind {
                    EntryKind::Directory => {
                        let mut node = Node::folder(prefix.as_deref(), &entry.name);
                        node.updated_at = entry.modified.unwrap_or_else(now_millis);
                        let child = dir.directory(&entry.name, false).await?;
                        pending.push((Some(node.id.clone()), child));
                        nodes.push(node);
                    }
                    EntryKind::File => {
                        let content = if self.lazy_content {
                            None
                        } else {
                            Some(dir.read_file(&entry.name).await?)
                        };
                        let mut node = Node::from_id(&id, NodeKind::File, content);
                        node.updated_at = entry.modified.unwrap_or_else(now_millis);
                        nodes.push(node);
                    }
                }
            }
        }

        debug!(count = nodes.len(), mode = %self.kind, "Listed nodes");
        Ok(nodes)
    }

    async fn get_content(&self, id: &str) -> Result<String, StorageError> {
        let (parent, name) = path::split_parent(id);
        let dir = self.resolve_dir(parent, false).await?;
        dir.read_file(&self.file_name(name))
            .await
            .map_err(|e| match e {
                StorageError::NotFound(_) => StorageError::NotFound(id.to_string()),
                other => other,
            })
    }

    async fn create(&self, node: &Node) -> Result<Node, StorageError> {
        node.validate()?;
        let parent = self.resolve_dir(node.parent_id.as_deref(), true).await?;
        let entry_name = self.entry_name(&node.name, node.kind);

        if self.occupied(parent.as_ref(), &node.name).await? {
            return Err(StorageError::AlreadyExists(node.id.clone()));
        }

        let mut created = node.clone();
        created.backend = None;
        match node.kind {
            NodeKind::Folder => {
                parent.directory(&node.name, true).await?;
                created.content = None;
                created.updated_at = now_millis();
            }
            NodeKind::File => {
                let content = node.content.clone().unwrap_or_default();
                created.updated_at = parent.write_file(&entry_name, &content, true).await?;
                created.content = Some(content);
            }
        }

        info!(id = %created.id, kind = created.kind.as_str(), mode = %self.kind, "Created node");
        Ok(created)
    }

    async fn rename(&self, id: &str, new_name: &str, old: &Node) -> Result<Node, StorageError> {
        path::validate_name(new_name)?;
        if old.id != id {
            return Err(StorageError::NotFound(id.to_string()));
        }
        if old.name == new_name {
            return Ok(old.clone());
        }
        self.relocate(old, old.parent_id.as_deref(), new_name).await
    }

    async fn move_node(
        &self,
        id: &str,
        new_parent_id: Option<&str>,
        old: &Node,
    ) -> Result<Node, StorageError> {
        if old.id != id {
            return Err(StorageError::NotFound(id.to_string()));
        }
        if let Some(parent) = new_parent_id {
            path::validate_id(parent)?;
            if parent == id || path::is_descendant(parent, id) {
                return Err(StorageError::NameConflict(format!(
                    "cannot move {} into itself",
                    id
                )));
            }
        }
        if old.parent_id.as_deref() == new_parent_id {
            return Ok(old.clone());
        }
        self.relocate(old, new_parent_id, &old.name).await
    }

    async fn update_content(&self, id: &str, content: &str) -> Result<Node, StorageError> {
        let (parent, name) = path::split_parent(id);
        let dir = self.resolve_dir(parent, false).await?;

        let file_name = self.file_name(name);
        if dir.entry(&file_name).await?.is_none() {
            return match dir.entry(name).await? {
                Some(entry) if entry.kind == EntryKind::Directory => {
                    Err(StorageError::NotAFile(id.to_string()))
                }
                _ => Err(StorageError::NotFound(id.to_string())),
            };
        }

        let updated_at = dir
            .write_file(&file_name, content, false)
            .await
            .map_err(|e| match e {
                StorageError::NotFound(_) => StorageError::NotFound(id.to_string()),
                other => other,
            })?;

        let mut node = Node::from_id(id, NodeKind::File, Some(content.to_string()));
        node.updated_at = updated_at;
        debug!(id, bytes = content.len(), mode = %self.kind, "Updated content");
        Ok(node)
    }

    async fn delete(&self, id: &str, kind: NodeKind) -> Result<(), StorageError> {
        let (parent, name) = path::split_parent(id);
        let dir = match self.resolve_dir(parent, false).await {
            Ok(dir) => dir,
            Err(StorageError::NotFound(_)) => {
                debug!(id, "Delete target parent already gone");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match dir
            .remove_entry(&self.entry_name(name, kind), kind.is_folder())
            .await
        {
            Ok(()) => {
                info!(id, kind = kind.as_str(), mode = %self.kind, "Deleted node");
                Ok(())
            }
            Err(StorageError::NotFound(_)) => {
                debug!(id, "Delete target already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
