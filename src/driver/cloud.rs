//! Cloud driver
//!
//! The store is flat: objects carry an opaque id and a parent list, with no path
//! addressing. Listing walks folder by folder from the notes root, and every node
//! handed out carries its object id so later calls address the object directly.

pub mod api;
pub mod auth;
pub mod http;
pub mod memory;

use crate::driver::contract::{DriverKind, StorageDriver};
use crate::error::StorageError;
use crate::node::{path, BackendRef, Node, NodeKind};
use crate::types::{now_millis, NodeId};
use api::{DriveApi, DriveObject, MetadataPatch, TOP_LEVEL};
use async_trait::async_trait;
use auth::TokenCache;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub use api::{FOLDER_MIME, NOTE_MIME};
pub use auth::{AccessToken, EnvTokenProvider, StaticTokenProvider, TokenProvider};
pub use http::HttpDriveApi;
pub use memory::MemoryDriveApi;

/// Where a logical node lives remotely
#[derive(Debug, Clone, PartialEq, Eq)]
struct RemoteEntry {
    object_id: String,
    parent_object: String,
    kind: NodeKind,
}

/// Driver over a [`DriveApi`] object store
pub struct CloudDriver {
    api: Arc<dyn DriveApi>,
    auth: Arc<TokenCache>,
    root_folder_name: String,
    extension: String,
    root_id: OnceCell<String>,
    index: RwLock<HashMap<NodeId, RemoteEntry>>,
    fetch_concurrency: usize,
    lazy_content: bool,
}

impl CloudDriver {
    pub fn new(
        api: Arc<dyn DriveApi>,
        auth: Arc<TokenCache>,
        root_folder_name: &str,
        extension: &str,
    ) -> Self {
        Self {
            api,
            auth,
            root_folder_name: root_folder_name.to_string(),
            extension: extension.trim_start_matches('.').to_string(),
            root_id: OnceCell::new(),
            index: RwLock::new(HashMap::new()),
            fetch_concurrency: 4,
            lazy_content: false,
        }
    }

    /// Use a known root object instead of looking it up by name.
    pub fn with_root_id(self, root_id: impl Into<String>) -> Self {
        Self {
            root_id: OnceCell::new_with(Some(root_id.into())),
            ..self
        }
    }

    pub fn with_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.fetch_concurrency = concurrency.max(1);
        self
    }

    pub fn with_lazy_content(mut self, lazy: bool) -> Self {
        self.lazy_content = lazy;
        self
    }

    pub fn auth(&self) -> &Arc<TokenCache> {
        &self.auth
    }

    fn file_name(&self, name: &str) -> String {
        format!("{}.{}", name, self.extension)
    }

    fn remote_name(&self, name: &str, kind: NodeKind) -> String {
        match kind {
            NodeKind::File => self.file_name(name),
            NodeKind::Folder => name.to_string(),
        }
    }

    /// Logical name and kind of a remote object; `None` for objects that are not notes.
    fn classify<'a>(&self, object: &'a DriveObject) -> Option<(&'a str, NodeKind)> {
        if object.name.starts_with('.') {
            return None;
        }
        if object.is_folder() {
            return Some((object.name.as_str(), NodeKind::Folder));
        }
        object
            .name
            .strip_suffix(self.extension.as_str())
            .and_then(|stem| stem.strip_suffix('.'))
            .filter(|stem| !stem.is_empty())
            .map(|stem| (stem, NodeKind::File))
    }

    async fn token(&self) -> Result<String, StorageError> {
        self.auth.token().await
    }

    /// Drop the cached token when the store rejects it, so the next call re-consents.
    fn observe<T>(&self, result: Result<T, StorageError>) -> Result<T, StorageError> {
        if let Err(StorageError::AuthRequired(_)) = result {
            self.auth.clear();
        }
        result
    }

    /// Notes root object id, found by name (or created) on first use.
    async fn root(&self) -> Result<String, StorageError> {
        let id = self
            .root_id
            .get_or_try_init(|| async {
                let token = self.token().await?;
                let found = self.observe(
                    self.api
                        .find_folder(&token, &self.root_folder_name, TOP_LEVEL)
                        .await,
                )?;
                let object = match found {
                    Some(object) => object,
                    None => {
                        info!(name = %self.root_folder_name, "Creating cloud notes root");
                        self.observe(
                            self.api
                                .create_folder(&token, &self.root_folder_name, TOP_LEVEL)
                                .await,
                        )?
                    }
                };
                Ok::<String, StorageError>(object.id)
            })
            .await?;
        Ok(id.clone())
    }

    fn parent_object_of(&self, parent_id: Option<&str>, root: &str) -> Option<String> {
        match parent_id {
            None => Some(root.to_string()),
            Some(parent) => self
                .index
                .read()
                .get(parent)
                .filter(|e| e.kind == NodeKind::Folder)
                .map(|e| e.object_id.clone()),
        }
    }

    /// Find `id` remotely, walking from the root when it is not indexed yet.
    async fn resolve(&self, id: &str) -> Result<RemoteEntry, StorageError> {
        let indexed = self.index.read().get(id).cloned();
        if let Some(entry) = indexed {
            return Ok(entry);
        }

        let root = self.root().await?;
        let token = self.token().await?;
        let mut parent_object = root;
        let mut prefix: Option<String> = None;
        let mut found: Option<RemoteEntry> = None;

        for segment in path::segments(id) {
            if let Some(RemoteEntry {
                kind: NodeKind::File,
                ..
            }) = found
            {
                return Err(StorageError::NotFound(id.to_string()));
            }
            let current_id = path::join(prefix.as_deref(), segment);
            let indexed = self.index.read().get(&current_id).cloned();
            if let Some(entry) = indexed {
                parent_object = entry.object_id.clone();
                found = Some(entry);
                prefix = Some(current_id);
                continue;
            }

            let children = self.observe(self.api.list_children(&token, &parent_object).await)?;
            let hit = children.iter().find_map(|object| match self.classify(object) {
                Some((name, kind)) if name == segment => Some(RemoteEntry {
                    object_id: object.id.clone(),
                    parent_object: parent_object.clone(),
                    kind,
                }),
                _ => None,
            });
            let entry = hit.ok_or_else(|| StorageError::NotFound(id.to_string()))?;
            self.index.write().insert(current_id.clone(), entry.clone());
            parent_object = entry.object_id.clone();
            found = Some(entry);
            prefix = Some(current_id);
        }

        found.ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    /// Object id of folder `id`, creating every missing folder along the way.
    async fn ensure_folder(&self, id: Option<&str>) -> Result<String, StorageError> {
        let root = self.root().await?;
        let Some(id) = id else {
            return Ok(root);
        };
        if let Some(object) = self.parent_object_of(Some(id), &root) {
            return Ok(object);
        }

        let token = self.token().await?;
        let mut parent_object = root;
        let mut prefix: Option<String> = None;
        for segment in path::segments(id) {
            let current_id = path::join(prefix.as_deref(), segment);
            let entry = match self.resolve(&current_id).await {
                Ok(entry) if entry.kind == NodeKind::Folder => entry,
                Ok(_) => {
                    return Err(StorageError::NameConflict(format!(
                        "{} is a file",
                        current_id
                    )))
                }
                Err(StorageError::NotFound(_)) => {
                    let object = self.observe(
                        self.api
                            .create_folder(&token, segment, &parent_object)
                            .await,
                    )?;
                    debug!(id = %current_id, object_id = %object.id, "Created intermediate folder");
                    let entry = RemoteEntry {
                        object_id: object.id,
                        parent_object: parent_object.clone(),
                        kind: NodeKind::Folder,
                    };
                    self.index.write().insert(current_id.clone(), entry.clone());
                    entry
                }
                Err(e) => return Err(e),
            };
            parent_object = entry.object_id;
            prefix = Some(current_id);
        }
        Ok(parent_object)
    }

    /// Whether a note called `name` already sits in `parent_object`.
    async fn occupied(
        &self,
        token: &str,
        parent_object: &str,
        name: &str,
        except: Option<&str>,
    ) -> Result<bool, StorageError> {
        let children = self.observe(self.api.list_children(token, parent_object).await)?;
        Ok(children.iter().any(|object| {
            Some(object.id.as_str()) != except
                && matches!(self.classify(object), Some((n, _)) if n == name)
        }))
    }

    /// Re-key `old_id` and everything below it to `new_id`.
    fn reindex(&self, old_id: &str, new_id: &str, new_parent_object: &str) {
        let mut index = self.index.write();
        let moved: Vec<(NodeId, RemoteEntry)> = index
            .iter()
            .filter(|(id, _)| id.as_str() == old_id || path::is_descendant(id, old_id))
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect();
        for (id, mut entry) in moved {
            index.remove(&id);
            if id == old_id {
                entry.parent_object = new_parent_object.to_string();
            }
            if let Some(rebased) = path::rebase(&id, old_id, new_id) {
                index.insert(rebased, entry);
            }
        }
    }

    fn forget(&self, id: &str) {
        self.index
            .write()
            .retain(|key, _| key != id && !path::is_descendant(key, id));
    }

    fn node_for(&self, id: &str, kind: NodeKind, object: &DriveObject, content: Option<String>) -> Node {
        let mut node = Node::from_id(id, kind, content);
        node.updated_at = object.modified_millis().unwrap_or_else(now_millis);
        node.with_backend(BackendRef::Object(object.id.clone()))
    }

    /// Entry for `old`, preferring the object id it carries.
    async fn entry_for(&self, id: &str, old: &Node) -> Result<RemoteEntry, StorageError> {
        let indexed = self.index.read().get(id).cloned();
        if let Some(entry) = indexed {
            return Ok(entry);
        }
        if let Some(object_id) = old.object_id() {
            let root = self.root().await?;
            if let Some(parent_object) = self.parent_object_of(old.parent_id.as_deref(), &root) {
                return Ok(RemoteEntry {
                    object_id: object_id.to_string(),
                    parent_object,
                    kind: old.kind,
                });
            }
        }
        self.resolve(id).await
    }
}

#[async_trait]
impl StorageDriver for CloudDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Cloud
    }

    async fn list_all(&self) -> Result<Vec<Node>, StorageError> {
        let root = self.root().await?;
        let token = self.token().await?;

        let mut index: HashMap<NodeId, RemoteEntry> = HashMap::new();
        let mut folders: Vec<Node> = Vec::new();
        let mut files: Vec<(NodeId, DriveObject)> = Vec::new();
        let mut pending: Vec<(Option<String>, String)> = vec![(None, root)];

        while let Some((prefix, folder_object)) = pending.pop() {
            let children = self.observe(self.api.list_children(&token, &folder_object).await)?;
            for object in children {
                let Some((name, kind)) = self.classify(&object) else {
                    continue;
                };
                let id = path::join(prefix.as_deref(), name);
                if index.contains_key(&id) {
                    warn!(id = %id, object_id = %object.id, "Skipping duplicate remote name");
                    continue;
                }
                index.insert(
                    id.clone(),
                    RemoteEntry {
                        object_id: object.id.clone(),
                        parent_object: folder_object.clone(),
                        kind,
                    },
                );
                match kind {
                    NodeKind::Folder => {
                        pending.push((Some(id.clone()), object.id.clone()));
                        folders.push(self.node_for(&id, kind, &object, None));
                    }
                    NodeKind::File => files.push((id, object)),
                }
            }
        }

        let file_nodes: Vec<Node> = if self.lazy_content {
            files
                .iter()
                .map(|(id, object)| self.node_for(id, NodeKind::File, object, None))
                .collect()
        } else {
            let downloads: Vec<_> = files
                .into_iter()
                .map(|(id, object)| {
                    let api = Arc::clone(&self.api);
                    let token = token.clone();
                    async move {
                        let content = api.download(&token, &object.id).await;
                        (id, object, content)
                    }
                })
                .collect();
            let fetched: Vec<(NodeId, DriveObject, Result<String, StorageError>)> =
                stream::iter(downloads)
                    .buffered(self.fetch_concurrency)
                    .collect()
                    .await;
            let mut loaded = Vec::with_capacity(fetched.len());
            for (id, object, content) in fetched {
                let content = self.observe(content)?;
                loaded.push(self.node_for(&id, NodeKind::File, &object, Some(content)));
            }
            loaded
        };

        *self.index.write() = index;
        let mut nodes = folders;
        nodes.extend(file_nodes);
        debug!(count = nodes.len(), "Listed cloud nodes");
        Ok(nodes)
    }

    async fn get_content(&self, id: &str) -> Result<String, StorageError> {
        let entry = self.resolve(id).await?;
        if entry.kind != NodeKind::File {
            return Err(StorageError::NotAFile(id.to_string()));
        }
        let token = self.token().await?;
        self.observe(self.api.download(&token, &entry.object_id).await)
    }

    async fn create(&self, node: &Node) -> Result<Node, StorageError> {
        node.validate()?;
        let parent_object = self.ensure_folder(node.parent_id.as_deref()).await?;
        let token = self.token().await?;

        if self.occupied(&token, &parent_object, &node.name, None).await? {
            return Err(StorageError::AlreadyExists(node.id.clone()));
        }

        let (object, content) = match node.kind {
            NodeKind::Folder => (
                self.observe(
                    self.api
                        .create_folder(&token, &node.name, &parent_object)
                        .await,
                )?,
                None,
            ),
            NodeKind::File => {
                let content = node.content.clone().unwrap_or_default();
                let object = self.observe(
                    self.api
                        .create_file(&token, &self.file_name(&node.name), &parent_object, &content)
                        .await,
                )?;
                (object, Some(content))
            }
        };

        self.index.write().insert(
            node.id.clone(),
            RemoteEntry {
                object_id: object.id.clone(),
                parent_object,
                kind: node.kind,
            },
        );
        info!(id = %node.id, object_id = %object.id, "Created cloud node");
        Ok(self.node_for(&node.id, node.kind, &object, content))
    }

    async fn rename(&self, id: &str, new_name: &str, old: &Node) -> Result<Node, StorageError> {
        path::validate_name(new_name)?;
        if old.name == new_name {
            return Ok(old.clone());
        }
        let entry = self.entry_for(id, old).await?;
        let token = self.token().await?;
        let new_id = path::join(old.parent_id.as_deref(), new_name);

        if self
            .occupied(&token, &entry.parent_object, new_name, Some(&entry.object_id))
            .await?
        {
            return Err(StorageError::NameConflict(new_id));
        }

        let patch = MetadataPatch::rename(self.remote_name(new_name, old.kind));
        let object = self.observe(
            self.api
                .patch_metadata(&token, &entry.object_id, &patch)
                .await,
        )?;

        self.reindex(id, &new_id, &entry.parent_object);
        info!(from = %id, to = %new_id, object_id = %object.id, "Renamed cloud node");
        let mut node = old.relocated(old.parent_id.as_deref(), new_name);
        node.backend = Some(BackendRef::Object(object.id));
        Ok(node)
    }

    async fn move_node(
        &self,
        id: &str,
        new_parent_id: Option<&str>,
        old: &Node,
    ) -> Result<Node, StorageError> {
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

        let entry = self.entry_for(id, old).await?;
        let new_parent_object = self.ensure_folder(new_parent_id).await?;
        let token = self.token().await?;
        let new_id = path::join(new_parent_id, &old.name);

        if self
            .occupied(&token, &new_parent_object, &old.name, Some(&entry.object_id))
            .await?
        {
            return Err(StorageError::NameConflict(new_id));
        }

        let patch = MetadataPatch::reparent(entry.parent_object.clone(), new_parent_object.clone());
        let object = self.observe(
            self.api
                .patch_metadata(&token, &entry.object_id, &patch)
                .await,
        )?;

        self.reindex(id, &new_id, &new_parent_object);
        info!(from = %id, to = %new_id, object_id = %object.id, "Moved cloud node");
        let mut node = old.relocated(new_parent_id, &old.name);
        node.backend = Some(BackendRef::Object(object.id));
        Ok(node)
    }

    async fn update_content(&self, id: &str, content: &str) -> Result<Node, StorageError> {
        let entry = self.resolve(id).await?;
        if entry.kind != NodeKind::File {
            return Err(StorageError::NotAFile(id.to_string()));
        }
        let token = self.token().await?;
        let object = self.observe(
            self.api
                .update_media(&token, &entry.object_id, content)
                .await,
        )?;
        debug!(id, object_id = %object.id, bytes = content.len(), "Updated cloud content");
        let mut node = self.node_for(id, NodeKind::File, &object, Some(content.to_string()));
        node.updated_at = now_millis();
        Ok(node)
    }

    async fn delete(&self, id: &str, kind: NodeKind) -> Result<(), StorageError> {
        let entry = match self.resolve(id).await {
            Ok(entry) => entry,
            Err(StorageError::NotFound(_)) => {
                debug!(id, "Cloud delete target already gone");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if entry.kind != kind {
            return Err(StorageError::NotFound(format!(
                "{} is not a {}",
                id,
                kind.as_str()
            )));
        }
        let token = self.token().await?;
        match self.observe(self.api.delete(&token, &entry.object_id).await) {
            Ok(()) | Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.forget(id);
        info!(id, object_id = %entry.object_id, "Deleted cloud node");
        Ok(())
    }
}
