//! Storage router
//!
//! Holds the single active backend session and dispatches every node operation
//! to its driver. Callers never talk to drivers directly.
//!
//! Each session carries an epoch. An operation pins the session it started on;
//! if the session is replaced (backend switch, disconnect) before the driver
//! call returns, the result is discarded and `SessionChanged` is returned.

pub mod backends;

pub use backends::Backends;

use crate::backup::{self, Backup};
use crate::concurrency::WriteOrdering;
use crate::driver::{DriverKind, PermissionState, StorageDriver};
use crate::error::StorageError;
use crate::migration::{self, MigrationReport};
use crate::node::{path, Node, NodeKind};
use crate::session::{FolderPicker, SessionRecord, SessionState, SessionStore};
use crate::types::NodeId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One backend session
struct ActiveSession {
    epoch: u64,
    mode: DriverKind,
    driver: Arc<dyn StorageDriver>,
    local_root: Option<PathBuf>,
    /// Nodes as last reported by this session's driver
    known: RwLock<HashMap<NodeId, Node>>,
}

impl ActiveSession {
    fn remember(&self, node: &Node) {
        self.known.write().insert(node.id.clone(), node.clone());
    }

    fn forget_subtree(&self, id: &str) {
        self.known
            .write()
            .retain(|key, _| key != id && !path::is_descendant(key, id));
    }

    /// Re-key a renamed or moved node and everything cached below it.
    fn relocate_subtree(&self, old_id: &str, moved: &Node) {
        let mut known = self.known.write();
        let stale: Vec<NodeId> = known
            .keys()
            .filter(|key| path::is_descendant(key, old_id))
            .cloned()
            .collect();
        known.remove(old_id);
        for key in stale {
            if let Some(node) = known.remove(&key) {
                if let Some(new_id) = path::rebase(&key, old_id, &moved.id) {
                    let (parent, name) = path::split_parent(&new_id);
                    known.insert(new_id.clone(), node.relocated(parent, name));
                }
            }
        }
        known.insert(moved.id.clone(), moved.clone());
    }
}

/// Backend selection options
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectOptions {
    /// Copy every node from the current backend into the new one first
    pub migrate: bool,
    /// Switch even when some nodes failed to copy
    pub continue_on_error: bool,
}

/// Result of a backend selection
#[derive(Debug)]
pub struct SwitchOutcome {
    pub mode: DriverKind,
    /// False when a migration failure kept the previous backend active
    pub switched: bool,
    pub migration: Option<MigrationReport>,
}

/// Dispatches node operations to the active driver
pub struct StorageRouter {
    backends: Backends,
    store: Arc<dyn SessionStore>,
    picker: Arc<dyn FolderPicker>,
    state: RwLock<SessionState>,
    active: RwLock<Option<Arc<ActiveSession>>>,
    /// Local folder waiting to be granted again
    lapsed_root: RwLock<Option<PathBuf>>,
    epoch: AtomicU64,
    writes: WriteOrdering,
}

impl StorageRouter {
    pub fn new(
        backends: Backends,
        store: Arc<dyn SessionStore>,
        picker: Arc<dyn FolderPicker>,
    ) -> Self {
        Self {
            backends,
            store,
            picker,
            state: RwLock::new(SessionState::Uninitialized),
            active: RwLock::new(None),
            lapsed_root: RwLock::new(None),
            epoch: AtomicU64::new(0),
            writes: WriteOrdering::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn mode(&self) -> Option<DriverKind> {
        self.active.read().as_ref().map(|s| s.mode)
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    /// Folder backing the local session, if that is the active mode.
    pub fn local_root(&self) -> Option<PathBuf> {
        self.active
            .read()
            .as_ref()
            .and_then(|s| s.local_root.clone())
    }

    fn current(&self) -> Result<Arc<ActiveSession>, StorageError> {
        if let Some(session) = self.active.read().clone() {
            return Ok(session);
        }
        match self.state() {
            SessionState::RequiresReauthorization(mode) => Err(StorageError::PermissionDenied(
                format!("{} folder access must be granted again", mode),
            )),
            _ => Err(StorageError::NotConfigured),
        }
    }

    /// Fail with `SessionChanged` if `session` is no longer the active one.
    fn still_current(&self, session: &ActiveSession) -> Result<(), StorageError> {
        let current = self.active.read().as_ref().map(|s| s.epoch);
        if current == Some(session.epoch) {
            Ok(())
        } else {
            debug!(epoch = session.epoch, "Discarding result from replaced session");
            Err(StorageError::SessionChanged)
        }
    }

    fn activate(
        &self,
        mode: DriverKind,
        driver: Arc<dyn StorageDriver>,
        local_root: Option<PathBuf>,
        persist: bool,
    ) -> Result<(), StorageError> {
        if persist {
            self.store
                .save(&SessionRecord::new(mode, local_root.clone()))?;
        }
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let session = Arc::new(ActiveSession {
            epoch,
            mode,
            driver,
            local_root,
            known: RwLock::new(HashMap::new()),
        });
        *self.active.write() = Some(session);
        *self.lapsed_root.write() = None;
        *self.state.write() = SessionState::Active(mode);
        info!(mode = %mode, epoch, "Storage session active");
        Ok(())
    }

    async fn open_local_via_picker(
        &self,
        previous: Option<PathBuf>,
    ) -> Result<(Arc<dyn StorageDriver>, PathBuf), StorageError> {
        let picked = self.picker.request_access(previous.as_deref()).await?;
        let root = self.backends.canonical_local_root(&picked)?;
        let driver = self.backends.open_local(&root).await?;
        Ok((driver, root))
    }

    /// Make `mode` the active backend, asking for consent where it needs it.
    pub async fn select_backend(
        &self,
        mode: DriverKind,
        options: SelectOptions,
    ) -> Result<SwitchOutcome, StorageError> {
        let previous = self.active.read().clone();

        let (driver, local_root) = match mode {
            DriverKind::Sandbox => (self.backends.open_sandbox().await?, None),
            DriverKind::Local => {
                let hint = previous
                    .as_ref()
                    .and_then(|s| s.local_root.clone())
                    .or_else(|| self.lapsed_root.read().clone());
                let (driver, root) = self.open_local_via_picker(hint).await?;
                (driver, Some(root))
            }
            DriverKind::Cloud => {
                self.backends.authorize_cloud().await?;
                (self.backends.open_cloud(), None)
            }
        };

        let migration = match previous {
            Some(ref prev) if options.migrate => {
                if prev.mode == mode && prev.local_root == local_root {
                    None
                } else {
                    Some(
                        migration::migrate(
                            prev.driver.as_ref(),
                            driver.as_ref(),
                            options.continue_on_error,
                        )
                        .await?,
                    )
                }
            }
            _ => None,
        };

        if let Some(ref report) = migration {
            if !report.is_complete() && !options.continue_on_error {
                warn!(
                    mode = %mode,
                    copied = report.copied.len(),
                    "Migration failed; keeping the current backend"
                );
                return Ok(SwitchOutcome {
                    mode,
                    switched: false,
                    migration,
                });
            }
        }

        self.activate(mode, driver, local_root, true)?;
        Ok(SwitchOutcome {
            mode,
            switched: true,
            migration,
        })
    }

    /// Restore the persisted session, if any.
    pub async fn resume(&self) -> Result<SessionState, StorageError> {
        let Some(record) = self.store.load()? else {
            return Ok(self.state());
        };

        match record.mode {
            DriverKind::Sandbox => {
                let driver = self.backends.open_sandbox().await?;
                self.activate(DriverKind::Sandbox, driver, None, false)?;
            }
            DriverKind::Cloud => {
                // The notes root is looked up again on first use; consent happens lazily.
                let driver = self.backends.open_cloud();
                self.activate(DriverKind::Cloud, driver, None, false)?;
            }
            DriverKind::Local => {
                let Some(root) = record.local_root else {
                    warn!("Local session without a folder; clearing it");
                    self.store.clear()?;
                    return Ok(self.state());
                };
                match self.backends.local_permission(&root).await {
                    PermissionState::Granted => {
                        let driver = self.backends.open_local(&root).await?;
                        self.activate(DriverKind::Local, driver, Some(root), false)?;
                    }
                    permission => {
                        info!(root = %root.display(), ?permission, "Local folder needs a new grant");
                        *self.active.write() = None;
                        *self.lapsed_root.write() = Some(root);
                        *self.state.write() = SessionState::RequiresReauthorization(DriverKind::Local);
                    }
                }
            }
        }
        Ok(self.state())
    }

    /// Ask the user to grant the lapsed local folder again.
    pub async fn reauthorize(&self) -> Result<SessionState, StorageError> {
        let previous = match self.state() {
            SessionState::RequiresReauthorization(DriverKind::Local) => self.lapsed_root.read().clone(),
            SessionState::Active(DriverKind::Local) => self.local_root(),
            state => {
                return Err(StorageError::Unsupported(format!(
                    "reauthorization while {}",
                    state
                )))
            }
        };
        let (driver, root) = self.open_local_via_picker(previous).await?;
        self.activate(DriverKind::Local, driver, Some(root), true)?;
        Ok(self.state())
    }

    /// Forget the session and any cached credential. Backend data is left alone.
    pub fn disconnect(&self) -> Result<(), StorageError> {
        self.store.clear()?;
        self.backends.tokens().clear();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *self.active.write() = None;
        *self.lapsed_root.write() = None;
        *self.state.write() = SessionState::Uninitialized;
        info!("Storage session disconnected");
        Ok(())
    }

    /// Node with `id` as last reported, refreshing the listing on a miss.
    async fn known_node(&self, session: &ActiveSession, id: &str) -> Result<Node, StorageError> {
        let cached = session.known.read().get(id).cloned();
        if let Some(node) = cached {
            return Ok(node);
        }
        let nodes = session.driver.list_all().await?;
        self.still_current(session)?;
        let mut known = session.known.write();
        *known = nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        known
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<Node>, StorageError> {
        let session = self.current()?;
        let nodes = session.driver.list_all().await?;
        self.still_current(&session)?;
        *session.known.write() = nodes.iter().map(|n| (n.id.clone(), n.clone())).collect();
        debug!(mode = %session.mode, count = nodes.len(), "Listed nodes");
        Ok(nodes)
    }

    pub async fn read(&self, id: &str) -> Result<String, StorageError> {
        let session = self.current()?;
        let content = session.driver.get_content(id).await?;
        self.still_current(&session)?;
        Ok(content)
    }

    pub async fn create(&self, node: Node) -> Result<Node, StorageError> {
        let name = path::normalize_name(&node.name);
        let node = node.relocated(node.parent_id.as_deref(), &name);
        node.validate()?;

        let session = self.current()?;
        let created = session.driver.create(&node).await?;
        self.still_current(&session)?;
        session.remember(&created);
        info!(mode = %session.mode, id = %created.id, kind = created.kind.as_str(), "Created node");
        Ok(created)
    }

    pub async fn rename(&self, id: &str, new_name: &str) -> Result<Node, StorageError> {
        let new_name = path::normalize_name(new_name);
        path::validate_name(&new_name)?;

        let session = self.current()?;
        let old = self.known_node(&session, id).await?;
        let renamed = session.driver.rename(id, &new_name, &old).await?;
        self.still_current(&session)?;
        session.relocate_subtree(id, &renamed);
        info!(mode = %session.mode, from = id, to = %renamed.id, "Renamed node");
        Ok(renamed)
    }

    pub async fn move_node(
        &self,
        id: &str,
        new_parent_id: Option<&str>,
    ) -> Result<Node, StorageError> {
        let session = self.current()?;
        let old = self.known_node(&session, id).await?;
        let moved = session.driver.move_node(id, new_parent_id, &old).await?;
        self.still_current(&session)?;
        session.relocate_subtree(id, &moved);
        info!(mode = %session.mode, from = id, to = %moved.id, "Moved node");
        Ok(moved)
    }

    /// Overwrite a file's content. Writes to one id complete in the order they started.
    pub async fn write(&self, id: &str, content: &str) -> Result<Node, StorageError> {
        let _ticket = self.writes.acquire(id).await;
        let session = self.current()?;
        let updated = session.driver.update_content(id, content).await?;
        self.still_current(&session)?;
        session.remember(&updated);
        debug!(mode = %session.mode, id, bytes = content.len(), "Wrote node");
        Ok(updated)
    }

    pub async fn remove(&self, id: &str) -> Result<(), StorageError> {
        let session = self.current()?;
        let kind = match self.known_node(&session, id).await {
            Ok(node) => node.kind,
            Err(StorageError::NotFound(_)) => {
                debug!(id, "Remove target already gone");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        session.driver.delete(id, kind).await?;
        self.still_current(&session)?;
        session.forget_subtree(id);
        info!(mode = %session.mode, id, kind = kind.as_str(), "Removed node");
        Ok(())
    }

    pub async fn export_backup(&self) -> Result<Backup, StorageError> {
        let session = self.current()?;
        let backup = backup::export(session.driver.as_ref()).await?;
        self.still_current(&session)?;
        Ok(backup)
    }

    /// Destructive: replaces every node of the active backend.
    pub async fn restore_backup(&self, backup: &Backup) -> Result<MigrationReport, StorageError> {
        let session = self.current()?;
        let report = backup::restore(session.driver.as_ref(), backup).await?;
        self.still_current(&session)?;
        session.known.write().clear();
        Ok(report)
    }

    /// Kind of a known node, for callers that only hold an id.
    pub async fn kind_of(&self, id: &str) -> Result<NodeKind, StorageError> {
        let session = self.current()?;
        Ok(self.known_node(&session, id).await?.kind)
    }
}

impl std::fmt::Debug for StorageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageRouter")
            .field("state", &self.state())
            .field("local_root", &self.local_root())
            .finish()
    }
}

/// Path of the lapsed local folder, for messages.
pub fn describe_root(root: Option<&Path>) -> String {
    root.map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NotesConfig, StorageConfig};
    use crate::driver::cloud::{MemoryDriveApi, StaticTokenProvider};
    use crate::session::{MemorySessionStore, PresetFolderPicker};

    fn router(dir: &Path, picked: Option<PathBuf>) -> StorageRouter {
        let config = NotesConfig {
            storage: StorageConfig {
                sandbox_root: Some(dir.join("sandbox")),
                ..StorageConfig::default()
            },
            ..NotesConfig::default()
        };
        let backends = Backends::new(
            &config,
            Arc::new(MemoryDriveApi::new()),
            Arc::new(StaticTokenProvider::new("t", chrono::Duration::hours(1))),
        )
        .unwrap();
        StorageRouter::new(
            backends,
            Arc::new(MemorySessionStore::new()),
            Arc::new(PresetFolderPicker::new(picked)),
        )
    }

    #[tokio::test]
    async fn operations_need_a_backend() {
        let dir = tempfile::tempdir().unwrap();
        let router = router(dir.path(), None);
        assert_eq!(router.state(), SessionState::Uninitialized);
        assert!(matches!(router.list().await, Err(StorageError::NotConfigured)));
    }

    #[tokio::test]
    async fn rename_of_folder_rekeys_cached_children() {
        let dir = tempfile::tempdir().unwrap();
        let router = router(dir.path(), None);
        router
            .select_backend(DriverKind::Sandbox, SelectOptions::default())
            .await
            .unwrap();

        router.create(Node::folder(None, "work")).await.unwrap();
        router
            .create(Node::file(Some("work"), "todo", "x"))
            .await
            .unwrap();
        router.rename("work", "job").await.unwrap();

        // Served from the cache, without relisting.
        assert_eq!(router.kind_of("job/todo").await.unwrap(), NodeKind::File);
        let moved = router.move_node("job/todo", None).await.unwrap();
        assert_eq!(moved.id, "todo");
        assert_eq!(router.read("todo").await.unwrap(), "x");
    }

    #[tokio::test]
    async fn stale_session_results_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let router = router(dir.path(), None);
        router
            .select_backend(DriverKind::Sandbox, SelectOptions::default())
            .await
            .unwrap();
        let session = router.current().unwrap();
        router.disconnect().unwrap();
        assert!(matches!(
            router.still_current(&session),
            Err(StorageError::SessionChanged)
        ));
    }
}
