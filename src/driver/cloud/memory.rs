//! In-memory object store implementing [`DriveApi`], for offline use and tests.
//!
//! Counts every call by kind so callers can assert on round trips.

use super::api::{DriveApi, DriveObject, MetadataPatch, FOLDER_MIME, NOTE_MIME, TOP_LEVEL};
use crate::error::StorageError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Per-kind call counters
#[derive(Debug, Default)]
pub struct CallCounts {
    pub find_folder: AtomicUsize,
    pub list_children: AtomicUsize,
    pub download: AtomicUsize,
    pub create_folder: AtomicUsize,
    pub create_file: AtomicUsize,
    pub update_media: AtomicUsize,
    pub patch_metadata: AtomicUsize,
    pub delete: AtomicUsize,
}

impl CallCounts {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        for counter in [
            &self.find_folder,
            &self.list_children,
            &self.download,
            &self.create_folder,
            &self.create_file,
            &self.update_media,
            &self.patch_metadata,
            &self.delete,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    meta: DriveObject,
    content: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<String, StoredObject>,
    next_id: u64,
    accepted_token: Option<String>,
    failing_uploads: bool,
}

/// In-memory [`DriveApi`]
#[derive(Debug, Default)]
pub struct MemoryDriveApi {
    state: RwLock<State>,
    calls: CallCounts,
}

impl MemoryDriveApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &CallCounts {
        &self.calls
    }

    /// Only accept this bearer token; `None` accepts any non-empty token.
    pub fn set_accepted_token(&self, token: Option<&str>) {
        self.state.write().accepted_token = token.map(str::to_string);
    }

    /// Make every upload (file create or media update) fail.
    pub fn set_failing_uploads(&self, failing: bool) {
        self.state.write().failing_uploads = failing;
    }

    /// Seed a folder directly, bypassing call counters.
    pub fn seed_folder(&self, name: &str, parent: &str) -> String {
        self.insert(name, FOLDER_MIME, parent, None).id
    }

    /// Seed a file directly, bypassing call counters.
    pub fn seed_file(&self, name: &str, parent: &str, content: &str) -> String {
        self.insert(name, NOTE_MIME, parent, Some(content.to_string()))
            .id
    }

    /// Number of stored objects.
    pub fn object_count(&self) -> usize {
        self.state.read().objects.len()
    }

    /// Metadata of a stored object.
    pub fn object(&self, object_id: &str) -> Option<DriveObject> {
        self.state
            .read()
            .objects
            .get(object_id)
            .map(|o| o.meta.clone())
    }

    fn insert(&self, name: &str, mime: &str, parent: &str, content: Option<String>) -> DriveObject {
        let mut state = self.state.write();
        state.next_id += 1;
        let meta = DriveObject {
            id: format!("obj-{}", state.next_id),
            name: name.to_string(),
            mime_type: mime.to_string(),
            parents: vec![parent.to_string()],
            modified_time: Some(chrono::Utc::now().to_rfc3339()),
        };
        state.objects.insert(
            meta.id.clone(),
            StoredObject {
                meta: meta.clone(),
                content,
            },
        );
        meta
    }

    fn authorize(&self, token: &str) -> Result<(), StorageError> {
        let state = self.state.read();
        let ok = match state.accepted_token {
            Some(ref accepted) => accepted == token,
            None => !token.is_empty(),
        };
        if ok {
            Ok(())
        } else {
            Err(StorageError::AuthRequired("token rejected".to_string()))
        }
    }

    fn children_of(state: &State, parent: &str) -> Vec<DriveObject> {
        let mut children: Vec<DriveObject> = state
            .objects
            .values()
            .filter(|o| o.meta.parents.iter().any(|p| p == parent))
            .map(|o| o.meta.clone())
            .collect();
        children.sort_by(|a, b| a.id.cmp(&b.id));
        children
    }

    fn parent_exists(state: &State, parent: &str) -> bool {
        parent == TOP_LEVEL
            || state
                .objects
                .get(parent)
                .map(|o| o.meta.is_folder())
                .unwrap_or(false)
    }
}

#[async_trait]
impl DriveApi for MemoryDriveApi {
    async fn find_folder(
        &self,
        token: &str,
        name: &str,
        parent: &str,
    ) -> Result<Option<DriveObject>, StorageError> {
        CallCounts::bump(&self.calls.find_folder);
        self.authorize(token)?;
        let wanted = name.to_lowercase();
        let state = self.state.read();
        Ok(Self::children_of(&state, parent)
            .into_iter()
            .find(|o| o.is_folder() && o.name.to_lowercase() == wanted))
    }

    async fn list_children(
        &self,
        token: &str,
        parent: &str,
    ) -> Result<Vec<DriveObject>, StorageError> {
        CallCounts::bump(&self.calls.list_children);
        self.authorize(token)?;
        let state = self.state.read();
        if !Self::parent_exists(&state, parent) {
            return Err(StorageError::NotFound(parent.to_string()));
        }
        Ok(Self::children_of(&state, parent))
    }

    async fn download(&self, token: &str, object_id: &str) -> Result<String, StorageError> {
        CallCounts::bump(&self.calls.download);
        self.authorize(token)?;
        let state = self.state.read();
        match state.objects.get(object_id) {
            Some(StoredObject {
                content: Some(content),
                ..
            }) => Ok(content.clone()),
            Some(_) => Err(StorageError::NotAFile(object_id.to_string())),
            None => Err(StorageError::NotFound(object_id.to_string())),
        }
    }

    async fn create_folder(
        &self,
        token: &str,
        name: &str,
        parent: &str,
    ) -> Result<DriveObject, StorageError> {
        CallCounts::bump(&self.calls.create_folder);
        self.authorize(token)?;
        if !Self::parent_exists(&self.state.read(), parent) {
            return Err(StorageError::NotFound(parent.to_string()));
        }
        Ok(self.insert(name, FOLDER_MIME, parent, None))
    }

    async fn create_file(
        &self,
        token: &str,
        name: &str,
        parent: &str,
        content: &str,
    ) -> Result<DriveObject, StorageError> {
        CallCounts::bump(&self.calls.create_file);
        self.authorize(token)?;
        {
            let state = self.state.read();
            if state.failing_uploads {
                return Err(StorageError::BackendUnavailable("upload failed".to_string()));
            }
            if !Self::parent_exists(&state, parent) {
                return Err(StorageError::NotFound(parent.to_string()));
            }
        }
        Ok(self.insert(name, NOTE_MIME, parent, Some(content.to_string())))
    }

    async fn update_media(
        &self,
        token: &str,
        object_id: &str,
        content: &str,
    ) -> Result<DriveObject, StorageError> {
        CallCounts::bump(&self.calls.update_media);
        self.authorize(token)?;
        let mut state = self.state.write();
        if state.failing_uploads {
            return Err(StorageError::BackendUnavailable("upload failed".to_string()));
        }
        let object = state
            .objects
            .get_mut(object_id)
            .ok_or_else(|| StorageError::NotFound(object_id.to_string()))?;
        if object.meta.is_folder() {
            return Err(StorageError::NotAFile(object_id.to_string()));
        }
        object.content = Some(content.to_string());
        object.meta.modified_time = Some(chrono::Utc::now().to_rfc3339());
        Ok(object.meta.clone())
    }

    async fn patch_metadata(
        &self,
        token: &str,
        object_id: &str,
        patch: &MetadataPatch,
    ) -> Result<DriveObject, StorageError> {
        CallCounts::bump(&self.calls.patch_metadata);
        self.authorize(token)?;
        let mut state = self.state.write();
        if let Some(ref parent) = patch.add_parent {
            if !Self::parent_exists(&state, parent) {
                return Err(StorageError::NotFound(parent.clone()));
            }
        }
        let object = state
            .objects
            .get_mut(object_id)
            .ok_or_else(|| StorageError::NotFound(object_id.to_string()))?;
        if let Some(ref name) = patch.name {
            object.meta.name = name.clone();
        }
        if let Some(ref parent) = patch.remove_parent {
            object.meta.parents.retain(|p| p != parent);
        }
        if let Some(ref parent) = patch.add_parent {
            object.meta.parents.push(parent.clone());
        }
        Ok(object.meta.clone())
    }

    async fn delete(&self, token: &str, object_id: &str) -> Result<(), StorageError> {
        CallCounts::bump(&self.calls.delete);
        self.authorize(token)?;
        let mut state = self.state.write();
        if !state.objects.contains_key(object_id) {
            return Err(StorageError::NotFound(object_id.to_string()));
        }
        let mut doomed = vec![object_id.to_string()];
        let mut i = 0;
        while i < doomed.len() {
            let current = doomed[i].clone();
            doomed.extend(Self::children_of(&state, &current).into_iter().map(|o| o.id));
            i += 1;
        }
        for id in doomed {
            state.objects.remove(&id);
        }
        Ok(())
    }
}
