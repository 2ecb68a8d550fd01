use notestore::config::{NotesConfig, StorageConfig};
use notestore::driver::cloud::{MemoryDriveApi, StaticTokenProvider};
use notestore::router::{Backends, StorageRouter};
use notestore::session::{MemorySessionStore, PresetFolderPicker, SessionStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct Harness {
    pub router: Arc<StorageRouter>,
    pub drive: Arc<MemoryDriveApi>,
    pub store: Arc<MemorySessionStore>,
}

pub fn config_for(dir: &Path) -> NotesConfig {
    NotesConfig {
        storage: StorageConfig {
            sandbox_root: Some(dir.join("sandbox")),
            ..StorageConfig::default()
        },
        ..NotesConfig::default()
    }
}

/// Router over a temp sandbox, an in-memory cloud and an in-memory session store.
pub fn harness(dir: &Path, picked: Option<PathBuf>) -> Harness {
    harness_with_store(dir, picked, Arc::new(MemorySessionStore::new()))
}

pub fn harness_with_store(
    dir: &Path,
    picked: Option<PathBuf>,
    store: Arc<MemorySessionStore>,
) -> Harness {
    let drive = Arc::new(MemoryDriveApi::new());
    let backends = Backends::new(
        &config_for(dir),
        drive.clone(),
        Arc::new(StaticTokenProvider::new("token", chrono::Duration::hours(1))),
    )
    .unwrap();
    let router = StorageRouter::new(
        backends,
        store.clone() as Arc<dyn SessionStore>,
        Arc::new(PresetFolderPicker::new(picked)),
    );
    Harness {
        router: Arc::new(router),
        drive,
        store,
    }
}
