//! Driver construction for each storage mode.

use crate::config::NotesConfig;
use crate::driver::cloud::api::DriveApi;
use crate::driver::cloud::auth::{EnvTokenProvider, TokenCache, TokenProvider};
use crate::driver::cloud::HttpDriveApi;
use crate::driver::{
    CloudDriver, DirectoryHandle, DriverKind, FsDirectory, HandleDriver, PermissionState,
    StorageDriver,
};
use crate::error::StorageError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Builds drivers from configuration; owns the process-wide cloud token cache.
pub struct Backends {
    sandbox_root: PathBuf,
    extension: String,
    native_move: bool,
    lazy_local: bool,
    root_folder_name: String,
    lazy_cloud: bool,
    fetch_concurrency: usize,
    drive: Arc<dyn DriveApi>,
    tokens: Arc<TokenCache>,
}

impl Backends {
    /// Real backends: HTTP Drive client, token from `cloud.token_env`.
    pub fn from_config(config: &NotesConfig) -> Result<Self, StorageError> {
        let drive = Arc::new(HttpDriveApi::new(
            config.cloud.api_base.clone(),
            config.cloud.upload_base.clone(),
        ));
        let provider = Arc::new(EnvTokenProvider::new(config.cloud.token_env.clone()));
        Self::new(config, drive, provider)
    }

    pub fn new(
        config: &NotesConfig,
        drive: Arc<dyn DriveApi>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            sandbox_root: config.storage.resolve_sandbox_root()?,
            extension: config.storage.extension.clone(),
            native_move: config.storage.native_move,
            lazy_local: config.storage.lazy_content,
            root_folder_name: config.cloud.root_folder_name.clone(),
            lazy_cloud: config.cloud.lazy_content,
            fetch_concurrency: config.cloud.fetch_concurrency,
            drive,
            tokens: Arc::new(TokenCache::new(tokens, config.cloud.token_skew())),
        })
    }

    pub fn tokens(&self) -> &Arc<TokenCache> {
        &self.tokens
    }

    pub fn sandbox_root(&self) -> &Path {
        &self.sandbox_root
    }

    pub async fn open_sandbox(&self) -> Result<Arc<dyn StorageDriver>, StorageError> {
        let root = FsDirectory::open_or_create(&self.sandbox_root)
            .await?
            .with_native_move(self.native_move);
        debug!(root = %self.sandbox_root.display(), "Opened sandbox");
        Ok(Arc::new(
            HandleDriver::new(DriverKind::Sandbox, Arc::new(root), &self.extension)
                .with_lazy_content(self.lazy_local),
        ))
    }

    /// Canonical form of a user-picked folder.
    pub fn canonical_local_root(&self, root: &Path) -> Result<PathBuf, StorageError> {
        dunce::canonicalize(root).map_err(|e| StorageError::from_io(e, root.display()))
    }

    /// Grant state of a previously picked folder.
    pub async fn local_permission(&self, root: &Path) -> PermissionState {
        FsDirectory::new(root).query_permission().await
    }

    /// Open a picked folder; it must exist and be writable.
    pub async fn open_local(&self, root: &Path) -> Result<Arc<dyn StorageDriver>, StorageError> {
        let handle = FsDirectory::open(root)
            .await?
            .with_native_move(self.native_move);
        match handle.query_permission().await {
            PermissionState::Granted => {}
            state => {
                return Err(StorageError::PermissionDenied(format!(
                    "{} ({:?})",
                    root.display(),
                    state
                )))
            }
        }
        debug!(root = %root.display(), "Opened local folder");
        Ok(Arc::new(
            HandleDriver::new(DriverKind::Local, Arc::new(handle), &self.extension)
                .with_lazy_content(self.lazy_local),
        ))
    }

    pub fn open_cloud(&self) -> Arc<dyn StorageDriver> {
        Arc::new(
            CloudDriver::new(
                self.drive.clone(),
                self.tokens.clone(),
                &self.root_folder_name,
                &self.extension,
            )
            .with_lazy_content(self.lazy_cloud)
            .with_fetch_concurrency(self.fetch_concurrency),
        )
    }

    /// Run the consent flow now rather than on the first cloud call.
    pub async fn authorize_cloud(&self) -> Result<(), StorageError> {
        self.tokens.token().await.map(|_| ())
    }
}
