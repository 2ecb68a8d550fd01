//! ConfigLoader: composes the sources and deserializes into `NotesConfig`.

use super::{sources, NotesConfig};
use crate::error::StorageError;
use config::Config;
use std::path::Path;
use tracing::debug;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from the global file, `explicit` (required when given) and the environment.
    pub fn load(explicit: Option<&Path>) -> Result<NotesConfig, StorageError> {
        let builder = sources::add_global_file(Config::builder()).map_err(config_error)?;
        let builder = match explicit {
            Some(path) => sources::add_file(builder, path, true).map_err(config_error)?,
            None => builder,
        };
        let builder = sources::add_environment(builder).map_err(config_error)?;
        let config: NotesConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(config_error)?;
        config.validate()?;
        debug!(?explicit, "Loaded configuration");
        Ok(config)
    }

    /// Load a single file with no global or environment layers.
    pub fn load_file_only(path: &Path) -> Result<NotesConfig, StorageError> {
        let config: NotesConfig = sources::add_file(Config::builder(), path, true)
            .and_then(|b| b.build())
            .and_then(|c| c.try_deserialize())
            .map_err(config_error)?;
        config.validate()?;
        Ok(config)
    }
}

fn config_error(err: config::ConfigError) -> StorageError {
    StorageError::Config(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.toml");
        std::fs::write(
            &path,
            "[storage]\nextension = \"txt\"\nnative_move = false\n\n[save]\ndebounce_ms = 200\n",
        )
        .unwrap();

        let config = ConfigLoader::load_file_only(&path).unwrap();
        assert_eq!(config.storage.extension, "txt");
        assert!(!config.storage.native_move);
        assert_eq!(config.save.debounce_ms, 200);
        assert_eq!(config.cloud.root_folder_name, "Notes");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigLoader::load_file_only(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[storage]\nextension = \"\"\n").unwrap();
        assert!(ConfigLoader::load_file_only(&path).is_err());
    }
}
