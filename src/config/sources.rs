//! Config sources, lowest precedence first.

use super::xdg;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment, File, FileFormat};
use std::path::Path;

/// Prefix of the environment overlay (`NOTESTORE__STORAGE__EXTENSION=txt`).
pub const ENV_PREFIX: &str = "NOTESTORE";

/// Global `config.toml`; absent is fine.
pub fn add_global_file(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(match xdg::global_config_path() {
        Some(path) if path.exists() => add_file(builder, &path, false)?,
        _ => builder,
    })
}

/// TOML file at `path`.
pub fn add_file(
    builder: ConfigBuilder<DefaultState>,
    path: &Path,
    required: bool,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let name = path
        .to_str()
        .ok_or_else(|| ConfigError::Message(format!("Config path is not UTF-8: {:?}", path)))?;
    Ok(builder.add_source(File::new(name, FileFormat::Toml).required(required)))
}

/// `NOTESTORE__SECTION__KEY` overlay.
pub fn add_environment(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    ))
}
