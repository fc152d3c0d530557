// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Read and deserialize a configuration file without validating it.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Read a configuration file and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Like [`load_from_path`], but a missing file at the default location
/// yields the built-in defaults. An explicitly named file must exist.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    if !path.exists() && path == default_config_path() {
        info!(path = %path.display(), "no config file; using defaults");
        return Ok(RawConfigFile::default());
    }
    load_from_path(path)
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("Depflow.toml")
}
