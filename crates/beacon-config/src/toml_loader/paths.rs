//! Where the config file lives, and seeding it on first run.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use beacon_common::ConfigError;
use tracing::{debug, info};

use super::template::default_config_toml;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "BEACON_CONFIG";

/// `$BEACON_CONFIG` if set, else `<config_dir>/beacon/realtime.toml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    resolve_config_path(std::env::var_os(CONFIG_ENV), dirs::config_dir())
}

/// An empty override counts as unset.
pub(crate) fn resolve_config_path(
    override_path: Option<OsString>,
    config_dir: Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = override_path.filter(|p| !p.is_empty()) {
        debug!(env = CONFIG_ENV, "Config path taken from environment");
        return Ok(PathBuf::from(path));
    }
    config_dir
        .map(|dir| dir.join("beacon").join("realtime.toml"))
        .ok_or(ConfigError::NoConfigDir)
}

/// Seed `path` with the commented template. An existing file is left
/// untouched.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    let write_error = |e: std::io::Error| ConfigError::WriteError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_error)?;
    }

    let mut file = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            debug!(path = %path.display(), "Config appeared concurrently; keeping it");
            return Ok(());
        }
        Err(e) => return Err(write_error(e)),
    };
    file.write_all(default_config_toml().as_bytes())
        .map_err(write_error)?;

    info!(path = %path.display(), "Created default config");
    Ok(())
}
