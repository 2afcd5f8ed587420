//! Path resolution for cade configuration files.
//!
//! ```text
//! <config_dir>/cade/        # e.g. ~/.config/cade on Linux
//! └── config.toml           # Dispatch configuration
//! ```

use std::env;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "CADE_CONFIG";

const APP_DIR: &str = "cade";
const CONFIG_FILE: &str = "config.toml";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// The platform config directory could not be determined.
    ConfigDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::ConfigDirNotFound => write!(f, "Cannot find config directory"),
        }
    }
}

impl std::error::Error for PathError {}

pub struct CadePaths;

impl CadePaths {
    /// Returns the cade configuration directory.
    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(PathError::ConfigDirNotFound)
    }

    /// Returns the default path of the main configuration file.
    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    /// Resolves the configuration file to load.
    ///
    /// Priority: `explicit` > `$CADE_CONFIG` > `<config_dir>/cade/config.toml`.
    pub fn resolve_config_file(explicit: Option<&Path>) -> Result<PathBuf, PathError> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        match env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Ok(PathBuf::from(path)),
            _ => Self::config_file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        let path = CadePaths::resolve_config_file(Some(Path::new("/tmp/custom.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/custom.toml"));
    }

    #[test]
    fn test_default_file_name() {
        if let Ok(path) = CadePaths::config_file() {
            assert!(path.ends_with("cade/config.toml"));
        }
    }
}
