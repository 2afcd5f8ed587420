//! Dispatch configuration file storage.
//!
//! Loads `DispatchConfig` from TOML. A missing or empty file yields the
//! defaults; saving writes a temporary file and renames it into place.

use cade_core::config::DispatchConfig;
use cade_core::error::CadeError;
use std::fs::{self, File};
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

/// Errors that can occur during config storage operations.
#[derive(Debug)]
pub enum ConfigStorageError {
    /// File I/O error.
    IoError(std::io::Error),
    /// TOML parsing error.
    TomlParseError(toml::de::Error),
    /// TOML serialization error.
    TomlSerError(toml::ser::Error),
    /// The file parsed but holds values the engine cannot run with.
    Invalid(String),
}

impl std::fmt::Display for ConfigStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigStorageError::IoError(e) => write!(f, "I/O error: {}", e),
            ConfigStorageError::TomlParseError(e) => write!(f, "TOML parse error: {}", e),
            ConfigStorageError::TomlSerError(e) => write!(f, "TOML serialization error: {}", e),
            ConfigStorageError::Invalid(e) => write!(f, "Invalid configuration: {}", e),
        }
    }
}

impl std::error::Error for ConfigStorageError {}

impl From<std::io::Error> for ConfigStorageError {
    fn from(e: std::io::Error) -> Self {
        ConfigStorageError::IoError(e)
    }
}

impl From<toml::de::Error> for ConfigStorageError {
    fn from(e: toml::de::Error) -> Self {
        ConfigStorageError::TomlParseError(e)
    }
}

impl From<toml::ser::Error> for ConfigStorageError {
    fn from(e: toml::ser::Error) -> Self {
        ConfigStorageError::TomlSerError(e)
    }
}

impl From<ConfigStorageError> for CadeError {
    fn from(e: ConfigStorageError) -> Self {
        match e {
            ConfigStorageError::IoError(io) => CadeError::from(io),
            ConfigStorageError::TomlParseError(de) => CadeError::from(de),
            ConfigStorageError::TomlSerError(ser) => CadeError::from(ser),
            ConfigStorageError::Invalid(message) => CadeError::config(message),
        }
    }
}

/// A handle on one configuration file.
pub struct ConfigStorage {
    path: PathBuf,
}

impl ConfigStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads and validates the configuration.
    ///
    /// - `Ok(config)`: parsed file, or defaults when the file is missing or empty
    /// - `Err`: failed to read, parse or validate the file
    pub fn load(&self) -> Result<DispatchConfig, ConfigStorageError> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "Config file not found, using defaults");
            return Ok(DispatchConfig::default());
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(DispatchConfig::default());
        }

        let config: DispatchConfig = toml::from_str(&content)?;
        config
            .validate()
            .map_err(|e| ConfigStorageError::Invalid(e.to_string()))?;
        Ok(config)
    }

    /// Saves the configuration atomically (temporary file + rename).
    pub fn save(&self, config: &DispatchConfig) -> Result<(), ConfigStorageError> {
        config
            .validate()
            .map_err(|e| ConfigStorageError::Invalid(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(config)?;

        let tmp_path = self.temp_path();
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(toml_string.as_bytes())?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "config.toml".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_and_empty_files_yield_defaults() {
        let dir = TempDir::new().unwrap();
        let storage = ConfigStorage::new(dir.path().join("config.toml"));
        assert_eq!(storage.load().unwrap(), DispatchConfig::default());

        fs::write(storage.path(), "   \n").unwrap();
        assert_eq!(storage.load().unwrap(), DispatchConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[classifier]
timeout_secs = 10
max_retries = 0

[predictor]
prediction_limit = 5
"#,
        )
        .unwrap();

        let config = ConfigStorage::new(path).load().unwrap();
        assert_eq!(config.classifier.timeout_secs, 10);
        assert_eq!(config.classifier.max_retries, 0);
        assert_eq!(config.predictor.prediction_limit, 5);
        assert_eq!(config.window.recent_messages, 6);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[router]\nclarification_threshold = 8.0\n").unwrap();

        let err = ConfigStorage::new(path).load().unwrap_err();
        assert!(matches!(err, ConfigStorageError::Invalid(_)));
        assert!(CadeError::from(err).is_config());
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[window\nrecent_messages = ").unwrap();

        let err = ConfigStorage::new(path).load().unwrap_err();
        assert!(matches!(err, ConfigStorageError::TomlParseError(_)));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let storage = ConfigStorage::new(dir.path().join("nested").join("config.toml"));
        let mut config = DispatchConfig::default();
        config.execution.turn_deadline_secs = 12;
        config.completion.provider = "offline".into();

        storage.save(&config).unwrap();

        assert_eq!(storage.load().unwrap(), config);
        assert!(!dir.path().join("nested").join("config.toml.tmp").exists());
    }
}
