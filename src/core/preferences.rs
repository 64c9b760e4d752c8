/*
 * Persists the user's export defaults (scale and axis rotation) between runs.
 * The defaults live as a small JSON file in the per-user local configuration
 * directory. `PreferencesManagerOperations` abstracts the storage so the
 * command layer can be tested against an in-memory mock.
 */
use crate::core::path_utils;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

const EXPORT_DEFAULTS_FILENAME: &str = "export_defaults.json";

#[derive(Debug)]
pub enum PreferencesError {
    Io(io::Error),
    Serde(serde_json::Error),
    NoConfigDirectory,
}

impl From<io::Error> for PreferencesError {
    fn from(err: io::Error) -> Self {
        PreferencesError::Io(err)
    }
}

impl From<serde_json::Error> for PreferencesError {
    fn from(err: serde_json::Error) -> Self {
        PreferencesError::Serde(err)
    }
}

impl std::fmt::Display for PreferencesError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreferencesError::Io(e) => write!(f, "Preferences I/O error: {e}"),
            PreferencesError::Serde(e) => write!(f, "Preferences format error: {e}"),
            PreferencesError::NoConfigDirectory => {
                write!(f, "Could not determine configuration directory for preferences")
            }
        }
    }
}

impl std::error::Error for PreferencesError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PreferencesError::Io(e) => Some(e),
            PreferencesError::Serde(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PreferencesError>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    pub scale: f32,
    pub rot_x: f32,
    pub rot_y: f32,
    pub rot_z: f32,
}

impl Default for ExportDefaults {
    fn default() -> Self {
        ExportDefaults {
            scale: 100.0,
            rot_x: 0.0,
            rot_y: 0.0,
            rot_z: 0.0,
        }
    }
}

pub trait PreferencesManagerOperations: Send + Sync {
    fn load_export_defaults(&self, app_name: &str) -> Result<ExportDefaults>;
    fn save_export_defaults(&self, app_name: &str, defaults: &ExportDefaults) -> Result<()>;
}

/*
 * File-backed preferences. With no override the directory comes from
 * `path_utils::get_base_app_config_local_dir`; tests point it at a temporary
 * directory instead.
 */
pub struct CorePreferencesManager {
    config_dir_override: Option<PathBuf>,
}

impl CorePreferencesManager {
    pub fn new() -> Self {
        CorePreferencesManager {
            config_dir_override: None,
        }
    }

    pub fn with_config_dir(dir: &Path) -> Self {
        CorePreferencesManager {
            config_dir_override: Some(dir.to_path_buf()),
        }
    }

    fn defaults_file_path(&self, app_name: &str) -> Result<PathBuf> {
        let dir = match &self.config_dir_override {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                dir.clone()
            }
            None => path_utils::get_base_app_config_local_dir(app_name)
                .ok_or(PreferencesError::NoConfigDirectory)?,
        };
        Ok(dir.join(EXPORT_DEFAULTS_FILENAME))
    }
}

impl Default for CorePreferencesManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PreferencesManagerOperations for CorePreferencesManager {
    fn load_export_defaults(&self, app_name: &str) -> Result<ExportDefaults> {
        let file_path = self.defaults_file_path(app_name)?;
        if !file_path.exists() {
            log::debug!(
                "CorePreferencesManager: {file_path:?} does not exist, using built-in defaults."
            );
            return Ok(ExportDefaults::default());
        }
        let file = File::open(&file_path)?;
        let defaults: ExportDefaults = serde_json::from_reader(BufReader::new(file))?;
        log::debug!("CorePreferencesManager: Loaded export defaults {defaults:?}.");
        Ok(defaults)
    }

    fn save_export_defaults(&self, app_name: &str, defaults: &ExportDefaults) -> Result<()> {
        let file_path = self.defaults_file_path(app_name)?;
        let file = File::create(&file_path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), defaults)?;
        log::debug!("CorePreferencesManager: Saved export defaults to {file_path:?}.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const APP: &str = "RigRetargetTest";

    #[test]
    fn test_load_missing_file_yields_defaults() -> Result<()> {
        let dir = tempdir()?;
        let manager = CorePreferencesManager::with_config_dir(dir.path());

        let defaults = manager.load_export_defaults(APP)?;

        assert_eq!(defaults, ExportDefaults::default());
        assert_eq!(defaults.scale, 100.0);
        Ok(())
    }

    #[test]
    fn test_save_then_load() -> Result<()> {
        // Arrange
        let dir = tempdir()?;
        let manager = CorePreferencesManager::with_config_dir(&dir.path().join("cfg"));
        let custom = ExportDefaults {
            scale: 1.0,
            rot_x: -90.0,
            rot_y: 0.0,
            rot_z: 180.0,
        };

        // Act
        manager.save_export_defaults(APP, &custom)?;
        let loaded = manager.load_export_defaults(APP)?;

        // Assert
        assert_eq!(loaded, custom);
        Ok(())
    }

    #[test]
    fn test_partial_file_fills_missing_fields() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join(EXPORT_DEFAULTS_FILENAME), r#"{ "rot_x": 90.0 }"#)?;
        let manager = CorePreferencesManager::with_config_dir(dir.path());

        let loaded = manager.load_export_defaults(APP)?;

        assert_eq!(loaded.rot_x, 90.0);
        assert_eq!(loaded.scale, 100.0);
        Ok(())
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(EXPORT_DEFAULTS_FILENAME), "not json").unwrap();
        let manager = CorePreferencesManager::with_config_dir(dir.path());

        let result = manager.load_export_defaults(APP);

        assert!(matches!(result, Err(PreferencesError::Serde(_))));
    }
}
