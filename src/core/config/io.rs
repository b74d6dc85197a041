use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tempfile::NamedTempFile;

use crate::core::config::data::{path_display, Settings};
use crate::core::constants::{
    EXPORTS_DIR, HISTORY_FILE_NAME, SECURITY_LOG_DIR, SECURITY_LOG_FILE_NAME,
};

pub const SETTINGS_FILE_NAME: &str = "settings.toml";
pub const DATA_DIR_ENV: &str = "SHAMA_DATA_DIR";

/// Errors that can occur when loading or saving the settings document.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the settings file from disk.
    #[error("Failed to read config at {}: {source}", path_display(.path))]
    Read { path: PathBuf, source: io::Error },

    /// The settings file is not valid TOML or has mistyped values.
    #[error("Failed to parse config at {}: {source}", path_display(.path))]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Failed to write the settings file.
    #[error("Failed to write config at {}: {source}", path_display(.path))]
    Write { path: PathBuf, source: io::Error },

    /// No home directory to derive the default locations from.
    #[error("Failed to determine the {0} directory; pass it explicitly")]
    Location(&'static str),
}

impl Settings {
    /// Load settings from `path`. A missing file yields defaults.
    pub fn load_from_path(path: &Path) -> Result<Settings, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        let write_error = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        let parent = path.parent().filter(|dir| !dir.as_os_str().is_empty());

        if let Some(dir) = parent {
            fs::create_dir_all(dir).map_err(write_error)?;
        }

        let contents = toml::to_string_pretty(self).map_err(|err| write_error(io::Error::other(err)))?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(write_error)?;

        temp_file
            .write_all(contents.as_bytes())
            .map_err(write_error)?;
        temp_file.as_file_mut().sync_all().map_err(write_error)?;
        temp_file
            .persist(path)
            .map_err(|err| write_error(err.error))?;
        Ok(())
    }
}

/// On-disk locations used by one run of the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub config_file: PathBuf,
    /// Storage root: history, security log and exports live here.
    pub data_dir: PathBuf,
}

impl Paths {
    /// Resolve locations from explicit overrides, then `SHAMA_DATA_DIR`,
    /// then the platform directories.
    pub fn resolve(
        config_file: Option<PathBuf>,
        data_dir: Option<PathBuf>,
    ) -> Result<Paths, ConfigError> {
        Self::resolve_with_env(config_file, data_dir, std::env::var_os(DATA_DIR_ENV))
    }

    pub(crate) fn resolve_with_env(
        config_file: Option<PathBuf>,
        data_dir: Option<PathBuf>,
        env_data_dir: Option<OsString>,
    ) -> Result<Paths, ConfigError> {
        let env_data_dir = env_data_dir
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        let data_dir = data_dir.or(env_data_dir);

        let project_dirs = || ProjectDirs::from("org", "shama", "shama");
        let config_file = match config_file {
            Some(path) => path,
            None => project_dirs()
                .ok_or(ConfigError::Location("configuration"))?
                .config_dir()
                .join(SETTINGS_FILE_NAME),
        };
        let data_dir = match data_dir {
            Some(path) => path,
            None => project_dirs()
                .ok_or(ConfigError::Location("data"))?
                .data_dir()
                .to_path_buf(),
        };
        Ok(Paths {
            config_file,
            data_dir,
        })
    }

    pub fn history_file(&self) -> PathBuf {
        self.data_dir.join(HISTORY_FILE_NAME)
    }

    pub fn security_log_file(&self) -> PathBuf {
        self.data_dir
            .join(SECURITY_LOG_DIR)
            .join(SECURITY_LOG_FILE_NAME)
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.data_dir.join(EXPORTS_DIR)
    }
}
