use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use tracing::debug;

use crate::core::config::data::Settings;
use crate::core::config::io::ConfigError;

#[derive(Default)]
struct ConfigCacheState {
    settings: Option<Settings>,
    modified: Option<SystemTime>,
}

/// Cached access to one settings document.
///
/// The cache is refreshed whenever the file's modification time changes,
/// so edits made by another process are picked up on the next load.
pub struct ConfigStore {
    path: PathBuf,
    state: Mutex<ConfigCacheState>,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: Mutex::new(ConfigCacheState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Settings, ConfigError> {
        let mut state = self.lock();
        self.refresh(&mut state)
    }

    pub fn persist(&self, settings: Settings) -> Result<(), ConfigError> {
        settings.save_to_path(&self.path)?;
        let mut state = self.lock();
        state.modified = Self::modified_time(&self.path);
        state.settings = Some(settings);
        debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }

    /// Load, apply `mutator`, and persist. Nothing is written when the
    /// mutator fails.
    pub fn mutate<F, T>(&self, mutator: F) -> Result<T, Box<dyn std::error::Error>>
    where
        F: FnOnce(&mut Settings) -> Result<T, Box<dyn std::error::Error>>,
    {
        let mut working = self.load()?;
        let result = mutator(&mut working)?;
        self.persist(working)?;
        Ok(result)
    }

    fn refresh(&self, state: &mut ConfigCacheState) -> Result<Settings, ConfigError> {
        let disk_modified = Self::modified_time(&self.path);
        match &state.settings {
            Some(settings) if state.modified == disk_modified => Ok(settings.clone()),
            _ => {
                let settings = Settings::load_from_path(&self.path)?;
                state.modified = disk_modified;
                state.settings = Some(settings.clone());
                Ok(settings)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConfigCacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn modified_time(path: &Path) -> Option<SystemTime> {
        fs::metadata(path).ok()?.modified().ok()
    }
}
