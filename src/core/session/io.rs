use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::core::session::Session;

/// Errors raised while reading or writing the history document and exports.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to access {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to serialize {}: {source}", .path.display())]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Replace `path` with `contents` without ever exposing a partial file.
///
/// The data goes to a temporary file in the same directory, is synced, and
/// is then renamed over the target. On failure the old file is untouched.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), PersistenceError> {
    let io_error = |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };
    let parent = path.parent().filter(|dir| !dir.as_os_str().is_empty());

    if let Some(dir) = parent {
        fs::create_dir_all(dir).map_err(io_error)?;
    }

    let mut temp_file = match parent {
        Some(dir) => NamedTempFile::new_in(dir),
        None => NamedTempFile::new(),
    }
    .map_err(io_error)?;

    temp_file.write_all(contents).map_err(io_error)?;
    temp_file.as_file_mut().sync_all().map_err(io_error)?;
    temp_file.persist(path).map_err(|err| io_error(err.error))?;
    Ok(())
}

pub fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), PersistenceError> {
    let contents = serde_json::to_vec_pretty(value).map_err(|source| {
        PersistenceError::Serialize {
            path: path.to_path_buf(),
            source,
        }
    })?;
    write_atomic(path, &contents)
}

/// Read the history document. A missing file is an empty history.
pub fn read_history(path: &Path) -> Result<Vec<Session>, PersistenceError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(PersistenceError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&contents).map_err(|source| PersistenceError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Move an unreadable history document aside so a fresh one can be written.
pub fn quarantine(path: &Path) -> Result<PathBuf, PersistenceError> {
    let mut target = path.as_os_str().to_owned();
    target.push(".corrupt");
    let target = PathBuf::from(target);
    fs::rename(path, &target).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(target)
}
