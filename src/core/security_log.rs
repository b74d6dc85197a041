//! Append-only security event log
//!
//! One line per event: `<timestamp>\t<category>\t<detail>`. Details are
//! truncated so a hostile payload cannot grow the log without bound.

use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use tracing::warn;

use crate::core::constants::SECURITY_SNIPPET_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityEvent {
    pub timestamp: String,
    pub category: String,
    pub detail: String,
}

pub struct SecurityLog {
    file_path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl SecurityLog {
    pub fn new(file_path: PathBuf) -> Self {
        SecurityLog {
            file_path: Some(file_path),
            write_lock: Mutex::new(()),
        }
    }

    /// A log that only mirrors events to tracing.
    pub fn disabled() -> Self {
        SecurityLog {
            file_path: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Record an event. Write failures are reported through tracing and
    /// never reach the caller.
    pub fn record(&self, category: &str, detail: &str) {
        let detail = snippet(detail);
        warn!(target: "security", category, detail = %detail, "security event");

        if let Err(err) = self.write_event(category, &detail) {
            warn!(target: "security", error = %err, "failed to append security log");
        }
    }

    fn write_event(&self, category: &str, detail: &str) -> io::Result<()> {
        let Some(file_path) = &self.file_path else {
            return Ok(());
        };
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(dir) = file_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        let mut writer = BufWriter::new(file);
        let line = format!(
            "{}\t{}\t{}\n",
            Local::now().to_rfc3339(),
            single_line(category),
            detail
        );
        writer.write_all(line.as_bytes())?;
        writer.flush()
    }

    pub fn events(&self) -> io::Result<Vec<SecurityEvent>> {
        let Some(file_path) = &self.file_path else {
            return Ok(Vec::new());
        };
        let contents = match fs::read_to_string(file_path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        Ok(contents
            .lines()
            .filter_map(|line| {
                let mut parts = line.splitn(3, '\t');
                Some(SecurityEvent {
                    timestamp: parts.next()?.to_string(),
                    category: parts.next()?.to_string(),
                    detail: parts.next().unwrap_or_default().to_string(),
                })
            })
            .collect())
    }

    pub fn clear(&self) -> io::Result<()> {
        let Some(file_path) = &self.file_path else {
            return Ok(());
        };
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match fs::remove_file(file_path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }
}

/// Truncate a value for logging and fold it onto one line.
pub fn snippet(value: &str) -> String {
    let mut cut: String = value.chars().take(SECURITY_SNIPPET_LEN).collect();
    if value.chars().nth(SECURITY_SNIPPET_LEN).is_some() {
        cut.push('…');
    }
    single_line(&cut)
}

fn single_line(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}
