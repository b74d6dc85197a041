//! Durable record of conversations.
//!
//! [`SessionStore`] owns the open session and the saved history. Every change
//! to the history is followed by a full rewrite of the history document; if
//! that rewrite fails the in-memory history stays ahead of disk and
//! [`SessionStore::is_durable`] reports it until [`SessionStore::flush`]
//! succeeds.

pub mod export;
pub mod io;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::ChatMessage;
use crate::core::constants::{DEFAULT_MAX_HISTORY, EXPORTS_DIR};
use crate::core::message::{local_timestamp, now, Message, Role};
use crate::core::session::export::{render, ExportFormat};
use crate::core::session::io::{
    quarantine, read_history, write_atomic, write_json_atomic, PersistenceError,
};
use crate::core::validator::{sanitize, ValidationError, Validator};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub title: String,
    #[serde(with = "local_timestamp")]
    pub timestamp: NaiveDateTime,
    pub messages: Vec<Message>,
}

impl Session {
    /// `YYYY-MM-DD HH:MM`, as shown in history listings.
    pub fn listing_date(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M").to_string()
    }
}

/// One row of a history listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub index: usize,
    pub title: String,
    pub date: String,
    pub message_count: usize,
}

/// Which session an export reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportSource {
    Current,
    History(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSettings {
    pub auto_save: bool,
    /// Oldest sessions are evicted beyond this many. `None` keeps everything.
    pub max_history: Option<usize>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            auto_save: true,
            max_history: Some(DEFAULT_MAX_HISTORY),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no saved session at index {0}")]
    NoSuchSession(usize),
    #[error("the current session has no messages")]
    EmptySession,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

pub struct SessionStore {
    history_path: PathBuf,
    history: Vec<Session>,
    current: Vec<Message>,
    settings: StoreSettings,
    dirty: bool,
    validator: Arc<Validator>,
}

impl SessionStore {
    /// Load the history document at `history_path`.
    ///
    /// A document that does not parse is renamed to `<name>.corrupt` and the
    /// store starts with an empty history.
    pub fn open(
        history_path: PathBuf,
        validator: Arc<Validator>,
        settings: StoreSettings,
    ) -> Result<Self, StoreError> {
        let history = match read_history(&history_path) {
            Ok(history) => history,
            Err(PersistenceError::Parse { path, source }) => {
                let moved_to = quarantine(&path)?;
                warn!(
                    error = %source,
                    moved_to = %moved_to.display(),
                    "history document is corrupt; starting with an empty history"
                );
                validator
                    .security_log()
                    .record("corrupt history document", &moved_to.display().to_string());
                Vec::new()
            }
            Err(err) => return Err(err.into()),
        };

        let mut store = SessionStore {
            history_path,
            history,
            current: Vec::new(),
            settings,
            dirty: false,
            validator,
        };
        if store.enforce_max_history() > 0 {
            // Keep disk in step with the trimmed collection; a failure only
            // leaves the store flagged as not durable.
            let _ = store.persist();
        }
        debug!(sessions = store.history.len(), "history loaded");
        Ok(store)
    }

    pub fn history_path(&self) -> &Path {
        &self.history_path
    }

    pub fn history(&self) -> &[Session] {
        &self.history
    }

    pub fn current(&self) -> &[Message] {
        &self.current
    }

    pub fn settings(&self) -> StoreSettings {
        self.settings
    }

    /// False while the in-memory history holds changes the last rewrite
    /// failed to persist.
    pub fn is_durable(&self) -> bool {
        !self.dirty
    }

    /// Add a message to the open session.
    ///
    /// User text must pass message validation. Other roles are sanitized
    /// instead of rejected. Returns `false` when nothing was appended
    /// because the content is blank.
    pub fn append(&mut self, role: Role, content: &str, model: &str) -> Result<bool, StoreError> {
        if content.trim().is_empty() {
            return Ok(false);
        }
        let content = match role {
            Role::User => {
                self.validator.validate_message(content)?;
                content.to_string()
            }
            Role::Assistant | Role::System => sanitize(content),
        };
        if content.trim().is_empty() {
            return Ok(false);
        }
        self.current.push(Message::new(role, content, model));
        Ok(true)
    }

    /// Close the open session and begin an empty one. With autosave on, a
    /// non-empty session is saved first; the fresh session starts even when
    /// that save fails.
    pub fn start_new_session(&mut self) -> Result<Option<usize>, StoreError> {
        let saved = if self.settings.auto_save && !self.current.is_empty() {
            self.save(None).map(Some)
        } else {
            Ok(None)
        };
        self.current.clear();
        saved
    }

    /// Move the open session into the history and rewrite the document.
    ///
    /// Returns the index of the saved session. If the rewrite fails the
    /// session stays in the history and the store is flagged not durable.
    pub fn save(&mut self, title: Option<&str>) -> Result<usize, StoreError> {
        if self.current.is_empty() {
            return Err(StoreError::EmptySession);
        }
        let timestamp = now();
        let title = title
            .map(sanitize)
            .map(|title| title.trim().to_string())
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| format!("Chat {}", timestamp.format("%Y-%m-%d %H:%M")));

        self.history.push(Session {
            title,
            timestamp,
            messages: std::mem::take(&mut self.current),
        });
        self.enforce_max_history();
        let index = self.history.len() - 1;

        self.persist()?;
        info!(index, sessions = self.history.len(), "session saved");
        Ok(index)
    }

    /// Reopen a saved session. The open session receives a copy, so later
    /// appends never reach the stored entry.
    pub fn load(&mut self, index: usize) -> Result<(), StoreError> {
        let session = self
            .history
            .get(index)
            .ok_or(StoreError::NoSuchSession(index))?;
        self.current = session.messages.clone();
        Ok(())
    }

    /// Write a session to `target`. Relative targets land in the exports
    /// directory; every target must resolve inside the storage root.
    pub fn export(&self, target: &str, source: ExportSource) -> Result<PathBuf, StoreError> {
        let session = match source {
            ExportSource::Current => {
                if self.current.is_empty() {
                    return Err(StoreError::EmptySession);
                }
                Session {
                    title: "Current Session".to_string(),
                    timestamp: now(),
                    messages: self.current.clone(),
                }
            }
            ExportSource::History(index) => self
                .history
                .get(index)
                .cloned()
                .ok_or(StoreError::NoSuchSession(index))?,
        };

        let path = self.resolve_export_path(target)?;
        let format = ExportFormat::for_path(&path);
        let contents = render(&session, format).map_err(|source| PersistenceError::Serialize {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, &contents)?;
        info!(path = %path.display(), ?format, "session exported");
        Ok(path)
    }

    /// Drop every saved session and rewrite the document as empty.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.history.clear();
        self.persist()?;
        info!("history cleared");
        Ok(())
    }

    /// Retry the history rewrite after an earlier failure.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if self.dirty {
            self.persist()?;
        }
        Ok(())
    }

    /// `{role, content}` pairs for the chat endpoint, in order, without
    /// system notes.
    pub fn project_for_transport(&self) -> Vec<ChatMessage> {
        self.current
            .iter()
            .filter_map(Message::to_api_message)
            .collect()
    }

    pub fn summaries(&self) -> Vec<SessionSummary> {
        self.history
            .iter()
            .enumerate()
            .map(|(index, session)| SessionSummary {
                index,
                title: session.title.clone(),
                date: session.listing_date(),
                message_count: session.messages.len(),
            })
            .collect()
    }

    fn resolve_export_path(&self, target: &str) -> Result<PathBuf, ValidationError> {
        let target = target.trim();
        if target.is_empty() || Path::new(target).is_absolute() {
            self.validator.resolve_path(target)
        } else {
            let relative = Path::new(EXPORTS_DIR).join(target);
            self.validator.resolve_path(&relative.to_string_lossy())
        }
    }

    /// Evict the oldest sessions beyond `max_history`; returns how many went.
    fn enforce_max_history(&mut self) -> usize {
        let Some(max) = self.settings.max_history else {
            return 0;
        };
        let max = max.max(1);
        let excess = self.history.len().saturating_sub(max);
        if excess > 0 {
            self.history.drain(..excess);
            debug!(evicted = excess, max, "oldest sessions evicted");
        }
        excess
    }

    fn persist(&mut self) -> Result<(), PersistenceError> {
        match write_json_atomic(&self.history_path, &self.history) {
            Ok(()) => {
                self.dirty = false;
                Ok(())
            }
            Err(err) => {
                self.dirty = true;
                warn!(error = %err, "history rewrite failed; in-memory history is ahead of disk");
                Err(err)
            }
        }
    }
}
