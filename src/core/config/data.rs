use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::constants::{DEFAULT_MAX_HISTORY, DEFAULT_OLLAMA_URL};
use crate::core::endpoint::Endpoint;
use crate::core::session::StoreSettings;
use crate::core::validator::{is_valid_model_identifier, ValidationError, Validator};

/// Flat settings document stored as TOML.
///
/// Missing keys fall back to their defaults, so older or hand-written
/// documents with only some of the keys still load.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub ollama_url: String,
    pub auto_save: bool,
    /// Saved sessions kept before the oldest are evicted; `0` keeps all.
    pub max_history: Option<usize>,
    /// Hide reasoning spans in model replies.
    pub hide_thinking: bool,
    pub default_model: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            auto_save: true,
            max_history: Some(DEFAULT_MAX_HISTORY),
            hide_thinking: false,
            default_model: None,
        }
    }
}

impl Settings {
    /// Validate the configured address.
    pub fn endpoint(&self, validator: &Validator) -> Result<Endpoint, ValidationError> {
        Endpoint::parse(&self.ollama_url, validator)
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            auto_save: self.auto_save,
            max_history: self.max_history.filter(|max| *max > 0),
        }
    }

    pub fn get(&self, key: SettingKey) -> String {
        match key {
            SettingKey::OllamaUrl => self.ollama_url.clone(),
            SettingKey::AutoSave => format_bool(self.auto_save).to_string(),
            SettingKey::MaxHistory => match self.max_history {
                Some(0) | None => "unlimited".to_string(),
                Some(max) => max.to_string(),
            },
            SettingKey::HideThinking => format_bool(self.hide_thinking).to_string(),
            SettingKey::DefaultModel => self
                .default_model
                .clone()
                .unwrap_or_else(|| "(unset)".to_string()),
        }
    }

    /// Parse `value` for `key` and store it. The address is only checked for
    /// shape here; callers validate it into an [`Endpoint`] before saving.
    pub fn set(&mut self, key: SettingKey, value: &str) -> Result<(), SettingError> {
        let value = value.trim();
        match key {
            SettingKey::OllamaUrl => {
                if value.is_empty() {
                    return Err(SettingError::InvalidValue {
                        key,
                        value: value.to_string(),
                        expected: "an http:// or https:// address",
                    });
                }
                self.ollama_url = value.to_string();
            }
            SettingKey::AutoSave => self.auto_save = parse_bool_for(key, value)?,
            SettingKey::HideThinking => self.hide_thinking = parse_bool_for(key, value)?,
            SettingKey::MaxHistory => {
                let parsed = if value.eq_ignore_ascii_case("unlimited") {
                    0
                } else {
                    value
                        .parse::<usize>()
                        .map_err(|_| SettingError::InvalidValue {
                            key,
                            value: value.to_string(),
                            expected: "a session count or 'unlimited'",
                        })?
                };
                self.max_history = Some(parsed);
            }
            SettingKey::DefaultModel => {
                if !is_valid_model_identifier(value) {
                    return Err(SettingError::InvalidValue {
                        key,
                        value: value.to_string(),
                        expected: "a model name such as llama2:7b",
                    });
                }
                self.default_model = Some(value.to_string());
            }
        }
        Ok(())
    }

    /// Restore the default for `key`.
    pub fn unset(&mut self, key: SettingKey) {
        let defaults = Settings::default();
        match key {
            SettingKey::OllamaUrl => self.ollama_url = defaults.ollama_url,
            SettingKey::AutoSave => self.auto_save = defaults.auto_save,
            SettingKey::MaxHistory => self.max_history = defaults.max_history,
            SettingKey::HideThinking => self.hide_thinking = defaults.hide_thinking,
            SettingKey::DefaultModel => self.default_model = defaults.default_model,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    OllamaUrl,
    AutoSave,
    MaxHistory,
    HideThinking,
    DefaultModel,
}

impl SettingKey {
    pub const ALL: [SettingKey; 5] = [
        SettingKey::OllamaUrl,
        SettingKey::AutoSave,
        SettingKey::MaxHistory,
        SettingKey::HideThinking,
        SettingKey::DefaultModel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::OllamaUrl => "ollama_url",
            SettingKey::AutoSave => "auto_save",
            SettingKey::MaxHistory => "max_history",
            SettingKey::HideThinking => "hide_thinking",
            SettingKey::DefaultModel => "default_model",
        }
    }

    /// Accepts both `snake_case` and `kebab-case` spellings.
    pub fn parse(input: &str) -> Result<Self, SettingError> {
        let normalized = input.trim().to_ascii_lowercase().replace('-', "_");
        SettingKey::ALL
            .into_iter()
            .find(|key| key.as_str() == normalized)
            .ok_or_else(|| SettingError::UnknownKey(input.to_string()))
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by `config set` / `config unset`.
#[derive(Debug, thiserror::Error)]
pub enum SettingError {
    #[error("Unknown config key: {0}")]
    UnknownKey(String),
    #[error("Invalid value '{value}' for {key}: expected {expected}")]
    InvalidValue {
        key: SettingKey,
        value: String,
        expected: &'static str,
    },
}

/// Accepts on/off, true/false, yes/no and 1/0 (case-insensitive).
pub fn parse_bool(input: &str) -> Option<bool> {
    match input.to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

pub fn format_bool(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

fn parse_bool_for(key: SettingKey, value: &str) -> Result<bool, SettingError> {
    parse_bool(value).ok_or_else(|| SettingError::InvalidValue {
        key,
        value: value.to_string(),
        expected: "on or off",
    })
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
