use std::time::Duration;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const LIST_MODELS_TIMEOUT: Duration = Duration::from_secs(10);
pub const PULL_TIMEOUT: Duration = Duration::from_secs(300);
pub const CHAT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DELETE_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between connectivity probes while the front-end keeps polling.
pub const CONNECTIVITY_POLL_INTERVAL: Duration = Duration::from_secs(10);

pub const MAX_ADDRESS_LEN: usize = 2000;
pub const MAX_MODEL_NAME_LEN: usize = 100;
pub const MAX_MESSAGE_LEN: usize = 10_000;
pub const MAX_FILENAME_LEN: usize = 255;
pub const MAX_REQUEST_BYTES: usize = 100_000;

/// Security-log details are cut to this many characters.
pub const SECURITY_SNIPPET_LEN: usize = 100;

pub const DEFAULT_MAX_HISTORY: usize = 100;

pub const HISTORY_FILE_NAME: &str = "chat_history.json";
pub const SECURITY_LOG_DIR: &str = "logs";
pub const SECURITY_LOG_FILE_NAME: &str = "security.log";
pub const EXPORTS_DIR: &str = "exports";
