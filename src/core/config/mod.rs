pub mod data;
pub mod io;
pub mod orchestrator;
pub mod printing;

#[cfg(test)]
pub mod tests;

pub use data::{SettingError, SettingKey, Settings};
pub use io::{ConfigError, Paths};
pub use orchestrator::ConfigStore;
