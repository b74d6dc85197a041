//! Settings and security-log commands

use std::error::Error;

use crate::cli::{ConfigCommands, Context};
use crate::core::config::data::path_display;
use crate::core::config::{SettingKey, Settings};
use crate::core::endpoint::Endpoint;

pub fn run_config(context: &Context, command: ConfigCommands) -> Result<(), Box<dyn Error>> {
    match command {
        ConfigCommands::Show => {
            context.settings.print_all();
            println!();
            println!("  settings file: {}", path_display(context.config.path()));
            println!("  data directory: {}", path_display(&context.paths.data_dir));
        }
        ConfigCommands::Set { key, value } => {
            let key = SettingKey::parse(&key)?;
            let settings = context.config.mutate(|settings: &mut Settings| {
                settings.set(key, &value)?;
                if key == SettingKey::OllamaUrl {
                    // Keep the stored address in normalized form
                    let endpoint = Endpoint::parse(&settings.ollama_url, &context.validator)?;
                    settings.ollama_url = endpoint.to_string();
                }
                Ok(settings.clone())
            })?;
            println!("✅ Set {key} to: {}", settings.get(key));
        }
        ConfigCommands::Unset { key } => {
            let key = SettingKey::parse(&key)?;
            let settings = context.config.mutate(|settings: &mut Settings| {
                settings.unset(key);
                Ok(settings.clone())
            })?;
            println!(
                "✅ Unset {key} (will use default: {})",
                settings.get(key)
            );
        }
    }
    Ok(())
}

pub fn run_security_log(context: &Context, clear: bool) -> Result<(), Box<dyn Error>> {
    let log = context.validator.security_log();
    if clear {
        log.clear()?;
        println!("🧹 Security log cleared");
        return Ok(());
    }

    let events = log.events()?;
    if events.is_empty() {
        println!("No security events recorded.");
        return Ok(());
    }
    for event in events {
        println!("{}  {:<40}  {}", event.timestamp, event.category, event.detail);
    }
    Ok(())
}
