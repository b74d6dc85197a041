use super::data::{parse_bool, SettingError, SettingKey, Settings};
use super::io::{ConfigError, Paths, SETTINGS_FILE_NAME};
use super::orchestrator::ConfigStore;
use crate::core::security_log::SecurityLog;
use crate::core::validator::Validator;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn config_store_detects_external_updates() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join(SETTINGS_FILE_NAME);
    let store = ConfigStore::new(config_path.clone());

    store
        .mutate(|settings| {
            settings.default_model = Some("llama2:7b".to_string());
            Ok(())
        })
        .expect("mutate failed");

    let persisted = Settings::load_from_path(&config_path).expect("load failed");
    assert_eq!(persisted.default_model.as_deref(), Some("llama2:7b"));

    let cached = store.load().expect("cached load failed");
    assert_eq!(cached.default_model.as_deref(), Some("llama2:7b"));

    std::thread::sleep(Duration::from_millis(1100));

    let external = Settings {
        default_model: Some("mistral".to_string()),
        ..Default::default()
    };
    external
        .save_to_path(&config_path)
        .expect("external save failed");

    let reloaded = store.load().expect("reload failed");
    assert_eq!(reloaded.default_model.as_deref(), Some("mistral"));
}

#[test]
fn missing_file_yields_defaults() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let settings =
        Settings::load_from_path(&temp_dir.path().join("nonexistent.toml")).expect("load");

    assert_eq!(settings, Settings::default());
    assert_eq!(settings.ollama_url, "http://localhost:11434");
    assert!(settings.auto_save);
    assert_eq!(settings.max_history, Some(100));
    assert!(!settings.hide_thinking);
}

#[test]
fn partial_documents_fill_in_defaults() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join(SETTINGS_FILE_NAME);
    fs::write(&config_path, "hide_thinking = true\n").expect("write");

    let settings = Settings::load_from_path(&config_path).expect("load");
    assert!(settings.hide_thinking);
    assert_eq!(settings.ollama_url, "http://localhost:11434");
    assert_eq!(settings.max_history, Some(100));
}

#[test]
fn malformed_document_is_a_parse_error_naming_the_path() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join(SETTINGS_FILE_NAME);
    fs::write(&config_path, "auto_save = \"sometimes\"\n").expect("write");

    let err = Settings::load_from_path(&config_path).expect_err("mistyped value");
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains(SETTINGS_FILE_NAME));
}

#[test]
fn settings_persistence_lifecycle() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nested").join(SETTINGS_FILE_NAME);

    let mut settings = Settings::default();
    settings
        .set(SettingKey::OllamaUrl, "http://gpu-box:11434")
        .expect("set url");
    settings
        .set(SettingKey::MaxHistory, "25")
        .expect("set history cap");
    settings.save_to_path(&config_path).expect("save");

    let loaded = Settings::load_from_path(&config_path).expect("load");
    assert_eq!(loaded, settings);

    let mut loaded = loaded;
    loaded.unset(SettingKey::OllamaUrl);
    loaded.unset(SettingKey::MaxHistory);
    loaded.save_to_path(&config_path).expect("save");
    assert_eq!(
        Settings::load_from_path(&config_path).expect("load"),
        Settings::default()
    );

    let leftovers: Vec<_> = fs::read_dir(config_path.parent().expect("parent"))
        .expect("read dir")
        .collect();
    assert_eq!(leftovers.len(), 1, "temp files must not be left behind");
}

#[test]
fn failed_mutation_writes_nothing() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join(SETTINGS_FILE_NAME);
    let store = ConfigStore::new(config_path.clone());

    let result: Result<(), _> = store.mutate(|settings| {
        settings.set(SettingKey::AutoSave, "maybe")?;
        Ok(())
    });
    assert!(result.is_err());
    assert!(!config_path.exists());
}

#[test]
fn setting_keys_accept_both_spellings() {
    assert_eq!(
        SettingKey::parse("hide-thinking").expect("kebab"),
        SettingKey::HideThinking
    );
    assert_eq!(
        SettingKey::parse("DEFAULT_MODEL").expect("upper"),
        SettingKey::DefaultModel
    );
    assert!(matches!(
        SettingKey::parse("theme"),
        Err(SettingError::UnknownKey(key)) if key == "theme"
    ));
}

#[test]
fn set_rejects_malformed_values() {
    let mut settings = Settings::default();
    assert!(settings.set(SettingKey::MaxHistory, "lots").is_err());
    assert!(settings.set(SettingKey::DefaultModel, "bad|name").is_err());
    assert!(settings.set(SettingKey::OllamaUrl, "  ").is_err());
    assert_eq!(settings, Settings::default());

    settings.set(SettingKey::AutoSave, "off").expect("bool");
    settings.set(SettingKey::MaxHistory, "unlimited").expect("unlimited");
    assert!(!settings.auto_save);
    assert_eq!(settings.get(SettingKey::MaxHistory), "unlimited");
    assert_eq!(settings.store_settings().max_history, None);
    assert!(!settings.store_settings().auto_save);
}

#[test]
fn parse_bool_accepts_common_spellings() {
    for input in ["on", "TRUE", "yes", "1"] {
        assert_eq!(parse_bool(input), Some(true), "{input}");
    }
    for input in ["off", "False", "no", "0"] {
        assert_eq!(parse_bool(input), Some(false), "{input}");
    }
    assert_eq!(parse_bool("sometimes"), None);
}

#[test]
fn describe_lists_every_key() {
    let text = Settings::default().describe();
    assert!(text.starts_with("Current configuration:\n"));
    for key in SettingKey::ALL {
        assert!(text.contains(&format!("  {key}: ")), "{key} missing");
    }
    assert!(text.contains("  default_model: (unset)"));
    assert!(text.contains("  auto_save: on"));
}

#[test]
fn configured_address_is_revalidated() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let validator = Validator::new(temp_dir.path().to_path_buf(), SecurityLog::disabled());

    let settings = Settings::default();
    let endpoint = settings.endpoint(&validator).expect("default is valid");
    assert_eq!(endpoint.as_str(), "http://localhost:11434");

    let hostile = Settings {
        ollama_url: "javascript:alert(1)".into(),
        ..Default::default()
    };
    assert!(hostile.endpoint(&validator).is_err());
}

#[test]
fn paths_prefer_flags_then_environment() {
    let explicit = Paths::resolve_with_env(
        Some(PathBuf::from("/tmp/shama/settings.toml")),
        Some(PathBuf::from("/tmp/shama-data")),
        Some(OsString::from("/ignored")),
    )
    .expect("resolve");
    assert_eq!(explicit.data_dir, PathBuf::from("/tmp/shama-data"));
    assert_eq!(
        explicit.history_file(),
        PathBuf::from("/tmp/shama-data/chat_history.json")
    );
    assert_eq!(
        explicit.security_log_file(),
        PathBuf::from("/tmp/shama-data/logs/security.log")
    );
    assert_eq!(
        explicit.exports_dir(),
        PathBuf::from("/tmp/shama-data/exports")
    );

    let from_env = Paths::resolve_with_env(
        Some(PathBuf::from("/tmp/shama/settings.toml")),
        None,
        Some(OsString::from("/srv/shama")),
    )
    .expect("resolve");
    assert_eq!(from_env.data_dir, PathBuf::from("/srv/shama"));
    assert_eq!(
        from_env.config_file,
        PathBuf::from("/tmp/shama/settings.toml")
    );
}
