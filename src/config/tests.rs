use std::fs;

use serde_json::json;

use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("info".to_string());

    let overrides = LoggingOverrides {
        log_level: Some("debug".to_string()),
        log_json: Some(true),
    };

    raw.apply_logging_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.logging.format, LogFormat::Json);
}

#[test]
fn defaults_to_info_compact_and_no_storage() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert_eq!(settings.logging.format, LogFormat::Compact);
    assert!(settings.storage.is_null());
}

#[test]
fn invalid_log_level_is_reported_with_its_key() {
    let raw = RawSettings {
        logging: RawLoggingSettings {
            level: Some("loud".into()),
            json: None,
        },
        ..RawSettings::default()
    };
    let err = Settings::from_raw(raw).expect_err("unknown level");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "logging.level",
            ..
        }
    ));
}

#[test]
fn storage_must_be_a_table() {
    let raw = RawSettings {
        storage: json!("Memory"),
        ..RawSettings::default()
    };
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn storage_table_is_read_from_config_file() {
    let storage = json!({
        "adapter": "Memory",
        "options": { "namespace": "app", "ttl": 120 },
        "plugins": [
            { "name": "Serializer", "priority": 10 },
            { "name": "ClearExpiredByFactor" }
        ]
    });
    let document = toml::to_string(&json!({ "logging": { "level": "warn" }, "storage": storage }))
        .expect("toml document");

    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("stowage-test.toml");
    fs::write(&path, document).expect("write config");

    let args = CliArgs::parse_from(["stowage", "--config-file", path.to_str().expect("utf-8")]);
    let settings = load(&args).expect("settings");

    assert_eq!(settings.logging.level, LevelFilter::WARN);
    assert_eq!(settings.storage, storage);
}

#[test]
fn missing_config_file_is_an_error() {
    let args = CliArgs::parse_from(["stowage", "--config-file", "/nonexistent/stowage.toml"]);
    assert!(matches!(load(&args), Err(LoadError::Build(_))));
}

#[test]
fn default_command_is_none_and_subcommands_parse() {
    let args = CliArgs::parse_from(["stowage"]);
    assert!(args.command.is_none());

    let args = CliArgs::parse_from(["stowage", "capabilities", "--log-json", "true"]);
    assert_eq!(args.command, Some(Command::Capabilities));
    assert_eq!(args.logging.log_json, Some(true));

    let args = CliArgs::parse_from(["stowage", "--log-level", "trace", "registry"]);
    assert_eq!(args.command, Some(Command::Registry));
    assert_eq!(args.logging.log_level.as_deref(), Some("trace"));
}
