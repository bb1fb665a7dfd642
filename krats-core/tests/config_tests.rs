use krats_auth::MAX_WINDOW_SECS;
use krats_core::config::MAX_INACTIVITY_TIMEOUT_SECS;
use krats_core::{Capability, ConfigError, CoreConfig};
use pretty_assertions::assert_eq;
use std::time::Duration;

#[test]
fn empty_document_gives_defaults() {
    let config = CoreConfig::from_toml("").unwrap();
    assert_eq!(config, CoreConfig::default());
    assert_eq!(config.password.min_length, 12);
    assert_eq!(config.hashing.memory_cost_kib, 19456);
    assert_eq!(config.login.max_failures, 5);
    assert_eq!(config.session.inactivity_timeout(), Duration::from_secs(28800));
    assert_eq!(config.service.channel_capacity, 256);
    assert_eq!(config.secrets.encryption_key_env, "KRATS_ENCRYPTION_KEY");
    assert_eq!(config.hardware.salt, "krats-hwid-v1");
}

#[test]
fn partial_sections_keep_other_defaults() {
    let config = CoreConfig::from_toml(
        r#"
        [paths]
        data_dir = "/var/lib/krats"

        [password]
        min_length = 14

        [login]
        max_failures = 3

        [capabilities]
        disabled = ["ai", "whatsapp"]
        "#,
    )
    .unwrap();

    assert_eq!(config.data_dir(), std::path::PathBuf::from("/var/lib/krats"));
    assert_eq!(config.key_dir(), std::path::PathBuf::from("/var/lib/krats/keys"));
    assert_eq!(
        config.license_path(),
        std::path::PathBuf::from("/var/lib/krats/license.key")
    );
    assert_eq!(config.password.min_length, 14);
    assert_eq!(config.password.max_length, 128);
    assert_eq!(config.login.max_failures, 3);
    assert_eq!(config.login.window_secs, 900);
    assert!(config.capabilities.disabled.contains(&Capability::Ai));
    assert!(config.capabilities.disabled.contains(&Capability::Whatsapp));
}

#[test]
fn home_relative_paths_expand() {
    let config = CoreConfig::from_toml("[paths]\nkey_dir = \"~/secure/keys\"\n").unwrap();
    let key_dir = config.key_dir();
    assert!(key_dir.ends_with("secure/keys"));
    assert!(!key_dir.starts_with("~"));
}

#[test]
fn malformed_toml_is_an_error() {
    let err = CoreConfig::from_toml("[password\nmin_length = 12").unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn wrong_types_are_an_error() {
    assert!(CoreConfig::from_toml("[password]\nmin_length = \"twelve\"").is_err());
}

#[test]
fn weakening_settings_are_rejected() {
    for doc in [
        "[password]\nmin_length = 0",
        "[password]\nmin_length = 200",
        "[password]\nmin_character_classes = 5",
        "[login]\nmax_failures = 0",
        "[session]\ninactivity_timeout_secs = 0",
        "[service]\nchannel_capacity = 0",
        "[secrets]\nencryption_key_env = \"  \"",
    ] {
        assert!(
            matches!(CoreConfig::from_toml(doc), Err(ConfigError::Invalid(_))),
            "{doc}"
        );
    }
}

#[test]
fn unbounded_durations_are_rejected() {
    for doc in [
        "[login]\nwindow_secs = 1000000000000000",
        "[login]\nwindow_secs = 2592001",
        "[session]\ninactivity_timeout_secs = 9223372036854775807",
        "[session]\ninactivity_timeout_secs = 2592001",
    ] {
        assert!(
            matches!(CoreConfig::from_toml(doc), Err(ConfigError::Invalid(_))),
            "{doc}"
        );
    }
}

#[test]
fn durations_at_the_bound_are_accepted() {
    let config = CoreConfig::from_toml(
        "[login]\nwindow_secs = 2592000\n[session]\ninactivity_timeout_secs = 2592000",
    )
    .unwrap();
    assert_eq!(config.login.window_secs, MAX_WINDOW_SECS);
    assert_eq!(config.session.inactivity_timeout_secs, MAX_INACTIVITY_TIMEOUT_SECS);
}

#[test]
fn missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = CoreConfig::load_from(dir.path().join("config.toml")).unwrap();
    assert_eq!(config, CoreConfig::default());
}

#[test]
fn malformed_file_reports_its_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "not = [valid").unwrap();
    match CoreConfig::load_from(&path).unwrap_err() {
        ConfigError::Parse { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn config_roundtrips_through_toml() {
    let mut config = CoreConfig::default();
    config.session.inactivity_timeout_secs = 600;
    config.capabilities.disabled.insert(Capability::Sms);
    let text = toml::to_string(&config).unwrap();
    assert_eq!(CoreConfig::from_toml(&text).unwrap(), config);
}
