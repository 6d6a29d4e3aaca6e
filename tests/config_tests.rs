//! Settings loading and validation tests.

use std::io::Write as _;

use statepool::config::Settings;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_empty_file_yields_defaults() {
    let file = write_config("");
    let settings = Settings::from_path(file.path()).unwrap();

    assert_eq!(settings.pool.restart_delay_ms, 1000);
    assert_eq!(settings.pool.poll_interval_ms, 100);
    assert_eq!(settings.pool.subscription_queue_capacity, 4096);
    assert_eq!(settings.logging.level, "info");
    assert_eq!(settings.logging.format, "pretty");
}

#[test]
fn test_partial_override() {
    let file = write_config(
        r#"
[pool]
restart_delay_ms = 250

[logging]
level = "debug"
format = "json"
"#,
    );
    let settings = Settings::from_path(file.path()).unwrap();

    assert_eq!(settings.pool.restart_delay_ms, 250);
    assert_eq!(settings.pool.poll_interval_ms, 100);
    assert_eq!(settings.logging.level, "debug");
    assert_eq!(settings.logging.format, "json");
}

#[test]
fn test_zero_values_are_rejected() {
    let file = write_config("[pool]\nsubscription_queue_capacity = 0\n");
    assert!(Settings::from_path(file.path()).is_err());
}

#[test]
fn test_logging_section_fields_default_individually() {
    let file = write_config("[logging]\nlevel = \"warn\"\n");
    let settings = Settings::from_path(file.path()).unwrap();

    assert_eq!(settings.logging.level, "warn");
    assert_eq!(settings.logging.format, "pretty");
}

#[test]
fn test_logging_init_installs_once() {
    let settings = Settings::default();
    settings.logging.init();

    // A global subscriber is already in place by now (installed above or
    // by a sibling test); a second install must be refused.
    assert!(!settings.logging.init());
}

#[test]
fn test_missing_file_is_an_error() {
    assert!(Settings::from_path("/nonexistent/statepool.toml").is_err());
}

#[test]
fn test_malformed_toml_is_an_error() {
    let file = write_config("[pool\nrestart_delay_ms = ");
    assert!(Settings::from_path(file.path()).is_err());
}
