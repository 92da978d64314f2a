//! Integration tests for config file resolution and graceful degradation
//!
//! Covers:
//! - Missing config files fall back to compiled defaults
//! - Priority order: CLI argument → BOXTRACK_CONFIG → user config dir
//! - Malformed files are reported, not silently ignored
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate BOXTRACK_CONFIG are marked with #[serial].

use boxtrack_common::config::{ConfigResolver, TomlConfig, CONFIG_ENV_VAR};
use boxtrack_common::Error;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Should create temp file");
    file.write_all(content.as_bytes()).expect("Should write config");
    file
}

#[test]
#[serial]
fn test_cli_path_loads_file() {
    env::remove_var(CONFIG_ENV_VAR);
    let file = write_config(
        r#"
[logging]
level = "debug"

[geo]
destination_tolerance_m = 1500.0

[insights]
timeline_window_days = 90
grouped = false
"#,
    );

    let config = ConfigResolver::new(Some(file.path())).load().unwrap();
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.geo.destination_tolerance_m, 1_500.0);
    assert_eq!(config.insights.timeline_window_days, 90);
    assert!(!config.insights.grouped);
}

#[test]
#[serial]
fn test_env_var_used_without_cli_path() {
    let file = write_config("[insights]\ntimeline_window_days = 30\n");
    env::set_var(CONFIG_ENV_VAR, file.path());

    let resolver = ConfigResolver::new(None);
    assert_eq!(resolver.resolve_path().as_deref(), Some(file.path()));
    assert_eq!(resolver.load().unwrap().insights.timeline_window_days, 30);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_cli_path_beats_env_var() {
    let env_file = write_config("[insights]\ntimeline_window_days = 30\n");
    let cli_file = write_config("[insights]\ntimeline_window_days = 60\n");
    env::set_var(CONFIG_ENV_VAR, env_file.path());

    let config = ConfigResolver::new(Some(cli_file.path())).load().unwrap();
    assert_eq!(config.insights.timeline_window_days, 60);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_missing_file_uses_defaults() {
    env::remove_var(CONFIG_ENV_VAR);
    let resolver = ConfigResolver::new(Some(Path::new("/nonexistent/boxtrack/config.toml")));
    assert_eq!(resolver.load().unwrap(), TomlConfig::default());
}

#[test]
#[serial]
fn test_malformed_file_is_config_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let file = write_config("[geo]\ndestination_tolerance_m = \"far\"\n");
    let result = ConfigResolver::new(Some(file.path())).load();
    assert!(matches!(result, Err(Error::Config(_))));
}
