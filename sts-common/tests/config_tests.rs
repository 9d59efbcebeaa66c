//! Integration tests for TOML configuration loading
//!
//! Missing files degrade to defaults; malformed files are rejected.

use std::io::Write;
use sts_common::config::{load_module_config, load_toml_config, TomlConfig};
use sts_common::Error;
use tempfile::{tempdir, NamedTempFile};

#[test]
fn test_missing_file_uses_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn test_load_full_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
host = "0.0.0.0"
port = 8080
serpapi_key = "serp-key"
store_url = "sqlite::memory:"
task_ttl_seconds = 600
cors_origins = ["http://localhost:3000"]

[logging]
level = "debug"

[apple]
max_reviews = 50

[prioritization]
ai_effort_estimates = true
"#
    )
    .unwrap();

    let config = load_toml_config(file.path()).unwrap();
    assert_eq!(config.host.as_deref(), Some("0.0.0.0"));
    assert_eq!(config.port, Some(8080));
    assert_eq!(config.serpapi_key.as_deref(), Some("serp-key"));
    assert_eq!(config.store_url.as_deref(), Some("sqlite::memory:"));
    assert_eq!(config.task_ttl_seconds, Some(600));
    assert_eq!(
        config.cors_origins,
        Some(vec!["http://localhost:3000".to_string()])
    );
    assert_eq!(config.logging.level.as_deref(), Some("debug"));
    assert_eq!(config.apple.max_reviews, Some(50));
    assert_eq!(config.prioritization.ai_effort_estimates, Some(true));
    assert_eq!(config.gemini_api_key, None);
}

#[test]
fn test_malformed_file_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "port = \"not a number\"").unwrap();

    let result = load_toml_config(file.path());
    assert!(matches!(result, Err(Error::Toml(_))));
}

#[test]
fn test_explicit_missing_path_is_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nope.toml");

    let result = load_module_config("sts-api", Some(&path));
    assert!(matches!(result, Err(Error::Config(_))));
}
