//! TOML configuration file model and loading
//!
//! Every field is optional: a value present here overrides the compiled
//! default but is itself overridden by environment variables and CLI flags.
//! A missing file is not an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Top-level TOML configuration for an STS service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub serpapi_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: Option<String>,
    pub store_url: Option<String>,
    pub task_ttl_seconds: Option<u64>,
    pub sweep_interval_seconds: Option<u64>,
    pub source_timeout_seconds: Option<u64>,
    pub cors_origins: Option<Vec<String>>,
    pub logging: LoggingConfig,
    pub reddit: RedditConfig,
    pub apple: AppleConfig,
    pub classification: ClassificationConfig,
    pub prioritization: PrioritizationConfig,
}

/// `[logging]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset (e.g. "info", "sts_api=debug")
    pub level: Option<String>,
}

/// `[reddit]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub concurrent_limit: Option<usize>,
    pub requests_per_second: Option<u32>,
    pub max_pages: Option<u32>,
}

/// `[apple]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppleConfig {
    pub max_reviews: Option<u32>,
}

/// `[classification]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub max_chars_per_request: Option<usize>,
    pub batch_delay_ms: Option<u64>,
    pub max_attempts: Option<u32>,
}

/// `[prioritization]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrioritizationConfig {
    pub ai_effort_estimates: Option<bool>,
}

/// Default config file location for a module: `<config_dir>/sts/<module>.toml`
///
/// Returns `None` when the platform has no config directory.
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sts").join(format!("{}.toml", module_name)))
}

/// Parse TOML configuration from a string
pub fn parse_toml_config(content: &str) -> Result<TomlConfig> {
    Ok(toml::from_str(content)?)
}

/// Load TOML configuration from `path`
///
/// A missing file yields `TomlConfig::default()`. An unreadable or malformed
/// file is an error, so a typo never silently falls back to defaults.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "Config file not found, using defaults");
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = parse_toml_config(&content).map_err(|e| {
        warn!(path = %path.display(), error = %e, "Config file rejected");
        e
    })?;
    debug!(path = %path.display(), "Config file loaded");
    Ok(config)
}

/// Load configuration from the explicit path, or the module's default path
///
/// An explicit path that does not exist is an error; the default path is
/// optional.
pub fn load_module_config(module_name: &str, explicit: Option<&Path>) -> Result<TomlConfig> {
    match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            load_toml_config(path)
        }
        None => match default_config_path(module_name) {
            Some(path) => load_toml_config(&path),
            None => Ok(TomlConfig::default()),
        },
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_sections() {
        let config = parse_toml_config(
            r#"
            port = 9000
            gemini_model = "gemini-2.5-pro"

            [reddit]
            concurrent_limit = 2

            [classification]
            max_attempts = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.port, Some(9000));
        assert_eq!(config.gemini_model.as_deref(), Some("gemini-2.5-pro"));
        assert_eq!(config.reddit.concurrent_limit, Some(2));
        assert_eq!(config.reddit.max_pages, None);
        assert_eq!(config.classification.max_attempts, Some(4));
        assert_eq!(config.logging.level, None);
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(parse_toml_config("").unwrap(), TomlConfig::default());
    }

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("abc"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("   \t"));
    }
}
