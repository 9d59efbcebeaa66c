//! Configuration resolution for sts-api
//!
//! Priority, highest first: command-line flag → environment variable → TOML
//! file → compiled default. clap handles the first two tiers (`env` on every
//! flag), `sts_common::config` loads the TOML file.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use sts_common::config::{is_valid_key, TomlConfig};
use sts_common::{Error, Result};
use tracing::{info, warn};

use crate::services::classifier::GEMINI_BASE_URL;
use crate::services::{AnalysisSettings, CoordinatorSettings, GeminiSettings};
use crate::sources::reddit::REDDIT_BASE_URL;
use crate::sources::serpapi::SERPAPI_BASE_URL;
use crate::sources::RedditSettings;

pub const MODULE_NAME: &str = "sts-api";

/// Command-line arguments
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "sts-api", version, about = "Review scraping and prioritization service")]
pub struct CliArgs {
    /// TOML config file (default: <config_dir>/sts/sts-api.toml)
    #[arg(long, env = "STS_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "STS_HOST")]
    pub host: Option<String>,

    #[arg(long, env = "STS_PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "STS_SERPAPI_KEY", hide_env_values = true)]
    pub serpapi_key: Option<String>,

    #[arg(long, env = "STS_GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    #[arg(long, env = "STS_GEMINI_MODEL")]
    pub gemini_model: Option<String>,

    /// memory://, sqlite::memory: or sqlite://path
    #[arg(long, env = "STS_STORE_URL")]
    pub store_url: Option<String>,

    #[arg(long, env = "STS_TASK_TTL_SECONDS")]
    pub task_ttl_seconds: Option<u64>,

    #[arg(long, env = "STS_SWEEP_INTERVAL_SECONDS")]
    pub sweep_interval_seconds: Option<u64>,

    #[arg(long, env = "STS_SOURCE_TIMEOUT_SECONDS")]
    pub source_timeout_seconds: Option<u64>,

    #[arg(long, env = "STS_REDDIT_CONCURRENT_LIMIT")]
    pub reddit_concurrent_limit: Option<usize>,

    /// Comma-separated allowed origins, `*` for any
    #[arg(long, env = "STS_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Log filter directive used when RUST_LOG is unset
    #[arg(long, env = "STS_LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub serpapi_key: String,
    pub serpapi_base_url: String,
    pub store_url: String,
    pub task_ttl: Duration,
    pub sweep_interval: Duration,
    pub cors_origins: Vec<String>,
    pub log_level: String,
    pub ai_effort_estimates: bool,
    pub apple_max_reviews: u32,
    pub reddit: RedditSettings,
    pub gemini: GeminiSettings,
    pub coordinator: CoordinatorSettings,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            serpapi_key: String::new(),
            serpapi_base_url: SERPAPI_BASE_URL.to_string(),
            store_url: "memory://".to_string(),
            task_ttl: Duration::from_secs(86_400),
            sweep_interval: Duration::from_secs(60),
            cors_origins: vec!["*".to_string()],
            log_level: "info".to_string(),
            ai_effort_estimates: false,
            apple_max_reviews: 199,
            reddit: RedditSettings {
                base_url: REDDIT_BASE_URL.to_string(),
                ..RedditSettings::default()
            },
            gemini: GeminiSettings {
                base_url: GEMINI_BASE_URL.to_string(),
                ..GeminiSettings::default()
            },
            coordinator: CoordinatorSettings::default(),
        }
    }
}

impl ServiceConfig {
    /// Merge CLI/env values over TOML values over defaults
    pub fn resolve(cli: &CliArgs, toml: &TomlConfig) -> Result<Self> {
        let defaults = ServiceConfig::default();

        let serpapi_key = resolve_api_key("SerpAPI", cli.serpapi_key.as_deref(), toml.serpapi_key.as_deref());
        let gemini_api_key =
            resolve_api_key("Gemini", cli.gemini_api_key.as_deref(), toml.gemini_api_key.as_deref());

        let task_ttl_seconds = cli
            .task_ttl_seconds
            .or(toml.task_ttl_seconds)
            .unwrap_or(defaults.task_ttl.as_secs());
        let sweep_interval_seconds = cli
            .sweep_interval_seconds
            .or(toml.sweep_interval_seconds)
            .unwrap_or(defaults.sweep_interval.as_secs());
        let source_timeout_seconds = cli
            .source_timeout_seconds
            .or(toml.source_timeout_seconds)
            .unwrap_or(defaults.coordinator.source_timeout.as_secs());

        for (name, value) in [
            ("task_ttl_seconds", task_ttl_seconds),
            ("sweep_interval_seconds", sweep_interval_seconds),
            ("source_timeout_seconds", source_timeout_seconds),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{} must be greater than 0", name)));
            }
        }

        let reddit = RedditSettings {
            concurrent_limit: cli
                .reddit_concurrent_limit
                .or(toml.reddit.concurrent_limit)
                .unwrap_or(defaults.reddit.concurrent_limit),
            requests_per_second: toml
                .reddit
                .requests_per_second
                .unwrap_or(defaults.reddit.requests_per_second),
            max_pages: toml.reddit.max_pages.unwrap_or(defaults.reddit.max_pages),
            ..defaults.reddit
        };
        if reddit.concurrent_limit == 0 || reddit.requests_per_second == 0 {
            return Err(Error::Config(
                "reddit concurrent_limit and requests_per_second must be greater than 0".to_string(),
            ));
        }

        let classification = &toml.classification;
        let analysis = AnalysisSettings {
            max_chars_per_request: classification
                .max_chars_per_request
                .unwrap_or(defaults.coordinator.analysis.max_chars_per_request),
            batch_delay: classification
                .batch_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.coordinator.analysis.batch_delay),
        };
        if analysis.max_chars_per_request == 0 {
            return Err(Error::Config("max_chars_per_request must be greater than 0".to_string()));
        }

        let gemini = GeminiSettings {
            api_key: gemini_api_key,
            model: cli
                .gemini_model
                .clone()
                .or_else(|| toml.gemini_model.clone())
                .unwrap_or(defaults.gemini.model.clone()),
            max_attempts: classification
                .max_attempts
                .unwrap_or(defaults.gemini.max_attempts)
                .max(1),
            ..defaults.gemini.clone()
        };

        let cors_origins: Vec<String> = cli
            .cors_origins
            .clone()
            .or_else(|| toml.cors_origins.clone())
            .unwrap_or(defaults.cors_origins.clone())
            .into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        let store_url = cli
            .store_url
            .clone()
            .or_else(|| toml.store_url.clone())
            .unwrap_or(defaults.store_url.clone());

        Ok(Self {
            host: cli
                .host
                .clone()
                .or_else(|| toml.host.clone())
                .unwrap_or(defaults.host),
            port: cli.port.or(toml.port).unwrap_or(defaults.port),
            serpapi_key,
            serpapi_base_url: defaults.serpapi_base_url,
            store_url,
            task_ttl: Duration::from_secs(task_ttl_seconds),
            sweep_interval: Duration::from_secs(sweep_interval_seconds),
            cors_origins,
            log_level: cli
                .log_level
                .clone()
                .or_else(|| toml.logging.level.clone())
                .unwrap_or(defaults.log_level),
            ai_effort_estimates: toml
                .prioritization
                .ai_effort_estimates
                .unwrap_or(defaults.ai_effort_estimates),
            apple_max_reviews: toml.apple.max_reviews.unwrap_or(defaults.apple_max_reviews),
            reddit,
            gemini,
            coordinator: CoordinatorSettings {
                source_timeout: Duration::from_secs(source_timeout_seconds),
                analysis,
            },
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Pick an API key from CLI/env or TOML, logging where it came from
///
/// An absent key resolves to an empty string; the components needing it
/// fail on use rather than at startup.
fn resolve_api_key(name: &str, cli_or_env: Option<&str>, toml: Option<&str>) -> String {
    let cli_or_env = cli_or_env.filter(|k| is_valid_key(k));
    let toml = toml.filter(|k| is_valid_key(k));

    if cli_or_env.is_some() && toml.is_some() {
        warn!(
            "{} API key found in multiple sources: command line/environment, TOML. Using command line/environment.",
            name
        );
    }

    match (cli_or_env, toml) {
        (Some(key), _) => {
            info!("{} API key loaded from command line/environment", name);
            key.trim().to_string()
        }
        (None, Some(key)) => {
            info!("{} API key loaded from TOML config", name);
            key.trim().to_string()
        }
        (None, None) => {
            warn!("{} API key not configured", name);
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sts_common::config::parse_toml_config;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::resolve(&CliArgs::default(), &TomlConfig::default()).unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:8000");
        assert_eq!(config.store_url, "memory://");
        assert_eq!(config.task_ttl, Duration::from_secs(86_400));
        assert_eq!(config.cors_origins, vec!["*".to_string()]);
        assert_eq!(config.gemini.model, "gemini-2.5-flash-lite");
        assert_eq!(config.coordinator.analysis.max_chars_per_request, 600_000);
        assert!(config.serpapi_key.is_empty());
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml = parse_toml_config(
            r#"
            port = 9000
            host = "0.0.0.0"
            serpapi_key = "from-toml"
            [reddit]
            concurrent_limit = 2
            max_pages = 10
            [classification]
            batch_delay_ms = 0
            "#,
        )
        .unwrap();
        let cli = CliArgs {
            port: Some(9100),
            serpapi_key: Some("from-cli".to_string()),
            ..CliArgs::default()
        };

        let config = ServiceConfig::resolve(&cli, &toml).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.serpapi_key, "from-cli");
        assert_eq!(config.reddit.concurrent_limit, 2);
        assert_eq!(config.reddit.max_pages, 10);
        assert_eq!(config.coordinator.analysis.batch_delay, Duration::ZERO);
    }

    #[test]
    fn test_blank_key_falls_through() {
        let toml = parse_toml_config("gemini_api_key = \"toml-key\"").unwrap();
        let cli = CliArgs {
            gemini_api_key: Some("   ".to_string()),
            ..CliArgs::default()
        };
        let config = ServiceConfig::resolve(&cli, &toml).unwrap();
        assert_eq!(config.gemini.api_key, "toml-key");
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let cli = CliArgs {
            task_ttl_seconds: Some(0),
            ..CliArgs::default()
        };
        assert!(matches!(
            ServiceConfig::resolve(&cli, &TomlConfig::default()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_cli_parses_cors_list() {
        let cli = CliArgs::parse_from([
            "sts-api",
            "--cors-origins",
            "http://a.example, http://b.example",
            "--port",
            "8080",
        ]);
        let config = ServiceConfig::resolve(&cli, &TomlConfig::default()).unwrap();
        assert_eq!(
            config.cors_origins,
            vec!["http://a.example".to_string(), "http://b.example".to_string()]
        );
        assert_eq!(config.port, 8080);
    }
}
