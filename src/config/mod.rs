mod file_config;

pub use file_config::{FileConfig, PollingConfig, RateLimiterConfig, UpstreamConfig};

use crate::listening::PollIntervalPolicy;
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.spotify.com/api/token";

/// Upper bound of the recently-played endpoint.
pub const MAX_BACKSTOP_LIMIT: usize = 50;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub token_path: Option<PathBuf>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_path: PathBuf,
    pub token_path: PathBuf,

    // Feature configs (with defaults)
    pub upstream: UpstreamSettings,
    pub rate_limiter: RateLimiterSettings,
    pub polling: PollingSettings,
}

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub api_base_url: String,
    pub accounts_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub request_timeout: Duration,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            accounts_url: DEFAULT_ACCOUNTS_URL.to_string(),
            client_id: None,
            client_secret: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiterSettings {
    pub window_seconds: u64,
    pub max_requests: usize,
    pub min_interval: Duration,
    pub base_interval: Duration,
    pub max_interval: Duration,
}

impl Default for RateLimiterSettings {
    fn default() -> Self {
        Self {
            window_seconds: 30,
            // About half of the estimated 180 requests/minute upstream allowance
            max_requests: 90,
            min_interval: Duration::from_secs(3),
            base_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollingSettings {
    pub interval_policy: PollIntervalPolicy,
    pub initial_delay: Duration,
    pub backstop_interval: Duration,
    pub backstop_limit: usize,
    /// `None` disables the periodic full metadata backfill.
    pub metadata_backfill_interval: Option<Duration>,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_policy: PollIntervalPolicy::Adaptive,
            initial_delay: Duration::from_secs(1),
            backstop_interval: Duration::from_secs(60 * 60),
            backstop_limit: MAX_BACKSTOP_LIMIT,
            metadata_backfill_interval: Some(Duration::from_secs(24 * 60 * 60)),
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let token_path = file
            .token_path
            .map(PathBuf::from)
            .or_else(|| cli.token_path.clone())
            .unwrap_or_else(|| {
                db_path
                    .parent()
                    .map(|p| p.join("token.json"))
                    .unwrap_or_else(|| PathBuf::from("token.json"))
            });

        let upstream_file = file.upstream.unwrap_or_default();
        let upstream_defaults = UpstreamSettings::default();
        let upstream = UpstreamSettings {
            api_base_url: upstream_file
                .api_base_url
                .unwrap_or(upstream_defaults.api_base_url)
                .trim_end_matches('/')
                .to_string(),
            accounts_url: upstream_file
                .accounts_url
                .unwrap_or(upstream_defaults.accounts_url),
            client_id: upstream_file.client_id.or_else(|| cli.client_id.clone()),
            client_secret: upstream_file
                .client_secret
                .or_else(|| cli.client_secret.clone()),
            request_timeout: upstream_file
                .request_timeout_sec
                .map(Duration::from_secs)
                .unwrap_or(upstream_defaults.request_timeout),
        };

        let rl_file = file.rate_limiter.unwrap_or_default();
        let rl_defaults = RateLimiterSettings::default();
        let rate_limiter = RateLimiterSettings {
            window_seconds: rl_file.window_seconds.unwrap_or(rl_defaults.window_seconds),
            max_requests: rl_file.max_requests.unwrap_or(rl_defaults.max_requests),
            min_interval: rl_file
                .min_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(rl_defaults.min_interval),
            base_interval: rl_file
                .base_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(rl_defaults.base_interval),
            max_interval: rl_file
                .max_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(rl_defaults.max_interval),
        };
        if rate_limiter.max_requests == 0 {
            bail!("rate_limiter.max_requests must be greater than 0");
        }
        if rate_limiter.window_seconds == 0 {
            bail!("rate_limiter.window_seconds must be greater than 0");
        }
        if rate_limiter.min_interval > rate_limiter.base_interval
            || rate_limiter.base_interval > rate_limiter.max_interval
        {
            bail!(
                "rate_limiter intervals must satisfy min <= base <= max, got {:?} / {:?} / {:?}",
                rate_limiter.min_interval,
                rate_limiter.base_interval,
                rate_limiter.max_interval
            );
        }

        let polling_file = file.polling.unwrap_or_default();
        let polling_defaults = PollingSettings::default();
        let interval_policy = match polling_file.interval_policy.as_deref() {
            None | Some("adaptive") => PollIntervalPolicy::Adaptive,
            Some("request_volume") => {
                let single = polling_file.single_request_interval_secs.unwrap_or(3);
                let multiple = polling_file.multi_request_interval_secs.unwrap_or(6);
                if single > multiple {
                    bail!(
                        "polling.single_request_interval_secs ({}) must not exceed multi_request_interval_secs ({})",
                        single,
                        multiple
                    );
                }
                PollIntervalPolicy::RequestVolume {
                    single: Duration::from_secs(single),
                    multiple: Duration::from_secs(multiple),
                }
            }
            Some("fixed") => PollIntervalPolicy::Fixed(Duration::from_secs(
                polling_file.fixed_interval_secs.unwrap_or(30),
            )),
            Some(other) => bail!(
                "Unknown polling.interval_policy '{}', expected adaptive, request_volume or fixed",
                other
            ),
        };

        let backstop_limit = polling_file
            .backstop_limit
            .unwrap_or(polling_defaults.backstop_limit);
        if backstop_limit == 0 || backstop_limit > MAX_BACKSTOP_LIMIT {
            bail!(
                "polling.backstop_limit must be between 1 and {}, got {}",
                MAX_BACKSTOP_LIMIT,
                backstop_limit
            );
        }

        let metadata_backfill_interval = match polling_file.metadata_backfill_interval_hours {
            Some(0) => None,
            Some(hours) => Some(Duration::from_secs(hours * 60 * 60)),
            None => polling_defaults.metadata_backfill_interval,
        };

        let polling = PollingSettings {
            interval_policy,
            initial_delay: polling_file
                .initial_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(polling_defaults.initial_delay),
            backstop_interval: polling_file
                .backstop_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(polling_defaults.backstop_interval),
            backstop_limit,
            metadata_backfill_interval,
        };

        Ok(Self {
            db_path,
            token_path,
            upstream,
            rate_limiter,
            polling,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cli_with_db(dir: &TempDir) -> CliConfig {
        CliConfig {
            db_path: Some(dir.path().join("hoardify.db")),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::resolve(&cli_with_db(&dir), None).unwrap();

        assert_eq!(config.db_path, dir.path().join("hoardify.db"));
        assert_eq!(config.token_path, dir.path().join("token.json"));
        assert_eq!(config.upstream.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.rate_limiter.max_requests, 90);
        assert_eq!(config.rate_limiter.window_seconds, 30);
        assert_eq!(config.polling.interval_policy, PollIntervalPolicy::Adaptive);
        assert_eq!(config.polling.backstop_interval, Duration::from_secs(3600));
        assert_eq!(config.polling.backstop_limit, 50);
    }

    #[test]
    fn test_missing_db_path_fails() {
        let result = AppConfig::resolve(&CliConfig::default(), None);
        assert!(result.is_err());
    }

    #[test]
    fn test_toml_overrides_cli() {
        let dir = TempDir::new().unwrap();
        let toml_str = format!(
            r#"
            db_path = "{}"

            [upstream]
            client_id = "file-client"
            api_base_url = "http://localhost:9999/v1/"

            [rate_limiter]
            max_requests = 40
            max_interval_secs = 60

            [polling]
            interval_policy = "request_volume"
            single_request_interval_secs = 4
            multi_request_interval_secs = 8
            metadata_backfill_interval_hours = 0
            "#,
            dir.path().join("from-file.db").display()
        );
        let file: FileConfig = toml::from_str(&toml_str).unwrap();

        let mut cli = cli_with_db(&dir);
        cli.client_id = Some("cli-client".to_string());
        let config = AppConfig::resolve(&cli, Some(file)).unwrap();

        assert_eq!(config.db_path, dir.path().join("from-file.db"));
        assert_eq!(config.upstream.client_id.as_deref(), Some("file-client"));
        assert_eq!(config.upstream.api_base_url, "http://localhost:9999/v1");
        assert_eq!(config.rate_limiter.max_requests, 40);
        assert_eq!(config.rate_limiter.max_interval, Duration::from_secs(60));
        assert_eq!(
            config.polling.interval_policy,
            PollIntervalPolicy::RequestVolume {
                single: Duration::from_secs(4),
                multiple: Duration::from_secs(8),
            }
        );
        assert!(config.polling.metadata_backfill_interval.is_none());
    }

    #[test]
    fn test_invalid_interval_ordering_rejected() {
        let dir = TempDir::new().unwrap();
        let file = FileConfig {
            rate_limiter: Some(RateLimiterConfig {
                min_interval_secs: Some(10),
                base_interval_secs: Some(5),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli_with_db(&dir), Some(file)).is_err());
    }

    #[test]
    fn test_unknown_interval_policy_rejected() {
        let dir = TempDir::new().unwrap();
        let file = FileConfig {
            polling: Some(PollingConfig {
                interval_policy: Some("sometimes".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli_with_db(&dir), Some(file)).is_err());
    }

    #[test]
    fn test_backstop_limit_bounds() {
        let dir = TempDir::new().unwrap();
        let file = FileConfig {
            polling: Some(PollingConfig {
                backstop_limit: Some(51),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli_with_db(&dir), Some(file)).is_err());
    }
}
