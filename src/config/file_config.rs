use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub token_path: Option<String>,

    // Feature configs
    pub upstream: Option<UpstreamConfig>,
    pub rate_limiter: Option<RateLimiterConfig>,
    pub polling: Option<PollingConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct UpstreamConfig {
    pub api_base_url: Option<String>,
    pub accounts_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub request_timeout_sec: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RateLimiterConfig {
    pub window_seconds: Option<u64>,
    pub max_requests: Option<usize>,
    pub min_interval_secs: Option<u64>,
    pub base_interval_secs: Option<u64>,
    pub max_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PollingConfig {
    /// "adaptive", "request_volume" or "fixed"
    pub interval_policy: Option<String>,
    pub fixed_interval_secs: Option<u64>,
    pub single_request_interval_secs: Option<u64>,
    pub multi_request_interval_secs: Option<u64>,
    pub initial_delay_secs: Option<u64>,
    pub backstop_interval_secs: Option<u64>,
    pub backstop_limit: Option<usize>,
    pub metadata_backfill_interval_hours: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
