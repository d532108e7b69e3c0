use serde::Deserialize;
use std::time::Duration;

use crate::services::{enrichment::EnrichmentOptions, retry::RetryPolicy};

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Base URL of the backend gateway fronting lms-filmes, lms-rating and lms-favorite
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Per-request timeout for gateway calls, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Maximum number of detail fetches in flight per page
    #[serde(default = "default_detail_concurrency")]
    pub detail_concurrency: usize,

    /// Retries for a single detail fetch
    #[serde(default = "default_detail_retry_count")]
    pub detail_retry_count: u32,

    /// Fixed delay between detail fetch retries, in milliseconds
    #[serde(default = "default_detail_retry_delay_ms")]
    pub detail_retry_delay_ms: u64,

    /// Maximum number of favorite status lookups in flight
    #[serde(default = "default_favorite_status_concurrency")]
    pub favorite_status_concurrency: usize,

    /// Page size requested from the rating service
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Seconds a feed may go unused before it is closed
    #[serde(default = "default_feed_idle_ttl_secs")]
    pub feed_idle_ttl_secs: u64,

    /// How often idle feeds are swept, in seconds
    #[serde(default = "default_feed_sweep_interval_secs")]
    pub feed_sweep_interval_secs: u64,

    /// Open feeds allowed per session
    #[serde(default = "default_max_feeds_per_owner")]
    pub max_feeds_per_owner: usize,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_gateway_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_detail_concurrency() -> usize {
    6
}

fn default_detail_retry_count() -> u32 {
    2
}

fn default_detail_retry_delay_ms() -> u64 {
    500
}

fn default_favorite_status_concurrency() -> usize {
    5
}

fn default_page_size() -> u32 {
    20
}

fn default_feed_idle_ttl_secs() -> u64 {
    900
}

fn default_feed_sweep_interval_secs() -> u64 {
    60
}

fn default_max_feeds_per_owner() -> usize {
    8
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            request_timeout_ms: default_request_timeout_ms(),
            detail_concurrency: default_detail_concurrency(),
            detail_retry_count: default_detail_retry_count(),
            detail_retry_delay_ms: default_detail_retry_delay_ms(),
            favorite_status_concurrency: default_favorite_status_concurrency(),
            page_size: default_page_size(),
            feed_idle_ttl_secs: default_feed_idle_ttl_secs(),
            feed_sweep_interval_secs: default_feed_sweep_interval_secs(),
            max_feeds_per_owner: default_max_feeds_per_owner(),
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Enrichment settings derived from the detail_* variables
    pub fn enrichment_options(&self) -> EnrichmentOptions {
        EnrichmentOptions {
            concurrency: self.detail_concurrency,
            retry: RetryPolicy {
                retries: self.detail_retry_count,
                delay: Duration::from_millis(self.detail_retry_delay_ms),
            },
        }
    }

    pub fn feed_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.feed_idle_ttl_secs)
    }

    /// Never zero; `tokio::time::interval` rejects an empty period
    pub fn feed_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.feed_sweep_interval_secs.max(1))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_env_is_empty() {
        let config: Config = envy::from_iter(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(config.gateway_url, "http://localhost:8080");
        assert_eq!(config.detail_concurrency, 6);
        assert_eq!(config.detail_retry_count, 2);
        assert_eq!(config.detail_retry_delay_ms, 500);
        assert_eq!(config.page_size, 20);
        assert_eq!(config.feed_idle_ttl(), Duration::from_secs(900));
        assert_eq!(config.max_feeds_per_owner, 8);
        assert_eq!(config.bind_address(), "127.0.0.1:3000");
    }

    #[test]
    fn test_overrides_from_env() {
        let vars = vec![
            ("GATEWAY_URL".to_string(), "http://gateway:9000".to_string()),
            ("DETAIL_CONCURRENCY".to_string(), "3".to_string()),
            ("DETAIL_RETRY_DELAY_MS".to_string(), "50".to_string()),
        ];
        let config: Config = envy::from_iter(vars).unwrap();

        assert_eq!(config.gateway_url, "http://gateway:9000");
        let options = config.enrichment_options();
        assert_eq!(options.concurrency, 3);
        assert_eq!(options.retry.retries, 2);
        assert_eq!(options.retry.delay, Duration::from_millis(50));
    }

    #[test]
    fn test_sweep_interval_is_never_zero() {
        let vars = vec![("FEED_SWEEP_INTERVAL_SECS".to_string(), "0".to_string())];
        let config: Config = envy::from_iter(vars).unwrap();
        assert_eq!(config.feed_sweep_interval(), Duration::from_secs(1));
    }
}
