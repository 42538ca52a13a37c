//! Ingestion configuration
//!
//! [`ProviderConfig`] describes how to talk to the rating feed (endpoint,
//! credentials, retry and throttle timings). [`IngestConfig`] sizes the
//! persistence phase and the schedule.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use ratings_common::types::DEFAULT_CREDIBILITY_SCORE;

// ============================================================================
// Provider Defaults
// ============================================================================

pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Attempts per page, including the first request.
pub const DEFAULT_PROVIDER_MAX_RETRIES: u32 = 3;

pub const DEFAULT_RETRY_WAIT_MIN_MS: u64 = 1_000;

pub const DEFAULT_RETRY_WAIT_MAX_MS: u64 = 5_000;

/// Pause between successful page requests.
pub const DEFAULT_PAGE_THROTTLE_MS: u64 = 100;

pub const DEFAULT_USER_AGENT: &str = "Stock-Tracker/1.0";

// ============================================================================
// Ingestion Defaults
// ============================================================================

pub const DEFAULT_BATCH_SIZE: usize = 100;

pub const DEFAULT_WORKER_COUNT: usize = 5;

/// One hour between scheduled runs.
pub const DEFAULT_INTERVAL_SECS: u64 = 3_600;

/// Upper bound on rows per bulk insert (14 bind parameters per row, 65535 max).
pub const MAX_BATCH_SIZE: usize = 4_000;

/// Connection and retry settings for the rating feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Feed endpoint; the cursor is appended as `?next_page=<cursor>`
    pub base_url: String,

    /// Bearer token
    #[serde(skip_serializing)]
    pub api_key: String,

    pub timeout_secs: u64,

    /// Attempts per page before the fetch gives up
    pub max_retries: u32,

    /// First backoff; doubles per attempt up to `retry_wait_max`
    pub retry_wait_min: Duration,
    pub retry_wait_max: Duration,

    pub page_throttle: Duration,

    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
            max_retries: DEFAULT_PROVIDER_MAX_RETRIES,
            retry_wait_min: Duration::from_millis(DEFAULT_RETRY_WAIT_MIN_MS),
            retry_wait_max: Duration::from_millis(DEFAULT_RETRY_WAIT_MAX_MS),
            page_throttle: Duration::from_millis(DEFAULT_PAGE_THROTTLE_MS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ProviderConfig {
    pub fn builder() -> ProviderConfigBuilder {
        ProviderConfigBuilder::default()
    }

    /// Load from `STOCK_API_*` environment variables.
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            base_url: std::env::var("STOCK_API_URL").unwrap_or(default.base_url),
            api_key: std::env::var("STOCK_API_KEY").unwrap_or(default.api_key),
            timeout_secs: env_parse("STOCK_API_TIMEOUT_SECS").unwrap_or(default.timeout_secs),
            max_retries: env_parse("STOCK_API_MAX_RETRIES").unwrap_or(default.max_retries),
            retry_wait_min: env_parse("STOCK_API_RETRY_WAIT_MIN_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.retry_wait_min),
            retry_wait_max: env_parse("STOCK_API_RETRY_WAIT_MAX_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.retry_wait_max),
            page_throttle: env_parse("STOCK_API_PAGE_THROTTLE_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.page_throttle),
            user_agent: std::env::var("STOCK_API_USER_AGENT").unwrap_or(default.user_agent),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Wait before retrying after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.retry_wait_min
            .saturating_mul(1u32 << exponent)
            .min(self.retry_wait_max)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.trim().is_empty() {
            return Err("Provider URL cannot be empty (set STOCK_API_URL)".to_string());
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(format!("Provider URL must be http(s): {}", self.base_url));
        }
        if self.api_key.trim().is_empty() {
            return Err("Provider API key cannot be empty (set STOCK_API_KEY)".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }
        if self.max_retries == 0 {
            return Err("Max retries must be at least 1".to_string());
        }
        if self.retry_wait_min > self.retry_wait_max {
            return Err("Minimum retry wait cannot exceed the maximum".to_string());
        }
        Ok(())
    }
}

/// Builder for ProviderConfig
#[derive(Debug, Default)]
pub struct ProviderConfigBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    retry_wait_min: Option<Duration>,
    retry_wait_max: Option<Duration>,
    page_throttle: Option<Duration>,
    user_agent: Option<String>,
}

impl ProviderConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn retry_wait(mut self, min: Duration, max: Duration) -> Self {
        self.retry_wait_min = Some(min);
        self.retry_wait_max = Some(max);
        self
    }

    pub fn page_throttle(mut self, throttle: Duration) -> Self {
        self.page_throttle = Some(throttle);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn build(self) -> ProviderConfig {
        let default = ProviderConfig::default();

        ProviderConfig {
            base_url: self.base_url.unwrap_or(default.base_url),
            api_key: self.api_key.unwrap_or(default.api_key),
            timeout_secs: self.timeout_secs.unwrap_or(default.timeout_secs),
            max_retries: self.max_retries.unwrap_or(default.max_retries),
            retry_wait_min: self.retry_wait_min.unwrap_or(default.retry_wait_min),
            retry_wait_max: self.retry_wait_max.unwrap_or(default.retry_wait_max),
            page_throttle: self.page_throttle.unwrap_or(default.page_throttle),
            user_agent: self.user_agent.unwrap_or(default.user_agent),
        }
    }
}

/// Persistence and scheduling settings for ingestion runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Whether the scheduler starts at all
    pub enabled: bool,

    /// Records per bulk insert
    pub batch_size: usize,

    /// Maximum batches committed concurrently
    pub worker_count: usize,

    /// Credibility given to newly discovered brokers
    pub default_credibility: f64,

    /// Time between scheduled runs
    pub interval: Duration,

    /// Run once immediately when the scheduler starts
    pub run_on_startup: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: DEFAULT_BATCH_SIZE,
            worker_count: DEFAULT_WORKER_COUNT,
            default_credibility: DEFAULT_CREDIBILITY_SCORE,
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            run_on_startup: true,
        }
    }
}

impl IngestConfig {
    /// Load from `INGEST_*` environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            enabled: env_parse("INGEST_ENABLED").unwrap_or(default.enabled),
            batch_size: env_parse("INGEST_BATCH_SIZE").unwrap_or(default.batch_size),
            worker_count: env_parse("INGEST_WORKER_COUNT").unwrap_or(default.worker_count),
            default_credibility: env_parse("INGEST_DEFAULT_CREDIBILITY")
                .unwrap_or(default.default_credibility),
            interval: env_parse("INGEST_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.interval),
            run_on_startup: env_parse("INGEST_RUN_ON_STARTUP").unwrap_or(default.run_on_startup),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("Batch size must be greater than 0".to_string());
        }
        if self.batch_size > MAX_BATCH_SIZE {
            return Err(format!("Batch size cannot exceed {}", MAX_BATCH_SIZE));
        }
        if self.worker_count == 0 {
            return Err("Worker count must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.default_credibility) {
            return Err("Default credibility must be within [0, 1]".to_string());
        }
        if self.interval.is_zero() {
            return Err("Schedule interval must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = ProviderConfig::default();
        assert_eq!(config.backoff(1), Duration::from_secs(1));
        assert_eq!(config.backoff(2), Duration::from_secs(2));
        assert_eq!(config.backoff(3), Duration::from_secs(4));
        assert_eq!(config.backoff(4), Duration::from_secs(5));
        assert_eq!(config.backoff(40), Duration::from_secs(5));
    }

    #[test]
    fn test_provider_builder() {
        let config = ProviderConfig::builder()
            .base_url("https://api.example.com/list")
            .api_key("secret")
            .max_retries(5)
            .page_throttle(Duration::ZERO)
            .build();

        assert_eq!(config.base_url, "https://api.example.com/list");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.page_throttle, Duration::ZERO);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_provider_validation() {
        assert!(ProviderConfig::default().validate().is_err());

        let no_key = ProviderConfig::builder().base_url("https://x.test").build();
        assert!(no_key.validate().unwrap_err().contains("API key"));

        let bad_scheme = ProviderConfig::builder()
            .base_url("ftp://x.test")
            .api_key("k")
            .build();
        assert!(bad_scheme.validate().is_err());

        let inverted = ProviderConfig::builder()
            .base_url("https://x.test")
            .api_key("k")
            .retry_wait(Duration::from_secs(5), Duration::from_secs(1))
            .build();
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_ingest_config_validation() {
        assert!(IngestConfig::default().validate().is_ok());

        let zero_workers = IngestConfig {
            worker_count: 0,
            ..Default::default()
        };
        assert!(zero_workers.validate().is_err());

        let huge_batches = IngestConfig {
            batch_size: MAX_BATCH_SIZE + 1,
            ..Default::default()
        };
        assert!(huge_batches.validate().is_err());

        let bad_score = IngestConfig {
            default_credibility: 1.5,
            ..Default::default()
        };
        assert!(bad_score.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_ingest_config_from_env() {
        std::env::set_var("INGEST_BATCH_SIZE", "250");
        std::env::set_var("INGEST_WORKER_COUNT", "8");
        std::env::set_var("INGEST_INTERVAL_SECS", "not-a-number");

        let config = IngestConfig::from_env();
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.interval, Duration::from_secs(DEFAULT_INTERVAL_SECS));

        std::env::remove_var("INGEST_BATCH_SIZE");
        std::env::remove_var("INGEST_WORKER_COUNT");
        std::env::remove_var("INGEST_INTERVAL_SECS");
    }
}
