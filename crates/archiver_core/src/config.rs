use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.114 Safari/537.36";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("max_workers must be at least 1 (got {0})")]
    MaxWorkers(usize),
    #[error("page_size must be at least 1")]
    PageSize,
    #[error("backoff_factor must be a finite value >= 1.0 (got {0})")]
    BackoffFactor(f64),
}

/// Every tunable the archiver accepts. Supplied by an outer collaborator;
/// nothing in the workspace reads the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiverConfig {
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
    pub max_retries: u32,
    #[serde(with = "duration_secs")]
    pub base_retry_delay: Duration,
    pub backoff_factor: f64,
    #[serde(with = "duration_secs")]
    pub max_retry_delay: Duration,
    /// Retry ceiling for archive pages; separate from per-post retries.
    pub page_retry_limit: u32,
    #[serde(with = "duration_secs")]
    pub rate_limit_delay: Duration,
    pub max_workers: usize,
    pub cache_enabled: bool,
    pub cache_dir: PathBuf,
    pub output_dir: PathBuf,
    pub page_size: usize,
    pub max_body_bytes: u64,
    pub max_image_bytes: u64,
    pub user_agent: String,
    pub referer: String,
    pub auth_check_url: String,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_retries: 3,
            base_retry_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_retry_delay: Duration::from_secs(30),
            page_retry_limit: 3,
            rate_limit_delay: Duration::from_secs(1),
            max_workers: 5,
            cache_enabled: false,
            cache_dir: PathBuf::from(".cache"),
            output_dir: PathBuf::from("output"),
            page_size: 12,
            max_body_bytes: 5 * 1024 * 1024,
            max_image_bytes: 10 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referer: "https://substack.com/".to_string(),
            auth_check_url: "https://substack.com/api/v1/subscriptions".to_string(),
        }
    }
}

impl ArchiverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers < 1 {
            return Err(ConfigError::MaxWorkers(self.max_workers));
        }
        if self.page_size < 1 {
            return Err(ConfigError::PageSize);
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ConfigError::BackoffFactor(self.backoff_factor));
        }
        Ok(())
    }

    /// Retry policy for per-post content and image requests.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: self.base_retry_delay,
            backoff_factor: self.backoff_factor,
            max_delay: self.max_retry_delay,
        }
    }

    /// Retry policy for archive pages.
    pub fn page_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.page_retry_limit,
            ..self.retry_policy()
        }
    }
}

/// Exponential backoff: `base_delay * backoff_factor^(attempt - 1)`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        let exponent = i32::try_from(exponent).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        ArchiverConfig::default().retry_policy()
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
