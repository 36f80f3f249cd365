//! Configuration management for the sync client.

use ferry_engine::RetryPolicy;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default interval between periodic sync checks.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_millis(5_000);
/// Default wait after reconnecting before the first pass.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1_000);
/// Default timeout for a single remote call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Timing knobs for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// How often to check the queue while online
    pub sync_interval: Duration,
    /// Wait after an offline-to-online transition
    pub settle_delay: Duration,
    /// Backoff between retries inside a pass
    pub retry: RetryPolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            sync_interval: DEFAULT_SYNC_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
            retry: RetryPolicy::default(),
        }
    }
}

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the booking/trip API
    pub api_url: String,
    /// Bearer token for the API
    pub api_token: Option<String>,
    /// Where the queue is persisted
    pub queue_path: PathBuf,
    /// Timeout for a single remote call
    pub request_timeout: Duration,
    /// Default retry budget for new operations
    pub max_retries: u32,
    /// Scheduler timing
    pub sync: SyncSettings,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("FERRY_API_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingApiUrl)?;

        let api_token = lookup("FERRY_API_TOKEN")
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());

        let queue_path = lookup("FERRY_QUEUE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("ferry-queue.json"));

        let millis = |name: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            parse_var(&lookup, name, default.as_millis() as u64).map(Duration::from_millis)
        };

        let retry = RetryPolicy::new(
            millis("FERRY_BASE_DELAY_MS", ferry_engine::backoff::DEFAULT_BASE_DELAY)?,
            millis("FERRY_MAX_DELAY_MS", ferry_engine::backoff::DEFAULT_MAX_DELAY)?,
        );

        Ok(Self {
            api_url,
            api_token,
            queue_path,
            request_timeout: millis("FERRY_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT)?,
            max_retries: parse_var(
                &lookup,
                "FERRY_MAX_RETRIES",
                ferry_engine::operation::DEFAULT_MAX_RETRIES,
            )?,
            sync: SyncSettings {
                sync_interval: millis("FERRY_SYNC_INTERVAL_MS", DEFAULT_SYNC_INTERVAL)?,
                settle_delay: millis("FERRY_SETTLE_DELAY_MS", DEFAULT_SETTLE_DELAY)?,
                retry,
            },
        })
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            var: name,
            value,
        }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("FERRY_API_URL environment variable is required")]
    MissingApiUrl,

    #[error("Invalid {var} value: {value:?}")]
    Invalid { var: &'static str, value: String },
}
