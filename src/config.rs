//! Configuration types for tube-relay

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Main configuration for [`MediaRelay`](crate::MediaRelay)
///
/// Fields are organized into logical sub-configs:
/// - [`download`](DownloadConfig) — working directory, workers, fetch behavior
/// - [`rate_limit`](RateLimitConfig) — per-user sliding-window quota
/// - [`cleanup`](CleanupConfig) — stale-file sweeper
/// - [`delivery`](DeliveryConfig) — payload limits and upload retry policy
///
/// All values have sensible defaults; `Config::default()` works out of the box.
/// Loading from a file or environment is left to the embedding application.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Per-user rate limiting
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Stale-file cleanup
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Delivery limits and retry policy
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

/// Download behavior configuration (working directory, workers, fetch bounds)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Working directory for fetched files (default: "./downloads")
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Number of concurrent job workers (default: 3)
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Maximum video resolution in pixels of height (default: 1080)
    #[serde(default = "default_max_resolution")]
    pub max_resolution: u32,

    /// Timeout for a metadata probe (default: 30 seconds)
    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    pub probe_timeout: Duration,

    /// Timeout for a full media fetch (default: 30 minutes)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub fetch_timeout: Duration,

    /// Network retries passed to the extraction tool (default: 5)
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,

    /// Maximum accepted video duration; longer videos are rejected after the
    /// probe, before any payload download (default: 2 hours)
    #[serde(default = "default_max_duration", with = "duration_serde")]
    pub max_duration: Duration,

    /// Path to the yt-dlp executable (searched on PATH if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            worker_count: default_worker_count(),
            max_resolution: default_max_resolution(),
            probe_timeout: default_probe_timeout(),
            fetch_timeout: default_fetch_timeout(),
            fetch_retries: default_fetch_retries(),
            max_duration: default_max_duration(),
            ytdlp_path: None,
        }
    }
}

/// Per-user sliding-window rate limit configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum admitted requests per user per window (default: 20)
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    /// Trailing window length (default: 1 hour)
    #[serde(default = "default_rate_window", with = "duration_serde")]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window: default_rate_window(),
        }
    }
}

/// Cleanup sweeper configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// How often the sweeper scans the working directory (default: 10 minutes)
    #[serde(default = "default_cleanup_interval", with = "duration_serde")]
    pub interval: Duration,

    /// Files with a last-modified time older than this are considered orphaned
    /// and removed (default: 30 minutes)
    #[serde(default = "default_cleanup_max_age", with = "duration_serde")]
    pub max_age: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval: default_cleanup_interval(),
            max_age: default_cleanup_max_age(),
        }
    }
}

/// Delivery limits, upload retry policy, and shutdown drain timeout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Maximum payload the delivery channel accepts (default: 2 GiB)
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,

    /// Retry policy for transient upload failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// How long shutdown waits for the queue to empty before abandoning
    /// queued jobs (default: 30 seconds)
    #[serde(default = "default_drain_timeout", with = "duration_serde")]
    pub drain_timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
            retry: RetryConfig::default(),
            drain_timeout: default_drain_timeout(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before the first retry (default: 2 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

fn default_working_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_worker_count() -> usize {
    3
}

fn default_max_resolution() -> u32 {
    1080
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(1800)
}

fn default_fetch_retries() -> u32 {
    5
}

fn default_max_duration() -> Duration {
    Duration::from_secs(7200)
}

fn default_max_requests() -> usize {
    20
}

fn default_rate_window() -> Duration {
    Duration::from_secs(3600)
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(600)
}

fn default_cleanup_max_age() -> Duration {
    Duration::from_secs(1800)
}

fn default_max_payload_bytes() -> u64 {
    2 * 1024 * 1024 * 1024
}

fn default_drain_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (serialized as whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
