//! Error types for tube-relay
//!
//! Every pipeline stage returns a tagged outcome instead of throwing: admission,
//! probe, fetch, and delivery each have their own error enum, and the job state
//! machine folds them into a [`FailureReason`] that knows how to describe itself
//! to the requesting user in plain language.

use std::time::Duration;
use thiserror::Error;

use crate::utils::format_duration;

/// Result type alias for tube-relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tube-relay
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "working_dir")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Request rejected at admission
    #[error("submission rejected: {0}")]
    Submit(#[from] SubmitError),

    /// Metadata probe failed
    #[error("probe error: {0}")]
    Probe(#[from] ProbeError),

    /// Media fetch failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Delivery to the chat transport failed
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Serialization error (yt-dlp JSON output)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Admission errors returned by [`MediaRelay::submit`](crate::MediaRelay::submit)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The submitted text did not contain a recognizable media URL
    #[error("not a valid video URL")]
    InvalidUrl,

    /// The user has exhausted their sliding-window quota
    #[error("rate limited, retry in {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the oldest counted request expires and a slot frees
        retry_after_secs: u64,
    },

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,
}

/// Metadata probe errors
///
/// All variants are terminal for the job; no download is attempted after any
/// of them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// The video is private
    #[error("video is private")]
    Private,

    /// The video is removed or otherwise unavailable
    #[error("video is unavailable")]
    Unavailable,

    /// The video is age-restricted
    #[error("video is age-restricted")]
    AgeRestricted,

    /// The video is blocked for copyright reasons
    #[error("video blocked due to copyright")]
    CopyrightBlocked,

    /// The probe did not complete within its timeout
    #[error("probe timed out")]
    Timeout,

    /// Any other probe failure
    #[error("probe failed: {0}")]
    Unknown(String),
}

impl ProbeError {
    /// Plain-language description shown to the requesting user
    pub fn user_message(&self) -> &'static str {
        match self {
            ProbeError::Private => "Video is private",
            ProbeError::Unavailable => "Video is unavailable",
            ProbeError::AgeRestricted => "Video is age-restricted",
            ProbeError::CopyrightBlocked => "Video blocked due to copyright",
            ProbeError::Timeout => "Request timed out",
            ProbeError::Unknown(_) => "Video cannot be accessed",
        }
    }
}

/// Media fetch errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The fetch did not complete within the configured timeout
    #[error("download timed out")]
    Timeout,

    /// The extraction tool or its environment is broken (e.g. missing ffmpeg)
    #[error("tool error: {0}")]
    Tool(String),

    /// The video became unavailable mid-fetch
    #[error("video became unavailable")]
    Unavailable,

    /// The fetched file exceeds the delivery payload limit
    #[error("file too large: {size_bytes} bytes (limit {limit_bytes})")]
    Oversized {
        /// Actual size of the fetched file
        size_bytes: u64,
        /// Maximum payload size the delivery channel accepts
        limit_bytes: u64,
    },

    /// Any other fetch failure
    #[error("download failed: {0}")]
    Failed(String),
}

impl FetchError {
    /// Plain-language description shown to the requesting user
    pub fn user_message(&self) -> String {
        match self {
            FetchError::Timeout => "Download timed out. Try a shorter video.".to_string(),
            FetchError::Tool(tool) => format!("Server error: {} not available", tool),
            FetchError::Unavailable => "Video is unavailable".to_string(),
            FetchError::Oversized {
                size_bytes,
                limit_bytes,
            } => format!(
                "Video too large ({}MB). Limit is {}MB.",
                size_bytes / (1024 * 1024),
                limit_bytes / (1024 * 1024)
            ),
            FetchError::Failed(_) => "Download failed. Try another video.".to_string(),
        }
    }
}

/// Delivery (chat transport) errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The transport demands a wait before any further calls
    #[error("delivery rate limited for {retry_after:?}")]
    RateLimited {
        /// Wait duration mandated by the transport
        retry_after: Duration,
    },

    /// Generic transport error (retried with backoff up to a bound)
    #[error("transport error: {0}")]
    Transport(String),
}

/// Terminal failure category for a single job
///
/// Consumed by the `FAILED` transition of the job state machine. Exactly one
/// user-facing message is produced per terminal failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Metadata probe failed
    Probe(ProbeError),

    /// Duration exceeds the configured ceiling (checked before any fetch)
    TooLong {
        /// Reported duration of the video
        duration_secs: u64,
        /// Configured maximum duration
        limit_secs: u64,
    },

    /// Media fetch failed
    Fetch(FetchError),

    /// The delivery channel rate-limited the upload; the mandated wait was
    /// honored and the job reported as failed without retrying the send
    DeliveryRateLimited {
        /// Wait duration the transport demanded
        retry_after: Duration,
    },

    /// Delivery failed after all retry attempts
    Delivery(String),

    /// Unexpected error caught at the worker boundary
    Internal,
}

impl FailureReason {
    /// Plain-language description shown to the requesting user
    pub fn user_message(&self) -> String {
        match self {
            FailureReason::Probe(e) => e.user_message().to_string(),
            FailureReason::TooLong { limit_secs, .. } => {
                format!("Video too long (max {})", format_duration(*limit_secs))
            }
            FailureReason::Fetch(e) => e.user_message(),
            FailureReason::DeliveryRateLimited { .. } => {
                "Rate limited. Please try again in a minute.".to_string()
            }
            FailureReason::Delivery(_) => "Upload failed. Please try again.".to_string(),
            FailureReason::Internal => "Something went wrong. Please try again.".to_string(),
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Probe(e) => write!(f, "probe: {}", e),
            FailureReason::TooLong {
                duration_secs,
                limit_secs,
            } => write!(f, "too long: {}s (limit {}s)", duration_secs, limit_secs),
            FailureReason::Fetch(e) => write!(f, "fetch: {}", e),
            FailureReason::DeliveryRateLimited { retry_after } => {
                write!(f, "delivery rate limited: {:?}", retry_after)
            }
            FailureReason::Delivery(msg) => write!(f, "delivery: {}", msg),
            FailureReason::Internal => write!(f, "internal error"),
        }
    }
}
