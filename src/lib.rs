//! # tube-relay
//!
//! Backend library for chat bots that download online videos on request and
//! deliver them back into the conversation.
//!
//! ## Design Philosophy
//!
//! tube-relay is designed to be:
//! - **Library-first** - No bot framework baked in; the chat side is a trait
//!   the embedding application implements
//! - **Bounded** - Per-user rate limiting, a video length ceiling, a payload
//!   size ceiling, and a fixed worker pool keep resource use predictable
//! - **Event-driven** - Consumers subscribe to events, no polling required
//! - **Tidy** - Downloaded files never outlive their job; a background
//!   sweeper catches anything orphaned by a crash
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tube_relay::{Config, DeliveryChannel, MediaRelay, YtDlpFetcher};
//! # fn make_delivery() -> Arc<dyn DeliveryChannel> { unimplemented!() }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let fetcher = Arc::new(YtDlpFetcher::new(&config.download)?);
//!     let delivery: Arc<dyn DeliveryChannel> = make_delivery();
//!
//!     let relay = MediaRelay::new(config, fetcher, delivery).await?;
//!     relay.start().await;
//!     let _sweeper = relay.spawn_cleanup_sweeper();
//!
//!     // Subscribe to events
//!     let mut events = relay.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Stale file sweeping
pub mod cleanup;
/// Configuration types
pub mod config;
/// Chat delivery abstraction and upload progress throttling
pub mod delivery;
/// Error types
pub mod error;
/// Media probing and downloading via yt-dlp
pub mod fetch;
/// Per-user sliding-window rate limiting
pub mod rate_limiter;
/// Core relay implementation (decomposed into focused submodules)
pub mod relay;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Video URL recognition and normalization
pub mod urls;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{
    CleanupConfig, Config, DeliveryConfig, DownloadConfig, RateLimitConfig, RetryConfig,
};
pub use delivery::{DeliveryChannel, ProgressCallback};
pub use error::{
    DeliveryError, Error, FailureReason, FetchError, ProbeError, Result, SubmitError,
};
pub use fetch::{MediaFetcher, YtDlpFetcher};
pub use rate_limiter::RateLimiter;
pub use relay::MediaRelay;
pub use types::{
    ChatId, DownloadResult, Event, Job, MessageId, MessageRef, Stage, UserId, VideoInfo,
};

/// Helper function to run the relay with graceful signal handling.
///
/// Waits for a termination signal and then calls the relay's `shutdown()`
/// method, which drains in-flight jobs up to the configured timeout.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tube_relay::{Config, DeliveryChannel, MediaRelay, YtDlpFetcher, run_with_shutdown};
/// # fn make_delivery() -> Arc<dyn DeliveryChannel> { unimplemented!() }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let fetcher = Arc::new(YtDlpFetcher::new(&config.download)?);
///     let relay = MediaRelay::new(config, fetcher, make_delivery()).await?;
///     relay.start().await;
///
///     // Run with automatic signal handling
///     run_with_shutdown(relay).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(relay: MediaRelay) -> Result<()> {
    wait_for_signal().await;
    relay.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    // Registration can fail in restricted environments (containers, tests);
    // fall back to whichever handlers did register, or plain ctrl_c.
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                _ = sigint.recv() => tracing::info!("Received SIGINT (Ctrl+C)"),
            }
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "SIGINT handler unavailable, waiting on SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM");
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting on SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT (Ctrl+C)");
        }
        (Err(term_err), Err(int_err)) => {
            tracing::error!(
                sigterm_error = %term_err,
                sigint_error = %int_err,
                "No signal handlers registered, using ctrl_c fallback"
            );
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
    }
}
