//! Core relay implementation split into focused submodules.
//!
//! The `MediaRelay` struct and its methods are organized by domain:
//! - [`admission`] - URL validation, rate limiting, enqueue
//! - [`workers`] - FIFO queue, worker pool, shutdown drain protocol
//! - [`processor`] - Per-job pipeline state machine

mod admission;
mod processor;
mod workers;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::cleanup::CleanupSweeper;
use crate::config::Config;
use crate::delivery::DeliveryChannel;
use crate::error::{Error, Result};
use crate::fetch::MediaFetcher;
use crate::rate_limiter::RateLimiter;
use crate::types::{Event, Job};

/// Queue and worker state shared across relay clones
#[derive(Clone)]
pub(crate) struct QueueState {
    /// FIFO buffer of pending jobs
    pub(crate) queue: Arc<tokio::sync::Mutex<VecDeque<Job>>>,
    /// Wakes idle workers when a job is enqueued
    pub(crate) job_ready: Arc<tokio::sync::Notify>,
    /// Flag cleared during shutdown so admission stops accepting jobs
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Cancellation signal observed by workers at safe suspension points
    /// (idle-waiting or between jobs), never mid-job
    pub(crate) cancel: CancellationToken,
    /// Worker join handles, consumed by shutdown
    pub(crate) workers: Arc<tokio::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>>,
}

/// Main relay instance (cloneable - all fields are Arc-wrapped)
///
/// Owns the rate limiter, job queue, and worker pool; talks to the extraction
/// engine and chat transport through the [`MediaFetcher`] and
/// [`DeliveryChannel`] collaborator traits. Constructed once at process
/// startup and passed by handle to everything that needs it - no module-level
/// mutable state anywhere.
#[derive(Clone)]
pub struct MediaRelay {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Media extraction collaborator
    pub(crate) fetcher: Arc<dyn MediaFetcher>,
    /// Chat transport collaborator
    pub(crate) delivery: Arc<dyn DeliveryChannel>,
    /// Per-user sliding-window admission control
    pub(crate) rate_limiter: Arc<RateLimiter>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Queue and worker state
    pub(crate) queue_state: QueueState,
}

/// Buffer size of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

impl MediaRelay {
    /// Create a new relay instance
    ///
    /// Ensures the working directory exists and wires up the queue, rate
    /// limiter, and event channel. Workers are not started until
    /// [`start`](Self::start) is called.
    pub async fn new(
        config: Config,
        fetcher: Arc<dyn MediaFetcher>,
        delivery: Arc<dyn DeliveryChannel>,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(&config.download.working_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create working directory '{}': {}",
                        config.download.working_dir.display(),
                        e
                    ),
                ))
            })?;

        let (event_tx, _rx) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit.max_requests,
            config.rate_limit.window,
        ));

        let queue_state = QueueState {
            queue: Arc::new(tokio::sync::Mutex::new(VecDeque::new())),
            job_ready: Arc::new(tokio::sync::Notify::new()),
            accepting_new: Arc::new(AtomicBool::new(true)),
            cancel: CancellationToken::new(),
            workers: Arc::new(tokio::sync::Mutex::new(Vec::new())),
        };

        Ok(Self {
            config: Arc::new(config),
            fetcher,
            delivery,
            rate_limiter,
            event_tx,
            queue_state,
        })
    }

    /// Subscribe to relay events
    ///
    /// Multiple subscribers are supported; each receives all events
    /// independently. A subscriber that falls behind by more than the channel
    /// capacity receives a `RecvError::Lagged` and loses the oldest events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration (cheap Arc clone)
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Number of jobs currently buffered (not counting in-flight jobs)
    pub async fn pending_jobs(&self) -> usize {
        self.queue_state.queue.lock().await.len()
    }

    /// Spawn the periodic stale-file sweeper for the working directory
    ///
    /// The sweeper stops when the relay shuts down.
    pub fn spawn_cleanup_sweeper(&self) -> tokio::task::JoinHandle<()> {
        CleanupSweeper::new(
            self.config.download.working_dir.clone(),
            self.config.cleanup.interval,
            self.config.cleanup.max_age,
            self.event_tx.clone(),
            self.queue_state.cancel.clone(),
        )
        .spawn()
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers the event is silently dropped;
    /// job processing never depends on anyone listening.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
