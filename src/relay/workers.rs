//! FIFO job queue and worker pool.
//!
//! A single shared FIFO drained by a fixed number of long-lived worker loops.
//! No priority, no per-user fairness: strict submission order across all
//! users. Cancellation is cooperative - workers observe the shutdown signal
//! only while idle-waiting or between jobs, so an in-flight job always runs to
//! completion.

use futures::FutureExt;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::MediaRelay;
use crate::error::Result;
use crate::types::Job;

/// Poll interval while shutdown waits for the queue to drain
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl MediaRelay {
    /// Add a job to the queue and wake an idle worker
    ///
    /// Returns the 1-based queue position (queue size immediately after
    /// insertion).
    pub(crate) async fn enqueue(&self, job: Job) -> usize {
        let position = {
            let mut queue = self.queue_state.queue.lock().await;
            queue.push_back(job);
            queue.len()
        };
        self.queue_state.job_ready.notify_one();
        position
    }

    /// Start the worker pool
    ///
    /// Spawns `worker_count` long-lived loops. Calling start on a relay whose
    /// workers are already running is a no-op.
    pub async fn start(&self) {
        let mut workers = self.queue_state.workers.lock().await;
        if !workers.is_empty() {
            return;
        }

        let count = self.config.download.worker_count;
        tracing::info!(worker_count = count, "Starting queue workers");
        for worker_id in 1..=count {
            let relay = self.clone();
            workers.push(tokio::spawn(async move {
                relay.worker_loop(worker_id).await;
            }));
        }
    }

    /// One worker's lifetime: pull a job, process it, loop
    ///
    /// A failing or panicking job never terminates the worker; the error is
    /// logged and the worker proceeds to the next job.
    async fn worker_loop(self, worker_id: usize) {
        tracing::info!(worker_id = worker_id, "Worker started");

        loop {
            // Safe suspension point: shutdown is only observed here, so a job
            // picked up before cancellation always finishes.
            if self.queue_state.cancel.is_cancelled() {
                break;
            }

            let job = { self.queue_state.queue.lock().await.pop_front() };
            let Some(job) = job else {
                tokio::select! {
                    _ = self.queue_state.job_ready.notified() => continue,
                    _ = self.queue_state.cancel.cancelled() => break,
                }
            };

            tracing::info!(worker_id = worker_id, user_id = %job.user, url = %job.url, "Worker processing job");
            let fallback = job.clone();
            let run = std::panic::AssertUnwindSafe(self.process_job(job)).catch_unwind();
            if run.await.is_err() {
                tracing::error!(
                    worker_id = worker_id,
                    user_id = %fallback.user,
                    "Job processing panicked; notifying user and continuing"
                );
                self.report_panic(&fallback).await;
            }
        }

        tracing::info!(worker_id = worker_id, "Worker stopped");
    }

    /// Stop the worker pool gracefully
    ///
    /// Stops accepting new submissions, waits up to the configured drain
    /// timeout for the queue to empty, then cancels idle workers and joins
    /// all of them. Jobs still queued once the drain timeout elapses are
    /// abandoned; the job a worker is mid-way through always completes.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down relay");
        self.queue_state.accepting_new.store(false, Ordering::SeqCst);

        let drain_deadline = tokio::time::Instant::now() + self.config.delivery.drain_timeout;
        loop {
            let pending = self.pending_jobs().await;
            if pending == 0 {
                break;
            }
            if tokio::time::Instant::now() >= drain_deadline {
                tracing::warn!(abandoned = pending, "Drain timeout elapsed, abandoning queued jobs");
                break;
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }

        self.queue_state.cancel.cancel();

        let workers = {
            let mut guard = self.queue_state.workers.lock().await;
            std::mem::take(&mut *guard)
        };
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Worker task join failed");
            }
        }

        tracing::info!("Relay shut down");
        Ok(())
    }
}
