//! Per-job pipeline state machine.
//!
//! `PROBING → DOWNLOADING → UPLOADING → DONE`, with a terminal `FAILED`
//! reachable from any state. Each stage returns a tagged outcome; the
//! transition logic consumes [`FailureReason`] values instead of catching
//! errors ad hoc. Whatever the exit state, a local file produced by the job is
//! deleted before the job is considered finished.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::MediaRelay;
use crate::cleanup::delete_file;
use crate::delivery::{ProgressCallback, ProgressThrottle};
use crate::error::{DeliveryError, FailureReason, FetchError};
use crate::retry::retry_with_backoff;
use crate::types::{DownloadResult, Event, Job, Stage};
use crate::utils::{format_duration, format_size, truncate};

/// Minimum progress advance, in percentage points, between status updates
const PROGRESS_STEP_PERCENT: u8 = 10;

impl MediaRelay {
    /// Process a single job end-to-end
    ///
    /// Never returns an error: every failure is terminal for this job only,
    /// reported to the requester as exactly one plain-language message.
    pub(crate) async fn process_job(&self, mut job: Job) {
        let mut local_file: Option<PathBuf> = None;

        match self.run_pipeline(&mut job, &mut local_file).await {
            Ok(()) => {}
            Err(reason) => {
                tracing::warn!(user_id = %job.user, url = %job.url, reason = %reason, "Job failed");
                self.report_failure(&job, &reason).await;
                self.emit_event(Event::JobFailed {
                    user: job.user,
                    reason: reason.user_message(),
                });
            }
        }

        // Unconditional cleanup: no artifact outlives its job, whichever exit
        // path was taken.
        if let Some(path) = local_file {
            delete_file(&path);
        }
    }

    async fn run_pipeline(
        &self,
        job: &mut Job,
        local_file: &mut Option<PathBuf>,
    ) -> Result<(), FailureReason> {
        // PROBING: metadata only, no payload download.
        self.set_stage(job, Stage::Probing, "Getting video info...").await;
        let info = self
            .fetcher
            .probe(&job.url)
            .await
            .map_err(FailureReason::Probe)?;

        // Long videos are rejected here because downloading is expensive and
        // the ceiling can be enforced from metadata alone.
        let limit_secs = self.config.download.max_duration.as_secs();
        if info.duration_secs > limit_secs {
            return Err(FailureReason::TooLong {
                duration_secs: info.duration_secs,
                limit_secs,
            });
        }

        // DOWNLOADING: full fetch, bounded by the fetch timeout.
        self.set_stage(
            job,
            Stage::Downloading,
            &format!(
                "Downloading: {}...\nDuration: {}\nQuality: up to {}p",
                truncate(&info.title, 50),
                format_duration(info.duration_secs),
                self.config.download.max_resolution
            ),
        )
        .await;

        let result = self
            .fetcher
            .fetch(&job.url, &job.user.to_string())
            .await
            .map_err(FailureReason::Fetch)?;
        *local_file = Some(result.file_path.clone());

        // True size is only known after a full fetch; delete immediately on
        // an oversized result.
        let limit_bytes = self.config.delivery.max_payload_bytes;
        if result.size_bytes > limit_bytes {
            delete_file(&result.file_path);
            *local_file = None;
            return Err(FailureReason::Fetch(FetchError::Oversized {
                size_bytes: result.size_bytes,
                limit_bytes,
            }));
        }

        // UPLOADING: deliver with throttled progress and bounded retry.
        self.set_stage(
            job,
            Stage::Uploading,
            &format!("Uploading ({})...", format_size(result.size_bytes)),
        )
        .await;
        self.deliver(job, &result).await?;

        // DONE: remove the status message to declutter the conversation.
        if let Some(status) = job.status.take() {
            if let Err(e) = self.delivery.delete_message(&status).await {
                tracing::warn!(user_id = %job.user, error = %e, "Failed to delete status message");
            }
        }
        self.emit_event(Event::StageChanged {
            user: job.user,
            stage: Stage::Done,
        });

        tracing::info!(
            user_id = %job.user,
            title = %truncate(&result.title, 30),
            size_bytes = result.size_bytes,
            "Job complete"
        );
        self.emit_event(Event::JobCompleted {
            user: job.user,
            title: result.title.clone(),
            size_bytes: result.size_bytes,
        });

        Ok(())
    }

    /// Deliver the fetched file, with progress updates and retry policy
    ///
    /// Transient transport errors are retried with exponential backoff up to
    /// the configured bound. A rate-limit signal is honored by sleeping
    /// exactly the mandated duration, then reported as a terminal failure
    /// without retrying the send.
    async fn deliver(&self, job: &Job, result: &DownloadResult) -> Result<(), FailureReason> {
        let caption = format!(
            "{}\nDuration: {}\nSize: {}",
            truncate(&result.title, 200),
            format_duration(result.duration_secs),
            format_size(result.size_bytes)
        );

        // Throttled progress edits run on a side task so the upload itself is
        // never blocked on a status edit. The throttle is shared across
        // attempts: a retried upload does not re-announce percentages already
        // reported.
        let (progress_tx, mut progress_rx) = tokio::sync::mpsc::unbounded_channel::<u8>();
        let throttle = Arc::new(Mutex::new(ProgressThrottle::new(PROGRESS_STEP_PERCENT)));
        let editor = job.status.map(|status| {
            let delivery = Arc::clone(&self.delivery);
            tokio::spawn(async move {
                while let Some(percent) = progress_rx.recv().await {
                    let text = format!("Uploading... {}%", percent);
                    if let Err(e) = delivery.edit_text(&status, &text).await {
                        tracing::warn!(error = %e, "Failed to update upload progress");
                    }
                }
            })
        });

        let send_result = retry_with_backoff(&self.config.delivery.retry, || {
            let tx = progress_tx.clone();
            let throttle = Arc::clone(&throttle);
            let on_progress: ProgressCallback = Box::new(move |sent, total| {
                let admitted = throttle.lock().ok().and_then(|mut t| t.admit(sent, total));
                if let Some(percent) = admitted {
                    tx.send(percent).ok();
                }
            });
            self.delivery.send_file(
                job.chat,
                &result.file_path,
                &caption,
                Some(job.message),
                on_progress,
            )
        })
        .await;

        drop(progress_tx);
        if let Some(editor) = editor {
            editor.await.ok();
        }

        match send_result {
            Ok(()) => Ok(()),
            Err(DeliveryError::RateLimited { retry_after }) => {
                tracing::warn!(
                    user_id = %job.user,
                    wait_secs = retry_after.as_secs(),
                    "Delivery rate limited, honoring mandated wait"
                );
                tokio::time::sleep(retry_after).await;
                Err(FailureReason::DeliveryRateLimited { retry_after })
            }
            Err(DeliveryError::Transport(msg)) => Err(FailureReason::Delivery(msg)),
        }
    }

    /// Move the job to a new stage, creating or editing its status message
    async fn set_stage(&self, job: &mut Job, stage: Stage, text: &str) {
        self.emit_event(Event::StageChanged {
            user: job.user,
            stage,
        });

        match &job.status {
            Some(status) => {
                if let Err(e) = self.delivery.edit_text(status, text).await {
                    tracing::warn!(user_id = %job.user, error = %e, "Failed to update status message");
                }
            }
            None => match self
                .delivery
                .send_text(job.chat, text, Some(job.message))
                .await
            {
                Ok(status) => job.status = Some(status),
                Err(e) => {
                    tracing::warn!(user_id = %job.user, error = %e, "Failed to send status message");
                }
            },
        }
    }

    /// Report a terminal failure to the requester
    ///
    /// The status message is replaced with the error text when one exists,
    /// otherwise a fresh error message is sent.
    async fn report_failure(&self, job: &Job, reason: &FailureReason) {
        self.emit_event(Event::StageChanged {
            user: job.user,
            stage: Stage::Failed,
        });

        let text = reason.user_message();
        let result = match &job.status {
            Some(status) => self.delivery.edit_text(status, &text).await,
            None => self
                .delivery
                .send_text(job.chat, &text, Some(job.message))
                .await
                .map(|_| ()),
        };
        if let Err(e) = result {
            tracing::error!(user_id = %job.user, error = %e, "Failed to report failure to user");
        }
    }

    /// Surface a panic caught at the worker boundary as a generic failure
    pub(crate) async fn report_panic(&self, job: &Job) {
        let reason = FailureReason::Internal;
        self.report_failure(job, &reason).await;
        self.emit_event(Event::JobFailed {
            user: job.user,
            reason: reason.user_message(),
        });
    }
}
