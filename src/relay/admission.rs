//! Request admission: URL validation, rate limiting, enqueue.

use std::sync::atomic::Ordering;

use super::MediaRelay;
use crate::error::SubmitError;
use crate::types::{ChatId, Event, Job, MessageId, UserId};
use crate::urls;

impl MediaRelay {
    /// Submit a media request on behalf of a chat user
    ///
    /// `text` may be a bare URL or a whole chat message; the first recognized
    /// video URL in it is normalized and queued, anything after it is ignored.
    /// Checks the user's sliding-window quota before enqueueing. Returns the
    /// 1-based queue position at insertion time.
    ///
    /// # Errors
    ///
    /// - [`SubmitError::InvalidUrl`] if the text contains no recognizable video URL
    /// - [`SubmitError::RateLimited`] with the reset ETA if the quota is exhausted
    /// - [`SubmitError::ShuttingDown`] while a shutdown drain is in progress
    pub async fn submit(
        &self,
        user: UserId,
        chat: ChatId,
        message: MessageId,
        text: &str,
    ) -> Result<usize, SubmitError> {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Err(SubmitError::ShuttingDown);
        }

        let url = urls::extract_urls(text)
            .into_iter()
            .next()
            .and_then(|candidate| urls::normalize_url(&candidate))
            .ok_or(SubmitError::InvalidUrl)?;

        if !self.rate_limiter.is_allowed(user) {
            let retry_after_secs = self.rate_limiter.reset_seconds(user);
            tracing::info!(
                user_id = %user,
                retry_after_secs = retry_after_secs,
                "Submission rate limited"
            );
            return Err(SubmitError::RateLimited { retry_after_secs });
        }
        self.rate_limiter.record_request(user);

        let job = Job::new(user, chat, message, url.clone());
        let position = self.enqueue(job).await;

        tracing::info!(
            user_id = %user,
            url = %url,
            position = position,
            remaining = self.rate_limiter.remaining(user),
            "Job queued"
        );
        self.emit_event(Event::JobQueued {
            user,
            url,
            position,
        });

        Ok(position)
    }
}
