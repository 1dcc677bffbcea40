//! Delivery channel interface
//!
//! The chat transport is a collaborator behind a trait: the relay only needs
//! text send/edit/delete and file upload with a progress callback. Transport
//! rate-limit signals surface as [`DeliveryError::RateLimited`] carrying the
//! mandated wait; everything else is a generic transport error.

use async_trait::async_trait;
use std::path::Path;

use crate::error::DeliveryError;
use crate::types::{ChatId, MessageId, MessageRef};

/// Progress callback invoked by the transport with (bytes_sent, bytes_total)
///
/// The callback is synchronous; throttling is the caller's concern (see
/// [`ProgressThrottle`]).
pub type ProgressCallback = Box<dyn FnMut(u64, u64) + Send>;

/// Outbound chat transport operations the relay depends on
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Send a text message, optionally as a threaded reply
    async fn send_text(
        &self,
        chat: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageRef, DeliveryError>;

    /// Edit a previously sent message in place
    async fn edit_text(&self, message: &MessageRef, text: &str) -> Result<(), DeliveryError>;

    /// Delete a previously sent message
    async fn delete_message(&self, message: &MessageRef) -> Result<(), DeliveryError>;

    /// Upload a file with a caption, reporting progress through the callback
    async fn send_file(
        &self,
        chat: ChatId,
        path: &Path,
        caption: &str,
        reply_to: Option<MessageId>,
        on_progress: ProgressCallback,
    ) -> Result<(), DeliveryError>;
}

/// Throttle for upload progress updates
///
/// Admits a progress report only when the percentage has advanced by at least
/// `min_step` points since the last admitted report, so status edits do not
/// flood the transport.
#[derive(Debug)]
pub struct ProgressThrottle {
    last_percent: u8,
    min_step: u8,
}

impl ProgressThrottle {
    /// Create a throttle admitting advances of at least `min_step` points
    pub fn new(min_step: u8) -> Self {
        Self {
            last_percent: 0,
            min_step,
        }
    }

    /// Evaluate a progress report, returning the percentage if it should pass
    pub fn admit(&mut self, bytes_sent: u64, bytes_total: u64) -> Option<u8> {
        if bytes_total == 0 {
            return None;
        }
        let percent = ((bytes_sent.min(bytes_total)) * 100 / bytes_total) as u8;
        if percent >= self.last_percent.saturating_add(self.min_step) {
            self.last_percent = percent;
            Some(percent)
        } else {
            None
        }
    }
}
