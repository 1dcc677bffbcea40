//! Core types and events for tube-relay

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Chat platform user identity
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Chat/conversation identity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Message identity within a chat
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Handle to a message the relay previously sent (used for edits and deletion)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    /// Chat the message lives in
    pub chat: ChatId,
    /// Message identity within that chat
    pub message_id: MessageId,
}

/// One user's request to fetch and deliver a specific media URL
///
/// Constructed only after the URL has been normalized to canonical form and the
/// rate limiter has admitted the request. Immutable except for the status
/// message handle, which is owned exclusively by the worker processing the job.
#[derive(Clone, Debug)]
pub struct Job {
    /// Requesting user
    pub user: UserId,
    /// Conversation the request arrived in (delivery target)
    pub chat: ChatId,
    /// The request message itself, for threaded replies
    pub message: MessageId,
    /// Canonical media URL
    pub url: String,
    /// Mutable progress message, set once the worker creates one
    pub(crate) status: Option<MessageRef>,
}

impl Job {
    /// Create a job for an admitted request
    pub fn new(user: UserId, chat: ChatId, message: MessageId, url: String) -> Self {
        Self {
            user,
            chat,
            message,
            url,
            status: None,
        }
    }
}

/// Metadata result of a probe-only fetch
///
/// Produced fresh per job, never cached across jobs. Availability failures are
/// reported through [`ProbeError`](crate::ProbeError) rather than a flag on
/// this struct.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoInfo {
    /// External video id
    pub id: String,
    /// Video title
    pub title: String,
    /// Duration in seconds
    pub duration_secs: u64,
    /// Uploader/channel name
    pub uploader: String,
    /// Thumbnail URL, when the source reports one
    pub thumbnail: Option<String>,
}

/// Outcome of a successful fetch-and-store operation
///
/// Ownership of the file on disk transfers to the job processor, which is
/// solely responsible for deleting it. Fetch failures are reported through
/// [`FetchError`](crate::FetchError).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadResult {
    /// Local path of the stored media file
    pub file_path: PathBuf,
    /// Size of the stored file in bytes
    pub size_bytes: u64,
    /// Video title
    pub title: String,
    /// Duration in seconds
    pub duration_secs: u64,
}

/// Pipeline stage of a job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Fetching metadata, no payload download
    Probing,
    /// Fetching the media payload to local storage
    Downloading,
    /// Delivering the file to the requester
    Uploading,
    /// Delivered successfully
    Done,
    /// Terminal failure (reachable from any prior stage)
    Failed,
}

/// Events emitted by the relay
///
/// Consumers subscribe via [`MediaRelay::subscribe`](crate::MediaRelay::subscribe).
/// Events are informational; dropping them never affects job processing.
#[derive(Clone, Debug)]
pub enum Event {
    /// A request was admitted and buffered
    JobQueued {
        /// Requesting user
        user: UserId,
        /// Canonical media URL
        url: String,
        /// 1-based queue position at insertion time
        position: usize,
    },
    /// A job moved to a new pipeline stage
    StageChanged {
        /// Requesting user
        user: UserId,
        /// New stage
        stage: Stage,
    },
    /// A job delivered its file and finished
    JobCompleted {
        /// Requesting user
        user: UserId,
        /// Video title
        title: String,
        /// Delivered payload size in bytes
        size_bytes: u64,
    },
    /// A job failed terminally
    JobFailed {
        /// Requesting user
        user: UserId,
        /// Plain-language failure description (what the user was told)
        reason: String,
    },
    /// The cleanup sweeper removed a stale file
    FileSwept {
        /// Path of the removed file
        path: PathBuf,
    },
}
