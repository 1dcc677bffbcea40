//! Shared helpers for relay tests: mock collaborators and a relay factory.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Config;
use crate::delivery::{DeliveryChannel, ProgressCallback};
use crate::error::{DeliveryError, FetchError, ProbeError};
use crate::fetch::MediaFetcher;
use crate::relay::MediaRelay;
use crate::types::{ChatId, DownloadResult, MessageId, MessageRef, VideoInfo};

/// What the mock fetcher should produce for a fetch call
#[derive(Clone)]
pub(crate) struct FetchPlan {
    pub size_bytes: u64,
    pub title: String,
    pub duration_secs: u64,
}

impl Default for FetchPlan {
    fn default() -> Self {
        Self {
            size_bytes: 1024,
            title: "Test Video".to_string(),
            duration_secs: 212,
        }
    }
}

/// Programmable fetcher that writes real files into the working directory
pub(crate) struct MockFetcher {
    working_dir: PathBuf,
    pub probe_response: Mutex<Result<VideoInfo, ProbeError>>,
    pub fetch_response: Mutex<Result<FetchPlan, FetchError>>,
    /// Artificial latency per fetch, for shutdown/ordering tests
    pub fetch_delay: Mutex<Duration>,
    pub probe_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
}

impl MockFetcher {
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            probe_response: Mutex::new(Ok(default_video_info())),
            fetch_response: Mutex::new(Ok(FetchPlan::default())),
            fetch_delay: Mutex::new(Duration::ZERO),
            probe_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_probe(&self, response: Result<VideoInfo, ProbeError>) {
        *self.probe_response.lock().unwrap() = response;
    }

    pub fn set_fetch(&self, response: Result<FetchPlan, FetchError>) {
        *self.fetch_response.lock().unwrap() = response;
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }
}

pub(crate) fn default_video_info() -> VideoInfo {
    VideoInfo {
        id: "dQw4w9WgXcQ".to_string(),
        title: "Test Video".to_string(),
        duration_secs: 212,
        uploader: "Test Channel".to_string(),
        thumbnail: None,
    }
}

#[async_trait]
impl MediaFetcher for MockFetcher {
    async fn probe(&self, _url: &str) -> Result<VideoInfo, ProbeError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        self.probe_response.lock().unwrap().clone()
    }

    async fn fetch(&self, _url: &str, job_key: &str) -> Result<DownloadResult, FetchError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let plan = self.fetch_response.lock().unwrap().clone()?;
        let file_path = self.working_dir.join(format!("{}_dQw4w9WgXcQ.mp4", job_key));
        std::fs::write(&file_path, vec![0u8; plan.size_bytes.min(4096) as usize]).unwrap();

        Ok(DownloadResult {
            file_path,
            size_bytes: plan.size_bytes,
            title: plan.title,
            duration_secs: plan.duration_secs,
        })
    }
}

/// Recording delivery channel with programmable send_file failures
pub(crate) struct MockDelivery {
    next_message_id: AtomicI64,
    pub sent_texts: Mutex<Vec<(ChatId, String, Option<MessageId>)>>,
    pub edits: Mutex<Vec<(MessageRef, String)>>,
    pub deleted: Mutex<Vec<MessageRef>>,
    /// (chat, path, caption, file existed at send time)
    pub sent_files: Mutex<Vec<(ChatId, PathBuf, String, bool)>>,
    /// Errors popped one per send_file attempt before any success
    pub send_file_failures: Mutex<VecDeque<DeliveryError>>,
    /// Progress points the mock reports, as (sent, total) fractions of the
    /// file size in percent
    pub progress_points: Mutex<Vec<u64>>,
}

impl MockDelivery {
    pub fn new() -> Self {
        Self {
            next_message_id: AtomicI64::new(1000),
            sent_texts: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            sent_files: Mutex::new(Vec::new()),
            send_file_failures: Mutex::new(VecDeque::new()),
            progress_points: Mutex::new(vec![0, 25, 50, 75, 100]),
        }
    }

    pub fn fail_next_sends(&self, errors: impl IntoIterator<Item = DeliveryError>) {
        self.send_file_failures.lock().unwrap().extend(errors);
    }

    /// Captions of successfully sent files, in order
    pub fn sent_captions(&self) -> Vec<String> {
        self.sent_files
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, caption, _)| caption.clone())
            .collect()
    }
}

#[async_trait]
impl DeliveryChannel for MockDelivery {
    async fn send_text(
        &self,
        chat: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageRef, DeliveryError> {
        self.sent_texts
            .lock()
            .unwrap()
            .push((chat, text.to_string(), reply_to));
        Ok(MessageRef {
            chat,
            message_id: MessageId(self.next_message_id.fetch_add(1, Ordering::SeqCst)),
        })
    }

    async fn edit_text(&self, message: &MessageRef, text: &str) -> Result<(), DeliveryError> {
        self.edits.lock().unwrap().push((*message, text.to_string()));
        Ok(())
    }

    async fn delete_message(&self, message: &MessageRef) -> Result<(), DeliveryError> {
        self.deleted.lock().unwrap().push(*message);
        Ok(())
    }

    async fn send_file(
        &self,
        chat: ChatId,
        path: &Path,
        caption: &str,
        _reply_to: Option<MessageId>,
        mut on_progress: ProgressCallback,
    ) -> Result<(), DeliveryError> {
        if let Some(error) = self.send_file_failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let total = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let points = self.progress_points.lock().unwrap().clone();
        for percent in points {
            on_progress(total * percent / 100, total);
        }

        self.sent_files.lock().unwrap().push((
            chat,
            path.to_path_buf(),
            caption.to_string(),
            path.exists(),
        ));
        Ok(())
    }
}

/// Test configuration with fast retry timings over a temp working directory
pub(crate) fn test_config(working_dir: PathBuf) -> Config {
    let mut config = Config::default();
    config.download.working_dir = working_dir;
    config.download.worker_count = 2;
    config.delivery.retry.initial_delay = Duration::from_millis(10);
    config.delivery.retry.max_delay = Duration::from_millis(100);
    config.delivery.retry.jitter = false;
    config.delivery.drain_timeout = Duration::from_millis(500);
    config
}

/// Build a relay over mock collaborators
///
/// Workers are not started; tests call `relay.start()` themselves when they
/// need the pool.
pub(crate) async fn create_test_relay() -> (
    MediaRelay,
    Arc<MockFetcher>,
    Arc<MockDelivery>,
    tempfile::TempDir,
) {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = test_config(temp_dir.path().to_path_buf());
    let fetcher = Arc::new(MockFetcher::new(temp_dir.path().to_path_buf()));
    let delivery = Arc::new(MockDelivery::new());

    let relay = MediaRelay::new(config, fetcher.clone(), delivery.clone())
        .await
        .unwrap();

    (relay, fetcher, delivery, temp_dir)
}
