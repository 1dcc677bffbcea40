//! Integration tests for the relay pipeline: admission, processing, shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{DeliveryError, FetchError, ProbeError, SubmitError};
use crate::fetch::MediaFetcher;
use crate::relay::test_helpers::{
    create_test_relay, default_video_info, test_config, FetchPlan, MockDelivery, MockFetcher,
};
use crate::relay::MediaRelay;
use crate::types::{ChatId, DownloadResult, Event, MessageId, UserId, VideoInfo};

const USER: UserId = UserId(1);
const CHAT: ChatId = ChatId(100);
const MESSAGE: MessageId = MessageId(5);
const URL: &str = "https://youtu.be/dQw4w9WgXcQ";

/// Wait for the first event matching the predicate, with a generous timeout.
async fn wait_for_event(
    rx: &mut tokio::sync::broadcast::Receiver<Event>,
    predicate: impl Fn(&Event) -> bool,
) -> Event {
    // Generous bound: under a paused clock this must outlast any suspension
    // the pipeline performs (e.g. a mandated rate-limit wait).
    tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn is_completed(event: &Event) -> bool {
    matches!(event, Event::JobCompleted { .. })
}

fn is_failed(event: &Event) -> bool {
    matches!(event, Event::JobFailed { .. })
}

#[tokio::test]
async fn successful_job_delivers_file_and_cleans_up() {
    let (relay, _fetcher, delivery, temp_dir) = create_test_relay().await;
    relay.start().await;
    let mut events = relay.subscribe();

    let position = relay.submit(USER, CHAT, MESSAGE, URL).await.unwrap();
    assert_eq!(position, 1);

    wait_for_event(&mut events, is_completed).await;

    // Exactly one file delivered, and it existed at send time.
    let sent = delivery.sent_files.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    let (chat, path, _, existed) = &sent[0];
    assert_eq!(*chat, CHAT);
    assert!(existed);

    let captions = delivery.sent_captions();
    assert_eq!(captions.len(), 1);
    assert!(captions[0].contains("Test Video"));
    assert!(captions[0].contains("3m 32s"));

    // The local file does not outlive the job.
    assert!(!path.exists());
    assert_eq!(
        std::fs::read_dir(temp_dir.path()).unwrap().count(),
        0,
        "working directory should be empty after the job"
    );

    // Success removes the status message instead of editing it.
    assert_eq!(delivery.deleted.lock().unwrap().len(), 1);

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn status_message_is_created_once_then_edited() {
    let (relay, _fetcher, delivery, _temp_dir) = create_test_relay().await;
    relay.start().await;
    let mut events = relay.subscribe();

    relay.submit(USER, CHAT, MESSAGE, URL).await.unwrap();
    wait_for_event(&mut events, is_completed).await;

    let texts = delivery.sent_texts.lock().unwrap().clone();
    assert_eq!(texts.len(), 1, "only the initial status should be a fresh message");
    assert_eq!(texts[0].1, "Getting video info...");
    assert_eq!(texts[0].2, Some(MESSAGE), "status replies to the request message");

    let edits = delivery.edits.lock().unwrap().clone();
    assert!(edits.iter().any(|(_, t)| t.starts_with("Downloading:")));
    assert!(edits.iter().any(|(_, t)| t.starts_with("Uploading (")));

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn probe_failure_is_terminal_and_skips_fetch() {
    let (relay, fetcher, delivery, _temp_dir) = create_test_relay().await;
    fetcher.set_probe(Err(ProbeError::Private));
    relay.start().await;
    let mut events = relay.subscribe();

    relay.submit(USER, CHAT, MESSAGE, URL).await.unwrap();
    let event = wait_for_event(&mut events, is_failed).await;

    match event {
        Event::JobFailed { reason, .. } => assert_eq!(reason, "Video is private"),
        _ => unreachable!(),
    }
    assert_eq!(fetcher.fetch_calls.load(std::sync::atomic::Ordering::SeqCst), 0);

    // The status message was replaced with the error text.
    let edits = delivery.edits.lock().unwrap().clone();
    assert!(edits.iter().any(|(_, t)| t == "Video is private"));
    assert!(delivery.sent_files.lock().unwrap().is_empty());

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn too_long_video_fails_after_probe_without_fetch() {
    let (relay, fetcher, _delivery, _temp_dir) = create_test_relay().await;
    let mut info = default_video_info();
    info.duration_secs = 7500;
    fetcher.set_probe(Ok(info));
    relay.start().await;
    let mut events = relay.subscribe();

    relay.submit(USER, CHAT, MESSAGE, URL).await.unwrap();
    let event = wait_for_event(&mut events, is_failed).await;

    match event {
        Event::JobFailed { reason, .. } => assert_eq!(reason, "Video too long (max 2h 0m)"),
        _ => unreachable!(),
    }
    assert_eq!(fetcher.fetch_calls.load(std::sync::atomic::Ordering::SeqCst), 0);

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn oversized_fetch_deletes_file_and_fails() {
    let (relay, fetcher, delivery, temp_dir) = create_test_relay().await;
    fetcher.set_fetch(Ok(FetchPlan {
        size_bytes: 3 * 1024 * 1024 * 1024,
        ..FetchPlan::default()
    }));
    relay.start().await;
    let mut events = relay.subscribe();

    relay.submit(USER, CHAT, MESSAGE, URL).await.unwrap();
    let event = wait_for_event(&mut events, is_failed).await;

    match event {
        Event::JobFailed { reason, .. } => assert!(reason.starts_with("Video too large")),
        _ => unreachable!(),
    }
    assert!(delivery.sent_files.lock().unwrap().is_empty());

    // A directory scan finds no leftover file.
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn fetch_timeout_reports_user_message() {
    let (relay, fetcher, delivery, _temp_dir) = create_test_relay().await;
    fetcher.set_fetch(Err(FetchError::Timeout));
    relay.start().await;
    let mut events = relay.subscribe();

    relay.submit(USER, CHAT, MESSAGE, URL).await.unwrap();
    wait_for_event(&mut events, is_failed).await;

    let edits = delivery.edits.lock().unwrap().clone();
    assert!(edits
        .iter()
        .any(|(_, t)| t == "Download timed out. Try a shorter video."));

    relay.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn delivery_rate_limit_honors_mandated_wait_then_fails() {
    let (relay, _fetcher, delivery, _temp_dir) = create_test_relay().await;
    delivery.fail_next_sends([DeliveryError::RateLimited {
        retry_after: Duration::from_secs(45),
    }]);
    relay.start().await;
    let mut events = relay.subscribe();

    let start = tokio::time::Instant::now();
    relay.submit(USER, CHAT, MESSAGE, URL).await.unwrap();
    let event = wait_for_event(&mut events, is_failed).await;

    // The processor suspended for the mandated wait before reporting.
    assert!(
        start.elapsed() >= Duration::from_secs(45),
        "expected a ~45s suspension, got {:?}",
        start.elapsed()
    );
    match event {
        Event::JobFailed { reason, .. } => {
            assert_eq!(reason, "Rate limited. Please try again in a minute.")
        }
        _ => unreachable!(),
    }

    // The send was not retried after the rate-limit signal.
    assert!(delivery.sent_files.lock().unwrap().is_empty());

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn transient_transport_errors_are_retried_to_success() {
    let (relay, _fetcher, delivery, _temp_dir) = create_test_relay().await;
    delivery.fail_next_sends([
        DeliveryError::Transport("502".to_string()),
        DeliveryError::Transport("502 again".to_string()),
    ]);
    relay.start().await;
    let mut events = relay.subscribe();

    relay.submit(USER, CHAT, MESSAGE, URL).await.unwrap();
    wait_for_event(&mut events, is_completed).await;

    assert_eq!(delivery.sent_files.lock().unwrap().len(), 1);

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn exhausted_upload_retries_fail_the_job() {
    let (relay, _fetcher, delivery, _temp_dir) = create_test_relay().await;
    delivery.fail_next_sends([
        DeliveryError::Transport("down".to_string()),
        DeliveryError::Transport("down".to_string()),
        DeliveryError::Transport("down".to_string()),
    ]);
    relay.start().await;
    let mut events = relay.subscribe();

    relay.submit(USER, CHAT, MESSAGE, URL).await.unwrap();
    let event = wait_for_event(&mut events, is_failed).await;

    match event {
        Event::JobFailed { reason, .. } => {
            assert_eq!(reason, "Upload failed. Please try again.")
        }
        _ => unreachable!(),
    }
    assert!(delivery.sent_files.lock().unwrap().is_empty());

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn upload_progress_updates_are_throttled() {
    let (relay, _fetcher, delivery, _temp_dir) = create_test_relay().await;
    relay.start().await;
    let mut events = relay.subscribe();

    relay.submit(USER, CHAT, MESSAGE, URL).await.unwrap();
    wait_for_event(&mut events, is_completed).await;

    // Mock reports 0/25/50/75/100; the 0% report is suppressed.
    let progress_edits: Vec<String> = delivery
        .edits
        .lock()
        .unwrap()
        .iter()
        .filter(|(_, t)| t.starts_with("Uploading... "))
        .map(|(_, t)| t.clone())
        .collect();
    assert_eq!(
        progress_edits,
        vec![
            "Uploading... 25%",
            "Uploading... 50%",
            "Uploading... 75%",
            "Uploading... 100%",
        ]
    );

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn jobs_process_in_submission_order() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(temp_dir.path().to_path_buf());
    config.download.worker_count = 1;
    let fetcher = Arc::new(MockFetcher::new(temp_dir.path().to_path_buf()));
    fetcher.set_fetch_delay(Duration::from_millis(20));
    let delivery = Arc::new(MockDelivery::new());
    let relay = MediaRelay::new(config, fetcher.clone(), delivery.clone())
        .await
        .unwrap();
    let mut events = relay.subscribe();

    for user in 1..=3 {
        relay
            .submit(UserId(user), CHAT, MessageId(user), URL)
            .await
            .unwrap();
    }
    relay.start().await;

    let mut completed_users = Vec::new();
    while completed_users.len() < 3 {
        if let Event::JobCompleted { user, .. } = wait_for_event(&mut events, is_completed).await {
            completed_users.push(user.0);
        }
    }
    assert_eq!(completed_users, vec![1, 2, 3]);

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn queue_position_reflects_backlog() {
    let (relay, _fetcher, _delivery, _temp_dir) = create_test_relay().await;
    // Workers not started: positions grow with the backlog.
    for (user, expected) in [(1, 1), (2, 2), (3, 3)] {
        let position = relay
            .submit(UserId(user), CHAT, MessageId(user), URL)
            .await
            .unwrap();
        assert_eq!(position, expected);
    }
    assert_eq!(relay.pending_jobs().await, 3);
}

#[tokio::test]
async fn first_video_url_in_message_text_is_queued() {
    let (relay, _fetcher, _delivery, _temp_dir) = create_test_relay().await;

    relay
        .submit(
            USER,
            CHAT,
            MESSAGE,
            "grab this one please youtu.be/dQw4w9WgXcQ (and maybe youtu.be/aaaaaaaaaaa later)",
        )
        .await
        .unwrap();

    let queue = relay.queue_state.queue.lock().await;
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
}

#[tokio::test]
async fn invalid_url_is_rejected_before_queuing() {
    let (relay, _fetcher, _delivery, _temp_dir) = create_test_relay().await;

    let result = relay
        .submit(USER, CHAT, MESSAGE, "https://example.com/watch?v=dQw4w9WgXcQ")
        .await;
    assert_eq!(result, Err(SubmitError::InvalidUrl));
    assert_eq!(relay.pending_jobs().await, 0);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_user_is_rejected_with_reset_eta() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(temp_dir.path().to_path_buf());
    config.rate_limit.max_requests = 1;
    config.rate_limit.window = Duration::from_secs(60);
    let fetcher = Arc::new(MockFetcher::new(temp_dir.path().to_path_buf()));
    let delivery = Arc::new(MockDelivery::new());
    let relay = MediaRelay::new(config, fetcher, delivery).await.unwrap();

    relay.submit(USER, CHAT, MESSAGE, URL).await.unwrap();

    let result = relay.submit(USER, CHAT, MESSAGE, URL).await;
    assert!(matches!(
        result,
        Err(SubmitError::RateLimited { retry_after_secs }) if retry_after_secs > 0
    ));

    // Another user is unaffected.
    assert!(relay.submit(UserId(2), CHAT, MESSAGE, URL).await.is_ok());
}

#[tokio::test]
async fn both_url_shapes_consume_separate_slots_for_one_video() {
    let (relay, _fetcher, _delivery, _temp_dir) = create_test_relay().await;

    relay
        .submit(USER, CHAT, MESSAGE, "youtu.be/dQw4w9WgXcQ")
        .await
        .unwrap();
    relay
        .submit(USER, CHAT, MESSAGE, "https://www.youtube.com/watch?v=dQw4w9WgXcQ")
        .await
        .unwrap();

    // Both normalized to the same canonical URL, no dedup across submissions.
    let queue = relay.queue_state.queue.lock().await;
    assert_eq!(queue.len(), 2);
    assert!(queue
        .iter()
        .all(|job| job.url == "https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
}

#[tokio::test]
async fn submissions_are_rejected_during_shutdown() {
    let (relay, _fetcher, _delivery, _temp_dir) = create_test_relay().await;
    relay.start().await;
    relay.shutdown().await.unwrap();

    let result = relay.submit(USER, CHAT, MESSAGE, URL).await;
    assert_eq!(result, Err(SubmitError::ShuttingDown));
}

/// Fetcher whose probe panics while the counter is non-zero, then delegates.
struct FaultyFetcher {
    inner: MockFetcher,
    panics_remaining: AtomicUsize,
}

#[async_trait]
impl MediaFetcher for FaultyFetcher {
    async fn probe(&self, url: &str) -> Result<VideoInfo, ProbeError> {
        if self.panics_remaining.load(Ordering::SeqCst) > 0 {
            self.panics_remaining.fetch_sub(1, Ordering::SeqCst);
            panic!("probe blew up");
        }
        self.inner.probe(url).await
    }

    async fn fetch(&self, url: &str, job_key: &str) -> Result<DownloadResult, FetchError> {
        self.inner.fetch(url, job_key).await
    }
}

#[tokio::test]
async fn panicking_job_reports_generic_failure_and_worker_survives() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(temp_dir.path().to_path_buf());
    config.download.worker_count = 1;
    let fetcher = Arc::new(FaultyFetcher {
        inner: MockFetcher::new(temp_dir.path().to_path_buf()),
        panics_remaining: AtomicUsize::new(1),
    });
    let delivery = Arc::new(MockDelivery::new());
    let relay = MediaRelay::new(config, fetcher, delivery.clone())
        .await
        .unwrap();
    relay.start().await;
    let mut events = relay.subscribe();

    relay.submit(USER, CHAT, MESSAGE, URL).await.unwrap();
    let event = wait_for_event(&mut events, is_failed).await;
    match event {
        Event::JobFailed { reason, .. } => {
            assert_eq!(reason, "Something went wrong. Please try again.")
        }
        _ => unreachable!(),
    }

    // The sole worker is still alive and handles the next job normally.
    relay
        .submit(UserId(2), CHAT, MessageId(2), URL)
        .await
        .unwrap();
    wait_for_event(&mut events, is_completed).await;
    assert_eq!(delivery.sent_files.lock().unwrap().len(), 1);

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_finishes_in_flight_job_and_abandons_queued_ones() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(temp_dir.path().to_path_buf());
    config.download.worker_count = 1;
    config.delivery.drain_timeout = Duration::ZERO;
    let fetcher = Arc::new(MockFetcher::new(temp_dir.path().to_path_buf()));
    fetcher.set_fetch_delay(Duration::from_millis(300));
    let delivery = Arc::new(MockDelivery::new());
    let relay = MediaRelay::new(config, fetcher, delivery.clone())
        .await
        .unwrap();
    relay.start().await;

    for user in 1..=3 {
        relay
            .submit(UserId(user), CHAT, MessageId(user), URL)
            .await
            .unwrap();
    }

    // Let the single worker pick up the first job and get mid-fetch.
    tokio::time::sleep(Duration::from_millis(100)).await;
    relay.shutdown().await.unwrap();

    // The in-flight job completed and was delivered; the queued two never started.
    assert_eq!(delivery.sent_files.lock().unwrap().len(), 1);
    assert_eq!(relay.pending_jobs().await, 2);
}
