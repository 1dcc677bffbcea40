//! Media fetch service
//!
//! The extraction engine is a collaborator behind the [`MediaFetcher`] trait:
//! a metadata-only probe and a full fetch-and-store operation, each bounded by
//! its own timeout. [`YtDlpFetcher`] is the production implementation,
//! shelling out to a `yt-dlp` binary discovered on PATH (or configured
//! explicitly) and classifying its stderr into the fetch error taxonomy.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::DownloadConfig;
use crate::error::{Error, FetchError, ProbeError};
use crate::types::{DownloadResult, VideoInfo};

/// Probe-and-fetch interface to the media extraction engine
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetch metadata only, no payload download
    async fn probe(&self, url: &str) -> Result<VideoInfo, ProbeError>;

    /// Fetch the media payload to local storage
    ///
    /// `job_key` namespaces the output filename so concurrently fetching jobs
    /// never collide in the shared working directory.
    async fn fetch(&self, url: &str, job_key: &str) -> Result<DownloadResult, FetchError>;
}

/// Subset of the yt-dlp info JSON the relay cares about
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    thumbnail: Option<String>,
}

impl YtDlpInfo {
    fn into_video_info(self) -> VideoInfo {
        VideoInfo {
            id: self.id,
            title: self.title.unwrap_or_else(|| "Unknown".to_string()),
            duration_secs: self.duration.unwrap_or(0.0).max(0.0) as u64,
            uploader: self.uploader.unwrap_or_else(|| "Unknown".to_string()),
            thumbnail: self.thumbnail,
        }
    }
}

/// Production fetcher shelling out to yt-dlp
pub struct YtDlpFetcher {
    binary: PathBuf,
    working_dir: PathBuf,
    max_resolution: u32,
    probe_timeout: Duration,
    fetch_timeout: Duration,
    fetch_retries: u32,
}

impl YtDlpFetcher {
    /// Create a fetcher from the download configuration
    ///
    /// The yt-dlp binary is taken from `config.ytdlp_path` when set, otherwise
    /// discovered on PATH.
    pub fn new(config: &DownloadConfig) -> crate::error::Result<Self> {
        let binary = match &config.ytdlp_path {
            Some(path) => path.clone(),
            None => which::which("yt-dlp").map_err(|e| Error::Config {
                message: format!("yt-dlp not found on PATH: {}", e),
                key: Some("ytdlp_path".to_string()),
            })?,
        };

        tracing::info!(binary = %binary.display(), "yt-dlp fetcher initialized");

        Ok(Self {
            binary,
            working_dir: config.working_dir.clone(),
            max_resolution: config.max_resolution,
            probe_timeout: config.probe_timeout,
            fetch_timeout: config.fetch_timeout,
            fetch_retries: config.fetch_retries,
        })
    }

    /// Format selector capped at the configured resolution, preferring mp4
    /// with a merged-stream fallback chain.
    fn format_selector(&self) -> String {
        let h = self.max_resolution;
        format!(
            "bestvideo[height<={h}][ext=mp4]+bestaudio[ext=m4a]/\
             bestvideo[height<={h}]+bestaudio/\
             best[height<={h}][ext=mp4]/\
             best[height<={h}]/best"
        )
    }

    /// Expected output path for a fetch, derived from the deterministic
    /// output template.
    fn expected_path(&self, job_key: &str, video_id: &str) -> PathBuf {
        self.working_dir.join(format!("{}_{}.mp4", job_key, video_id))
    }

    /// Locate the output file by template prefix when the expected path is
    /// missing (yt-dlp may settle on a different extension).
    ///
    /// The prefix includes the video id, so a user's concurrent fetches of
    /// different videos can never resolve to each other's files.
    fn find_by_prefix(&self, job_key: &str, video_id: &str) -> Option<PathBuf> {
        let prefix = format!("{}_{}.", job_key, video_id);
        let entries = std::fs::read_dir(&self.working_dir).ok()?;
        entries
            .flatten()
            .map(|entry| entry.path())
            .find(|path| {
                path.is_file()
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(&prefix))
            })
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn probe(&self, url: &str) -> Result<VideoInfo, ProbeError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-J", "--no-warnings", "--no-playlist", "--socket-timeout", "15"])
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = tokio::time::timeout(self.probe_timeout, cmd.output())
            .await
            .map_err(|_| {
                tracing::error!(url = %url, "Probe timed out");
                ProbeError::Timeout
            })?
            .map_err(|e| ProbeError::Unknown(format!("failed to run yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let error = classify_probe_stderr(&stderr);
            tracing::error!(url = %url, error = %error, "Probe failed");
            return Err(error);
        }

        let info: YtDlpInfo = serde_json::from_slice(&output.stdout)
            .map_err(|e| ProbeError::Unknown(format!("unparseable probe output: {}", e)))?;
        Ok(info.into_video_info())
    }

    async fn fetch(&self, url: &str, job_key: &str) -> Result<DownloadResult, FetchError> {
        let template = self
            .working_dir
            .join(format!("{}_%(id)s.%(ext)s", job_key))
            .to_string_lossy()
            .into_owned();
        let retries = self.fetch_retries.to_string();

        let mut cmd = Command::new(&self.binary);
        cmd.args(["-f", &self.format_selector()])
            .args(["--merge-output-format", "mp4"])
            .args(["-o", &template])
            .args(["--no-playlist", "--no-warnings", "--no-progress"])
            .args(["--retries", &retries])
            .args(["--fragment-retries", &retries])
            .args(["--socket-timeout", "60"])
            // Print the full info JSON once the download finishes, so the
            // result carries title/duration without a second probe.
            .args(["-j", "--no-simulate"])
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::info!(url = %url, job_key = %job_key, "Starting fetch");

        let output = tokio::time::timeout(self.fetch_timeout, cmd.output())
            .await
            .map_err(|_| {
                tracing::error!(url = %url, timeout_secs = self.fetch_timeout.as_secs(), "Fetch timed out");
                FetchError::Timeout
            })?
            .map_err(|e| FetchError::Failed(format!("failed to run yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let error = classify_fetch_stderr(&stderr);
            tracing::error!(url = %url, error = %error, "Fetch failed");
            return Err(error);
        }

        let info: YtDlpInfo = serde_json::from_slice(&output.stdout)
            .map_err(|e| FetchError::Failed(format!("unparseable fetch output: {}", e)))?;

        let file_path = {
            let expected = self.expected_path(job_key, &info.id);
            if expected.is_file() {
                expected
            } else {
                self.find_by_prefix(job_key, &info.id)
                    .ok_or_else(|| FetchError::Failed("downloaded file not found".to_string()))?
            }
        };

        let size_bytes = std::fs::metadata(&file_path)
            .map_err(|e| FetchError::Failed(format!("cannot stat downloaded file: {}", e)))?
            .len();

        let info = info.into_video_info();
        tracing::info!(
            file = %file_path.display(),
            size_bytes = size_bytes,
            "Fetch complete"
        );

        Ok(DownloadResult {
            file_path,
            size_bytes,
            title: info.title,
            duration_secs: info.duration_secs,
        })
    }
}

/// Map yt-dlp probe stderr to a failure category
fn classify_probe_stderr(stderr: &str) -> ProbeError {
    let lower = stderr.to_lowercase();
    if lower.contains("private") {
        ProbeError::Private
    } else if lower.contains("age") {
        ProbeError::AgeRestricted
    } else if lower.contains("copyright") {
        ProbeError::CopyrightBlocked
    } else if lower.contains("unavailable") || lower.contains("removed") {
        ProbeError::Unavailable
    } else {
        ProbeError::Unknown(first_line(stderr).to_string())
    }
}

/// Map yt-dlp fetch stderr to a failure category
fn classify_fetch_stderr(stderr: &str) -> FetchError {
    let lower = stderr.to_lowercase();
    if lower.contains("ffmpeg") {
        FetchError::Tool("ffmpeg".to_string())
    } else if lower.contains("private") || lower.contains("unavailable") {
        FetchError::Unavailable
    } else {
        FetchError::Failed(first_line(stderr).to_string())
    }
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("").trim()
}
