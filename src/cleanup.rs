//! Working-directory cleanup
//!
//! Per-job deletion plus a periodic background sweeper. The job processor
//! deletes its own file on every exit path; the sweeper is a safety net for
//! files orphaned by crashes or abrupt process kills. Each sweep scans the
//! working directory's immediate file entries and removes anything whose
//! last-modified time is older than the staleness threshold. Idempotent when
//! nothing is stale.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::types::Event;

/// Delete a single file, logging the outcome
///
/// Returns true if the file existed and was removed. Missing files and
/// directories are not an error; failures are logged and swallowed so cleanup
/// never aborts a job.
pub fn delete_file(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::info!(path = %path.display(), "Deleted file");
            true
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to delete file");
            false
        }
    }
}

/// Remove immediate file entries of `dir` older than `max_age`
///
/// Subdirectories are never touched. Returns the paths that were removed.
pub fn sweep_stale_files(dir: &Path, max_age: Duration) -> Vec<PathBuf> {
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let mut removed = Vec::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!(dir = %dir.display(), error = %e, "Sweep: failed to scan directory");
            return removed;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Sweep: failed to read mtime");
                continue;
            }
        };
        if modified < cutoff {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "Sweep: removed stale file");
                    removed.push(path);
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Sweep: failed to remove stale file");
                }
            }
        }
    }

    removed
}

/// Total size in bytes of the immediate file entries of `dir`
pub fn directory_size(dir: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .filter_map(|entry| entry.metadata().ok())
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .sum()
}

/// Periodic background sweeper over the working directory
///
/// Runs [`sweep_stale_files`] on a fixed interval until cancelled, emitting
/// [`Event::FileSwept`] per removed file.
pub struct CleanupSweeper {
    dir: PathBuf,
    interval: Duration,
    max_age: Duration,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl CleanupSweeper {
    /// Create a sweeper over `dir`
    pub fn new(
        dir: PathBuf,
        interval: Duration,
        max_age: Duration,
        event_tx: broadcast::Sender<Event>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            dir,
            interval,
            max_age,
            event_tx,
            cancel,
        }
    }

    /// Spawn the sweep loop as a background task
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                dir = %self.dir.display(),
                interval_secs = self.interval.as_secs(),
                max_age_secs = self.max_age.as_secs(),
                "Cleanup sweeper started"
            );

            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so a fresh start does
            // not race jobs that are still writing.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let removed = sweep_stale_files(&self.dir, self.max_age);
                        if !removed.is_empty() {
                            tracing::info!(count = removed.len(), "Sweep removed stale files");
                        }
                        for path in removed {
                            self.event_tx.send(Event::FileSwept { path }).ok();
                        }
                    }
                    _ = self.cancel.cancelled() => {
                        break;
                    }
                }
            }

            tracing::info!("Cleanup sweeper stopped");
        })
    }
}
